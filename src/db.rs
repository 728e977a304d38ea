use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// Durable store for the name map, series and seasons. Every write is a single
/// keyed statement, so a record is either fully replaced or left untouched.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS urlmap (
                name TEXT UNIQUE NOT NULL,
                url  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_urlmap_url ON urlmap(url);

            CREATE TABLE IF NOT EXISTS series (
                url               TEXT UNIQUE NOT NULL,
                name              TEXT NOT NULL,
                image             TEXT NOT NULL DEFAULT '',
                genre             TEXT NOT NULL DEFAULT '',
                network           TEXT NOT NULL DEFAULT '',
                year              INTEGER NOT NULL DEFAULT 0,
                tomatometer_score INTEGER NOT NULL DEFAULT 0,
                audience_score    INTEGER NOT NULL DEFAULT 0,
                no_seasons        INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS seasons (
                series_url        TEXT NOT NULL REFERENCES series(url) ON DELETE CASCADE,
                season_no         INTEGER NOT NULL,
                image             TEXT NOT NULL DEFAULT '',
                tomatometer_score INTEGER NOT NULL DEFAULT 0,
                critic_ratings    INTEGER NOT NULL DEFAULT 0,
                audience_score    INTEGER NOT NULL DEFAULT 0,
                user_ratings      INTEGER NOT NULL DEFAULT 0,
                certified         BOOLEAN NOT NULL DEFAULT 0,
                year              INTEGER NOT NULL DEFAULT 0,
                UNIQUE(series_url, season_no)
            );
            ",
        )?;
        Ok(())
    }

    // ── Name map ──

    pub fn mapping_exists(&self, name: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urlmap WHERE name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    #[cfg(test)]
    pub fn get_mapping(&self, name: &str) -> Result<Option<String>> {
        let url = self
            .conn
            .query_row("SELECT url FROM urlmap WHERE name = ?1", params![name], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(url)
    }

    /// Map `name` to `url` unless the name is already mapped. Returns whether a
    /// row was written. A mapping is never changed once recorded.
    pub fn insert_mapping(&self, name: &str, url: &str) -> Result<bool> {
        if self.mapping_exists(name)? {
            return Ok(false);
        }
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO urlmap (name, url) VALUES (?1, ?2)",
            params![name, url],
        )?;
        Ok(n > 0)
    }

    /// Distinct mapped URLs in first-mapped order.
    pub fn mapped_urls(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM urlmap GROUP BY url ORDER BY MIN(rowid)")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Series ──

    /// A series is stable once it premiered before last year; anything newer
    /// (or absent) is a re-fetch candidate.
    pub fn series_is_stable(&self, url: &str, current_year: i32) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM series WHERE url = ?1 AND year < ?2",
            params![url, current_year - 1],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn get_series(&self, url: &str) -> Result<Option<SeriesRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT url, name, image, genre, network, year,
                        tomatometer_score, audience_score, no_seasons
                 FROM series WHERE url = ?1",
                params![url],
                |row| {
                    Ok(SeriesRecord {
                        url: row.get(0)?,
                        name: row.get(1)?,
                        image_url: row.get(2)?,
                        genre: row.get(3)?,
                        network: row.get(4)?,
                        premiere_year: row.get(5)?,
                        tomatometer_score: row.get(6)?,
                        audience_score: row.get(7)?,
                        season_count: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or overwrite every column of the series keyed by `url`. Updating in
    /// place keeps the seasons attached to it.
    pub fn upsert_series(&self, s: &SeriesRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO series
             (url, name, image, genre, network, year, tomatometer_score, audience_score, no_seasons)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                image = excluded.image,
                genre = excluded.genre,
                network = excluded.network,
                year = excluded.year,
                tomatometer_score = excluded.tomatometer_score,
                audience_score = excluded.audience_score,
                no_seasons = excluded.no_seasons",
            params![
                s.url,
                s.name,
                s.image_url,
                s.genre,
                s.network,
                s.premiere_year,
                s.tomatometer_score,
                s.audience_score,
                s.season_count,
            ],
        )?;
        Ok(())
    }

    /// Remove a series; its seasons go with it.
    pub fn delete_series(&self, url: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM series WHERE url = ?1", params![url])?;
        Ok(n > 0)
    }

    /// (url, announced season count) for every stored series.
    pub fn season_counts(&self) -> Result<Vec<(String, u32)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, no_seasons FROM series ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (url, announced season count) for every series with at least one season
    /// in `1..=no_seasons` that is missing or not yet stable.
    pub fn series_with_open_seasons(&self, current_year: i32) -> Result<Vec<(String, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.url, s.no_seasons FROM series s
             WHERE s.no_seasons > (
                 SELECT COUNT(*) FROM seasons x
                 WHERE x.series_url = s.url
                   AND x.season_no BETWEEN 1 AND s.no_seasons
                   AND x.year < ?1
             )
             ORDER BY s.rowid",
        )?;
        let rows = stmt
            .query_map(params![current_year - 1], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Seasons ──

    pub fn season_is_stable(&self, series_url: &str, season_no: u32, current_year: i32) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM seasons WHERE series_url = ?1 AND season_no = ?2 AND year < ?3",
            params![series_url, season_no, current_year - 1],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    #[cfg(test)]
    pub fn get_season(&self, series_url: &str, season_no: u32) -> Result<Option<SeasonRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT series_url, season_no, image, tomatometer_score, critic_ratings,
                        audience_score, user_ratings, certified, year
                 FROM seasons WHERE series_url = ?1 AND season_no = ?2",
                params![series_url, season_no],
                |row| {
                    Ok(SeasonRecord {
                        series_url: row.get(0)?,
                        season_no: row.get(1)?,
                        image_url: row.get(2)?,
                        tomatometer_score: row.get(3)?,
                        critic_rating_count: row.get(4)?,
                        audience_score: row.get(5)?,
                        user_rating_count: row.get(6)?,
                        certified_fresh: row.get(7)?,
                        premiere_year: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_season(&self, s: &SeasonRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO seasons
             (series_url, season_no, image, tomatometer_score, critic_ratings,
              audience_score, user_ratings, certified, year)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(series_url, season_no) DO UPDATE SET
                image = excluded.image,
                tomatometer_score = excluded.tomatometer_score,
                critic_ratings = excluded.critic_ratings,
                audience_score = excluded.audience_score,
                user_ratings = excluded.user_ratings,
                certified = excluded.certified,
                year = excluded.year",
            params![
                s.series_url,
                s.season_no,
                s.image_url,
                s.tomatometer_score,
                s.critic_rating_count,
                s.audience_score,
                s.user_rating_count,
                s.certified_fresh,
                s.premiere_year,
            ],
        )?;
        Ok(())
    }

    // ── Read boundary ──

    /// Every series with season-summed rating counts. Scores whose summed count
    /// is below `min_votes` come back as `None`; stored values are untouched.
    pub fn overview(&self, min_votes: u32, limit: Option<usize>) -> Result<Vec<OverviewRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.url, s.name, s.image, s.genre, s.network, s.year,
                    s.tomatometer_score, s.audience_score, s.no_seasons,
                    COALESCE(a.cr, 0), COALESCE(a.ur, 0), COALESCE(a.cert, 0)
             FROM series s
             LEFT JOIN (
                 SELECT series_url,
                        SUM(critic_ratings) AS cr,
                        SUM(user_ratings) AS ur,
                        MAX(certified) AS cert
                 FROM seasons GROUP BY series_url
             ) a ON a.series_url = s.url
             ORDER BY s.year DESC, s.name
             LIMIT ?1",
        )?;
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = stmt
            .query_map(params![limit], |row| {
                let critic_ratings: u32 = row.get(9)?;
                let user_ratings: u32 = row.get(10)?;
                let tomatometer: u32 = row.get(6)?;
                let audience: u32 = row.get(7)?;
                Ok(OverviewRow {
                    url: row.get(0)?,
                    name: row.get(1)?,
                    image: row.get(2)?,
                    genre: row.get(3)?,
                    network: row.get(4)?,
                    year: row.get(5)?,
                    tomatometer_score: (critic_ratings >= min_votes).then_some(tomatometer),
                    audience_score: (user_ratings >= min_votes).then_some(audience),
                    no_seasons: row.get(8)?,
                    critic_ratings,
                    user_ratings,
                    certified: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Stats ──

    pub fn stats(&self) -> Result<Stats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(Stats {
            names: count("SELECT COUNT(*) FROM urlmap")?,
            urls: count("SELECT COUNT(DISTINCT url) FROM urlmap")?,
            series: count("SELECT COUNT(*) FROM series")?,
            seasons: count("SELECT COUNT(*) FROM seasons")?,
            certified_seasons: count("SELECT COUNT(*) FROM seasons WHERE certified = 1")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRecord {
    pub url: String,
    pub name: String,
    pub image_url: String,
    pub genre: String,
    pub network: String,
    pub premiere_year: i32,
    pub tomatometer_score: u32,
    pub audience_score: u32,
    pub season_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRecord {
    pub series_url: String,
    pub season_no: u32,
    pub image_url: String,
    pub tomatometer_score: u32,
    pub critic_rating_count: u32,
    pub audience_score: u32,
    pub user_rating_count: u32,
    pub certified_fresh: bool,
    pub premiere_year: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewRow {
    pub url: String,
    pub name: String,
    pub image: String,
    pub genre: String,
    pub network: String,
    pub year: i32,
    pub tomatometer_score: Option<u32>,
    pub audience_score: Option<u32>,
    pub no_seasons: u32,
    pub critic_ratings: u32,
    pub user_ratings: u32,
    pub certified: bool,
}

pub struct Stats {
    pub names: usize,
    pub urls: usize,
    pub series: usize,
    pub seasons: usize,
    pub certified_seasons: usize,
}
