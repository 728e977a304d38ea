use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::Rejection;
use crate::fetch::{FetchRequest, Outcome};
use crate::pipeline::{progress_bar, Harvest, StageStats};

/// Result of the series pass: counters plus every URL it tried to fetch,
/// whether or not the fetch succeeded.
pub struct SeriesPass {
    pub stats: StageStats,
    pub touched: Vec<String>,
}

/// Which series the season pass walks.
pub enum SeasonScope<'a> {
    /// Series tried by the preceding series pass, plus every stored series
    /// that still has a missing or recent season.
    Pending(&'a [String]),
    /// Every stored series.
    All,
}

pub fn season_url(series_url: &str, season_no: u32) -> String {
    format!("{}/s{:02}", series_url.trim_end_matches('/'), season_no)
}

/// Fetch every mapped series that is missing or recent enough to still change.
pub async fn scrape_series(h: &Harvest) -> Result<SeriesPass> {
    let mut requests = Vec::new();
    for url in h.store.mapped_urls()? {
        if !h.store.series_is_stable(&url, h.current_year)? {
            requests.push(FetchRequest::new(url.clone(), url));
        }
    }
    info!("Series to fetch: {}", requests.len());

    let touched = requests.iter().map(|r| r.key.clone()).collect();
    let stats = drain(h, "series", requests, |url, body| {
        let record = match h.extractor.series(url, body) {
            Ok(record) => record,
            Err(rejection) => return Ok(Err(rejection)),
        };
        h.store.upsert_series(&record)?;
        Ok(Ok(()))
    })
    .await?;

    Ok(SeriesPass { stats, touched })
}

/// Fetch seasons `1..=season_count` of each series in scope, skipping seasons
/// already stored with an old enough premiere year.
pub async fn scrape_seasons(h: &Harvest, scope: SeasonScope<'_>) -> Result<StageStats> {
    let series = match scope {
        SeasonScope::All => h.store.season_counts()?,
        SeasonScope::Pending(urls) => {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for url in urls {
                if let Some(s) = h.store.get_series(url)? {
                    if seen.insert(s.url.clone()) {
                        out.push((s.url, s.season_count));
                    }
                }
            }
            for (url, count) in h.store.series_with_open_seasons(h.current_year)? {
                if seen.insert(url.clone()) {
                    out.push((url, count));
                }
            }
            out
        }
    };

    let mut requests = Vec::new();
    for (url, count) in series {
        for no in 1..=count {
            if !h.store.season_is_stable(&url, no, h.current_year)? {
                requests.push(FetchRequest::new((url.clone(), no), season_url(&url, no)));
            }
        }
    }
    info!("Seasons to fetch: {}", requests.len());

    drain(h, "seasons", requests, |(url, no), body| {
        let record = match h.extractor.season(url, *no, body) {
            Ok(record) => record,
            Err(rejection) => return Ok(Err(rejection)),
        };
        h.store.upsert_season(&record)?;
        Ok(Ok(()))
    })
    .await
}

/// Dispatch `requests` and hand each successful body to `save` on this task.
/// `save` returns `Ok(Err(_))` when the page parsed into nothing worth
/// storing and `Err(_)` when the store itself failed.
async fn drain<K, F>(
    h: &Harvest,
    stage: &str,
    requests: Vec<FetchRequest<K>>,
    mut save: F,
) -> Result<StageStats>
where
    K: Send + 'static,
    F: FnMut(&K, &str) -> Result<Result<(), Rejection>>,
{
    let mut stats = StageStats { dispatched: requests.len(), ..Default::default() };
    if requests.is_empty() {
        stats.log(stage);
        return Ok(stats);
    }

    let pb = progress_bar(requests.len())?;
    let mut rx = h.scheduler.dispatch(requests);

    while let Some(done) = rx.recv().await {
        pb.inc(1);
        match done.outcome {
            Outcome::Success(body) => match save(&done.key, &body) {
                Ok(Ok(())) => {
                    stats.written += 1;
                    pb.set_message(done.url);
                }
                Ok(Err(rejection)) => {
                    debug!("Rejected {}: {}", done.url, rejection);
                    stats.rejected += 1;
                }
                Err(e) => {
                    warn!("Failed to store {}: {:#}", done.url, e);
                    stats.failed += 1;
                }
            },
            Outcome::Skip(reason) => {
                debug!("Skipped {}: {}", done.url, reason);
                stats.skipped += 1;
            }
            Outcome::Failure(e) => {
                warn!("Failed {}: {}", done.url, e);
                stats.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    stats.log(stage);
    Ok(stats)
}
