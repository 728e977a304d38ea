use std::sync::Arc;

use anyhow::Result;
use chrono::Datelike;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::catalog;
use crate::settings::{Settings, Sites};
use crate::db::Store;
use crate::fetch::{HttpSource, Limits, PageSource, Scheduler};
use crate::parser::Extractor;
use crate::resolve;
use crate::scraper::{self, SeasonScope};

/// Everything a stage needs, built once and passed by reference.
pub struct Harvest {
    pub store: Store,
    pub source: Arc<dyn PageSource>,
    pub scheduler: Scheduler,
    pub extractor: Extractor,
    pub sites: Sites,
    pub current_year: i32,
}

impl Harvest {
    pub fn new(
        store: Store,
        source: Arc<dyn PageSource>,
        limits: Limits,
        extractor: Extractor,
        sites: Sites,
        current_year: i32,
    ) -> Self {
        let scheduler = Scheduler::new(Arc::clone(&source), limits);
        Harvest { store, source, scheduler, extractor, sites, current_year }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Store::open(&settings.db_path)?;
        let source = Arc::new(HttpSource::new(settings.proxy.as_deref(), settings.timeout())?);
        let rules = settings.rules()?;
        let extractor = Extractor::new(&rules)?;
        info!("Using rule set {}", extractor.version());
        Ok(Harvest::new(
            store,
            source,
            settings.limits(),
            extractor,
            settings.sites()?,
            chrono::Local::now().year(),
        ))
    }

    /// Catalog → resolve → series → seasons. Each stage only reads what the
    /// previous one committed, so the whole run can be repeated safely.
    pub async fn run(&self) -> Result<RunReport> {
        let names = catalog::collect_new_names(self).await?;
        let new_names = names.len();
        let resolve = resolve::resolve_names(self, names).await?;
        let series = scraper::scrape_series(self).await?;
        let seasons = scraper::scrape_seasons(self, SeasonScope::Pending(&series.touched)).await?;
        Ok(RunReport { new_names, resolve, series: series.stats, seasons })
    }
}

/// Per-stage tally. Nothing here is persisted; an item that failed simply has no row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub dispatched: usize,
    pub written: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl StageStats {
    pub fn log(&self, stage: &str) {
        info!(
            stage,
            dispatched = self.dispatched,
            written = self.written,
            skipped = self.skipped,
            rejected = self.rejected,
            failed = self.failed,
            "Stage complete"
        );
    }

    pub fn summary(&self) -> String {
        format!(
            "{} fetched: {} written, {} skipped, {} rejected, {} failed",
            self.dispatched, self.written, self.skipped, self.rejected, self.failed
        )
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub new_names: usize,
    pub resolve: StageStats,
    pub series: StageStats,
    pub seasons: StageStats,
}

impl RunReport {
    pub fn print(&self) {
        println!("New names: {}", self.new_names);
        println!("Resolve:   {}", self.resolve.summary());
        println!("Series:    {}", self.series.summary());
        println!("Seasons:   {}", self.seasons.summary());
    }
}

pub(crate) fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {wide_msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetch::testing::{unlimited, FakeSite};
    use crate::parser::rules::RuleSet;

    pub(crate) const YEAR: i32 = 2026;

    pub(crate) fn harvest(site: &Arc<FakeSite>) -> Harvest {
        Harvest::new(
            Store::open_in_memory().unwrap(),
            site.clone(),
            unlimited(),
            Extractor::new(&RuleSet::builtin()).unwrap(),
            Settings::default().sites().unwrap(),
            YEAR,
        )
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    const BB: &str = "https://www.rottentomatoes.com/tv/breaking_bad";

    /// Index, search and series pages for Breaking Bad; season 5 only.
    fn upstream() -> Arc<FakeSite> {
        let site = Arc::new(FakeSite::new());
        site.page(
            "http://epguides.com/menub/",
            200,
            r#"<div class="cont"><a href="../BreakingBad/">Breaking Bad</a></div>"#,
        );
        site.page(
            "https://www.rottentomatoes.com/search?search=Breaking%20Bad",
            200,
            r#"<search-page-result type="tvSeries">
                 <a data-qa="info-name" href="/tv/breaking_bad/">Breaking Bad</a>
               </search-page-result>"#,
        );
        site.page(BB, 200, fixture("series_breaking_bad.html"));
        site.page(&format!("{}/s05", BB), 200, fixture("season_breaking_bad_s05.html"));
        site
    }

    #[tokio::test]
    async fn full_run_then_idempotent_rerun() {
        let site = upstream();
        for no in 1..=4 {
            site.page(&format!("{}/s{:02}", BB, no), 200, fixture("season_breaking_bad_s05.html"));
        }
        let h = harvest(&site);

        let first = h.run().await.unwrap();
        assert_eq!(first.new_names, 1);
        assert_eq!(first.resolve.written, 1);
        assert_eq!(first.series.written, 1);
        assert_eq!(first.seasons.dispatched, 5);
        assert_eq!(first.seasons.written, 5);

        assert_eq!(h.store.get_mapping("Breaking Bad").unwrap().as_deref(), Some(BB));
        assert_eq!(h.store.get_series(BB).unwrap().unwrap().season_count, 5);
        assert!(h.store.get_season(BB, 5).unwrap().unwrap().certified_fresh);

        site.clear_requests();
        let second = h.run().await.unwrap();
        assert_eq!(second.new_names, 0);
        assert_eq!(second.series.dispatched, 0);
        assert_eq!(second.seasons.dispatched, 0);

        // Only the 26 index pages are fetched again.
        let requests = site.requests();
        assert_eq!(requests.len(), 26);
        assert!(requests.iter().all(|u| u.starts_with("http://epguides.com/menu")));

        let stats = h.store.stats().unwrap();
        assert_eq!((stats.names, stats.series, stats.seasons), (1, 1, 5));
    }

    #[tokio::test]
    async fn missing_season_is_inserted_once_upstream_serves_it() {
        let site = upstream();
        let h = harvest(&site);

        let first = h.run().await.unwrap();
        assert_eq!(first.seasons.dispatched, 5);
        assert_eq!(first.seasons.written, 1);
        assert_eq!(first.seasons.skipped, 4);
        assert!(h.store.get_season(BB, 1).unwrap().is_none());

        // The series is stable now, yet its absent seasons are still retried.
        site.page(&format!("{}/s01", BB), 200, fixture("season_breaking_bad_s05.html"));
        site.clear_requests();
        let second = h.run().await.unwrap();
        assert_eq!(second.series.dispatched, 0);
        assert_eq!(second.seasons.dispatched, 4);
        assert_eq!(second.seasons.written, 1);
        assert_eq!(second.seasons.skipped, 3);
        assert!(h.store.get_season(BB, 1).unwrap().is_some());
        assert!(!site.requests().iter().any(|u| u == &format!("{}/s05", BB)));
    }
}
