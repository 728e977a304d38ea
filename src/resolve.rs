use anyhow::Result;
use tracing::{debug, info, warn};

use crate::fetch::{FetchRequest, Outcome};
use crate::parser::extract::search::{best_match, SearchHit};
use crate::pipeline::{progress_bar, Harvest, StageStats};

/// Search the review site for each name and record the name → series URL
/// mapping. Other TV hits on the same page are recorded under their own
/// titles so they need no search of their own later.
pub async fn resolve_names(h: &Harvest, names: Vec<String>) -> Result<StageStats> {
    let mut stats = StageStats::default();
    let mut requests = Vec::with_capacity(names.len());
    for name in names {
        let url = h.sites.search(&name)?;
        requests.push(FetchRequest::new(name, url));
    }
    stats.dispatched = requests.len();
    if requests.is_empty() {
        stats.log("resolve");
        return Ok(stats);
    }

    let pb = progress_bar(requests.len())?;
    let mut extra = 0usize;
    let mut rx = h.scheduler.dispatch(requests);

    while let Some(done) = rx.recv().await {
        pb.inc(1);
        let name = done.key;
        let body = match done.outcome {
            Outcome::Success(body) => body,
            Outcome::Skip(reason) => {
                debug!("Search for {:?} skipped: {}", name, reason);
                stats.skipped += 1;
                continue;
            }
            Outcome::Failure(e) => {
                warn!("Search for {:?} failed: {}", name, e);
                stats.failed += 1;
                continue;
            }
        };

        let hits = h.extractor.search_hits(&h.sites.review, &body);
        let Some(best) = best_match(&name, &hits) else {
            debug!("No TV result for {:?}", name);
            stats.rejected += 1;
            continue;
        };
        pb.set_message(name.clone());

        match record(h, &name, best, &hits) {
            Ok(n) => {
                stats.written += 1;
                extra += n;
            }
            Err(e) => {
                warn!("Failed to store mapping for {:?}: {:#}", name, e);
                stats.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    if extra > 0 {
        info!("Mapped {} additional titles from search results", extra);
    }
    stats.log("resolve");
    Ok(stats)
}

/// Map the queried name to its best hit, then every other hit to itself.
/// Returns how many extra titles were newly mapped.
fn record(h: &Harvest, name: &str, best: &SearchHit, hits: &[SearchHit]) -> Result<usize> {
    h.store.insert_mapping(name, &best.url)?;
    let mut extra = 0;
    for hit in hits {
        if h.store.insert_mapping(&hit.title, &hit.url)? {
            extra += 1;
        }
    }
    Ok(extra)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fetch::testing::FakeSite;
    use crate::pipeline::tests::harvest;

    const SEARCH: &str = "https://www.rottentomatoes.com/search?search=";

    fn site() -> Arc<FakeSite> {
        let site = Arc::new(FakeSite::new());
        site.page(
            &format!("{}The%20Office", SEARCH),
            200,
            std::fs::read_to_string("tests/fixtures/search_the_office.html").unwrap(),
        );
        site.page(
            &format!("{}Nothing%20Here", SEARCH),
            200,
            r#"<search-page-result type="movie"><a data-qa="info-name" href="/m/x">X</a></search-page-result>"#,
        );
        site.page(&format!("{}Blocked", SEARCH), 403, "");
        site.break_url(&format!("{}Flaky", SEARCH));
        site
    }

    #[tokio::test]
    async fn exact_title_wins_and_siblings_are_recorded() {
        let h = harvest(&site());
        let stats = resolve_names(&h, vec!["The Office".into()]).await.unwrap();

        assert_eq!(stats, StageStats { dispatched: 1, written: 1, ..Default::default() });
        assert_eq!(
            h.store.get_mapping("The Office").unwrap().as_deref(),
            Some("https://www.rottentomatoes.com/tv/office")
        );
        assert_eq!(
            h.store.get_mapping("The Office (UK)").unwrap().as_deref(),
            Some("https://www.rottentomatoes.com/tv/the_office_uk")
        );
        assert_eq!(h.store.mapped_urls().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unmatched_skipped_and_failed_names_stay_unmapped() {
        let h = harvest(&site());
        let names = vec!["Nothing Here".into(), "Blocked".into(), "Flaky".into(), "Unknown".into()];
        let stats = resolve_names(&h, names).await.unwrap();

        assert_eq!(stats.dispatched, 4);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.failed, 1);
        assert!(h.store.mapped_urls().unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_mapping_is_not_overwritten() {
        let h = harvest(&site());
        h.store.insert_mapping("The Office", "https://www.rottentomatoes.com/tv/the_office_uk").unwrap();
        resolve_names(&h, vec!["The Office".into()]).await.unwrap();
        assert_eq!(
            h.store.get_mapping("The Office").unwrap().as_deref(),
            Some("https://www.rottentomatoes.com/tv/the_office_uk")
        );
    }

    #[tokio::test]
    async fn no_names_no_requests() {
        let site = site();
        let h = harvest(&site);
        assert_eq!(resolve_names(&h, Vec::new()).await.unwrap(), StageStats::default());
        assert!(site.requests().is_empty());
    }
}
