use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::fetch::{fetch_one, Outcome};
use crate::pipeline::{progress_bar, Harvest};

/// Walk the 26 alphabetic index pages and return the names not yet present in
/// the name map, in page order. Letters that fail are logged and skipped; the
/// next run picks them up again.
pub async fn collect_new_names(h: &Harvest) -> Result<Vec<String>> {
    let pb = progress_bar(26)?;
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let mut listed = 0usize;

    for letter in 'a'..='z' {
        let url = h.sites.index_page(letter)?;
        pb.set_message(url.to_string());

        match fetch_one(h.source.as_ref(), url.as_str()).await {
            Outcome::Success(body) => {
                for name in h.extractor.index_names(&body) {
                    listed += 1;
                    if !seen.insert(name.clone()) || h.store.mapping_exists(&name)? {
                        continue;
                    }
                    names.push(name);
                }
            }
            Outcome::Skip(reason) => debug!("Index page {} skipped: {}", url, reason),
            Outcome::Failure(e) => warn!("Index page {} failed: {}", url, e),
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Index lists {} names, {} not yet mapped", listed, names.len());
    Ok(names)
}
