use scraper::{Html, Selector};
use url::Url;

use crate::error::RuleError;
use crate::parser::fields::clean_text;
use crate::parser::rules::{selector, SearchRules};

pub struct SearchProbes {
    section: Selector,
    link: Selector,
}

impl SearchProbes {
    pub fn compile(rules: &SearchRules) -> Result<Self, RuleError> {
        Ok(SearchProbes {
            section: selector("search.section", &rules.section)?,
            link: selector("search.link", &rules.link)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// TV results in page order, with hrefs made absolute and canonical.
pub fn extract(probes: &SearchProbes, base: &Url, html: &str) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);
    let Some(section) = doc.select(&probes.section).next() else {
        return Vec::new();
    };
    section
        .select(&probes.link)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let title = clean_text(&a.text().collect::<String>());
            if title.is_empty() {
                return None;
            }
            Some(SearchHit { title, url: canonical_url(base, href)? })
        })
        .collect()
}

/// The hit whose title equals `name` (ignoring case), else the first one.
pub fn best_match<'a>(name: &str, hits: &'a [SearchHit]) -> Option<&'a SearchHit> {
    let wanted = clean_text(name).to_lowercase();
    hits.iter()
        .find(|h| h.title.to_lowercase() == wanted)
        .or_else(|| hits.first())
}

/// Resolve `href` against the site, move the bare host onto the site's host
/// (`rottentomatoes.com` → `www.rottentomatoes.com`) and drop query, fragment
/// and trailing slash so `{url}/s01` is well formed.
pub fn canonical_url(base: &Url, href: &str) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    if let (Some(host), Some(base_host)) = (url.host_str(), base.host_str()) {
        if host != base_host && base_host.strip_prefix("www.") == Some(host) {
            url.set_host(Some(base_host)).ok()?;
        }
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.as_str().trim_end_matches('/').to_string())
}
