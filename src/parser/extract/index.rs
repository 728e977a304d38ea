use std::collections::HashSet;

use scraper::{Html, Selector};

use crate::error::RuleError;
use crate::parser::fields::clean_text;
use crate::parser::rules::{selector, IndexRules};

pub struct IndexProbes {
    names: Selector,
}

impl IndexProbes {
    pub fn compile(rules: &IndexRules) -> Result<Self, RuleError> {
        Ok(IndexProbes { names: selector("index.names", &rules.names)? })
    }
}

/// Show names listed on one alphabetic index page, deduplicated, page order.
pub fn extract(probes: &IndexProbes, html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&probes.names)
        .map(|a| clean_text(&a.text().collect::<String>()))
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}
