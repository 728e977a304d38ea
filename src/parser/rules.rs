use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::fields::clean_text;
use crate::error::RuleError;

/// How a single field is located in a page. Rule tables are data so a markup
/// change upstream is a new table, not new code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Whitespace-normalised text of the first match.
    Text { selector: String },
    /// Attribute of the first match.
    Attr { selector: String, attr: String },
    /// Text of the element following the first match whose text contains `label`.
    Labeled { selector: String, label: String },
    /// Number of matches, always present.
    Count { selector: String },
    /// Present iff at least one element matches.
    Present { selector: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub index: IndexRules,
    pub search: SearchRules,
    pub series: SeriesRules,
    pub season: SeasonRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRules {
    /// Every match's text is one show name.
    pub names: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRules {
    /// Container holding TV results only.
    pub section: String,
    /// Result links inside the container (href + title text).
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRules {
    pub name: FieldRule,
    pub season_count: FieldRule,
    pub image: FieldRule,
    pub genre: FieldRule,
    pub network: FieldRule,
    pub premiere_date: FieldRule,
    pub tomatometer_score: FieldRule,
    pub audience_score: FieldRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRules {
    pub image: FieldRule,
    pub premiere_date: FieldRule,
    pub tomatometer_score: FieldRule,
    pub critic_rating_count: FieldRule,
    pub audience_score: FieldRule,
    pub user_rating_count: FieldRule,
    pub certified_fresh: FieldRule,
}

fn text(selector: &str) -> FieldRule {
    FieldRule::Text { selector: selector.into() }
}

fn attr(selector: &str, attr: &str) -> FieldRule {
    FieldRule::Attr { selector: selector.into(), attr: attr.into() }
}

fn labeled(label: &str) -> FieldRule {
    FieldRule::Labeled { selector: "b".into(), label: label.into() }
}

impl RuleSet {
    /// Scoreboard-era markup of the review site.
    pub fn builtin() -> Self {
        RuleSet {
            version: "2021-scoreboard".into(),
            index: IndexRules { names: ".cont a".into() },
            search: SearchRules {
                section: "search-page-result[type='tvSeries']".into(),
                link: "a[data-qa='info-name']".into(),
            },
            series: SeriesRules {
                name: text("h1"),
                season_count: FieldRule::Count { selector: "[data-qa='season-item']".into() },
                image: attr("[data-qa='poster-image']", "src"),
                genre: labeled("Genre:"),
                network: labeled("TV Network:"),
                premiere_date: labeled("Premiere Date:"),
                tomatometer_score: attr("score-board", "tomatometerscore"),
                audience_score: attr("score-board", "audiencescore"),
            },
            season: SeasonRules {
                image: attr("[data-qa='poster-image']", "src"),
                premiere_date: labeled("Premiere Date:"),
                tomatometer_score: attr("score-board", "tomatometerscore"),
                critic_rating_count: text("[data-qa='tomatometer-review-count']"),
                audience_score: attr("score-board", "audiencescore"),
                user_rating_count: text("[data-qa='audience-rating-count']"),
                certified_fresh: FieldRule::Present { selector: "[state='certified-fresh']".into() },
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

// ── Compiled form ──

#[derive(Debug)]
enum ProbeKind {
    Text,
    Attr(String),
    Labeled(String),
    Count,
    Present,
}

/// A `FieldRule` with its selector parsed once.
#[derive(Debug)]
pub struct Probe {
    kind: ProbeKind,
    selector: Selector,
}

pub(crate) fn selector(field: &'static str, css: &str) -> Result<Selector, RuleError> {
    Selector::parse(css).map_err(|e| RuleError::Selector {
        field,
        selector: css.to_string(),
        message: e.to_string(),
    })
}

impl Probe {
    pub fn compile(field: &'static str, rule: &FieldRule) -> Result<Self, RuleError> {
        let (css, kind) = match rule {
            FieldRule::Text { selector } => (selector, ProbeKind::Text),
            FieldRule::Attr { selector, attr } => (selector, ProbeKind::Attr(attr.clone())),
            FieldRule::Labeled { selector, label } => {
                (selector, ProbeKind::Labeled(clean_text(label)))
            }
            FieldRule::Count { selector } => (selector, ProbeKind::Count),
            FieldRule::Present { selector } => (selector, ProbeKind::Present),
        };
        Ok(Probe { kind, selector: selector(field, css)? })
    }

    /// Raw field value, or `None` when the selector misses or the text is empty.
    pub fn value(&self, doc: &Html) -> Option<String> {
        let found = match &self.kind {
            ProbeKind::Text => doc
                .select(&self.selector)
                .next()
                .map(|el| clean_text(&el.text().collect::<String>())),
            ProbeKind::Attr(name) => doc
                .select(&self.selector)
                .next()
                .and_then(|el| el.value().attr(name))
                .map(clean_text),
            ProbeKind::Labeled(label) => doc
                .select(&self.selector)
                .find(|el| clean_text(&el.text().collect::<String>()).contains(label.as_str()))
                .and_then(|el| el.next_siblings().find_map(ElementRef::wrap))
                .map(|sib| clean_text(&sib.text().collect::<String>())),
            ProbeKind::Count => Some(doc.select(&self.selector).count().to_string()),
            ProbeKind::Present => doc
                .select(&self.selector)
                .next()
                .map(|_| "true".to_string()),
        };
        found.filter(|v| !v.is_empty())
    }

    pub fn is_present(&self, doc: &Html) -> bool {
        self.value(doc).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_round_trips_through_json() {
        let rules = RuleSet::builtin();
        let json = serde_json::to_string_pretty(&rules).unwrap();
        assert!(json.contains("\"kind\": \"labeled\""));
        assert_eq!(RuleSet::from_json(&json).unwrap(), rules);
    }

    #[test]
    fn invalid_selector_is_reported_with_field() {
        let rule = FieldRule::Text { selector: "h1[[".into() };
        let err = Probe::compile("name", &rule).unwrap_err();
        assert!(err.to_string().contains("name"), "{}", err);
    }

    #[test]
    fn probe_kinds() {
        let doc = Html::parse_document(
            r#"<div><b>Genre: </b> <span> Crime,  Drama </span></div>
               <img class="p" src=" /poster.jpg ">
               <i class="m"></i><i class="m"></i>
               <p class="empty">   </p>"#,
        );
        let genre = Probe::compile("genre", &labeled("Genre:")).unwrap();
        assert_eq!(genre.value(&doc).as_deref(), Some("Crime, Drama"));

        let img = Probe::compile("image", &attr("img.p", "src")).unwrap();
        assert_eq!(img.value(&doc).as_deref(), Some("/poster.jpg"));

        let count = Probe::compile("n", &FieldRule::Count { selector: "i.m".into() }).unwrap();
        assert_eq!(count.value(&doc).as_deref(), Some("2"));

        let none = Probe::compile("n", &FieldRule::Count { selector: "i.x".into() }).unwrap();
        assert_eq!(none.value(&doc).as_deref(), Some("0"));

        let empty = Probe::compile("e", &text("p.empty")).unwrap();
        assert_eq!(empty.value(&doc), None);

        let flag = Probe::compile("f", &FieldRule::Present { selector: "i.m".into() }).unwrap();
        assert!(flag.is_present(&doc));
    }
}
