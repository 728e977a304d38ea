pub mod extract;
pub mod fields;
pub mod rules;

use url::Url;

use crate::db::{SeasonRecord, SeriesRecord};
use crate::error::{Rejection, RuleError};
use extract::index::IndexProbes;
use extract::search::{SearchHit, SearchProbes};
use extract::season::SeasonProbes;
use extract::series::SeriesProbes;
use rules::RuleSet;

/// A rule table compiled once and shared by every stage.
pub struct Extractor {
    version: String,
    index: IndexProbes,
    search: SearchProbes,
    series: SeriesProbes,
    season: SeasonProbes,
}

impl Extractor {
    pub fn new(rules: &RuleSet) -> Result<Self, RuleError> {
        Ok(Extractor {
            version: rules.version.clone(),
            index: IndexProbes::compile(&rules.index)?,
            search: SearchProbes::compile(&rules.search)?,
            series: SeriesProbes::compile(&rules.series)?,
            season: SeasonProbes::compile(&rules.season)?,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn index_names(&self, html: &str) -> Vec<String> {
        extract::index::extract(&self.index, html)
    }

    pub fn search_hits(&self, base: &Url, html: &str) -> Vec<SearchHit> {
        extract::search::extract(&self.search, base, html)
    }

    pub fn series(&self, url: &str, html: &str) -> Result<SeriesRecord, Rejection> {
        extract::series::extract(&self.series, url, html)
    }

    pub fn season(&self, series_url: &str, season_no: u32, html: &str) -> Result<SeasonRecord, Rejection> {
        extract::season::extract(&self.season, series_url, season_no, html)
    }
}
