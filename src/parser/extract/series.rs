use scraper::Html;

use super::check_rated;
use crate::db::SeriesRecord;
use crate::error::{Rejection, RuleError};
use crate::parser::fields::{parse_number, parse_year};
use crate::parser::rules::{Probe, SeriesRules};

pub struct SeriesProbes {
    name: Probe,
    season_count: Probe,
    image: Probe,
    genre: Probe,
    network: Probe,
    premiere_date: Probe,
    tomatometer_score: Probe,
    audience_score: Probe,
}

impl SeriesProbes {
    pub fn compile(rules: &SeriesRules) -> Result<Self, RuleError> {
        Ok(SeriesProbes {
            name: Probe::compile("series.name", &rules.name)?,
            season_count: Probe::compile("series.season_count", &rules.season_count)?,
            image: Probe::compile("series.image", &rules.image)?,
            genre: Probe::compile("series.genre", &rules.genre)?,
            network: Probe::compile("series.network", &rules.network)?,
            premiere_date: Probe::compile("series.premiere_date", &rules.premiere_date)?,
            tomatometer_score: Probe::compile("series.tomatometer_score", &rules.tomatometer_score)?,
            audience_score: Probe::compile("series.audience_score", &rules.audience_score)?,
        })
    }
}

/// Series detail page → record. Only the name is required; every other field
/// falls back to its empty/zero default before the score and year checks.
pub fn extract(probes: &SeriesProbes, url: &str, html: &str) -> Result<SeriesRecord, Rejection> {
    let doc = Html::parse_document(html);

    let name = probes
        .name
        .value(&doc)
        .ok_or(Rejection::MissingField("name"))?;
    let number = |p: &Probe| p.value(&doc).as_deref().and_then(parse_number).unwrap_or(0);

    let tomatometer_score = number(&probes.tomatometer_score);
    let audience_score = number(&probes.audience_score);
    let premiere_year = probes
        .premiere_date
        .value(&doc)
        .as_deref()
        .and_then(parse_year)
        .unwrap_or(0);
    check_rated(tomatometer_score, audience_score, premiere_year)?;

    Ok(SeriesRecord {
        url: url.to_string(),
        name,
        image_url: probes.image.value(&doc).unwrap_or_default(),
        genre: probes.genre.value(&doc).unwrap_or_default(),
        network: probes.network.value(&doc).unwrap_or_default(),
        premiere_year,
        tomatometer_score,
        audience_score,
        season_count: number(&probes.season_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::rules::RuleSet;

    const URL: &str = "https://www.rottentomatoes.com/tv/breaking_bad";

    fn probes() -> SeriesProbes {
        SeriesProbes::compile(&RuleSet::builtin().series).unwrap()
    }

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/series_breaking_bad.html").unwrap()
    }

    #[test]
    fn breaking_bad_series() {
        let s = extract(&probes(), URL, &fixture()).unwrap();
        assert_eq!(s.url, URL);
        assert_eq!(s.name, "Breaking Bad");
        assert_eq!(s.genre, "Drama");
        assert_eq!(s.network, "AMC");
        assert_eq!(s.premiere_year, 2008);
        assert_eq!(s.tomatometer_score, 96);
        assert_eq!(s.audience_score, 97);
        assert_eq!(s.season_count, 5);
        assert!(s.image_url.ends_with("breaking_bad_poster.jpg"));
    }

    #[test]
    fn missing_genre_falls_back_to_empty() {
        let html = fixture().replace("Genre: </b>", "Category: </b>");
        let s = extract(&probes(), URL, &html).unwrap();
        assert_eq!(s.genre, "");
        assert_eq!(s.network, "AMC");
        assert_eq!(s.tomatometer_score, 96);
    }

    #[test]
    fn zero_scores_are_rejected() {
        let html = fixture()
            .replace("tomatometerscore=\"96\"", "tomatometerscore=\"\"")
            .replace("audiencescore=\"97\"", "audiencescore=\"0\"");
        assert_eq!(extract(&probes(), URL, &html), Err(Rejection::MissingScore));
    }

    #[test]
    fn one_score_is_enough() {
        let html = fixture().replace("tomatometerscore=\"96\"", "tomatometerscore=\"--\"");
        let s = extract(&probes(), URL, &html).unwrap();
        assert_eq!(s.tomatometer_score, 0);
        assert_eq!(s.audience_score, 97);
    }

    #[test]
    fn missing_year_is_rejected() {
        let html = fixture().replace("Jan 20, 2008", "TBA");
        assert_eq!(extract(&probes(), URL, &html), Err(Rejection::MissingYear));
    }

    #[test]
    fn missing_name_is_a_structure_failure() {
        let html = fixture().replace("<h1", "<h2").replace("</h1>", "</h2>");
        assert_eq!(
            extract(&probes(), URL, &html),
            Err(Rejection::MissingField("name"))
        );
    }

    #[test]
    fn no_season_markers_counts_zero() {
        let html = fixture().replace("data-qa=\"season-item\"", "data-qa=\"other\"");
        assert_eq!(extract(&probes(), URL, &html).unwrap().season_count, 0);
    }

    #[test]
    fn garbage_page() {
        assert_eq!(
            extract(&probes(), URL, "<html><body>blocked</body></html>"),
            Err(Rejection::MissingField("name"))
        );
    }
}
