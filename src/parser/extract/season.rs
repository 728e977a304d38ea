use scraper::Html;

use super::check_rated;
use crate::db::SeasonRecord;
use crate::error::{Rejection, RuleError};
use crate::parser::fields::{parse_number, parse_year};
use crate::parser::rules::{Probe, SeasonRules};

pub struct SeasonProbes {
    image: Probe,
    premiere_date: Probe,
    tomatometer_score: Probe,
    critic_rating_count: Probe,
    audience_score: Probe,
    user_rating_count: Probe,
    certified_fresh: Probe,
}

impl SeasonProbes {
    pub fn compile(rules: &SeasonRules) -> Result<Self, RuleError> {
        Ok(SeasonProbes {
            image: Probe::compile("season.image", &rules.image)?,
            premiere_date: Probe::compile("season.premiere_date", &rules.premiere_date)?,
            tomatometer_score: Probe::compile("season.tomatometer_score", &rules.tomatometer_score)?,
            critic_rating_count: Probe::compile(
                "season.critic_rating_count",
                &rules.critic_rating_count,
            )?,
            audience_score: Probe::compile("season.audience_score", &rules.audience_score)?,
            user_rating_count: Probe::compile("season.user_rating_count", &rules.user_rating_count)?,
            certified_fresh: Probe::compile("season.certified_fresh", &rules.certified_fresh)?,
        })
    }
}

pub fn extract(
    probes: &SeasonProbes,
    series_url: &str,
    season_no: u32,
    html: &str,
) -> Result<SeasonRecord, Rejection> {
    let doc = Html::parse_document(html);
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

    Ok(SeasonRecord {
        series_url: series_url.to_string(),
        season_no,
        image_url: probes.image.value(&doc).unwrap_or_default(),
        tomatometer_score,
        critic_rating_count: number(&probes.critic_rating_count),
        audience_score,
        user_rating_count: number(&probes.user_rating_count),
        certified_fresh: probes.certified_fresh.is_present(&doc),
        premiere_year,
    })
}
