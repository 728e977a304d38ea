pub mod index;
pub mod search;
pub mod season;
pub mod series;

use crate::error::Rejection;

/// Terminal check shared by series and season pages: a page with neither score
/// is assumed mis-parsed, and a record without a premiere year cannot be aged.
pub fn check_rated(tomatometer_score: u32, audience_score: u32, premiere_year: i32) -> Result<(), Rejection> {
    if tomatometer_score == 0 && audience_score == 0 {
        return Err(Rejection::MissingScore);
    }
    if premiere_year == 0 {
        return Err(Rejection::MissingYear);
    }
    Ok(())
}
