use std::sync::LazyLock;

use regex::Regex;

static NON_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Drop everything but ASCII digits: "1,234 Ratings" → "1234".
pub fn only_digits(s: &str) -> String {
    NON_DIGIT_RE.replace_all(s, "").into_owned()
}

/// Score or count text to a number. Malformed text yields `None`, never a panic.
pub fn parse_number(s: &str) -> Option<u32> {
    only_digits(s).parse().ok()
}

/// Year from date text such as "Jan 20, 2008"; the last token must be a year.
pub fn parse_year(s: &str) -> Option<i32> {
    let last = s.split_whitespace().last()?;
    let digits = only_digits(last);
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok().filter(|y| *y > 0)
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}
