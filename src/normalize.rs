use std::sync::LazyLock;

use regex::Regex;

/// Stored in `official_name` when the search flow found nothing for a code.
pub const NOT_FOUND: &str = "Not found";
/// Stored in `official_name` when a scrape stage exhausted its retries.
pub const ERROR: &str = "Error";

pub fn is_sentinel(name: &str) -> bool {
    name == NOT_FOUND || name == ERROR
}

static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,]*").unwrap());
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// First digit run with thousands separators stripped. Sentinels and
/// digit-free text yield None.
pub fn extract_numeric(raw: &str) -> Option<i64> {
    if is_sentinel(raw) {
        return None;
    }
    let run = DIGIT_RUN_RE.find(raw)?;
    run.as_str().replace(',', "").parse().ok()
}

/// First decimal token, currency symbols and separators ignored.
pub fn extract_price(raw: &str) -> Option<f64> {
    if is_sentinel(raw) {
        return None;
    }
    let cleaned = raw.replace(',', "");
    let m = PRICE_RE.find(&cleaned)?;
    m.as_str().parse().ok()
}

/// First plausible four-digit year anywhere in the text.
pub fn extract_year(raw: &str) -> Option<i32> {
    if is_sentinel(raw) {
        return None;
    }
    YEAR_RE.find(raw)?.as_str().parse().ok()
}

// ── Completeness ─────────────────────────────────────────────────────────────

/// Fields that make a set record usable downstream, with the score floor a
/// record must clear to count as validated.
pub const SET_CHECKLIST: &[&str] = &[
    "official_name",
    "number_of_pieces",
    "released",
    "theme",
    "retail_price_eur",
    "retail_price_gbp",
    "image_url",
];
pub const SET_THRESHOLD: f64 = 0.7;

pub const MINIFIG_CHECKLIST: &[&str] = &[
    "official_name",
    "year",
    "released",
    "retail_price_gbp",
    "theme",
];
pub const MINIFIG_THRESHOLD: f64 = 0.6;

/// Fraction of checklist fields present. `fields` pairs each checklist name
/// with whether the scrape produced a real (non-sentinel) value for it.
pub fn completeness_score(fields: &[(&str, bool)], checklist: &[&str]) -> f64 {
    if checklist.is_empty() {
        return 0.0;
    }
    let present = checklist
        .iter()
        .filter(|name| {
            fields
                .iter()
                .any(|(field, ok)| field == *name && *ok)
        })
        .count();
    present as f64 / checklist.len() as f64
}

/// Strictly above the threshold counts; landing exactly on it does not.
pub fn status_for(score: f64, threshold: f64) -> &'static str {
    if score > threshold {
        "validated"
    } else {
        "incomplete"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strips_thousands_separators() {
        assert_eq!(extract_numeric("1,234 pieces"), Some(1234));
        assert_eq!(extract_numeric("270"), Some(270));
        assert_eq!(extract_numeric("no digits here"), None);
    }

    #[test]
    fn price_ignores_currency_symbols() {
        assert_eq!(extract_price("£49.99"), Some(49.99));
        assert_eq!(extract_price("€12.99 (retail)"), Some(12.99));
        assert_eq!(extract_price("$1,099.99"), Some(1099.99));
        assert_eq!(extract_price("TBA"), None);
    }

    #[test]
    fn year_from_free_text() {
        assert_eq!(extract_year("Released: March 2004"), Some(2004));
        assert_eq!(extract_year("1999"), Some(1999));
        assert_eq!(extract_year("item 30210"), None);
    }

    #[test]
    fn sentinels_never_parse() {
        assert_eq!(extract_numeric(NOT_FOUND), None);
        assert_eq!(extract_price(ERROR), None);
        assert_eq!(extract_year(NOT_FOUND), None);
    }

    #[test]
    fn completeness_counts_checklist_fields_only() {
        let fields = [
            ("official_name", true),
            ("number_of_pieces", true),
            ("released", true),
            ("theme", true),
            ("retail_price_eur", true),
            ("retail_price_gbp", false),
            ("image_url", false),
            ("value_used", true), // not on the checklist, must not count
        ];
        let score = completeness_score(&fields, SET_CHECKLIST);
        assert!((score - 5.0 / 7.0).abs() < 1e-9);
        assert_eq!(status_for(score, SET_THRESHOLD), "validated");
        assert_eq!(status_for(0.5, SET_THRESHOLD), "incomplete");
    }

    #[test]
    fn landing_exactly_on_a_threshold_is_incomplete() {
        assert_eq!(status_for(0.6, MINIFIG_THRESHOLD), "incomplete");
        assert_eq!(status_for(0.61, MINIFIG_THRESHOLD), "validated");
        assert_eq!(status_for(0.7, SET_THRESHOLD), "incomplete");
        assert_eq!(status_for(5.0 / 7.0, SET_THRESHOLD), "validated");
    }
}
