use crate::extract::minifigs::RawMinifig;
use crate::extract::sets::RawSet;
use crate::normalize::{
    self, completeness_score, status_for, MINIFIG_CHECKLIST, MINIFIG_THRESHOLD, SET_CHECKLIST,
    SET_THRESHOLD,
};

/// A set row as stored: raw text fields as scraped, numeric fields derived
/// from them, plus scoring metadata. `official_name` always holds something,
/// a real name or one of the failure sentinels.
#[derive(Debug, Clone)]
pub struct SetRecord {
    pub lego_code: String,
    pub official_name: String,
    pub number_of_pieces: Option<String>,
    pub number_of_minifigs: Option<String>,
    pub released: Option<String>,
    pub retired: Option<String>,
    pub retail_price_eur: Option<String>,
    pub retail_price_gbp: Option<String>,
    pub value_new_sealed: Option<String>,
    pub value_used: Option<String>,
    pub image_url: Option<String>,
    pub theme: Option<String>,
    pub subtheme: Option<String>,
    pub pieces_numeric: Option<i64>,
    pub minifigs_numeric: Option<i64>,
    pub price_eur_numeric: Option<f64>,
    pub price_gbp_numeric: Option<f64>,
    pub value_new_numeric: Option<f64>,
    pub value_used_numeric: Option<f64>,
    pub release_year: Option<i32>,
    pub completeness_score: f64,
    pub validation_status: String,
    pub scrape_success: bool,
}

impl SetRecord {
    pub fn from_raw(raw: RawSet) -> Self {
        let official_name = raw
            .official_name
            .unwrap_or_else(|| normalize::NOT_FOUND.to_string());
        let named = !normalize::is_sentinel(&official_name);

        let fields = [
            ("official_name", named),
            ("number_of_pieces", raw.number_of_pieces.is_some()),
            ("released", raw.released.is_some()),
            ("theme", raw.theme.is_some()),
            ("retail_price_eur", raw.retail_price_eur.is_some()),
            ("retail_price_gbp", raw.retail_price_gbp.is_some()),
            ("image_url", raw.image_url.is_some()),
        ];
        let score = completeness_score(&fields, SET_CHECKLIST);

        Self {
            lego_code: raw.lego_code,
            pieces_numeric: raw.number_of_pieces.as_deref().and_then(normalize::extract_numeric),
            minifigs_numeric: raw
                .number_of_minifigs
                .as_deref()
                .and_then(normalize::extract_numeric),
            price_eur_numeric: raw
                .retail_price_eur
                .as_deref()
                .and_then(normalize::extract_price),
            price_gbp_numeric: raw
                .retail_price_gbp
                .as_deref()
                .and_then(normalize::extract_price),
            value_new_numeric: raw
                .value_new_sealed
                .as_deref()
                .and_then(normalize::extract_price),
            value_used_numeric: raw.value_used.as_deref().and_then(normalize::extract_price),
            release_year: raw.released.as_deref().and_then(normalize::extract_year),
            number_of_pieces: raw.number_of_pieces,
            number_of_minifigs: raw.number_of_minifigs,
            released: raw.released,
            retired: raw.retired,
            retail_price_eur: raw.retail_price_eur,
            retail_price_gbp: raw.retail_price_gbp,
            value_new_sealed: raw.value_new_sealed,
            value_used: raw.value_used,
            image_url: raw.image_url,
            theme: raw.theme,
            subtheme: raw.subtheme,
            completeness_score: score,
            validation_status: status_for(score, SET_THRESHOLD).to_string(),
            scrape_success: named,
            official_name,
        }
    }

    /// Placeholder row for a code whose scrape failed outright.
    pub fn sentinel(code: &str, name: &str) -> Self {
        Self {
            lego_code: code.to_string(),
            official_name: name.to_string(),
            number_of_pieces: None,
            number_of_minifigs: None,
            released: None,
            retired: None,
            retail_price_eur: None,
            retail_price_gbp: None,
            value_new_sealed: None,
            value_used: None,
            image_url: None,
            theme: None,
            subtheme: None,
            pieces_numeric: None,
            minifigs_numeric: None,
            price_eur_numeric: None,
            price_gbp_numeric: None,
            value_new_numeric: None,
            value_used_numeric: None,
            release_year: None,
            completeness_score: 0.0,
            validation_status: "incomplete".to_string(),
            scrape_success: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinifigRecord {
    pub minifig_code: String,
    pub official_name: String,
    pub year: Option<String>,
    pub released: Option<String>,
    pub retail_price_gbp: Option<String>,
    pub theme: Option<String>,
    /// Comma-joined raw reference list, resolved to codes by the linker.
    pub sets: Option<String>,
    pub year_numeric: Option<i32>,
    pub price_gbp_numeric: Option<f64>,
    pub completeness_score: f64,
    pub validation_status: String,
    pub scrape_success: bool,
}

impl MinifigRecord {
    pub fn from_raw(raw: RawMinifig) -> Self {
        let official_name = raw
            .official_name
            .unwrap_or_else(|| normalize::NOT_FOUND.to_string());
        let named = !normalize::is_sentinel(&official_name);

        let fields = [
            ("official_name", named),
            ("year", raw.year.is_some()),
            ("released", raw.released.is_some()),
            ("retail_price_gbp", raw.retail_price_gbp.is_some()),
            ("theme", raw.theme.is_some()),
        ];
        let score = completeness_score(&fields, MINIFIG_CHECKLIST);

        Self {
            minifig_code: raw.minifig_code,
            year_numeric: raw.year.as_deref().and_then(normalize::extract_year),
            price_gbp_numeric: raw
                .retail_price_gbp
                .as_deref()
                .and_then(normalize::extract_price),
            year: raw.year,
            released: raw.released,
            retail_price_gbp: raw.retail_price_gbp,
            theme: raw.theme,
            sets: if raw.sets.is_empty() {
                None
            } else {
                Some(raw.sets.join(", "))
            },
            completeness_score: score,
            validation_status: status_for(score, MINIFIG_THRESHOLD).to_string(),
            scrape_success: named,
            official_name,
        }
    }

    pub fn sentinel(code: &str, name: &str) -> Self {
        Self {
            minifig_code: code.to_string(),
            official_name: name.to_string(),
            year: None,
            released: None,
            retail_price_gbp: None,
            theme: None,
            sets: None,
            year_numeric: None,
            price_gbp_numeric: None,
            completeness_score: 0.0,
            validation_status: "incomplete".to_string(),
            scrape_success: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub set_code: String,
    pub minifig_code: String,
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_raw() -> RawSet {
        RawSet {
            lego_code: "9469".into(),
            official_name: Some("9469: Gandalf Arrives".into()),
            number_of_pieces: Some("270".into()),
            number_of_minifigs: Some("2".into()),
            released: Some("June 2012".into()),
            retired: Some("December 2013".into()),
            retail_price_eur: Some("€12.99".into()),
            retail_price_gbp: Some("£10.99".into()),
            value_new_sealed: Some("$53.98".into()),
            value_used: Some("$22.40".into()),
            image_url: Some("https://img.test/9469.jpg".into()),
            theme: Some("The Lord of the Rings".into()),
            subtheme: None,
        }
    }

    #[test]
    fn derives_numeric_fields() {
        let rec = SetRecord::from_raw(full_raw());
        assert_eq!(rec.pieces_numeric, Some(270));
        assert_eq!(rec.minifigs_numeric, Some(2));
        assert_eq!(rec.price_eur_numeric, Some(12.99));
        assert_eq!(rec.price_gbp_numeric, Some(10.99));
        assert_eq!(rec.release_year, Some(2012));
        assert!(rec.scrape_success);
        assert_eq!(rec.validation_status, "validated");
        assert!((rec.completeness_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_raw_scores_incomplete() {
        let raw = RawSet {
            lego_code: "9469".into(),
            official_name: Some("9469: Gandalf Arrives".into()),
            ..Default::default()
        };
        let rec = SetRecord::from_raw(raw);
        assert!(rec.scrape_success);
        assert_eq!(rec.validation_status, "incomplete");
        assert!((rec.completeness_score - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn sentinel_record_is_unsuccessful() {
        let rec = SetRecord::sentinel("9999", crate::normalize::ERROR);
        assert!(!rec.scrape_success);
        assert_eq!(rec.official_name, "Error");
        assert_eq!(rec.completeness_score, 0.0);
    }

    #[test]
    fn extra_fields_never_lower_completeness() {
        let sparse = RawSet {
            lego_code: "9469".into(),
            official_name: Some("9469: Gandalf Arrives".into()),
            ..Default::default()
        };
        let mut fuller = sparse.clone();
        fuller.number_of_pieces = Some("270".into());
        fuller.theme = Some("The Lord of the Rings".into());

        let before = SetRecord::from_raw(sparse).completeness_score;
        let after = SetRecord::from_raw(fuller).completeness_score;
        assert!(after >= before);
        assert!((after - 3.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn minifig_with_three_of_five_fields_stays_incomplete() {
        let raw = RawMinifig {
            minifig_code: "lor001".into(),
            official_name: Some("lor001: Gandalf the Grey".into()),
            year: Some("2012".into()),
            theme: Some("The Lord of the Rings".into()),
            ..Default::default()
        };
        let rec = MinifigRecord::from_raw(raw);
        assert!((rec.completeness_score - 0.6).abs() < 1e-9);
        assert_eq!(rec.validation_status, "incomplete");
    }

    #[test]
    fn minifig_reference_list_joined() {
        let raw = RawMinifig {
            minifig_code: "lor001".into(),
            official_name: Some("lor001: Gandalf the Grey".into()),
            year: Some("2012".into()),
            released: Some("June 2012".into()),
            retail_price_gbp: Some("£8.50".into()),
            theme: Some("The Lord of the Rings".into()),
            sets: vec!["9469 Gandalf Arrives".into(), "79005 The Wizard Battle".into()],
        };
        let rec = MinifigRecord::from_raw(raw);
        assert_eq!(
            rec.sets.as_deref(),
            Some("9469 Gandalf Arrives, 79005 The Wizard Battle")
        );
        assert_eq!(rec.year_numeric, Some(2012));
        assert_eq!(rec.validation_status, "validated");
    }
}
