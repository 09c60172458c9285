use rusqlite::types::ToSql;
use serde::Serialize;

use super::{SetRecord, Store};
use crate::error::ScrapeError;

/// Row shape for listings and exports.
#[derive(Debug, Clone, Serialize)]
pub struct SetSummary {
    pub lego_code: String,
    pub official_name: String,
    pub theme: Option<String>,
    pub pieces_numeric: Option<i64>,
    pub release_year: Option<i32>,
    pub price_gbp_numeric: Option<f64>,
    pub completeness_score: f64,
    pub validation_status: Option<String>,
    pub scrape_success: bool,
    pub scrape_attempts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinifigSummary {
    pub minifig_code: String,
    pub official_name: String,
    pub theme: Option<String>,
    pub year_numeric: Option<i32>,
    pub price_gbp_numeric: Option<f64>,
    pub completeness_score: f64,
    pub validation_status: Option<String>,
    pub scrape_success: bool,
}

#[derive(Debug, Default)]
pub struct ListFilter {
    pub theme: Option<String>,
    pub status: Option<String>,
    pub success_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub sets_total: usize,
    pub sets_success: usize,
    pub sets_validated: usize,
    pub minifigs_total: usize,
    pub minifigs_success: usize,
    pub relations: usize,
    pub avg_set_completeness: f64,
    pub avg_minifig_completeness: f64,
}

impl Store {
    pub fn get_set(&self, code: &str) -> Result<Option<SetRecord>, ScrapeError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT lego_code, official_name, number_of_pieces, number_of_minifigs,
                    released, retired, retail_price_eur, retail_price_gbp,
                    value_new_sealed, value_used, image_url, theme, subtheme,
                    pieces_numeric, minifigs_numeric, price_eur_numeric,
                    price_gbp_numeric, value_new_numeric, value_used_numeric,
                    release_year, completeness_score, validation_status, scrape_success
             FROM lego_sets WHERE lego_code = ?1",
        )?;
        let mut rows = stmt.query([code])?;
        match rows.next()? {
            Some(row) => Ok(Some(SetRecord {
                lego_code: row.get(0)?,
                official_name: row.get(1)?,
                number_of_pieces: row.get(2)?,
                number_of_minifigs: row.get(3)?,
                released: row.get(4)?,
                retired: row.get(5)?,
                retail_price_eur: row.get(6)?,
                retail_price_gbp: row.get(7)?,
                value_new_sealed: row.get(8)?,
                value_used: row.get(9)?,
                image_url: row.get(10)?,
                theme: row.get(11)?,
                subtheme: row.get(12)?,
                pieces_numeric: row.get(13)?,
                minifigs_numeric: row.get(14)?,
                price_eur_numeric: row.get(15)?,
                price_gbp_numeric: row.get(16)?,
                value_new_numeric: row.get(17)?,
                value_used_numeric: row.get(18)?,
                release_year: row.get(19)?,
                completeness_score: row.get(20)?,
                validation_status: row
                    .get::<_, Option<String>>(21)?
                    .unwrap_or_default(),
                scrape_success: row.get(22)?,
            })),
            None => Ok(None),
        }
    }

    pub fn list_sets(&self, filter: &ListFilter) -> Result<Vec<SetSummary>, ScrapeError> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(theme) = &filter.theme {
            conditions.push(format!("theme = ?{}", params.len() + 1));
            params.push(Box::new(theme.clone()));
        }
        if let Some(status) = &filter.status {
            conditions.push(format!("validation_status = ?{}", params.len() + 1));
            params.push(Box::new(status.clone()));
        }
        if filter.success_only {
            conditions.push("scrape_success = 1".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit_clause = match filter.limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        };

        let sql = format!(
            "SELECT lego_code, official_name, theme, pieces_numeric, release_year,
                    price_gbp_numeric, completeness_score, validation_status,
                    scrape_success, scrape_attempts
             FROM lego_sets{where_clause}
             ORDER BY lego_code{limit_clause}"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok(SetSummary {
                    lego_code: row.get(0)?,
                    official_name: row.get(1)?,
                    theme: row.get(2)?,
                    pieces_numeric: row.get(3)?,
                    release_year: row.get(4)?,
                    price_gbp_numeric: row.get(5)?,
                    completeness_score: row.get(6)?,
                    validation_status: row.get(7)?,
                    scrape_success: row.get(8)?,
                    scrape_attempts: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_minifigs(&self, filter: &ListFilter) -> Result<Vec<MinifigSummary>, ScrapeError> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(theme) = &filter.theme {
            conditions.push(format!("theme = ?{}", params.len() + 1));
            params.push(Box::new(theme.clone()));
        }
        if let Some(status) = &filter.status {
            conditions.push(format!("validation_status = ?{}", params.len() + 1));
            params.push(Box::new(status.clone()));
        }
        if filter.success_only {
            conditions.push("scrape_success = 1".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit_clause = match filter.limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        };

        let sql = format!(
            "SELECT minifig_code, official_name, theme, year_numeric,
                    price_gbp_numeric, completeness_score, validation_status,
                    scrape_success
             FROM minifigs{where_clause}
             ORDER BY minifig_code{limit_clause}"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok(MinifigSummary {
                    minifig_code: row.get(0)?,
                    official_name: row.get(1)?,
                    theme: row.get(2)?,
                    year_numeric: row.get(3)?,
                    price_gbp_numeric: row.get(4)?,
                    completeness_score: row.get(5)?,
                    validation_status: row.get(6)?,
                    scrape_success: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Row counts grouped by a column. The column set is closed; this never
    /// interpolates caller text into SQL.
    pub fn aggregate_sets(&self, by: AggregateField) -> Result<Vec<(String, i64)>, ScrapeError> {
        let column = by.column();
        let sql = format!(
            "SELECT COALESCE(CAST({column} AS TEXT), '(none)'), COUNT(*)
             FROM lego_sets GROUP BY {column} ORDER BY COUNT(*) DESC"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<Stats, ScrapeError> {
        let conn = self.conn();
        let sets_total: usize =
            conn.query_row("SELECT COUNT(*) FROM lego_sets", [], |r| r.get(0))?;
        let sets_success: usize = conn.query_row(
            "SELECT COUNT(*) FROM lego_sets WHERE scrape_success = 1",
            [],
            |r| r.get(0),
        )?;
        let sets_validated: usize = conn.query_row(
            "SELECT COUNT(*) FROM lego_sets WHERE validation_status = 'validated'",
            [],
            |r| r.get(0),
        )?;
        let minifigs_total: usize =
            conn.query_row("SELECT COUNT(*) FROM minifigs", [], |r| r.get(0))?;
        let minifigs_success: usize = conn.query_row(
            "SELECT COUNT(*) FROM minifigs WHERE scrape_success = 1",
            [],
            |r| r.get(0),
        )?;
        let relations: usize = conn.query_row(
            "SELECT COUNT(*) FROM set_minifig_relations",
            [],
            |r| r.get(0),
        )?;
        let avg_set_completeness: f64 = conn.query_row(
            "SELECT COALESCE(AVG(completeness_score), 0.0) FROM lego_sets",
            [],
            |r| r.get(0),
        )?;
        let avg_minifig_completeness: f64 = conn.query_row(
            "SELECT COALESCE(AVG(completeness_score), 0.0) FROM minifigs",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            sets_total,
            sets_success,
            sets_validated,
            minifigs_total,
            minifigs_success,
            relations,
            avg_set_completeness,
            avg_minifig_completeness,
        })
    }

    // ── Linker feeds ──

    /// (code, name) for every successfully scraped set.
    pub fn set_name_index(&self) -> Result<Vec<(String, String)>, ScrapeError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT lego_code, official_name FROM lego_sets WHERE scrape_success = 1",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (minifig_code, raw reference list) for minifigs that carried one.
    pub fn minifig_reference_lists(&self) -> Result<Vec<(String, String)>, ScrapeError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT minifig_code, sets FROM minifigs
             WHERE sets IS NOT NULL AND scrape_success = 1",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AggregateField {
    Theme,
    ReleaseYear,
    ValidationStatus,
}

impl AggregateField {
    fn column(&self) -> &'static str {
        match self {
            AggregateField::Theme => "theme",
            AggregateField::ReleaseYear => "release_year",
            AggregateField::ValidationStatus => "validation_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use super::*;
    use crate::extract::sets::RawSet;

    fn seed(store: &Store) {
        for (code, name, theme) in [
            ("9469", "9469: Gandalf Arrives", Some("The Lord of the Rings")),
            ("79003", "79003: An Unexpected Gathering", Some("The Hobbit")),
        ] {
            let raw = RawSet {
                lego_code: code.into(),
                official_name: Some(name.into()),
                theme: theme.map(String::from),
                number_of_pieces: Some("100".into()),
                ..Default::default()
            };
            store.upsert_set(&SetRecord::from_raw(raw)).unwrap();
        }
        store
            .upsert_set(&SetRecord::sentinel("9999", crate::normalize::NOT_FOUND))
            .unwrap();
    }

    #[test]
    fn get_set_roundtrips_record() {
        let (_dir, store) = temp_store();
        seed(&store);
        let rec = store.get_set("9469").unwrap().unwrap();
        assert_eq!(rec.official_name, "9469: Gandalf Arrives");
        assert_eq!(rec.pieces_numeric, Some(100));
        assert!(store.get_set("0000").unwrap().is_none());
    }

    #[test]
    fn list_filters_by_theme_and_success() {
        let (_dir, store) = temp_store();
        seed(&store);

        let all = store.list_sets(&ListFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let hobbit = store
            .list_sets(&ListFilter {
                theme: Some("The Hobbit".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hobbit.len(), 1);
        assert_eq!(hobbit[0].lego_code, "79003");

        let ok = store
            .list_sets(&ListFilter {
                success_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn aggregate_counts_by_theme() {
        let (_dir, store) = temp_store();
        seed(&store);
        let counts = store.aggregate_sets(AggregateField::Theme).unwrap();
        let none = counts.iter().find(|(k, _)| k == "(none)").unwrap();
        assert_eq!(none.1, 1);
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<i64>(), 3);
    }

    #[test]
    fn stats_reflect_seeded_rows() {
        let (_dir, store) = temp_store();
        seed(&store);
        let stats = store.stats().unwrap();
        assert_eq!(stats.sets_total, 3);
        assert_eq!(stats.sets_success, 2);
        assert_eq!(stats.minifigs_total, 0);
        assert!(stats.avg_set_completeness > 0.0);
    }

    #[test]
    fn linker_feed_skips_failures() {
        let (_dir, store) = temp_store();
        seed(&store);
        let names = store.set_name_index().unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|(code, _)| code != "9999"));
    }
}
