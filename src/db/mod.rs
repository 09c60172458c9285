pub mod backup;
pub mod maintain;
pub mod queries;
pub mod records;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::ScrapeError;
pub use records::{MinifigRecord, Relation, SetRecord};

pub const SCHEMA_VERSION: i64 = 3;

/// SQLite-backed record store. One coarse lock over the connection; the
/// pipeline is a single sequential writer, readers just queue behind it and
/// never observe a partial upsert.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScrapeError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means a writer panicked mid-call; the transaction
        // it held has already rolled back, so the connection is usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<(), ScrapeError> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS lego_sets (
                lego_code          TEXT PRIMARY KEY,
                official_name      TEXT NOT NULL,
                number_of_pieces   TEXT,
                number_of_minifigs TEXT,
                released           TEXT,
                retired            TEXT,
                retail_price_eur   TEXT,
                retail_price_gbp   TEXT,
                value_new_sealed   TEXT,
                value_used         TEXT,
                image_url          TEXT,
                theme              TEXT,
                subtheme           TEXT,
                pieces_numeric     INTEGER,
                minifigs_numeric   INTEGER,
                price_eur_numeric  REAL,
                price_gbp_numeric  REAL,
                value_new_numeric  REAL,
                value_used_numeric REAL,
                release_year       INTEGER,
                created_at         TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at         TEXT NOT NULL DEFAULT (datetime('now')),
                last_scraped       TEXT,
                scrape_success     BOOLEAN NOT NULL DEFAULT 0,
                scrape_attempts    INTEGER NOT NULL DEFAULT 0,
                completeness_score REAL NOT NULL DEFAULT 0,
                validation_status  TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sets_theme ON lego_sets(theme);
            CREATE INDEX IF NOT EXISTS idx_sets_success ON lego_sets(scrape_success);

            CREATE TABLE IF NOT EXISTS minifigs (
                minifig_code       TEXT PRIMARY KEY,
                official_name      TEXT NOT NULL,
                year               TEXT,
                released           TEXT,
                retail_price_gbp   TEXT,
                theme              TEXT,
                sets               TEXT,
                year_numeric       INTEGER,
                price_gbp_numeric  REAL,
                created_at         TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at         TEXT NOT NULL DEFAULT (datetime('now')),
                last_scraped       TEXT,
                scrape_success     BOOLEAN NOT NULL DEFAULT 0,
                scrape_attempts    INTEGER NOT NULL DEFAULT 0,
                completeness_score REAL NOT NULL DEFAULT 0,
                validation_status  TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_minifigs_theme ON minifigs(theme);

            CREATE TABLE IF NOT EXISTS set_minifig_relations (
                set_code     TEXT NOT NULL,
                minifig_code TEXT NOT NULL,
                quantity     INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (set_code, minifig_code)
            );
            CREATE INDEX IF NOT EXISTS idx_relations_minifig
                ON set_minifig_relations(minifig_code);

            CREATE TABLE IF NOT EXISTS database_metadata (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO database_metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    // ── Upserts ──

    /// Write a set record. New codes insert with attempt count 1; existing
    /// codes overwrite every scraped column, bump the attempt counter, and
    /// keep their original `created_at`.
    pub fn upsert_set(&self, rec: &SetRecord) -> Result<(), ScrapeError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO lego_sets
             (lego_code, official_name, number_of_pieces, number_of_minifigs,
              released, retired, retail_price_eur, retail_price_gbp,
              value_new_sealed, value_used, image_url, theme, subtheme,
              pieces_numeric, minifigs_numeric, price_eur_numeric,
              price_gbp_numeric, value_new_numeric, value_used_numeric,
              release_year, updated_at, last_scraped, scrape_success,
              scrape_attempts, completeness_score, validation_status)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,
                     ?17,?18,?19,?20,?21,?21,?22,1,?23,?24)
             ON CONFLICT(lego_code) DO UPDATE SET
                official_name      = excluded.official_name,
                number_of_pieces   = excluded.number_of_pieces,
                number_of_minifigs = excluded.number_of_minifigs,
                released           = excluded.released,
                retired            = excluded.retired,
                retail_price_eur   = excluded.retail_price_eur,
                retail_price_gbp   = excluded.retail_price_gbp,
                value_new_sealed   = excluded.value_new_sealed,
                value_used         = excluded.value_used,
                image_url          = excluded.image_url,
                theme              = excluded.theme,
                subtheme           = excluded.subtheme,
                pieces_numeric     = excluded.pieces_numeric,
                minifigs_numeric   = excluded.minifigs_numeric,
                price_eur_numeric  = excluded.price_eur_numeric,
                price_gbp_numeric  = excluded.price_gbp_numeric,
                value_new_numeric  = excluded.value_new_numeric,
                value_used_numeric = excluded.value_used_numeric,
                release_year       = excluded.release_year,
                updated_at         = excluded.updated_at,
                last_scraped       = excluded.last_scraped,
                scrape_success     = excluded.scrape_success,
                scrape_attempts    = lego_sets.scrape_attempts + 1,
                completeness_score = excluded.completeness_score,
                validation_status  = excluded.validation_status",
            rusqlite::params![
                rec.lego_code,
                rec.official_name,
                rec.number_of_pieces,
                rec.number_of_minifigs,
                rec.released,
                rec.retired,
                rec.retail_price_eur,
                rec.retail_price_gbp,
                rec.value_new_sealed,
                rec.value_used,
                rec.image_url,
                rec.theme,
                rec.subtheme,
                rec.pieces_numeric,
                rec.minifigs_numeric,
                rec.price_eur_numeric,
                rec.price_gbp_numeric,
                rec.value_new_numeric,
                rec.value_used_numeric,
                rec.release_year,
                now(),
                rec.scrape_success,
                rec.completeness_score,
                rec.validation_status,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_minifig(&self, rec: &MinifigRecord) -> Result<(), ScrapeError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO minifigs
             (minifig_code, official_name, year, released, retail_price_gbp,
              theme, sets, year_numeric, price_gbp_numeric, updated_at,
              last_scraped, scrape_success, scrape_attempts,
              completeness_score, validation_status)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?10,?11,1,?12,?13)
             ON CONFLICT(minifig_code) DO UPDATE SET
                official_name      = excluded.official_name,
                year               = excluded.year,
                released           = excluded.released,
                retail_price_gbp   = excluded.retail_price_gbp,
                theme              = excluded.theme,
                sets               = excluded.sets,
                year_numeric       = excluded.year_numeric,
                price_gbp_numeric  = excluded.price_gbp_numeric,
                updated_at         = excluded.updated_at,
                last_scraped       = excluded.last_scraped,
                scrape_success     = excluded.scrape_success,
                scrape_attempts    = minifigs.scrape_attempts + 1,
                completeness_score = excluded.completeness_score,
                validation_status  = excluded.validation_status",
            rusqlite::params![
                rec.minifig_code,
                rec.official_name,
                rec.year,
                rec.released,
                rec.retail_price_gbp,
                rec.theme,
                rec.sets,
                rec.year_numeric,
                rec.price_gbp_numeric,
                now(),
                rec.scrape_success,
                rec.completeness_score,
                rec.validation_status,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Idempotent relation insert; re-linking the same pair is a no-op.
    /// Returns how many rows were actually new.
    pub fn insert_relations(&self, relations: &[Relation]) -> Result<usize, ScrapeError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO set_minifig_relations (set_code, minifig_code, quantity)
                 VALUES (?1, ?2, ?3)",
            )?;
            for r in relations {
                inserted += stmt.execute(rusqlite::params![r.set_code, r.minifig_code, r.quantity])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    // ── Metadata ──

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), ScrapeError> {
        self.conn().execute(
            "INSERT INTO database_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            rusqlite::params![key, value, now()],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM database_metadata WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

pub(crate) fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::*;

    #[test]
    fn upsert_is_idempotent_but_counts_attempts() {
        let (_dir, store) = temp_store();
        let rec = SetRecord::sentinel("9469", crate::normalize::NOT_FOUND);
        store.upsert_set(&rec).unwrap();
        store.upsert_set(&rec).unwrap();
        store.upsert_set(&rec).unwrap();

        let conn = store.conn();
        let (count, attempts): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(scrape_attempts) FROM lego_sets",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn upsert_replaces_sentinel_with_real_record() {
        let (_dir, store) = temp_store();
        store
            .upsert_set(&SetRecord::sentinel("9469", crate::normalize::ERROR))
            .unwrap();

        let raw = crate::extract::sets::RawSet {
            lego_code: "9469".into(),
            official_name: Some("9469: Gandalf Arrives".into()),
            number_of_pieces: Some("270".into()),
            ..Default::default()
        };
        store.upsert_set(&SetRecord::from_raw(raw)).unwrap();

        let conn = store.conn();
        let (name, success, attempts): (String, bool, i64) = conn
            .query_row(
                "SELECT official_name, scrape_success, scrape_attempts FROM lego_sets",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(name, "9469: Gandalf Arrives");
        assert!(success);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn relation_insert_is_idempotent() {
        let (_dir, store) = temp_store();
        let rel = Relation {
            set_code: "9469".into(),
            minifig_code: "lor001".into(),
            quantity: 1,
        };
        assert_eq!(store.insert_relations(&[rel.clone()]).unwrap(), 1);
        assert_eq!(store.insert_relations(&[rel]).unwrap(), 0);
    }

    #[test]
    fn metadata_roundtrip() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_metadata("last_backup").unwrap(), None);
        store.set_metadata("last_backup", "2026-01-01 00:00:00").unwrap();
        assert_eq!(
            store.get_metadata("last_backup").unwrap().as_deref(),
            Some("2026-01-01 00:00:00")
        );
        assert!(store.get_metadata("schema_version").unwrap().is_some());
    }
}
