use tracing::{info, warn};

use super::{now, Store};
use crate::error::ScrapeError;
use crate::normalize::{ERROR, NOT_FOUND};

#[derive(Debug)]
pub struct MaintenanceReport {
    pub integrity_ok: bool,
    pub purged_sets: usize,
    pub purged_minifigs: usize,
    pub purged_relations: usize,
}

impl Store {
    /// Integrity check, statistics refresh and compaction. With `purge`,
    /// sentinel rows (and any relations left dangling by them) are deleted
    /// first so their codes get a fresh start on the next run.
    pub fn maintain(&self, purge: bool) -> Result<MaintenanceReport, ScrapeError> {
        let mut report = MaintenanceReport {
            integrity_ok: false,
            purged_sets: 0,
            purged_minifigs: 0,
            purged_relations: 0,
        };

        {
            let conn = self.conn();
            let verdict: String =
                conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
            report.integrity_ok = verdict == "ok";
            if !report.integrity_ok {
                warn!("integrity check reported: {}", verdict);
            }

            if purge {
                let tx = conn.unchecked_transaction()?;
                report.purged_sets = tx.execute(
                    "DELETE FROM lego_sets WHERE official_name IN (?1, ?2)",
                    [NOT_FOUND, ERROR],
                )?;
                report.purged_minifigs = tx.execute(
                    "DELETE FROM minifigs WHERE official_name IN (?1, ?2)",
                    [NOT_FOUND, ERROR],
                )?;
                report.purged_relations = tx.execute(
                    "DELETE FROM set_minifig_relations
                     WHERE set_code NOT IN (SELECT lego_code FROM lego_sets)
                        OR minifig_code NOT IN (SELECT minifig_code FROM minifigs)",
                    [],
                )?;
                tx.commit()?;
            }

            conn.execute_batch("ANALYZE; VACUUM;")?;
        }

        self.set_metadata("last_maintenance", &now())?;
        info!(
            "maintenance done (integrity {}, purged {} sets / {} minifigs / {} relations)",
            if report.integrity_ok { "ok" } else { "FAILED" },
            report.purged_sets,
            report.purged_minifigs,
            report.purged_relations
        );
        Ok(report)
    }
}
