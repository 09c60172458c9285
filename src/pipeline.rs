use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{MinifigRecord, SetRecord, Store};
use crate::error::ScrapeError;
use crate::extract;
use crate::fetch::PageFetcher;
use crate::linker::EntityLinker;
use crate::navigator::Navigator;
use crate::normalize::{ERROR, NOT_FOUND};

/// Sequential batch driver: one item at a time, per-item isolation. A failed
/// code becomes a sentinel row and the batch moves on; even a persist failure
/// only costs that code an error entry, never the rest of the batch.
pub struct Pipeline {
    navigator: Navigator,
    store: Arc<Store>,
    config: Config,
    shutdown: Arc<AtomicBool>,
}

pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_codes: Vec<String>,
}

impl RunSummary {
    pub fn print(&self, kind: &str) {
        println!(
            "{}: {}/{} scraped successfully.",
            kind, self.succeeded, self.total
        );
        if !self.failed_codes.is_empty() {
            println!("  failed: {}", self.failed_codes.join(", "));
        }
    }
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<Store>,
        config: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            navigator: Navigator::new(fetcher, &config),
            store,
            config,
            shutdown,
        }
    }

    /// Scrape a batch of set codes. The result map holds one entry per code
    /// in first-seen order; repeated codes collapse to the first occurrence.
    pub async fn process_sets(
        &self,
        codes: &[String],
    ) -> Result<IndexMap<String, SetRecord>, ScrapeError> {
        let unique = dedupe(codes);
        let pb = progress(unique.len());
        let mut results: IndexMap<String, SetRecord> = IndexMap::new();

        for (i, code) in unique.iter().enumerate() {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!("shutdown requested, stopping after {} of {} sets", i, unique.len());
                break;
            }
            let record = match self.scrape_set(code).await {
                Ok(rec) => rec,
                Err(e) => {
                    let sentinel = sentinel_for(&e);
                    warn!("set {} failed ({}), recording '{}'", code, e, sentinel);
                    SetRecord::sentinel(code, sentinel)
                }
            };
            let record = match self.persist_set(&record).await {
                Ok(()) => record,
                Err(e) => {
                    warn!("could not persist set {} ({}), recording '{}'", code, e, ERROR);
                    SetRecord::sentinel(code, ERROR)
                }
            };
            results.insert(code.clone(), record);
            pb.inc(1);
            if i + 1 < unique.len() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        pb.finish_and_clear();
        Ok(results)
    }

    pub async fn process_minifigs(
        &self,
        codes: &[String],
    ) -> Result<IndexMap<String, MinifigRecord>, ScrapeError> {
        let unique = dedupe(codes);
        let pb = progress(unique.len());
        let mut results: IndexMap<String, MinifigRecord> = IndexMap::new();

        for (i, code) in unique.iter().enumerate() {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!(
                    "shutdown requested, stopping after {} of {} minifigs",
                    i,
                    unique.len()
                );
                break;
            }
            let record = match self.navigator.load_minifig(code).await {
                Ok(doc) => MinifigRecord::from_raw(extract::minifigs::extract(code, &doc)),
                Err(e) => {
                    let sentinel = sentinel_for(&e.last);
                    warn!("minifig {} failed ({}), recording '{}'", code, e, sentinel);
                    MinifigRecord::sentinel(code, sentinel)
                }
            };
            let record = match self.persist_minifig(&record).await {
                Ok(()) => record,
                Err(e) => {
                    warn!(
                        "could not persist minifig {} ({}), recording '{}'",
                        code, e, ERROR
                    );
                    MinifigRecord::sentinel(code, ERROR)
                }
            };
            results.insert(code.clone(), record);
            pb.inc(1);
            if i + 1 < unique.len() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        pb.finish_and_clear();
        Ok(results)
    }

    /// Second pass over stored minifig reference lists: resolve references
    /// against the stored set names and persist the relations. Returns how
    /// many relations were new.
    pub fn link_all(&self) -> Result<usize, ScrapeError> {
        let names = self.store.set_name_index()?;
        if names.is_empty() {
            info!("no scraped sets to link against");
            return Ok(0);
        }
        let linker = EntityLinker::new(&names);
        let mut inserted = 0;
        for (minifig_code, references) in self.store.minifig_reference_lists()? {
            let relations = linker.link(&minifig_code, &references);
            inserted += self.store.insert_relations(&relations)?;
        }
        info!("linking pass added {} relation(s)", inserted);
        Ok(inserted)
    }

    async fn scrape_set(&self, code: &str) -> Result<SetRecord, ScrapeError> {
        let doc = self.navigator.find_set_detail(code).await?;
        let raw = extract::sets::extract(code, &doc);
        Ok(SetRecord::from_raw(raw))
    }

    // Upserts get one extra chance; a transiently locked database should not
    // cost the item.
    async fn persist_set(&self, rec: &SetRecord) -> Result<(), ScrapeError> {
        if let Err(e) = self.store.upsert_set(rec) {
            warn!("upsert failed for {}, retrying once: {}", rec.lego_code, e);
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.store.upsert_set(rec)?;
        }
        Ok(())
    }

    async fn persist_minifig(&self, rec: &MinifigRecord) -> Result<(), ScrapeError> {
        if let Err(e) = self.store.upsert_minifig(rec) {
            warn!(
                "upsert failed for {}, retrying once: {}",
                rec.minifig_code, e
            );
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.store.upsert_minifig(rec)?;
        }
        Ok(())
    }
}

pub fn summarize_sets(results: &IndexMap<String, SetRecord>) -> RunSummary {
    RunSummary {
        total: results.len(),
        succeeded: results.values().filter(|r| r.scrape_success).count(),
        failed_codes: results
            .iter()
            .filter(|(_, r)| !r.scrape_success)
            .map(|(code, _)| code.clone())
            .collect(),
    }
}

pub fn summarize_minifigs(results: &IndexMap<String, MinifigRecord>) -> RunSummary {
    RunSummary {
        total: results.len(),
        succeeded: results.values().filter(|r| r.scrape_success).count(),
        failed_codes: results
            .iter()
            .filter(|(_, r)| !r.scrape_success)
            .map(|(code, _)| code.clone())
            .collect(),
    }
}

fn dedupe(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes {
        let code = code.trim();
        if code.is_empty() || out.iter().any(|c| c == code) {
            continue;
        }
        out.push(code.to_string());
    }
    out
}

fn sentinel_for(e: &ScrapeError) -> &'static str {
    match e {
        ScrapeError::NotFound { .. } => NOT_FOUND,
        ScrapeError::LocatorNotFound { intent } if *intent == "result link" => NOT_FOUND,
        _ => ERROR,
    }
}

fn progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}
