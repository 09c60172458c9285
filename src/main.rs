mod config;
mod db;
mod error;
mod extract;
mod fetch;
mod linker;
mod navigator;
mod normalize;
mod pipeline;
mod retry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::config::{Config, NavigationMode};
use crate::db::queries::{AggregateField, ListFilter};
use crate::db::Store;
use crate::fetch::HttpFetcher;
use crate::pipeline::{summarize_minifigs, summarize_sets, Pipeline};

#[derive(Parser)]
#[command(name = "be_scraper", about = "BrickEconomy set and minifig catalog scraper")]
struct Cli {
    /// Database path (overrides BE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<String>,
    /// Verbose navigation: step-by-step tracing + page dumps under debug_pages/
    #[arg(long, global = true)]
    visible: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape set detail pages for the given codes
    Sets {
        /// Set codes (e.g. 9469 79003)
        codes: Vec<String>,
        /// File with one code per line ('#' starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Scrape minifig pages for the given codes
    Minifigs {
        /// Minifig codes (e.g. lor001 lor002)
        codes: Vec<String>,
        /// Code range, e.g. "lor001..lor153"
        #[arg(short, long)]
        range: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Resolve stored minifig set references into relations
    Link,
    /// Sets + minifigs + link in one pass
    Run {
        #[arg(long, value_delimiter = ',')]
        sets: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        minifigs: Vec<String>,
    },
    /// Show database statistics
    Stats,
    /// Scraped sets overview table
    Overview {
        /// Filter by theme (exact match)
        #[arg(short, long)]
        theme: Option<String>,
        /// Filter by validation status (validated, incomplete)
        #[arg(short, long)]
        status: Option<String>,
        /// Only successfully scraped rows
        #[arg(long)]
        success_only: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Group counts by a field instead of listing rows
        #[arg(long, value_parser = ["theme", "year", "status"])]
        group_by: Option<String>,
    },
    /// Export sets as JSON or CSV
    Export {
        /// Output format
        #[arg(long, default_value = "json", value_parser = ["json", "csv"])]
        format: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        theme: Option<String>,
        #[arg(long)]
        success_only: bool,
    },
    /// Snapshot the database into backups/
    Backup,
    /// Integrity check, ANALYZE and VACUUM
    Maintain {
        /// Also delete sentinel rows so their codes can be rescraped
        #[arg(long)]
        purge: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if cli.visible {
        config.mode = NavigationMode::Visible;
    }

    let result = match cli.command {
        Commands::Sets { codes, file } => {
            let codes = collect_codes(codes, file.as_deref(), None)?;
            if codes.is_empty() {
                bail!("no set codes given (pass codes or --file)");
            }
            let (_store, pipeline) = build_pipeline(&config)?;
            println!("Scraping {} set(s)...", codes.len());
            let results = pipeline.process_sets(&codes).await?;
            summarize_sets(&results).print("Sets");
            Ok(())
        }
        Commands::Minifigs { codes, range, file } => {
            let codes = collect_codes(codes, file.as_deref(), range.as_deref())?;
            if codes.is_empty() {
                bail!("no minifig codes given (pass codes, --range or --file)");
            }
            let (_store, pipeline) = build_pipeline(&config)?;
            println!("Scraping {} minifig(s)...", codes.len());
            let results = pipeline.process_minifigs(&codes).await?;
            summarize_minifigs(&results).print("Minifigs");
            Ok(())
        }
        Commands::Link => {
            let (_store, pipeline) = build_pipeline(&config)?;
            let inserted = pipeline.link_all()?;
            println!("Added {} new set-minifig relation(s).", inserted);
            Ok(())
        }
        Commands::Run { sets, minifigs } => {
            if sets.is_empty() && minifigs.is_empty() {
                bail!("nothing to do (pass --sets and/or --minifigs)");
            }
            let (_store, pipeline) = build_pipeline(&config)?;
            if !sets.is_empty() {
                println!("Phase 1: scraping {} set(s)...", sets.len());
                let results = pipeline.process_sets(&sets).await?;
                summarize_sets(&results).print("Sets");
            }
            if !minifigs.is_empty() {
                println!("Phase 2: scraping {} minifig(s)...", minifigs.len());
                let results = pipeline.process_minifigs(&minifigs).await?;
                summarize_minifigs(&results).print("Minifigs");
            }
            let inserted = pipeline.link_all()?;
            println!("Phase 3: linking added {} relation(s).", inserted);
            Ok(())
        }
        Commands::Stats => {
            let store = Store::open(&config.db_path)?;
            let s = store.stats()?;
            println!("Sets:      {} ({} ok, {} validated)", s.sets_total, s.sets_success, s.sets_validated);
            println!("Minifigs:  {} ({} ok)", s.minifigs_total, s.minifigs_success);
            println!("Relations: {}", s.relations);
            println!("Avg completeness: sets {:.2}, minifigs {:.2}",
                s.avg_set_completeness, s.avg_minifig_completeness);
            for key in ["schema_version", "last_backup", "last_maintenance"] {
                if let Some(value) = store.get_metadata(key)? {
                    println!("{}: {}", key, value);
                }
            }
            Ok(())
        }
        Commands::Overview { theme, status, success_only, limit, group_by } => {
            let store = Store::open(&config.db_path)?;
            if let Some(field) = group_by {
                let by = match field.as_str() {
                    "year" => AggregateField::ReleaseYear,
                    "status" => AggregateField::ValidationStatus,
                    _ => AggregateField::Theme,
                };
                for (key, count) in store.aggregate_sets(by)? {
                    println!("{:>5}  {}", count, key);
                }
                return Ok(());
            }

            let rows = store.list_sets(&ListFilter {
                theme,
                status,
                success_only,
                limit: Some(limit),
            })?;
            if rows.is_empty() {
                println!("No sets found.");
                return Ok(());
            }

            println!(
                "{:<8} | {:<34} | {:<22} | {:>6} | {:>4} | {:>7} | {:<10}",
                "Code", "Name", "Theme", "Pieces", "Year", "Score", "Status"
            );
            println!("{}", "-".repeat(110));
            for r in &rows {
                println!(
                    "{:<8} | {:<34} | {:<22} | {:>6} | {:>4} | {:>7.2} | {:<10}",
                    r.lego_code,
                    truncate(&r.official_name, 34),
                    truncate(r.theme.as_deref().unwrap_or("-"), 22),
                    r.pieces_numeric.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    r.release_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
                    r.completeness_score,
                    r.validation_status.as_deref().unwrap_or("-"),
                );
            }
            println!("\n{} set(s)", rows.len());
            Ok(())
        }
        Commands::Export { format, output, theme, success_only } => {
            let store = Store::open(&config.db_path)?;
            let rows = store.list_sets(&ListFilter {
                theme,
                status: None,
                success_only,
                limit: None,
            })?;
            let body = match format.as_str() {
                "csv" => to_csv(&rows),
                _ => serde_json::to_string_pretty(&rows)?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported {} row(s) to {}", rows.len(), path.display());
                }
                None => println!("{body}"),
            }
            Ok(())
        }
        Commands::Backup => {
            let store = Store::open(&config.db_path)?;
            let path = store.backup(std::path::Path::new("backups"), config.backup_compress_bytes)?;
            println!("Backup written to {}", path.display());
            Ok(())
        }
        Commands::Maintain { purge } => {
            let store = Store::open(&config.db_path)?;
            let report = store.maintain(purge)?;
            println!(
                "Integrity: {}",
                if report.integrity_ok { "ok" } else { "FAILED" }
            );
            if purge {
                println!(
                    "Purged {} set(s), {} minifig(s), {} relation(s).",
                    report.purged_sets, report.purged_minifigs, report.purged_relations
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_pipeline(config: &Config) -> anyhow::Result<(Arc<Store>, Pipeline)> {
    let store = Arc::new(Store::open(&config.db_path)?);
    let fetcher = Arc::new(HttpFetcher::new(config)?);
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupt received; finishing the current item...");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let pipeline = Pipeline::new(fetcher, Arc::clone(&store), config.clone(), shutdown);
    Ok((store, pipeline))
}

/// Merge positional codes with an optional file and an optional range
/// expression like "lor001..lor153".
fn collect_codes(
    mut codes: Vec<String>,
    file: Option<&std::path::Path>,
    range: Option<&str>,
) -> anyhow::Result<Vec<String>> {
    if let Some(path) = file {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading code list {}", path.display()))?;
        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if !line.is_empty() {
                codes.push(line.to_string());
            }
        }
    }
    if let Some(expr) = range {
        codes.extend(expand_range(expr)?);
    }
    Ok(codes)
}

/// "lor001..lor153" -> lor001, lor002, ..., lor153. Both ends must share the
/// same alphabetic prefix; numeric width is preserved.
fn expand_range(expr: &str) -> anyhow::Result<Vec<String>> {
    let (start, end) = expr
        .split_once("..")
        .with_context(|| format!("range '{expr}' must look like lor001..lor153"))?;
    let split = |s: &str| -> (String, String) {
        let idx = s
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(s.len());
        (s[..idx].to_string(), s[idx..].to_string())
    };
    let (prefix_a, num_a) = split(start.trim());
    let (prefix_b, num_b) = split(end.trim());
    if prefix_a != prefix_b || num_a.is_empty() || num_b.is_empty() {
        bail!("range '{expr}' must use one prefix and numeric suffixes");
    }
    let width = num_a.len();
    let from: u64 = num_a.parse()?;
    let to: u64 = num_b.parse()?;
    if to < from {
        bail!("range '{expr}' runs backwards");
    }
    Ok((from..=to)
        .map(|n| format!("{prefix_a}{n:0width$}"))
        .collect())
}

fn to_csv(rows: &[crate::db::queries::SetSummary]) -> String {
    let mut out = String::from(
        "lego_code,official_name,theme,pieces,release_year,price_gbp,completeness_score,validation_status,scrape_success,scrape_attempts\n",
    );
    for r in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{:.2},{},{},{}\n",
            csv_field(&r.lego_code),
            csv_field(&r.official_name),
            csv_field(r.theme.as_deref().unwrap_or("")),
            r.pieces_numeric.map(|n| n.to_string()).unwrap_or_default(),
            r.release_year.map(|y| y.to_string()).unwrap_or_default(),
            r.price_gbp_numeric.map(|p| p.to_string()).unwrap_or_default(),
            r.completeness_score,
            csv_field(r.validation_status.as_deref().unwrap_or("")),
            r.scrape_success,
            r.scrape_attempts,
        ));
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_expansion_preserves_width() {
        let codes = expand_range("lor001..lor004").unwrap();
        assert_eq!(codes, ["lor001", "lor002", "lor003", "lor004"]);
    }

    #[test]
    fn range_rejects_mismatched_prefixes() {
        assert!(expand_range("lor001..hp004").is_err());
        assert!(expand_range("lor010..lor002").is_err());
        assert!(expand_range("lor001").is_err());
    }

    #[test]
    fn csv_escapes_embedded_commas() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn truncate_marks_overflow() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long set name here", 10), "a very ...");
    }
}
