use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::backup::Backup;
use rusqlite::Connection;
use tracing::info;

use super::{now, Store};
use crate::error::ScrapeError;

impl Store {
    /// Snapshot the database into `dir` as `backup_YYYYMMDD_HHMMSS.db`,
    /// gzipping the result when it exceeds `compress_threshold` bytes.
    /// Goes through the online backup API so a consistent copy comes out
    /// even with WAL pages not yet checkpointed.
    pub fn backup(&self, dir: &Path, compress_threshold: u64) -> Result<PathBuf, ScrapeError> {
        std::fs::create_dir_all(dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dest = dir.join(format!("backup_{stamp}.db"));

        {
            let src = self.conn();
            let mut dst = Connection::open(&dest)?;
            let job = Backup::new(&src, &mut dst)?;
            job.run_to_completion(64, Duration::from_millis(50), None)?;
        }

        let size = std::fs::metadata(&dest)?.len();
        let final_path = if size > compress_threshold {
            let gz_path = dest.with_extension("db.gz");
            compress(&dest, &gz_path)?;
            std::fs::remove_file(&dest)?;
            info!(
                "backup compressed ({} bytes raw) -> {}",
                size,
                gz_path.display()
            );
            gz_path
        } else {
            info!("backup written ({} bytes) -> {}", size, dest.display());
            dest
        };

        self.set_metadata("last_backup", &now())?;
        Ok(final_path)
    }
}

fn compress(src: &Path, dst: &Path) -> Result<(), ScrapeError> {
    let mut reader = BufReader::new(File::open(src)?);
    let writer = BufWriter::new(File::create(dst)?);
    let mut encoder = GzEncoder::new(writer, Compression::default());
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}
