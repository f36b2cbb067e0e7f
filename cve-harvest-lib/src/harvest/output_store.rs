//! Batch persistence
//!
//! Each batch of each facet lands in its own output unit. Names never collide with an
//! existing file: a taken name gets an incrementing `_{i}` suffix instead of being
//! overwritten. When the data directory refuses writes, the raw results go to a
//! dead-letter directory as JSON lines.

use super::facet::Facet;
use super::fetch_result::{FetchResult, OutputRow};
use crate::Result;
use ohno::{IntoAppError, app_err};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     store";

/// Path of an output unit.
///
/// `suffix` is the collision disambiguator; `None` is the plain `{facet}_{offset:05}.csv` name.
#[must_use]
pub fn unit_path(dir: &Path, facet: Facet, offset: usize, suffix: Option<usize>) -> PathBuf {
    dir.join(file_name(facet, offset, suffix, "csv"))
}

fn file_name(facet: Facet, offset: usize, suffix: Option<usize>, extension: &str) -> String {
    match suffix {
        None => format!("{facet}_{offset:05}.{extension}"),
        Some(i) => format!("{facet}_{offset:05}_{i}.{extension}"),
    }
}

/// One line of a dead-letter file.
#[derive(Serialize)]
struct DeadLetterRecord<'a> {
    original_index: usize,
    #[serde(flatten)]
    result: &'a FetchResult,
}

/// Writes output units into the data directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
    dead_letter_dir: PathBuf,
    max_write_attempts: u32,
}

impl OutputStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, dead_letter_dir: impl Into<PathBuf>, max_write_attempts: u32) -> Self {
        Self {
            dir: dir.into(),
            dead_letter_dir: dead_letter_dir.into(),
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    /// Write `rows` to the first free unit name for this batch.
    ///
    /// Names that already exist are skipped without counting as an attempt. A failed write
    /// removes its partial file and moves on to the next name, up to `max_write_attempts`.
    ///
    /// # Errors
    ///
    /// Returns the last write error once every attempt has failed.
    pub fn persist(&self, facet: Facet, offset: usize, rows: &[OutputRow]) -> Result<PathBuf> {
        let mut attempts = 0;
        let mut suffix = None;

        loop {
            let path = unit_path(&self.dir, facet, offset, suffix);
            suffix = Some(suffix.map_or(0, |i| i + 1));

            let outcome = match File::create_new(&path) {
                Ok(file) => write_rows(file, rows),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!(target: LOG_TARGET, "Unit '{}' already exists, trying next name", path.display());
                    continue;
                }
                Err(e) => Err(e.into()),
            };

            attempts += 1;
            match outcome {
                Ok(()) => {
                    log::debug!(target: LOG_TARGET, "Wrote {} rows to '{}'", rows.len(), path.display());
                    return Ok(path);
                }
                Err(e) if attempts < self.max_write_attempts => {
                    log::warn!(
                        target: LOG_TARGET,
                        "Could not write unit '{}' (attempt {attempts} of {}): {e:#}",
                        path.display(),
                        self.max_write_attempts
                    );
                    let _ = fs::remove_file(&path);
                }
                Err(e) => {
                    let _ = fs::remove_file(&path);
                    return Err(app_err!("writing output unit '{}': {e:#}", path.display()));
                }
            }
        }
    }

    /// Write the raw results of a batch as JSON lines into the dead-letter directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn dead_letter(&self, facet: Facet, offset: usize, results: &[(usize, FetchResult)]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dead_letter_dir)
            .into_app_err_with(|| format!("creating dead-letter directory '{}'", self.dead_letter_dir.display()))?;

        let mut suffix = None;
        let (path, file) = loop {
            let path = self.dead_letter_dir.join(file_name(facet, offset, suffix, "jsonl"));
            match File::create_new(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix = Some(suffix.map_or(0, |i| i + 1)),
                Err(e) => return Err(e).into_app_err_with(|| format!("creating dead-letter file '{}'", path.display())),
            }
        };

        let mut writer = BufWriter::new(file);
        for (original_index, result) in results {
            let record = DeadLetterRecord {
                original_index: *original_index,
                result,
            };
            serde_json::to_writer(&mut writer, &record).into_app_err_with(|| format!("writing dead-letter file '{}'", path.display()))?;
            writer
                .write_all(b"\n")
                .into_app_err_with(|| format!("writing dead-letter file '{}'", path.display()))?;
        }
        writer
            .flush()
            .into_app_err_with(|| format!("flushing dead-letter file '{}'", path.display()))?;

        log::info!(target: LOG_TARGET, "Dead-lettered {} results to '{}'", results.len(), path.display());
        Ok(path)
    }
}

fn write_rows(file: File, rows: &[OutputRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(file);
    if rows.is_empty() {
        writer.write_record(["original_index", "url", "status", "payload"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
