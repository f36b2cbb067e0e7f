//! Startup inputs: the reference table and the API token file.

use crate::Result;
use ohno::{IntoAppError, bail};
use std::fs;
use std::io;
use std::path::Path;

const LOG_TARGET: &str = "references";

/// Column holding the reference URLs.
const URL_COLUMN: &str = "url";

/// Read the `url` column of a reference table, keeping only rows that mention `host`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed, or has no `url` column.
pub fn load_references(path: &Path, host: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).into_app_err_with(|| format!("opening reference table '{}'", path.display()))?;

    let headers = reader
        .headers()
        .into_app_err_with(|| format!("reading header of reference table '{}'", path.display()))?;
    let Some(column) = headers.iter().position(|h| h.trim() == URL_COLUMN) else {
        bail!("reference table '{}' has no '{URL_COLUMN}' column", path.display());
    };

    let mut total = 0usize;
    let mut references = Vec::new();
    for record in reader.records() {
        let record = record.into_app_err_with(|| format!("reading reference table '{}'", path.display()))?;
        total += 1;
        if let Some(url) = record.get(column)
            && url.contains(host)
        {
            references.push(url.to_string());
        }
    }

    log::info!(
        target: LOG_TARGET,
        "Loaded {} references to '{host}' out of {total} rows from '{}'",
        references.len(),
        path.display()
    );
    Ok(references)
}

/// Read an API token from the first line of `path`.
///
/// A missing file yields `None` unless `explicit` is set, in which case it is an error.
/// An empty first line also yields `None`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, or is missing while `explicit`.
pub fn read_token_file(path: &Path, explicit: bool) -> Result<Option<String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
            log::debug!(target: LOG_TARGET, "No token file at '{}', continuing unauthenticated", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e).into_app_err_with(|| format!("reading token file '{}'", path.display())),
    };

    let token = text.lines().next().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        log::warn!(target: LOG_TARGET, "Token file '{}' is empty, continuing unauthenticated", path.display());
        return Ok(None);
    }

    Ok(Some(token.to_string()))
}
