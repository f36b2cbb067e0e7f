use super::facet::Facet;
use super::repo_endpoint::RepoEndpoint;
use crate::Result;
use ohno::IntoAppError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "    ledger";

/// Endpoints already harvested by prior runs.
///
/// Built once at startup from the output units of one facet and never updated during a
/// run; results written by the current run only count on the next startup.
#[derive(Debug, Clone, Default)]
pub struct ResumeLedger {
    done: BTreeSet<RepoEndpoint>,
}

impl ResumeLedger {
    /// Collect the `url` column of every `{facet}_*.csv` unit in `dir`.
    ///
    /// A missing directory yields an empty ledger. Units that cannot be read are skipped
    /// with a warning, so only their endpoints get fetched again.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` exists but cannot be listed.
    pub fn load(dir: &Path, facet: Facet) -> Result<Self> {
        let mut done = BTreeSet::new();

        for path in units(dir, facet)? {
            match read_unit(&path) {
                Ok(urls) => {
                    log::debug!(target: LOG_TARGET, "Unit '{}' lists {} endpoints", path.display(), urls.len());
                    done.extend(urls);
                }
                Err(e) => log::warn!(target: LOG_TARGET, "Skipping unreadable output unit '{}': {e:#}", path.display()),
            }
        }

        log::info!(target: LOG_TARGET, "Found {} previously harvested endpoints for {facet}", done.len());
        Ok(Self { done })
    }

    #[must_use]
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = RepoEndpoint>) -> Self {
        Self {
            done: endpoints.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_done(&self, endpoint: &RepoEndpoint) -> bool {
        self.done.contains(endpoint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.done.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Split a working set into the endpoints still to fetch and the number removed.
    #[must_use]
    pub fn filter(&self, working_set: &BTreeSet<RepoEndpoint>) -> (BTreeSet<RepoEndpoint>, usize) {
        let remaining: BTreeSet<_> = working_set.difference(&self.done).cloned().collect();
        let removed = working_set.len() - remaining.len();
        (remaining, removed)
    }
}

/// Paths of the output units of `facet` in `dir`, sorted by name.
fn units(dir: &Path, facet: Facet) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).into_app_err_with(|| format!("listing data directory '{}'", dir.display())),
    };

    let prefix = format!("{facet}_");
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.into_app_err_with(|| format!("listing data directory '{}'", dir.display()))?;
        let path = entry.path();
        let is_unit = path.extension().is_some_and(|ext| ext == "csv")
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
        if is_unit && path.is_file() {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

fn read_unit(path: &Path) -> Result<Vec<RepoEndpoint>> {
    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == "url")
        .into_app_err("unit has no 'url' column")?;

    let mut urls = Vec::new();
    for record in reader.records() {
        if let Some(url) = record?.get(column)
            && !url.is_empty()
        {
            urls.push(RepoEndpoint::from_canonical(url));
        }
    }

    Ok(urls)
}
