use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "  endpoint";

/// Canonical API URL identifying one repository, e.g. `https://api.github.com/repos/owner/repo`.
///
/// This is the unique key for deduplication and resumption. Ordering is lexical on the URL,
/// which keeps working-set positions stable between runs over the same input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoEndpoint {
    url: Arc<str>,
}

impl RepoEndpoint {
    /// Derive the endpoint for a raw reference URL.
    ///
    /// Only the first two non-empty path segments (owner and repo) are kept. References with
    /// fewer segments still produce an endpoint; the API rejects it when it is fetched.
    /// Returns `None` when the reference cannot be parsed as a URL at all.
    #[must_use]
    pub fn from_reference(raw: &str, api_base: &str) -> Option<Self> {
        let raw = raw.trim();
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) if !raw.contains("://") => Url::parse(&format!("https://{raw}")).ok()?,
            Err(_) => return None,
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|segment| !segment.is_empty()).take(2).collect())
            .unwrap_or_default();

        let mut endpoint = format!("{}/repos", api_base.trim_end_matches('/'));
        for (i, segment) in segments.iter().enumerate() {
            endpoint.push('/');
            if i == 1 {
                endpoint.push_str(segment.trim_end_matches(".git"));
            } else {
                endpoint.push_str(segment);
            }
        }

        Some(Self { url: endpoint.into() })
    }

    /// Wrap an already-canonical endpoint URL, e.g. one read back from an output unit.
    #[must_use]
    pub fn from_canonical(url: &str) -> Self {
        Self { url: url.trim().into() }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// URL of one facet of this repository.
    #[must_use]
    pub fn facet_url(&self, facet: &str) -> String {
        format!("{}/{facet}", self.url)
    }
}

impl Display for RepoEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Collapse raw reference URLs into the set of repository endpoints they cite.
pub fn normalize<I, S>(references: I, api_base: &str) -> BTreeSet<RepoEndpoint>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    references
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.as_ref();
            let endpoint = RepoEndpoint::from_reference(raw, api_base);
            if endpoint.is_none() {
                log::debug!(target: LOG_TARGET, "Skipping unparseable reference '{raw}'");
            }
            endpoint
        })
        .collect()
}
