use super::facet::Facet;
use super::repo_endpoint::RepoEndpoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

static NULL_ROW: Value = Value::Null;

/// How a single facet query turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchStatus {
    /// 2xx with a JSON object or array body.
    Success,

    /// Non-2xx response; the payload holds the status code and body text.
    Failed,

    /// 2xx with a body of unexpected shape, or a transport failure.
    Error,
}

/// Outcome of querying one facet of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub facet: String,
    pub status: FetchStatus,
    pub payload: Value,
}

impl FetchResult {
    #[must_use]
    pub fn new(url: impl Into<String>, facet: impl Into<String>, status: FetchStatus, payload: Value) -> Self {
        Self {
            url: url.into(),
            facet: facet.into(),
            status,
            payload,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success)
    }

    /// Payload rows after shape normalization.
    ///
    /// An array yields one row per element; anything else is treated as a one-element list.
    /// An empty array yields a single `null` row so the endpoint still appears in the output.
    #[must_use]
    pub fn payload_rows(&self) -> Vec<&Value> {
        match &self.payload {
            Value::Array(items) if items.is_empty() => vec![&NULL_ROW],
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

/// One row of an output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    /// Position of the endpoint in the full normalized working set.
    pub original_index: usize,
    pub url: String,
    pub status: FetchStatus,
    /// JSON text of the payload element for this row.
    pub payload: String,
}

/// Flatten a facet's results into output rows, one per payload element.
///
/// `results` pairs each fetch with the original index of its endpoint.
#[must_use]
pub fn explode(results: &[(usize, FetchResult)]) -> Vec<OutputRow> {
    results
        .iter()
        .flat_map(|(original_index, result)| {
            result.payload_rows().into_iter().map(move |element| OutputRow {
                original_index: *original_index,
                url: result.url.clone(),
                status: result.status,
                payload: element.to_string(),
            })
        })
        .collect()
}

/// Facet and endpoint of a result, for log messages.
#[must_use]
pub fn describe(endpoint: &RepoEndpoint, facet: Facet) -> String {
    format!("{facet} of '{endpoint}'")
}
