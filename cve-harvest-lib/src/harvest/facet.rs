use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// One slice of repository metadata, fetched independently per endpoint.
///
/// The facet name doubles as the API path suffix and as the output unit prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumCount, EnumIter, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Facet {
    Languages,
    Contributors,
}

impl Facet {
    /// The facet name as used in URLs and file names.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Dense index, for per-facet counter arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}
