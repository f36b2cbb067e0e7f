//! Command-line interface and orchestration for cve-harvest
//!
//! # Commands
//!
//! - **harvest**: Load CVE references, skip repositories already present in earlier
//!   output, and fetch the configured facets batch by batch
//! - **probe**: Query the rate limit endpoint once and report the remaining quota
//! - **init**: Generate a default configuration file
//!
//! The `run` function parses command-line arguments using clap and routes to the
//! matching handler. The `common` module resolves what the harvest and probe commands
//! share: logging, configuration, the API token, and the progress reporter.
//!
//! Configuration is a TOML file (`harvest.toml` in the data directory by default)
//! covering batch size, facets, rate limit pacing, and persistence retries.

mod common;
mod config;
mod harvest;
mod host;
mod init;
mod probe;
mod progress_reporter;
mod run;

#[cfg(debug_assertions)]
pub use config::Config;

pub use harvest::{HarvestArgs, process_harvest};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use probe::{ProbeArgs, probe_rate_limit};
pub use progress_reporter::ProgressReporter;
pub use run::run;
