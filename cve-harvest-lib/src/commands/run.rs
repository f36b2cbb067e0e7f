//! Command dispatch logic for cve-harvest

use super::{HarvestArgs, InitArgs, ProbeArgs, init_config, probe_rate_limit, process_harvest};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "cve-harvest", version, author, long_about = None)]
#[command(about = "Harvest GitHub metadata for repositories referenced by CVE records")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: HarvestSubcommand,
}

#[derive(Subcommand, Debug)]
enum HarvestSubcommand {
    /// Fetch languages and contributors for every referenced repository not yet harvested
    Harvest(Box<HarvestArgs>),
    /// Report the remaining GitHub API quota
    Probe(ProbeArgs),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Arguments
///
/// * `args` - An iterator of command-line arguments (typically from `std::env::args()`)
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        HarvestSubcommand::Harvest(harvest_args) => process_harvest(host, harvest_args).await,
        HarvestSubcommand::Probe(probe_args) => probe_rate_limit(host, probe_args).await,
        HarvestSubcommand::Init(init_args) => init_config(host, init_args),
    }
}
