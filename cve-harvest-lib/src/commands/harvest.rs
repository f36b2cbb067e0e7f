use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::harvest::{Harvester, HarvesterOptions, Progress, StopSignal, load_references};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;

/// Reference table looked up in the data directory when none is given.
const DEFAULT_REFERENCES_FILE: &str = "all_parsed_cve_references.csv";

#[derive(Parser, Debug)]
pub struct HarvestArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// CSV file with a `url` column of CVE references (default is `all_parsed_cve_references.csv` in the data directory)
    #[arg(long, value_name = "PATH")]
    pub references: Option<Utf8PathBuf>,

    /// Skip this many repositories of those not yet harvested
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub start: usize,
}

pub async fn process_harvest<H: Host>(host: &mut H, args: &HarvestArgs) -> Result<()> {
    let common = Common::new(&args.common)?;

    let references_path = args
        .references
        .clone()
        .unwrap_or_else(|| common.data_dir.join(DEFAULT_REFERENCES_FILE));
    let references = load_references(references_path.as_std_path(), &common.config.repository_host)?;

    let options = HarvesterOptions {
        batch_size: common.config.batch_size,
        facets: common.config.facets.clone(),
        ledger_facet: common.config.ledger_facet,
        data_dir: common.data_dir.clone().into_std_path_buf(),
        dead_letter_dir: common.config.dead_letter_path(&common.data_dir).into_std_path_buf(),
        max_write_attempts: common.config.max_write_attempts,
    };

    let stop = StopSignal::new();
    stop.trigger_on_ctrl_c();

    let mut harvester = Harvester::new(options, &common.client_options(), common.progress(), stop)?;
    let result = harvester.run(references.as_slice(), args.start).await;
    common.progress.done();
    let summary = result?;

    let _ = writeln!(
        host.output(),
        "Harvested {} batches: {} units written, {} dead-lettered, {} failed ({} of {} repositories already harvested)",
        summary.batches,
        summary.persisted,
        summary.dead_lettered,
        summary.failed,
        summary.already_harvested,
        summary.endpoints
    );

    if summary.stopped {
        let _ = writeln!(host.error(), "Stopped before all batches were harvested");
    }

    if summary.dead_lettered > 0 || summary.failed > 0 {
        let _ = writeln!(
            host.error(),
            "Some batches could not be written to '{}', check the log and the dead-letter directory",
            common.data_dir
        );
        host.exit(1);
    }

    Ok(())
}
