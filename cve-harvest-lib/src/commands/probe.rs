use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::harvest::{Client, FetchStatus, Progress, RequestTracker, StopSignal};
use chrono::Local;
use clap::Parser;
use ohno::bail;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Query the rate limit once and report the remaining quota.
pub async fn probe_rate_limit<H: Host>(host: &mut H, args: &ProbeArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    common.progress.set_phase("Probing");

    let tracker = RequestTracker::new(&common.progress());
    let mut client = Client::new(&common.client_options(), tracker)?;
    let stop = StopSignal::new();
    stop.trigger_on_ctrl_c();

    let probe = client.probe(&stop).await;
    common.progress.done();

    let Ok(probe) = probe else {
        bail!("probe interrupted");
    };

    if probe.status != FetchStatus::Success {
        bail!("rate limit probe returned {}: {}", probe.status, probe.payload);
    }

    match client.rate_limit() {
        Some(info) => {
            let _ = writeln!(
                host.output(),
                "{} requests remaining, resets at {}",
                info.remaining,
                info.reset_at.with_timezone(&Local).format("%F %T")
            );
        }
        None => {
            let _ = writeln!(host.output(), "The API did not report a rate limit");
        }
    }

    Ok(())
}
