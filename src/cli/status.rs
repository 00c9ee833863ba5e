use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use crate::app;
use crate::cli::command::parse_duration;
use crate::cli::control::write_json_line;
use crate::cli::{BridgeSettings, OutputFormat};
use crate::protocol::ProtocolFamily;
use crate::state::ZoneSnapshot;
use crate::terminal::TerminalClient;

use super::ui::{Painter, ReportProgress, StatusView};

const DEFAULT_READY_WAIT: Duration = Duration::from_secs(10);

/// Arguments for the `status` command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// How long to wait for every zone to report before printing (e.g. `5s`).
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    wait: Duration,
}

impl StatusArgs {
    /// Creates status arguments with an explicit readiness wait.
    #[must_use]
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

impl Default for StatusArgs {
    fn default() -> Self {
        Self::new(DEFAULT_READY_WAIT)
    }
}

/// JSON body printed by `status`.
#[derive(Debug, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) family: ProtocolFamily,
    pub(crate) ready: bool,
    pub(crate) zones: Vec<ZoneSnapshot>,
}

/// Executes the `status` command.
#[instrument(
    skip(settings, out, terminal_client),
    level = "info",
    fields(wait = ?args.wait, ?output_format)
)]
pub(crate) async fn run<W>(
    settings: &BridgeSettings,
    args: &StatusArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let mut runtime = app::start_bridge(settings)?;
    if let Err(error) = app::await_link(&mut runtime, settings.connect_timeout()).await {
        runtime.shutdown().await;
        return Err(error);
    }

    let progress = ReportProgress::new(
        output_format == OutputFormat::Pretty && terminal_client.stderr_is_terminal(),
    );
    let ready = progress.wait_ready(&runtime, args.wait).await;
    let report = StatusReport {
        family: runtime.engine().family(),
        ready,
        zones: runtime.engine().snapshots(),
    };
    runtime.shutdown().await;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", StatusView::new(&report, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &report)?,
    }

    Ok(())
}
