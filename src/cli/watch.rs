use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_with::SerializeDisplay;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{instrument, warn};

use crate::app;
use crate::cli::command::parse_duration;
use crate::cli::{BridgeSettings, OutputFormat};
use crate::engine::{BridgeRuntime, ZoneChange};
use crate::terminal::TerminalClient;

use super::ui::{Painter, ReadinessView, WatchChangeView, WatchSummaryView};

/// Arguments for the `watch` command.
#[derive(Debug, Default, Args)]
pub struct WatchArgs {
    /// Stop after this many zone changes. If omitted, watch until Ctrl+C.
    #[arg(long)]
    max_changes: Option<usize>,
    /// Stop after this long (e.g. `30s`).
    #[arg(long = "for", value_parser = parse_duration)]
    duration: Option<Duration>,
}

impl WatchArgs {
    /// Creates watch arguments with optional change and time limits.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use zonelink::WatchArgs;
    ///
    /// let args = WatchArgs::new(Some(10), Some(Duration::from_secs(5)));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(max_changes: Option<usize>, duration: Option<Duration>) -> Self {
        Self {
            max_changes,
            duration,
        }
    }
}

/// Why a watch session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum WatchStopReason {
    #[display("reached limit of {_0} change(s)")]
    ReachedLimit(usize),
    #[display("time limit elapsed")]
    Elapsed,
    #[display("interrupted")]
    Interrupted,
    #[display("change stream closed")]
    ChangeStreamClosed,
}

/// Outcome of one watch session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct WatchSummary {
    received_changes: usize,
    stop_reason: WatchStopReason,
}

impl WatchSummary {
    #[must_use]
    pub fn new(received_changes: usize, stop_reason: WatchStopReason) -> Self {
        Self {
            received_changes,
            stop_reason,
        }
    }

    #[must_use]
    pub fn received_changes(&self) -> usize {
        self.received_changes
    }

    #[must_use]
    pub fn stop_reason(&self) -> WatchStopReason {
        self.stop_reason
    }
}

/// One line of `watch` JSON output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Change {
        #[serde(flatten)]
        change: &'a ZoneChange,
        at_unix_ms: i128,
    },
    Readiness {
        ready: bool,
    },
    Summary {
        #[serde(flatten)]
        summary: &'a WatchSummary,
    },
}

enum Next {
    Change(ZoneChange),
    Readiness(bool),
    Stop(WatchStopReason),
}

/// Executes the `watch` command.
#[instrument(skip(settings, out, terminal_client), level = "info", fields(?args, ?output_format))]
pub(crate) async fn run<W>(
    settings: &BridgeSettings,
    args: &WatchArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let mut runtime = app::start_bridge(settings)?;
    let mut changes = runtime.engine().subscribe();
    let mut readiness = runtime.engine().readiness();
    if let Err(error) = app::await_link(&mut runtime, settings.connect_timeout()).await {
        runtime.shutdown().await;
        return Err(error);
    }

    let deadline = args
        .duration
        .map(|duration| tokio::time::Instant::now() + duration);
    let mut received = 0_usize;
    let mut write_result = Ok(());

    let stop_reason = loop {
        if args.max_changes.is_some_and(|limit| received >= limit) {
            break WatchStopReason::ReachedLimit(received);
        }
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => Next::Stop(WatchStopReason::Interrupted),
            () = sleep_until(deadline) => Next::Stop(WatchStopReason::Elapsed),
            changed = readiness.changed() => match changed {
                Ok(()) => Next::Readiness(*readiness.borrow_and_update()),
                Err(_closed) => Next::Stop(WatchStopReason::ChangeStreamClosed),
            },
            change = changes.recv() => match change {
                Ok(change) => Next::Change(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch fell behind; some changes were not printed");
                    continue;
                }
                Err(RecvError::Closed) => Next::Stop(WatchStopReason::ChangeStreamClosed),
            },
        };

        write_result = match next {
            Next::Change(change) => {
                received += 1;
                write_change(out, &change, received, &runtime, &painter, output_format)
            }
            Next::Readiness(ready) => write_readiness(out, ready, &painter, output_format),
            Next::Stop(reason) => break reason,
        };
        if write_result.is_err() {
            break WatchStopReason::Interrupted;
        }
    };

    runtime.shutdown().await;
    write_result?;

    let summary = WatchSummary::new(received, stop_reason);
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", WatchSummaryView::new(&summary, &painter))?;
        }
        OutputFormat::Json => write_event(
            out,
            &WatchEvent::Summary {
                summary: &summary,
            },
        )?,
    }

    Ok(())
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn write_change<W>(
    out: &mut W,
    change: &ZoneChange,
    index: usize,
    runtime: &BridgeRuntime,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => {
            let name = runtime.engine().store().name(change.zone);
            writeln!(
                out,
                "{}",
                WatchChangeView::new(index, change, name.as_deref(), painter)
            )?;
        }
        OutputFormat::Json => write_event(
            out,
            &WatchEvent::Change {
                change,
                at_unix_ms: OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000,
            },
        )?,
    }
    Ok(())
}

fn write_readiness<W>(
    out: &mut W,
    ready: bool,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", ReadinessView::new(ready, painter))?,
        OutputFormat::Json => write_event(out, &WatchEvent::Readiness { ready })?,
    }
    Ok(())
}

fn write_event(out: &mut impl io::Write, event: &WatchEvent<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, event)?;
    writeln!(out)?;
    Ok(())
}
