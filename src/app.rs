use std::io;
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::{info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{BridgeSettings, Command, LogLevel, OutputFormat};
use crate::engine::BridgeRuntime;
use crate::error::CliConfigError;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Starts a bridge on the link selected in `settings`.
///
/// The returned runtime is already connecting in the background; subscribe
/// to its engine before calling [`await_link`] to see the first reports.
///
/// # Errors
///
/// Returns an error when no link is selected or the engine configuration is
/// inconsistent.
pub fn start_bridge(settings: &BridgeSettings) -> Result<BridgeRuntime> {
    let connector = settings.require_link()?.into_connector();
    info!(link = %connector.describe(), "starting bridge");
    let runtime = BridgeRuntime::start(
        settings.engine(),
        connector,
        settings.link_config().clone(),
    )?;
    Ok(runtime)
}

/// Waits for the bridge link to come up, showing progress on interactive
/// terminals.
///
/// # Errors
///
/// Returns an error when the link is not up within `limit`.
#[instrument(skip(runtime), level = "info", fields(progress = true, ?limit))]
pub async fn await_link(runtime: &mut BridgeRuntime, limit: Duration) -> Result<()> {
    let span = tracing::Span::current();
    span.pb_set_message("Connecting to the controller");
    if runtime.wait_connected(limit).await {
        span.pb_set_finish_message(&format!("{} Connected", "✓".green()));
        Ok(())
    } else {
        span.pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
        Err(CliConfigError::LinkTimeout { timeout: limit }.into())
    }
}

/// Runs the CLI command against the system terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = zonelink::Args::try_parse_from([
///     "zonelink",
///     "--family",
///     "audio",
///     "encode",
///     "power",
///     "3",
///     "on",
/// ])?;
/// let (command, settings) = args.into_command_and_settings()?;
/// let mut out = Vec::new();
/// zonelink::run(command, &settings, &mut out, zonelink::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link or engine
/// reports an error, or output writing fails.
pub async fn run<W>(
    command: Command,
    settings: &BridgeSettings,
    out: &mut W,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, settings, out, None, output_format).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link or engine
/// reports an error, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    settings: &BridgeSettings,
    out: &mut W,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        settings,
        out,
        &SystemTerminalClient,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link or engine
/// reports an error, or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    settings: &BridgeSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(command, settings, out, terminal_client, None, output_format)
        .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl zonelink::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = zonelink::Args::try_parse_from([
///     "zonelink",
///     "--log-level",
///     "debug",
///     "--family",
///     "audio",
///     "--zones",
///     "2",
///     "--fake",
///     "--fake-frames",
///     "#1ZS PR1+;#2ZS PR0+",
///     "status",
///     "--wait",
///     "2s",
/// ])?;
/// let log_level = args.log_level();
/// let (command, settings) = args.into_command_and_settings()?;
/// let mut out = Vec::new();
/// zonelink::run_with_clients_and_log_level(
///     command,
///     &settings,
///     &mut out,
///     &FakeTerminal,
///     log_level,
///     zonelink::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link or engine
/// reports an error, or output writing fails.
#[instrument(
    skip(settings, out, terminal_client),
    level = "info",
    fields(command = command.name(), family = %settings.engine().family(), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    settings: &BridgeSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "zonelink",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Watch(args) => {
            crate::cli::watch::run(settings, &args, out, terminal_client, output_format).await
        }
        Command::Status(args) => {
            crate::cli::status::run(settings, &args, out, terminal_client, output_format).await
        }
        Command::Control(args) => {
            crate::cli::control::run(settings, &args, out, terminal_client, output_format).await
        }
        Command::Encode(args) => {
            crate::cli::offline::run_encode(settings, &args, out, terminal_client, output_format)
                .await
        }
        Command::Decode(args) => {
            crate::cli::offline::run_decode(settings, &args, out, terminal_client, output_format)
        }
    }
}
