use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use crate::cli::control::{ControlArgs, write_json_line};
use crate::cli::{BridgeSettings, OutputFormat};
use crate::codec::scale_for;
use crate::decode::{DecodedFrame, FrameDecodeError, FrameDecoder};
use crate::engine::ZoneEngine;
use crate::link::RecordingTransport;
use crate::protocol::{Attribute, ProtocolFamily};
use crate::terminal::TerminalClient;

use super::ui::{DecodedFrameView, EncodedFramesView, Painter};

/// Arguments for the `decode` command.
#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Inbound frames exactly as received, without the line terminator.
    #[arg(required = true, num_args = 1..)]
    frames: Vec<String>,
}

impl DecodeArgs {
    /// Creates decode arguments for the given frames.
    ///
    /// ```
    /// use zonelink::DecodeArgs;
    ///
    /// let args = DecodeArgs::new(["#1ZS PR1+", "!1PR1+"]);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(frames: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }
}

/// JSON report for one frame passed to `decode`.
#[derive(Debug, Serialize)]
pub(crate) struct DecodeReport {
    frame: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    touched: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    updates: Vec<UpdateReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One decoded attribute in both native and external units.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub(crate) struct UpdateReport {
    pub(crate) zone: u16,
    pub(crate) attribute: Attribute,
    pub(crate) native: u8,
    pub(crate) value: u8,
}

impl DecodeReport {
    pub(crate) fn new(
        family: ProtocolFamily,
        frame: &str,
        result: &Result<DecodedFrame, FrameDecodeError>,
    ) -> Self {
        match result {
            Ok(decoded) => Self {
                frame: frame.to_string(),
                kind: Some(decoded.kind.to_string()),
                touched: decoded.touched.clone(),
                updates: update_reports(family, decoded),
                error: None,
            },
            Err(error) => Self {
                frame: frame.to_string(),
                kind: None,
                touched: Vec::new(),
                updates: Vec::new(),
                error: Some(error.to_string()),
            },
        }
    }
}

pub(crate) fn update_reports(family: ProtocolFamily, decoded: &DecodedFrame) -> Vec<UpdateReport> {
    decoded
        .updates
        .iter()
        .map(|update| UpdateReport {
            zone: update.zone,
            attribute: update.attribute,
            native: update.native,
            value: scale_for(family, update.attribute)
                .map_or(update.native, |scale| scale.to_external(update.native)),
        })
        .collect()
}

/// Executes the `decode` command. Undecodable frames are reported, not fatal.
#[instrument(
    skip(settings, args, out, terminal_client),
    level = "info",
    fields(frames = args.frames.len())
)]
pub(crate) fn run_decode<W>(
    settings: &BridgeSettings,
    args: &DecodeArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let family = settings.engine().family();
    let decoder = FrameDecoder::new(family).with_cal_mode(settings.engine().cal_mode());

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            for (index, frame) in args.frames.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                let result = decoder.decode(frame);
                writeln!(
                    out,
                    "{}",
                    DecodedFrameView::new(family, frame, &result, &painter)
                )?;
            }
        }
        OutputFormat::Json => {
            let reports: Vec<DecodeReport> = args
                .frames
                .iter()
                .map(|frame| DecodeReport::new(family, frame, &decoder.decode(frame)))
                .collect();
            write_json_line(out, &reports)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct EncodeReport<'a> {
    family: ProtocolFamily,
    frames: &'a [String],
}

/// Executes the `encode` command by running the action against an engine
/// whose transport only records frames.
#[instrument(
    skip(settings, args, out, terminal_client),
    level = "info",
    fields(action = ?args.action())
)]
pub(crate) async fn run_encode<W>(
    settings: &BridgeSettings,
    args: &ControlArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let transport = Arc::new(RecordingTransport::new());
    let engine = ZoneEngine::new(settings.engine(), transport.clone())?;
    args.action().apply(&engine).await?;
    let frames = transport.take();

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", EncodedFramesView::new(&frames, &painter))?;
        }
        OutputFormat::Json => write_json_line(
            out,
            &EncodeReport {
                family: engine.family(),
                frames: &frames,
            },
        )?,
    }

    Ok(())
}
