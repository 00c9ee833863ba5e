use std::io;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::instrument;

use crate::app;
use crate::cli::{BridgeSettings, OutputFormat};
use crate::codec::RampRate;
use crate::engine::ZoneEngine;
use crate::error::BridgeError;
use crate::terminal::TerminalClient;

use super::ui::Painter;

/// JSON result emitted by a `control` action.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    Power {
        zone: i32,
        state: SwitchState,
    },
    Level {
        zone: i32,
        level: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        ramp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ramp_seconds: Option<u64>,
    },
    StopRamp {
        zone: i32,
    },
    Mute {
        zone: i32,
        state: SwitchState,
    },
    Source {
        zone: i32,
        source: u8,
    },
    Bass {
        zone: i32,
        value: i32,
    },
    Treble {
        zone: i32,
        value: i32,
    },
    Balance {
        zone: i32,
        value: i32,
    },
    AllOn {
        zones: u16,
    },
    AllOff {
        zones: u16,
    },
    AllMute {
        zones: u16,
        state: SwitchState,
    },
    Raw {
        frame: String,
    },
}

/// Arguments for the `control` and `encode` commands.
#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(subcommand)]
    action: ControlAction,
}

impl ControlArgs {
    /// Creates control arguments for one action.
    ///
    /// ```
    /// use zonelink::{ControlAction, ControlArgs, SwitchState};
    ///
    /// let args = ControlArgs::new(ControlAction::Power { zone: 3, state: SwitchState::On });
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(action: ControlAction) -> Self {
        Self { action }
    }

    #[must_use]
    pub fn action(&self) -> &ControlAction {
        &self.action
    }
}

/// Action performed by the `control` and `encode` commands.
///
/// Zone numbers are wire numbers: lighting groups start at 0, audio zones
/// at 1. Levels use the `0..=100` scale.
#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum ControlAction {
    /// Switch one zone on or off.
    Power {
        zone: i32,
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Set brightness (lighting) or volume (audio).
    #[command(visible_alias = "volume")]
    Level {
        zone: i32,
        #[arg(allow_negative_numbers = true)]
        level: i32,
        /// Lighting ramp duration, e.g. `4 sec` or `1.5 min`.
        #[arg(long)]
        ramp: Option<RampRate>,
    },
    /// Stop a running lighting ramp.
    StopRamp { zone: i32 },
    /// Mute or unmute one audio zone.
    Mute {
        zone: i32,
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Route an input to one audio zone.
    Source { zone: i32, source: u8 },
    /// Set bass (`0..=100`).
    Bass {
        zone: i32,
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Set treble (`0..=100`).
    Treble {
        zone: i32,
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Set balance (`0..=100`).
    Balance {
        zone: i32,
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Switch every configured zone on.
    AllOn,
    /// Switch every configured zone off.
    AllOff,
    /// Mute or unmute every configured audio zone.
    AllMute {
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Send a raw frame; the terminator is appended when missing.
    Raw { frame: String },
}

impl ControlAction {
    /// Performs the action against an engine.
    ///
    /// # Errors
    ///
    /// Returns the engine's encode or transport error.
    pub(crate) async fn apply(&self, engine: &ZoneEngine) -> Result<(), BridgeError> {
        match self {
            Self::Power { zone, state } => engine.set_power(*zone, state.is_on()).await,
            Self::Level {
                zone,
                level,
                ramp: Some(rate),
            } => engine.ramp(*zone, *level, *rate).await,
            Self::Level {
                zone,
                level,
                ramp: None,
            } => engine.set_level(*zone, *level).await,
            Self::StopRamp { zone } => engine.stop_ramp(*zone).await,
            Self::Mute { zone, state } => engine.set_mute(*zone, state.is_on()).await,
            Self::Source { zone, source } => engine.set_source(*zone, *source).await,
            Self::Bass { zone, value } => engine.set_bass(*zone, *value).await,
            Self::Treble { zone, value } => engine.set_treble(*zone, *value).await,
            Self::Balance { zone, value } => engine.set_balance(*zone, *value).await,
            Self::AllOn => engine.all_on().await,
            Self::AllOff => engine.all_off().await,
            Self::AllMute { state } => engine.all_mute(state.is_on()).await,
            Self::Raw { frame } => engine.raw(frame).await,
        }
    }

    fn result(&self, zones: u16) -> ControlResult {
        match self.clone() {
            Self::Power { zone, state } => ControlResult::Power { zone, state },
            Self::Level { zone, level, ramp } => ControlResult::Level {
                zone,
                level,
                ramp: ramp.map(|rate| rate.to_string()),
                ramp_seconds: ramp
                    .and_then(RampRate::duration)
                    .map(|duration| duration.as_secs()),
            },
            Self::StopRamp { zone } => ControlResult::StopRamp { zone },
            Self::Mute { zone, state } => ControlResult::Mute { zone, state },
            Self::Source { zone, source } => ControlResult::Source { zone, source },
            Self::Bass { zone, value } => ControlResult::Bass { zone, value },
            Self::Treble { zone, value } => ControlResult::Treble { zone, value },
            Self::Balance { zone, value } => ControlResult::Balance { zone, value },
            Self::AllOn => ControlResult::AllOn { zones },
            Self::AllOff => ControlResult::AllOff { zones },
            Self::AllMute { state } => ControlResult::AllMute { zones, state },
            Self::Raw { frame } => ControlResult::Raw { frame },
        }
    }

    /// One-line description used by pretty output.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Power { zone, state } => format!("zone {zone} power {state}"),
            Self::Level {
                zone,
                level,
                ramp: Some(rate),
            } => format!("zone {zone} level {level} over {rate}"),
            Self::Level {
                zone,
                level,
                ramp: None,
            } => format!("zone {zone} level {level}"),
            Self::StopRamp { zone } => format!("zone {zone} stop ramp"),
            Self::Mute { zone, state } => format!("zone {zone} mute {state}"),
            Self::Source { zone, source } => format!("zone {zone} source {source}"),
            Self::Bass { zone, value } => format!("zone {zone} bass {value}"),
            Self::Treble { zone, value } => format!("zone {zone} treble {value}"),
            Self::Balance { zone, value } => format!("zone {zone} balance {value}"),
            Self::AllOn => "all zones power on".to_string(),
            Self::AllOff => "all zones power off".to_string(),
            Self::AllMute { state } => format!("all zones mute {state}"),
            Self::Raw { frame } => format!("raw frame {}", frame.escape_debug()),
        }
    }
}

/// Requested on/off state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    #[display("off")]
    Off,
    #[display("on")]
    On,
}

impl SwitchState {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Executes the `control` command.
#[instrument(
    skip(settings, args, out, terminal_client),
    level = "info",
    fields(action = ?args.action, ?output_format)
)]
pub(crate) async fn run<W>(
    settings: &BridgeSettings,
    args: &ControlArgs,
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

    let command_result = args.action.apply(runtime.engine()).await;
    let zones = runtime.engine().zones().count();
    runtime.shutdown().await;
    command_result?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{} {}",
                painter.success("Applied"),
                args.action.describe()
            )?;
        }
        OutputFormat::Json => write_json_line(out, &args.action.result(zones))?,
    }

    Ok(())
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use insta::assert_json_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(subcommand)]
        action: ControlAction,
    }

    fn parse(argv: &[&str]) -> ControlAction {
        let argv = std::iter::once("control").chain(argv.iter().copied());
        Harness::try_parse_from(argv)
            .expect("control arguments should parse")
            .action
    }

    #[rstest]
    #[case(&["power", "3", "on"], ControlAction::Power { zone: 3, state: SwitchState::On })]
    #[case(&["volume", "2", "40"], ControlAction::Level { zone: 2, level: 40, ramp: None })]
    #[case(
        &["level", "37", "50", "--ramp", "4 sec"],
        ControlAction::Level { zone: 37, level: 50, ramp: Some(RampRate::FourSeconds) }
    )]
    #[case(&["bass", "1", "-50"], ControlAction::Bass { zone: 1, value: -50 })]
    #[case(&["all-mute", "off"], ControlAction::AllMute { state: SwitchState::Off })]
    fn actions_parse_from_arguments(#[case] argv: &[&str], #[case] expected: ControlAction) {
        assert_eq!(expected, parse(argv));
    }

    #[test]
    fn level_result_includes_ramp_label() {
        let action = ControlAction::Level {
            zone: 37,
            level: 50,
            ramp: Some(RampRate::NinetySeconds),
        };
        assert_json_snapshot!(action.result(64), @r#"
        {
          "action": "level",
          "zone": 37,
          "level": 50,
          "ramp": "1.5 Min",
          "ramp_seconds": 90
        }
        "#);
    }

    #[test]
    fn stop_ramp_level_has_no_duration() {
        let action = ControlAction::Level {
            zone: 37,
            level: 50,
            ramp: Some(RampRate::StopRamp),
        };
        assert_json_snapshot!(action.result(64), @r#"
        {
          "action": "level",
          "zone": 37,
          "level": 50,
          "ramp": "Stop Ramp"
        }
        "#);
    }

    #[test]
    fn bulk_result_reports_zone_count() {
        let action = ControlAction::AllMute {
            state: SwitchState::On,
        };
        assert_json_snapshot!(action.result(6), @r#"
        {
          "action": "all_mute",
          "zones": 6,
          "state": "on"
        }
        "#);
    }

    #[rstest]
    #[case(ControlAction::StopRamp { zone: 4 }, "zone 4 stop ramp")]
    #[case(ControlAction::AllOff, "all zones power off")]
    #[case(ControlAction::Raw { frame: "!1PR1+\r".into() }, "raw frame !1PR1+\\r")]
    fn descriptions_name_action_and_target(#[case] action: ControlAction, #[case] expected: &str) {
        assert_eq!(expected, action.describe());
    }
}
