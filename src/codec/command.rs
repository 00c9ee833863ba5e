use std::fmt;

use tracing::instrument;

use super::ramp::RampRate;
use super::{audio, lighting};
use crate::error::EncodeError;
use crate::protocol::{ProtocolFamily, ZoneRange};

/// Lighting bus commands. Group and level values use the external scale.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LightingCommand {
    /// Switch a group fully on.
    On { group: i32 },
    /// Switch a group off.
    Off { group: i32 },
    /// Ramp a group to `level` (`0..=100`) over `rate`.
    Ramp { group: i32, level: i32, rate: RampRate },
    /// Terminate a running ramp.
    StopRamp { group: i32 },
    /// Request level status for the groups starting at `base`.
    LevelQuery { base: u8 },
}

/// Audio matrix commands. Numeric values use the external scale.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AudioCommand {
    Power { zone: i32, on: bool },
    Mute { zone: i32, on: bool },
    Volume { zone: i32, level: i32 },
    Bass { zone: i32, value: i32 },
    Treble { zone: i32, value: i32 },
    Balance { zone: i32, value: i32 },
    Source { zone: i32, source: u8 },
    /// Request a full status report for one zone.
    Query { zone: i32 },
}

/// The closed set of commands accepted by [`FrameEncoder::encode`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    Lighting(LightingCommand),
    Audio(AudioCommand),
    /// Raw passthrough text; the transport terminator is appended when missing.
    Raw(String),
}

impl Command {
    /// Short command name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lighting(LightingCommand::On { .. }) => "lighting_on",
            Self::Lighting(LightingCommand::Off { .. }) => "lighting_off",
            Self::Lighting(LightingCommand::Ramp { .. }) => "lighting_ramp",
            Self::Lighting(LightingCommand::StopRamp { .. }) => "lighting_stop_ramp",
            Self::Lighting(LightingCommand::LevelQuery { .. }) => "lighting_level_query",
            Self::Audio(AudioCommand::Power { .. }) => "audio_power",
            Self::Audio(AudioCommand::Mute { .. }) => "audio_mute",
            Self::Audio(AudioCommand::Volume { .. }) => "audio_volume",
            Self::Audio(AudioCommand::Bass { .. }) => "audio_bass",
            Self::Audio(AudioCommand::Treble { .. }) => "audio_treble",
            Self::Audio(AudioCommand::Balance { .. }) => "audio_balance",
            Self::Audio(AudioCommand::Source { .. }) => "audio_source",
            Self::Audio(AudioCommand::Query { .. }) => "audio_query",
            Self::Raw(_) => "raw",
        }
    }
}

impl From<LightingCommand> for Command {
    fn from(command: LightingCommand) -> Self {
        Self::Lighting(command)
    }
}

impl From<AudioCommand> for Command {
    fn from(command: AudioCommand) -> Self {
        Self::Audio(command)
    }
}

/// One encoded outbound frame, including its terminator.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OutboundFrame {
    text: String,
    terminator_len: usize,
}

impl OutboundFrame {
    pub(crate) fn new(body: String, terminator: &str) -> Self {
        Self {
            text: body + terminator,
            terminator_len: terminator.len(),
        }
    }

    /// Returns the frame exactly as written to the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Returns the frame text without its terminator.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.text[..self.text.len() - self.terminator_len]
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.body())
    }
}

/// Builds outbound frames for one protocol family and zone range.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    family: ProtocolFamily,
    zones: ZoneRange,
}

impl FrameEncoder {
    /// Creates an encoder validating targets against `zones`.
    #[must_use]
    pub fn new(family: ProtocolFamily, zones: ZoneRange) -> Self {
        Self { family, zones }
    }

    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    /// Encodes one command.
    ///
    /// ```
    /// use zonelink::{Command, FrameEncoder, LightingCommand, ProtocolFamily, ZoneRange};
    ///
    /// let encoder = FrameEncoder::new(ProtocolFamily::Lighting, ZoneRange::new(0, 256));
    /// let frame = encoder.encode(&Command::Lighting(LightingCommand::Off { group: 37 }))?;
    /// assert_eq!("\\05380001259D", frame.body());
    /// # Ok::<(), zonelink::EncodeError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the target zone is outside the configured range,
    /// a parameter is invalid, or the command belongs to the other family.
    #[instrument(
        skip(self),
        level = "trace",
        fields(family = %self.family, command = command.name())
    )]
    pub fn encode(&self, command: &Command) -> Result<OutboundFrame, EncodeError> {
        let terminator = self.family.metadata().terminator();
        match (self.family, command) {
            (ProtocolFamily::Lighting, Command::Lighting(command)) => {
                lighting::encode(*command, self.zones)
            }
            (ProtocolFamily::Audio, Command::Audio(command)) => audio::encode(*command, self.zones),
            (_, Command::Raw(text)) => {
                let body = text.trim_end_matches(['\r', '\n']);
                if body.is_empty() {
                    return Err(EncodeError::EmptyRawFrame);
                }
                Ok(OutboundFrame::new(body.to_string(), terminator))
            }
            (family, command) => Err(EncodeError::Unsupported {
                command: command.name(),
                family,
            }),
        }
    }

    /// Frames sent once every time the link comes up.
    #[must_use]
    pub fn init_sequence(&self) -> Vec<OutboundFrame> {
        match self.family {
            ProtocolFamily::Lighting => lighting::init_sequence(),
            ProtocolFamily::Audio => Vec::new(),
        }
    }

    /// Frames that query the state of every configured zone.
    #[must_use]
    pub fn full_query(&self) -> Vec<OutboundFrame> {
        match self.family {
            ProtocolFamily::Lighting => lighting::status_queries(),
            ProtocolFamily::Audio => self.zones.zones().map(audio::query).collect(),
        }
    }

    /// Builds the single-zone refresh query for `zone`.
    ///
    /// # Errors
    ///
    /// Returns an error when `zone` is outside the configured range.
    pub fn refresh_query(&self, zone: u16) -> Result<OutboundFrame, EncodeError> {
        let Some(zone) = self.zones.check(i32::from(zone)) else {
            return Err(out_of_range(i32::from(zone), self.zones));
        };
        let frame = match self.family {
            ProtocolFamily::Lighting => {
                lighting::level_query(u8::try_from(zone).unwrap_or(u8::MAX))
            }
            ProtocolFamily::Audio => audio::query(zone),
        };
        Ok(frame)
    }

    /// Consecutive zones, starting at the queried one, whose state a single
    /// [`Self::refresh_query`] reply reports.
    #[must_use]
    pub fn refresh_span(&self) -> u16 {
        match self.family {
            ProtocolFamily::Lighting => lighting::STATUS_BLOCK_GROUPS,
            ProtocolFamily::Audio => 1,
        }
    }
}

pub(crate) fn out_of_range(zone: i32, zones: ZoneRange) -> EncodeError {
    EncodeError::OutOfRangeTarget {
        zone,
        first: zones.first(),
        last: zones.last(),
    }
}

pub(crate) fn validate_zone(zone: i32, zones: ZoneRange) -> Result<u16, EncodeError> {
    zones.check(zone).ok_or_else(|| out_of_range(zone, zones))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lighting() -> FrameEncoder {
        FrameEncoder::new(ProtocolFamily::Lighting, ZoneRange::new(0, 64))
    }

    fn audio() -> FrameEncoder {
        FrameEncoder::new(ProtocolFamily::Audio, ZoneRange::new(1, 6))
    }

    #[rstest]
    #[case::lighting_off(lighting(), LightingCommand::Off { group: 37 }.into(), "\\05380001259D")]
    #[case::lighting_on(lighting(), LightingCommand::On { group: 37 }.into(), "\\053800792525")]
    #[case::audio_volume(audio(), AudioCommand::Volume { zone: 5, level: 21 }.into(), "!5VO8+")]
    #[case::raw(audio(), Command::Raw("!1PR1+\r".into()), "!1PR1+")]
    fn encode_dispatches_by_family(
        #[case] encoder: FrameEncoder,
        #[case] command: Command,
        #[case] expected: &str,
    ) {
        let frame = encoder.encode(&command).expect("command should encode");
        assert_eq!(expected, frame.body());
        assert!(frame.as_bytes().ends_with(b"\r"));
    }

    #[rstest]
    #[case(lighting(), AudioCommand::Query { zone: 1 }.into())]
    #[case(audio(), LightingCommand::On { group: 1 }.into())]
    fn encode_rejects_commands_of_the_other_family(
        #[case] encoder: FrameEncoder,
        #[case] command: Command,
    ) {
        assert_matches!(
            encoder.encode(&command),
            Err(EncodeError::Unsupported { .. })
        );
    }

    #[test]
    fn encode_rejects_empty_raw_frame() {
        assert_matches!(
            audio().encode(&Command::Raw("\r\n".into())),
            Err(EncodeError::EmptyRawFrame)
        );
    }

    #[test]
    fn audio_full_query_covers_configured_zones() {
        let frames: Vec<String> = audio()
            .full_query()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            vec!["?1ZS+", "?2ZS+", "?3ZS+", "?4ZS+", "?5ZS+", "?6ZS+"],
            frames
        );
    }

    #[test]
    fn lighting_full_query_covers_whole_group_space() {
        let frames = lighting().full_query();
        assert_eq!(8, frames.len());
        assert_eq!("\\05FF00730738004A", frames[0].body());
    }

    #[rstest]
    #[case(lighting(), 64)]
    #[case(audio(), 0)]
    #[case(audio(), 7)]
    fn refresh_query_rejects_unconfigured_zone(#[case] encoder: FrameEncoder, #[case] zone: u16) {
        assert_matches!(
            encoder.refresh_query(zone),
            Err(EncodeError::OutOfRangeTarget { .. })
        );
    }

    #[test]
    fn refresh_query_targets_single_zone() {
        let frame = lighting().refresh_query(37).expect("group 37 is configured");
        assert_eq!("\\05FF007307382525", frame.body());
        let frame = audio().refresh_query(3).expect("zone 3 is configured");
        assert_eq!("?3ZS+", frame.body());
    }

    #[test]
    fn lighting_refresh_reports_a_group_block() {
        assert_eq!(32, lighting().refresh_span());
        assert_eq!(1, audio().refresh_span());
    }
}
