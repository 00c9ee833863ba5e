use tracing::trace;

use super::command::{AudioCommand, OutboundFrame, validate_zone};
use super::scale::Scale;
use crate::error::EncodeError;
use crate::protocol::{ProtocolFamily, ZoneRange};

/// Two-letter attribute codes shared by commands and status reports.
pub(crate) const CODE_POWER: &str = "PR";
pub(crate) const CODE_MUTE: &str = "MU";
pub(crate) const CODE_VOLUME: &str = "VO";
pub(crate) const CODE_BASS: &str = "BS";
pub(crate) const CODE_TREBLE: &str = "TR";
pub(crate) const CODE_BALANCE: &str = "BA";
pub(crate) const CODE_SOURCE: &str = "SS";

pub(crate) fn encode(
    command: AudioCommand,
    zones: ZoneRange,
) -> Result<OutboundFrame, EncodeError> {
    let (zone, code, value) = match command {
        AudioCommand::Power { zone, on } => (zone, CODE_POWER, u8::from(on)),
        AudioCommand::Mute { zone, on } => (zone, CODE_MUTE, u8::from(on)),
        AudioCommand::Volume { zone, level } => {
            (zone, CODE_VOLUME, Scale::AUDIO_VOLUME.to_native_clamped(level))
        }
        AudioCommand::Bass { zone, value } => (zone, CODE_BASS, Scale::AUDIO_TONE.to_native(value)),
        AudioCommand::Treble { zone, value } => {
            (zone, CODE_TREBLE, Scale::AUDIO_TONE.to_native(value))
        }
        AudioCommand::Balance { zone, value } => {
            (zone, CODE_BALANCE, Scale::AUDIO_BALANCE.to_native(value))
        }
        AudioCommand::Source { zone, source } => {
            let zone = validate_zone(zone, zones)?;
            let max = ProtocolFamily::Audio.metadata().max_sources();
            if !(1..=max).contains(&source) {
                return Err(EncodeError::InvalidSource { input: source, max });
            }
            return Ok(render(zone, CODE_SOURCE, source));
        }
        AudioCommand::Query { zone } => return Ok(query(validate_zone(zone, zones)?)),
    };
    let zone = validate_zone(zone, zones)?;
    Ok(render(zone, code, value))
}

/// Builds the full status request for one zone.
pub(crate) fn query(zone: u16) -> OutboundFrame {
    let terminator = ProtocolFamily::Audio.metadata().terminator();
    OutboundFrame::new(format!("?{zone}ZS+"), terminator)
}

fn render(zone: u16, code: &str, value: u8) -> OutboundFrame {
    let terminator = ProtocolFamily::Audio.metadata().terminator();
    let frame = OutboundFrame::new(format!("!{zone}{code}{value}+"), terminator);
    trace!(frame = %frame, "encoded audio frame");
    frame
}
