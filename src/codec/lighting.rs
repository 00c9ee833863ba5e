use tracing::trace;

use super::checksum::checksum;
use super::command::{LightingCommand, OutboundFrame, validate_zone};
use super::ramp::RampRate;
use super::scale::Scale;
use crate::error::EncodeError;
use crate::protocol::{ProtocolFamily, ZoneRange};

pub(crate) const HEADER_POINT_TO_MULTIPOINT: u8 = 0x05;
pub(crate) const APPLICATION_LIGHTING: u8 = 0x38;
const RESERVED: u8 = 0x00;
pub(crate) const OPCODE_ON: u8 = 0x79;
pub(crate) const OPCODE_OFF: u8 = 0x01;
const FRAME_PREFIX: char = '\\';
const STATUS_REQUEST_HEADER: [u8; 5] = [0x05, 0xFF, 0x00, 0x73, 0x07];
pub(crate) const STATUS_BLOCK_GROUPS: u16 = 32;
const STATUS_BLOCKS: u16 = 8;
/// Interface parameters written at link-up, in order.
const INIT_PARAMETERS: [(u8, u8); 3] = [(0x21, 0x38), (0x42, 0x02), (0x30, 0x59)];

pub(crate) fn encode(
    command: LightingCommand,
    zones: ZoneRange,
) -> Result<OutboundFrame, EncodeError> {
    let frame = match command {
        LightingCommand::On { group } => {
            group_command(OPCODE_ON, validate_group(group, zones)?, None)
        }
        LightingCommand::Off { group } => {
            group_command(OPCODE_OFF, validate_group(group, zones)?, None)
        }
        LightingCommand::StopRamp { group }
        | LightingCommand::Ramp {
            group,
            rate: RampRate::StopRamp,
            ..
        } => group_command(RampRate::StopRamp.code(), validate_group(group, zones)?, None),
        LightingCommand::Ramp { group, level, rate } => {
            let group = validate_group(group, zones)?;
            let native = Scale::LIGHTING_LEVEL.to_native_clamped(level);
            group_command(rate.code(), group, Some(native))
        }
        LightingCommand::LevelQuery { base } => level_query(base),
    };
    trace!(frame = %frame, "encoded lighting frame");
    Ok(frame)
}

/// Builds the level-status request for the groups starting at `base`.
pub(crate) fn level_query(base: u8) -> OutboundFrame {
    let mut bytes = STATUS_REQUEST_HEADER.to_vec();
    bytes.extend([APPLICATION_LIGHTING, base]);
    render(bytes)
}

/// Builds one level-status request per 32-group block of the group space.
pub(crate) fn status_queries() -> Vec<OutboundFrame> {
    (0..STATUS_BLOCKS)
        .map(|block| u8::try_from(block * STATUS_BLOCK_GROUPS).unwrap_or(u8::MAX))
        .map(level_query)
        .collect()
}

/// Builds the interface configuration frames sent at link-up.
pub(crate) fn init_sequence() -> Vec<OutboundFrame> {
    let terminator = ProtocolFamily::Lighting.metadata().terminator();
    INIT_PARAMETERS
        .iter()
        .map(|(parameter, value)| {
            OutboundFrame::new(format!("@A3{parameter:02X}00{value:02X}"), terminator)
        })
        .collect()
}

fn validate_group(group: i32, zones: ZoneRange) -> Result<u8, EncodeError> {
    let group = validate_zone(group, zones)?;
    u8::try_from(group).map_err(|_error| super::command::out_of_range(i32::from(group), zones))
}

fn group_command(opcode: u8, group: u8, value: Option<u8>) -> OutboundFrame {
    let mut bytes = vec![
        HEADER_POINT_TO_MULTIPOINT,
        APPLICATION_LIGHTING,
        RESERVED,
        opcode,
        group,
    ];
    bytes.extend(value);
    render(bytes)
}

fn render(mut bytes: Vec<u8>) -> OutboundFrame {
    bytes.push(checksum(&bytes));
    let terminator = ProtocolFamily::Lighting.metadata().terminator();
    OutboundFrame::new(
        format!("{FRAME_PREFIX}{}", hex::encode_upper(&bytes)),
        terminator,
    )
}
