use std::ops::RangeInclusive;

use tracing::{debug, warn};

use super::{DecodedFrame, FrameDecodeError, FrameKind, ZoneUpdate};
use crate::codec::is_balanced;
use crate::codec::lighting::{
    APPLICATION_LIGHTING, HEADER_POINT_TO_MULTIPOINT, OPCODE_OFF, OPCODE_ON,
};
use crate::protocol::Attribute;

const LEVEL_STATUS: RangeInclusive<u8> = 0xE0..=0xF9;
const CAL_STATUS: RangeInclusive<u8> = 0xC0..=0xD8;
const LEVEL_HEADER_LEN: usize = 3;
const CAL_HEADER_LEN: usize = 2;
const MULTIPOINT_HEADER_LEN: usize = 4;
const MULTIPOINT_GROUP_LEN: usize = 3;
const NATIVE_FULL: u8 = u8::MAX;

/// How on/off pairs in a packed status block are interpreted.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Default, strum_macros::EnumString, strum_macros::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum CalStateMode {
    /// `01` on, `10` off, `11` error, `00` group absent.
    #[default]
    Distinct,
    /// `01` on, every other pair off.
    Collapsed,
}

pub(super) fn decode(
    frame: &str,
    cal_mode: CalStateMode,
) -> Result<DecodedFrame, FrameDecodeError> {
    if frame.starts_with('!') {
        return Ok(DecodedFrame::empty(FrameKind::DeviceError));
    }
    let hex_text = frame.strip_prefix('\\').unwrap_or(frame);
    let bytes = hex::decode(hex_text).map_err(|_error| FrameDecodeError::InvalidHex {
        frame: frame.to_string(),
    })?;
    if !is_balanced(&bytes) {
        return Err(FrameDecodeError::ChecksumMismatch {
            frame: frame.to_string(),
        });
    }

    // Checksum byte excluded from here on.
    let body = &bytes[..bytes.len() - 1];
    let Some(&leader) = body.first() else {
        return Err(FrameDecodeError::Empty);
    };
    match leader {
        byte if LEVEL_STATUS.contains(&byte) => decode_level_status(body),
        byte if CAL_STATUS.contains(&byte) => decode_cal_status(body, cal_mode),
        HEADER_POINT_TO_MULTIPOINT => decode_point_to_multipoint(body),
        byte => Err(FrameDecodeError::UnknownLeader { byte }),
    }
}

/// Decodes one two-byte level pair into a native `0..=255` level.
///
/// Each nibble carries two bits redundantly; `5`, `6`, `9` and `A` encode
/// 3, 2, 1 and 0. The low nibble of the second byte is least significant.
///
/// ```
/// use zonelink::level_from_pair;
///
/// assert_eq!(Ok(255), level_from_pair(0x55, 0x55));
/// assert_eq!(Ok(128), level_from_pair(0x6A, 0xAA));
/// assert!(level_from_pair(0x00, 0xAA).is_err());
/// ```
///
/// # Errors
///
/// Returns [`FrameDecodeError::IllegalNibble`] when any nibble is not one of
/// the four legal codes.
pub fn level_from_pair(high: u8, low: u8) -> Result<u8, FrameDecodeError> {
    let word = u16::from_be_bytes([high, low]);
    let mut level: u16 = 0;
    for position in 0..4u8 {
        let nibble = ((word >> (4 * position)) & 0x0F) as u8;
        let bits = match nibble {
            0x5 => 3,
            0x6 => 2,
            0x9 => 1,
            0xA => 0,
            nibble => return Err(FrameDecodeError::IllegalNibble { nibble, position }),
        };
        level += bits << (2 * position);
    }
    Ok(u8::try_from(level).unwrap_or(NATIVE_FULL))
}

fn declared_len(
    kind: FrameKind,
    body: &[u8],
    base: u8,
    header_len: usize,
) -> Result<usize, FrameDecodeError> {
    let following = usize::from(body[0] - base);
    let data_len = following.checked_sub(header_len).ok_or(FrameDecodeError::Truncated {
        kind,
        expected: header_len + 1,
        actual: following + 1,
    })?;
    let expected = 1 + header_len + data_len;
    if body.len() < expected {
        return Err(FrameDecodeError::Truncated {
            kind,
            expected,
            actual: body.len(),
        });
    }
    Ok(data_len)
}

fn decode_level_status(body: &[u8]) -> Result<DecodedFrame, FrameDecodeError> {
    let kind = FrameKind::LevelStatus;
    let data_len = declared_len(kind, body, *LEVEL_STATUS.start(), LEVEL_HEADER_LEN)?;
    let start = u16::from(body[LEVEL_HEADER_LEN]);
    let data = &body[LEVEL_HEADER_LEN + 1..LEVEL_HEADER_LEN + 1 + data_len];

    let mut updates = Vec::with_capacity(data.len());
    for (offset, pair) in (0u16..).zip(data.chunks_exact(2)) {
        let zone = start + offset;
        match level_from_pair(pair[0], pair[1]) {
            Ok(native) => {
                updates.push(ZoneUpdate::new(zone, Attribute::Level, native));
                updates.push(ZoneUpdate::new(zone, Attribute::Power, u8::from(native > 0)));
            }
            Err(error) => warn!(zone, %error, "skipping zone with illegal level encoding"),
        }
    }
    Ok(DecodedFrame::with_updates(kind, updates))
}

fn decode_cal_status(body: &[u8], mode: CalStateMode) -> Result<DecodedFrame, FrameDecodeError> {
    let kind = FrameKind::CalStatus;
    let data_len = declared_len(kind, body, *CAL_STATUS.start(), CAL_HEADER_LEN)?;
    let application = body[1];
    if application != APPLICATION_LIGHTING {
        debug!(application, "ignoring status for another application");
        return Ok(DecodedFrame::empty(kind));
    }
    let start = u16::from(body[CAL_HEADER_LEN]);
    let data = &body[CAL_HEADER_LEN + 1..CAL_HEADER_LEN + 1 + data_len];

    let mut updates = Vec::with_capacity(data.len() * 4);
    for (index, byte) in (0u16..).zip(data) {
        for pair in 0..4u16 {
            let zone = start + index * 4 + pair;
            let bits = (byte >> (2 * pair)) & 0b11;
            let on = match (mode, bits) {
                (_, 0b01) => true,
                (CalStateMode::Collapsed, _) | (CalStateMode::Distinct, 0b10) => false,
                (CalStateMode::Distinct, 0b11) => {
                    warn!(zone, "group reports an error state");
                    continue;
                }
                (CalStateMode::Distinct, _) => continue,
            };
            updates.push(ZoneUpdate::new(zone, Attribute::Power, u8::from(on)));
        }
    }
    Ok(DecodedFrame::with_updates(kind, updates))
}

fn decode_point_to_multipoint(body: &[u8]) -> Result<DecodedFrame, FrameDecodeError> {
    let kind = FrameKind::PointToMultipoint;
    if body.len() < MULTIPOINT_HEADER_LEN {
        return Err(FrameDecodeError::Truncated {
            kind,
            expected: MULTIPOINT_HEADER_LEN,
            actual: body.len(),
        });
    }
    let application = body[2];
    if application != APPLICATION_LIGHTING {
        debug!(application, "ignoring command for another application");
        return Ok(DecodedFrame::empty(kind));
    }

    let payload = &body[MULTIPOINT_HEADER_LEN..];
    let groups = payload.chunks_exact(MULTIPOINT_GROUP_LEN);
    if !groups.remainder().is_empty() {
        debug!(trailing = groups.remainder().len(), "ignoring partial command group");
    }
    let mut updates = Vec::new();
    for group in groups {
        let (command, zone, value) = (group[0], u16::from(group[1]), group[2]);
        match command {
            OPCODE_ON => {
                updates.push(ZoneUpdate::new(zone, Attribute::Level, NATIVE_FULL));
                updates.push(ZoneUpdate::new(zone, Attribute::Power, 1));
            }
            OPCODE_OFF => {
                updates.push(ZoneUpdate::new(zone, Attribute::Level, 0));
                updates.push(ZoneUpdate::new(zone, Attribute::Power, 0));
            }
            _ => updates.push(ZoneUpdate::new(zone, Attribute::Level, value)),
        }
    }
    Ok(DecodedFrame::with_updates(kind, updates))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::codec::{Scale, checksum};

    fn frame(bytes: &[u8]) -> String {
        let mut bytes = bytes.to_vec();
        bytes.push(checksum(&bytes));
        hex::encode_upper(bytes)
    }

    fn decode_default(bytes: &[u8]) -> DecodedFrame {
        decode(&frame(bytes), CalStateMode::Distinct).expect("frame should decode")
    }

    fn power_of(decoded: &DecodedFrame, zone: u16) -> Option<u8> {
        decoded
            .updates
            .iter()
            .find(|update| update.zone == zone && update.attribute == Attribute::Power)
            .map(|update| update.native)
    }

    fn level_pair(native: u8) -> [u8; 2] {
        let code = |bits: u8| [0xA, 0x9, 0x6, 0x5][usize::from(bits & 0b11)];
        let nibbles: Vec<u8> = (0..4)
            .rev()
            .map(|position| code(native >> (2 * position)))
            .collect();
        [nibbles[0] << 4 | nibbles[1], nibbles[2] << 4 | nibbles[3]]
    }

    #[rstest]
    #[case(0x5, 3)]
    #[case(0x6, 2)]
    #[case(0x9, 1)]
    #[case(0xA, 0)]
    fn nibble_codes_carry_weight_at_every_position(#[case] nibble: u8, #[case] bits: u16) {
        for position in 0..4u16 {
            let mut word: u16 = 0xAAAA;
            word &= !(0xF << (4 * position));
            word |= u16::from(nibble) << (4 * position);
            let [high, low] = word.to_be_bytes();
            let expected = bits * 4u16.pow(u32::from(position));
            assert_eq!(
                Ok(u8::try_from(expected).expect("weights fit a byte")),
                level_from_pair(high, low)
            );
        }
    }

    #[rstest]
    #[case(0x0)]
    #[case(0x3)]
    #[case(0xF)]
    fn illegal_nibbles_are_rejected(#[case] nibble: u8) {
        assert_matches!(
            level_from_pair(0xAA, 0xA0 | nibble),
            Err(FrameDecodeError::IllegalNibble { position: 0, .. })
        );
        assert_matches!(
            level_from_pair(nibble << 4 | 0x0A, 0xAA),
            Err(FrameDecodeError::IllegalNibble { position: 3, .. })
        );
    }

    #[test]
    fn level_status_reports_each_zone() {
        let decoded = decode_default(&[0xE7, 0x07, 0x38, 0x10, 0x55, 0x55, 0xAA, 0xAA]);
        assert_eq!(FrameKind::LevelStatus, decoded.kind);
        assert_eq!(vec![0x10, 0x11], decoded.touched);
        assert_eq!(
            vec![
                ZoneUpdate::new(0x10, Attribute::Level, 255),
                ZoneUpdate::new(0x10, Attribute::Power, 1),
                ZoneUpdate::new(0x11, Attribute::Level, 0),
                ZoneUpdate::new(0x11, Attribute::Power, 0),
            ],
            decoded.updates
        );
    }

    #[test]
    fn level_status_skips_only_the_illegal_zone() {
        let decoded = decode_default(&[0xE7, 0x07, 0x38, 0x00, 0x00, 0x00, 0x6A, 0xAA]);
        assert_eq!(vec![1], decoded.touched);
        assert_eq!(Some(1), power_of(&decoded, 1));
    }

    #[test]
    fn level_status_rejects_truncated_block() {
        let result = decode(&frame(&[0xE9, 0x07, 0x38, 0x00, 0x55, 0x55]), CalStateMode::Distinct);
        assert_matches!(
            result,
            Err(FrameDecodeError::Truncated {
                kind: FrameKind::LevelStatus,
                ..
            })
        );
    }

    #[test]
    fn level_round_trips_through_status_frame() {
        for external in 0..=100 {
            let native = Scale::LIGHTING_LEVEL.to_native_clamped(external);
            let [high, low] = level_pair(native);
            let decoded = decode_default(&[0xE5, 0x07, 0x38, 0x25, high, low]);
            let reported = decoded.updates[0].native;
            let back = i32::from(Scale::LIGHTING_LEVEL.to_external(reported));
            assert!((back - external).abs() <= 1, "{external} came back as {back}");
        }
    }

    #[test]
    fn cal_pair_01_is_on_and_others_are_off() {
        // 0x07 = pairs 11, 01 from the least significant end, then 00, 00.
        let decoded = decode(
            &frame(&[0xC3, 0x38, 0x20, 0x07]),
            CalStateMode::Collapsed,
        )
        .expect("frame should decode");
        assert_eq!(FrameKind::CalStatus, decoded.kind);
        assert_eq!(Some(0), power_of(&decoded, 0x20));
        assert_eq!(Some(1), power_of(&decoded, 0x21));
        assert_eq!(Some(0), power_of(&decoded, 0x22));
        assert_eq!(Some(0), power_of(&decoded, 0x23));
    }

    #[test]
    fn cal_distinct_mode_keeps_error_and_absent_groups_out() {
        // Pairs from the least significant end: 01 on, 10 off, 11 error, 00 absent.
        let decoded = decode_default(&[0xC3, 0x38, 0x00, 0b0011_1001]);
        assert_eq!(
            vec![
                ZoneUpdate::new(0, Attribute::Power, 1),
                ZoneUpdate::new(1, Attribute::Power, 0),
            ],
            decoded.updates
        );
    }

    #[test]
    fn cal_status_for_other_applications_is_ignored() {
        let decoded = decode_default(&[0xC3, 0x30, 0x00, 0x55]);
        assert!(decoded.updates.is_empty());
    }

    #[test]
    fn point_to_multipoint_forces_switch_levels() {
        let decoded = decode_default(&[
            0x05, 0x12, 0x38, 0x00, 0x79, 0x25, 0x00, 0x01, 0x26, 0x00, 0x0A, 0x27, 0x80,
        ]);
        assert_eq!(FrameKind::PointToMultipoint, decoded.kind);
        assert_eq!(
            vec![
                ZoneUpdate::new(0x25, Attribute::Level, 255),
                ZoneUpdate::new(0x25, Attribute::Power, 1),
                ZoneUpdate::new(0x26, Attribute::Level, 0),
                ZoneUpdate::new(0x26, Attribute::Power, 0),
                ZoneUpdate::new(0x27, Attribute::Level, 0x80),
            ],
            decoded.updates
        );
    }

    #[test]
    fn point_to_multipoint_for_other_applications_is_ignored() {
        let decoded = decode_default(&[0x05, 0x12, 0x30, 0x00, 0x79, 0x25, 0x00]);
        assert!(decoded.updates.is_empty());
    }

    #[test]
    fn leading_backslash_is_optional() {
        let text = format!("\\{}", frame(&[0x05, 0x12, 0x38, 0x00, 0x01, 0x03, 0x00]));
        let decoded = decode(&text, CalStateMode::Distinct).expect("frame should decode");
        assert_eq!(Some(0), power_of(&decoded, 3));
    }

    #[rstest]
    #[case::not_hex("G0", FrameDecodeError::InvalidHex { frame: "G0".into() })]
    #[case::bad_checksum("053800", FrameDecodeError::ChecksumMismatch { frame: "053800".into() })]
    fn malformed_frames_are_rejected(#[case] text: &str, #[case] expected: FrameDecodeError) {
        assert_eq!(Err(expected), decode(text, CalStateMode::Distinct));
    }

    #[test]
    fn unknown_leader_is_rejected() {
        assert_matches!(
            decode(&frame(&[0x86, 0x00]), CalStateMode::Distinct),
            Err(FrameDecodeError::UnknownLeader { byte: 0x86 })
        );
    }

    #[test]
    fn bang_lines_are_device_errors() {
        let decoded = decode("!", CalStateMode::Distinct).expect("error line should classify");
        assert_eq!(FrameKind::DeviceError, decoded.kind);
    }
}
