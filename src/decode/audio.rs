use tracing::debug;

use super::{DecodedFrame, FrameDecodeError, FrameKind, ZoneUpdate};
use crate::codec::audio::{
    CODE_BALANCE, CODE_BASS, CODE_MUTE, CODE_POWER, CODE_SOURCE, CODE_TREBLE, CODE_VOLUME,
};
use crate::protocol::Attribute;

const STATUS_TERMINATOR: char = '+';

pub(super) fn decode(frame: &str) -> Result<DecodedFrame, FrameDecodeError> {
    let mut chars = frame.chars();
    let Some(marker) = chars.next() else {
        return Err(FrameDecodeError::Empty);
    };
    match marker {
        'O' => Ok(DecodedFrame::empty(FrameKind::Acknowledgement)),
        'E' => Ok(DecodedFrame::empty(FrameKind::DeviceError)),
        '?' => Ok(DecodedFrame::empty(FrameKind::QueryEcho)),
        '#' => decode_status(frame, chars.as_str()),
        marker => Err(FrameDecodeError::UnknownMarker { marker }),
    }
}

fn decode_status(frame: &str, body: &str) -> Result<DecodedFrame, FrameDecodeError> {
    let body = body.trim_end().trim_end_matches(STATUS_TERMINATOR);
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let zone = body[..digits_end]
        .parse::<u16>()
        .map_err(|_error| FrameDecodeError::MissingZone {
            frame: frame.to_string(),
        })?;

    let rest = &body[digits_end..];
    let code = rest.get(..2).unwrap_or(rest);
    let kind = match code {
        "ZS" => FrameKind::ZoneStatus,
        "ZM" => FrameKind::ZoneMessage,
        code => {
            return Err(FrameDecodeError::UnknownMessageType {
                code: code.to_string(),
            });
        }
    };

    let updates = rest[code.len()..]
        .split_whitespace()
        .filter_map(|token| decode_token(zone, token))
        .collect();
    Ok(DecodedFrame {
        kind,
        touched: vec![zone],
        updates,
    })
}

fn decode_token(zone: u16, token: &str) -> Option<ZoneUpdate> {
    let (Some(code), Some(value)) = (token.get(..2), token.get(2..)) else {
        debug!(zone, token, "skipping short status token");
        return None;
    };
    let Some(attribute) = attribute_for(code) else {
        debug!(zone, code, "skipping unknown status attribute");
        return None;
    };
    match value.parse::<u8>() {
        Ok(native) => Some(ZoneUpdate::new(zone, attribute, native)),
        Err(error) => {
            debug!(zone, code, value, %error, "skipping unparseable status value");
            None
        }
    }
}

fn attribute_for(code: &str) -> Option<Attribute> {
    let attribute = match code {
        CODE_POWER => Attribute::Power,
        CODE_MUTE => Attribute::Mute,
        CODE_VOLUME => Attribute::Level,
        CODE_BASS => Attribute::Bass,
        CODE_TREBLE => Attribute::Treble,
        CODE_BALANCE => Attribute::Balance,
        CODE_SOURCE => Attribute::Source,
        _ => return None,
    };
    Some(attribute)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::codec::Scale;

    #[test]
    fn status_frame_reports_every_known_attribute() {
        let decoded = decode("#5ZS PR0 SS2 VO8 MU1+").expect("status frame should decode");
        assert_eq!(FrameKind::ZoneStatus, decoded.kind);
        assert_eq!(vec![5], decoded.touched);
        assert_eq!(
            vec![
                ZoneUpdate::new(5, Attribute::Power, 0),
                ZoneUpdate::new(5, Attribute::Source, 2),
                ZoneUpdate::new(5, Attribute::Level, 8),
                ZoneUpdate::new(5, Attribute::Mute, 1),
            ],
            decoded.updates
        );
        assert_eq!(21, Scale::AUDIO_VOLUME.to_external(decoded.updates[2].native));
    }

    #[test]
    fn unknown_and_malformed_tokens_are_skipped() {
        let decoded = decode("#12ZS XX4 VOloud BS7 T+").expect("status frame should decode");
        assert_eq!(vec![ZoneUpdate::new(12, Attribute::Bass, 7)], decoded.updates);
    }

    #[test]
    fn zone_reports_without_known_tokens_still_touch_the_zone() {
        let decoded = decode("#3ZM QQ1+").expect("status frame should decode");
        assert_eq!(FrameKind::ZoneMessage, decoded.kind);
        assert_eq!(vec![3], decoded.touched);
        assert!(decoded.updates.is_empty());
    }

    #[rstest]
    #[case("OK", FrameKind::Acknowledgement)]
    #[case("ERROR", FrameKind::DeviceError)]
    #[case("?5ZS+", FrameKind::QueryEcho)]
    fn non_status_frames_classify_without_updates(#[case] text: &str, #[case] kind: FrameKind) {
        assert_eq!(Ok(DecodedFrame::empty(kind)), decode(text));
    }

    #[rstest]
    #[case::no_zone("#ZS PR1+")]
    #[case::zone_overflow("#99999ZS PR1+")]
    fn status_frames_need_a_zone(#[case] text: &str) {
        assert_matches!(decode(text), Err(FrameDecodeError::MissingZone { .. }));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        assert_matches!(
            decode("#4ZX PR1+"),
            Err(FrameDecodeError::UnknownMessageType { code }) if code == "ZX"
        );
    }

    #[test]
    fn unknown_marker_is_rejected() {
        assert_matches!(
            decode("*5ZS+"),
            Err(FrameDecodeError::UnknownMarker { marker: '*' })
        );
    }
}
