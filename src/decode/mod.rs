//! Inbound frame classification and decoding.

mod audio;
mod lighting;

use thiserror::Error;
use tracing::instrument;

use crate::protocol::{Attribute, ProtocolFamily};

pub use lighting::{CalStateMode, level_from_pair};

/// Classification of one inbound frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, strum_macros::Display)]
pub enum FrameKind {
    /// Lighting nibble-pair level report.
    #[strum(to_string = "level status")]
    LevelStatus,
    /// Lighting packed on/off report.
    #[strum(to_string = "on/off status")]
    CalStatus,
    /// Lighting command observed on the bus.
    #[strum(to_string = "point-to-multipoint")]
    PointToMultipoint,
    /// Audio acknowledgement.
    #[strum(to_string = "acknowledgement")]
    Acknowledgement,
    /// Error reported by the device.
    #[strum(to_string = "device error")]
    DeviceError,
    /// Audio query echo.
    #[strum(to_string = "query echo")]
    QueryEcho,
    /// Audio zone status report.
    #[strum(to_string = "zone status")]
    ZoneStatus,
    /// Audio zone message report.
    #[strum(to_string = "zone message")]
    ZoneMessage,
}

/// One decoded attribute value in device-native units.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ZoneUpdate {
    pub zone: u16,
    pub attribute: Attribute,
    pub native: u8,
}

impl ZoneUpdate {
    pub(crate) fn new(zone: u16, attribute: Attribute, native: u8) -> Self {
        Self {
            zone,
            attribute,
            native,
        }
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DecodedFrame {
    pub kind: FrameKind,
    /// Zones that reported in this frame, even without a recognised attribute.
    pub touched: Vec<u16>,
    pub updates: Vec<ZoneUpdate>,
}

impl DecodedFrame {
    pub(crate) fn empty(kind: FrameKind) -> Self {
        Self {
            kind,
            touched: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub(crate) fn with_updates(kind: FrameKind, updates: Vec<ZoneUpdate>) -> Self {
        let mut touched: Vec<u16> = updates.iter().map(|update| update.zone).collect();
        touched.dedup();
        Self {
            kind,
            touched,
            updates,
        }
    }
}

/// Errors returned while decoding inbound frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameDecodeError {
    #[error("frame was empty")]
    Empty,
    #[error("frame `{frame}` is not valid hex")]
    InvalidHex { frame: String },
    #[error("frame `{frame}` failed its checksum")]
    ChecksumMismatch { frame: String },
    #[error("{kind} frame is truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },
    #[error("unrecognised leading byte {byte:#04X}")]
    UnknownLeader { byte: u8 },
    #[error("unrecognised leading character `{marker}`")]
    UnknownMarker { marker: char },
    #[error("status frame `{frame}` has no zone number")]
    MissingZone { frame: String },
    #[error("unrecognised status message type `{code}`")]
    UnknownMessageType { code: String },
    #[error("illegal level nibble {nibble:#X} at position {position}")]
    IllegalNibble { nibble: u8, position: u8 },
}

/// Decodes inbound frames for one protocol family.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    family: ProtocolFamily,
    cal_mode: CalStateMode,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(family: ProtocolFamily) -> Self {
        Self {
            family,
            cal_mode: CalStateMode::default(),
        }
    }

    /// Selects how lighting on/off pairs other than `01`/`10` are treated.
    #[must_use]
    pub fn with_cal_mode(mut self, cal_mode: CalStateMode) -> Self {
        self.cal_mode = cal_mode;
        self
    }

    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    /// Decodes one delimited frame into zone updates.
    ///
    /// ```
    /// use zonelink::{Attribute, FrameDecoder, ProtocolFamily};
    ///
    /// let decoded = FrameDecoder::new(ProtocolFamily::Audio).decode("#5ZS PR0 SS2 VO8 MU1+")?;
    /// assert_eq!(vec![5], decoded.touched);
    /// assert!(decoded.updates.iter().any(|u| u.attribute == Attribute::Source && u.native == 2));
    /// # Ok::<(), zonelink::FrameDecodeError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be classified or is malformed.
    /// Callers are expected to log the error and drop the frame.
    #[instrument(skip(self), level = "trace", fields(family = %self.family))]
    pub fn decode(&self, frame: &str) -> Result<DecodedFrame, FrameDecodeError> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(FrameDecodeError::Empty);
        }
        match self.family {
            ProtocolFamily::Lighting => lighting::decode(frame, self.cal_mode),
            ProtocolFamily::Audio => audio::decode(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ProtocolFamily::Lighting)]
    #[case(ProtocolFamily::Audio)]
    fn decode_rejects_blank_frames(#[case] family: ProtocolFamily) {
        assert_matches!(
            FrameDecoder::new(family).decode(" \r\n"),
            Err(FrameDecodeError::Empty)
        );
    }

    #[test]
    fn touched_zones_follow_updates() {
        let frame = DecodedFrame::with_updates(
            FrameKind::LevelStatus,
            vec![
                ZoneUpdate::new(3, Attribute::Level, 10),
                ZoneUpdate::new(3, Attribute::Power, 1),
                ZoneUpdate::new(4, Attribute::Level, 0),
            ],
        );
        assert_eq!(vec![3, 4], frame.touched);
    }
}
