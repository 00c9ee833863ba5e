use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Supported controller protocol families.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, EnumString, Display, SerializeDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum ProtocolFamily {
    /// Hex-framed lighting bus with 256 addressable groups.
    #[strum(to_string = "lighting")]
    Lighting,
    /// ASCII multi-zone audio matrix.
    #[strum(to_string = "audio")]
    Audio,
}

impl ProtocolFamily {
    /// Returns the static protocol metadata for this family.
    #[must_use]
    pub fn metadata(self) -> FamilyMetadata {
        family_metadata(self)
    }
}

/// Per-zone attributes mirrored by the engine.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, EnumIter, Display, SerializeDisplay,
)]
pub enum Attribute {
    #[strum(to_string = "power")]
    Power,
    #[strum(to_string = "mute")]
    Mute,
    #[strum(to_string = "level")]
    Level,
    #[strum(to_string = "source")]
    Source,
    #[strum(to_string = "bass")]
    Bass,
    #[strum(to_string = "treble")]
    Treble,
    #[strum(to_string = "balance")]
    Balance,
}

impl Attribute {
    /// Returns whether this attribute exists on the given protocol family.
    #[must_use]
    pub fn applies_to(self, family: ProtocolFamily) -> bool {
        match family {
            ProtocolFamily::Lighting => matches!(self, Self::Power | Self::Level),
            ProtocolFamily::Audio => true,
        }
    }
}

/// Static description of one protocol family.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FamilyMetadata {
    name: &'static str,
    first_zone: u16,
    max_zones: u16,
    max_sources: u8,
    terminator: &'static str,
    poll_interval: Duration,
    refresh_threshold: Duration,
    readiness_threshold: Duration,
}

impl FamilyMetadata {
    /// Human-readable family name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }

    /// Lowest addressable zone number on the wire.
    #[must_use]
    pub fn first_zone(self) -> u16 {
        self.first_zone
    }

    /// Protocol-defined maximum zone count.
    #[must_use]
    pub fn max_zones(self) -> u16 {
        self.max_zones
    }

    /// Number of routable inputs; zero when the family has no sources.
    #[must_use]
    pub fn max_sources(self) -> u8 {
        self.max_sources
    }

    /// Outbound frame terminator.
    #[must_use]
    pub fn terminator(self) -> &'static str {
        self.terminator
    }

    /// Default scheduler tick interval.
    #[must_use]
    pub fn poll_interval(self) -> Duration {
        self.poll_interval
    }

    /// Default age after which a single zone is re-queried.
    #[must_use]
    pub fn refresh_threshold(self) -> Duration {
        self.refresh_threshold
    }

    /// Default age after which a zone makes the engine not ready.
    #[must_use]
    pub fn readiness_threshold(self) -> Duration {
        self.readiness_threshold
    }
}

/// Family metadata keyed by typed family IDs.
static FAMILIES: LazyLock<HashMap<ProtocolFamily, FamilyMetadata>> = LazyLock::new(|| {
    ProtocolFamily::iter()
        .map(|family| (family, metadata_for(family)))
        .collect()
});

fn family_metadata(family: ProtocolFamily) -> FamilyMetadata {
    *FAMILIES.get(&family).unwrap_or(&metadata_for(family))
}

fn metadata_for(family: ProtocolFamily) -> FamilyMetadata {
    match family {
        ProtocolFamily::Lighting => FamilyMetadata {
            name: "lighting bus",
            first_zone: 0,
            max_zones: 256,
            max_sources: 0,
            terminator: "\r",
            poll_interval: Duration::from_secs(30),
            refresh_threshold: Duration::from_secs(90),
            readiness_threshold: Duration::from_secs(180),
        },
        ProtocolFamily::Audio => FamilyMetadata {
            name: "audio matrix",
            first_zone: 1,
            max_zones: 32,
            max_sources: 8,
            terminator: "\r",
            poll_interval: Duration::from_secs(30),
            refresh_threshold: Duration::from_secs(120),
            readiness_threshold: Duration::from_secs(300),
        },
    }
}

/// The configured, addressable subset of a family's zone space.
///
/// Zones are numbered on the wire from `first`; store slots are always
/// 0-based.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ZoneRange {
    first: u16,
    count: u16,
}

impl ZoneRange {
    /// Creates the range `first..first + count`.
    #[must_use]
    pub fn new(first: u16, count: u16) -> Self {
        Self { first, count }
    }

    /// Creates the range covering `count` zones of `family`.
    #[must_use]
    pub fn for_family(family: ProtocolFamily, count: u16) -> Self {
        Self::new(family.metadata().first_zone(), count)
    }

    #[must_use]
    pub fn first(self) -> u16 {
        self.first
    }

    /// Last addressable zone number (inclusive).
    #[must_use]
    pub fn last(self) -> u16 {
        (self.first + self.count).saturating_sub(1)
    }

    #[must_use]
    pub fn count(self) -> u16 {
        self.count
    }

    /// Validates an externally supplied zone number.
    #[must_use]
    pub fn check(self, zone: i32) -> Option<u16> {
        let zone = u16::try_from(zone).ok()?;
        self.contains(zone).then_some(zone)
    }

    #[must_use]
    pub fn contains(self, zone: u16) -> bool {
        zone >= self.first && u32::from(zone) < u32::from(self.first) + u32::from(self.count)
    }

    /// Returns the 0-based store slot for a wire zone number.
    #[must_use]
    pub fn slot(self, zone: u16) -> Option<usize> {
        self.contains(zone).then(|| usize::from(zone - self.first))
    }

    /// Iterates every configured wire zone number.
    pub fn zones(self) -> impl Iterator<Item = u16> {
        (0..self.count).map(move |offset| self.first + offset)
    }
}
