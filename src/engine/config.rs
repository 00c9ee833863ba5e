use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;

use crate::decode::CalStateMode;
use crate::error::{EngineConfigError, FixtureError};
use crate::protocol::{ProtocolFamily, ZoneRange};

const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Poll and staleness timing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct SchedulerConfig {
    /// Time between scheduler ticks.
    poll_interval: Duration,
    /// Age after which a single zone is re-queried.
    refresh_threshold: Duration,
    /// Age after which a zone makes the engine not ready.
    readiness_threshold: Duration,
}

impl SchedulerConfig {
    /// Default timing for a protocol family.
    #[must_use]
    pub fn for_family(family: ProtocolFamily) -> Self {
        let metadata = family.metadata();
        Self {
            poll_interval: metadata.poll_interval(),
            refresh_threshold: metadata.refresh_threshold(),
            readiness_threshold: metadata.readiness_threshold(),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    #[must_use]
    pub fn readiness_threshold(&self) -> Duration {
        self.readiness_threshold
    }

    fn validate(&self) -> Result<(), EngineConfigError> {
        if self.poll_interval.is_zero() {
            return Err(EngineConfigError::ZeroPollInterval);
        }
        if self.refresh_threshold >= self.readiness_threshold {
            return Err(EngineConfigError::RefreshNotShorterThanReadiness);
        }
        Ok(())
    }
}

/// A `ZONE=LABEL` display name, as given on the command line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ZoneName {
    pub zone: u16,
    pub label: String,
}

impl FromStr for ZoneName {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FixtureError::InvalidZoneName {
            value: value.to_string(),
        };
        let (zone, label) = value.split_once('=').ok_or_else(invalid)?;
        let zone = zone.trim().parse().map_err(|_error| invalid())?;
        let label = label.trim();
        if label.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            zone,
            label: label.to_string(),
        })
    }
}

/// Settings for one engine instance.
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    family: ProtocolFamily,
    /// Number of configured zones, counted from the family's first zone.
    zone_count: u16,
    #[builder(default)]
    zone_names: BTreeMap<u16, String>,
    /// Overrides the family's default timing.
    scheduler: Option<SchedulerConfig>,
    #[builder(default)]
    cal_mode: CalStateMode,
    /// Buffered change notifications per subscriber.
    #[builder(default = DEFAULT_CHANGE_CAPACITY)]
    change_capacity: usize,
}

impl EngineConfig {
    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    #[must_use]
    pub fn zones(&self) -> ZoneRange {
        ZoneRange::for_family(self.family, self.zone_count)
    }

    #[must_use]
    pub fn zone_names(&self) -> &BTreeMap<u16, String> {
        &self.zone_names
    }

    #[must_use]
    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler
            .unwrap_or_else(|| SchedulerConfig::for_family(self.family))
    }

    #[must_use]
    pub fn cal_mode(&self) -> CalStateMode {
        self.cal_mode
    }

    #[must_use]
    pub fn change_capacity(&self) -> usize {
        self.change_capacity.max(1)
    }

    /// Checks the zone count, names and timing for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        let max = self.family.metadata().max_zones();
        if self.zone_count == 0 || self.zone_count > max {
            return Err(EngineConfigError::ZoneCountOutOfRange {
                count: self.zone_count,
                family: self.family,
                max,
            });
        }
        let zones = self.zones();
        if let Some(zone) = self.zone_names.keys().find(|zone| !zones.contains(**zone)) {
            return Err(EngineConfigError::NamedZoneOutOfRange { zone: *zone });
        }
        self.scheduler().validate()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn family_timing_is_used_by_default() {
        let config = EngineConfig::builder()
            .family(ProtocolFamily::Lighting)
            .zone_count(64)
            .build();
        assert_eq!(Duration::from_secs(180), config.scheduler().readiness_threshold());
        assert_eq!(ZoneRange::new(0, 64), config.zones());
        assert_eq!(Ok(()), config.validate());
    }

    #[rstest]
    #[case(ProtocolFamily::Audio, 0)]
    #[case(ProtocolFamily::Audio, 33)]
    #[case(ProtocolFamily::Lighting, 257)]
    fn zone_count_must_fit_family(#[case] family: ProtocolFamily, #[case] zone_count: u16) {
        let config = EngineConfig::builder()
            .family(family)
            .zone_count(zone_count)
            .build();
        assert_matches!(
            config.validate(),
            Err(EngineConfigError::ZoneCountOutOfRange { .. })
        );
    }

    #[test]
    fn names_must_target_configured_zones() {
        let config = EngineConfig::builder()
            .family(ProtocolFamily::Audio)
            .zone_count(4)
            .zone_names(BTreeMap::from([(5, "Patio".to_string())]))
            .build();
        assert_eq!(
            Err(EngineConfigError::NamedZoneOutOfRange { zone: 5 }),
            config.validate()
        );
    }

    #[test]
    fn refresh_must_precede_readiness() {
        let scheduler = SchedulerConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .refresh_threshold(Duration::from_secs(60))
            .readiness_threshold(Duration::from_secs(60))
            .build();
        let config = EngineConfig::builder()
            .family(ProtocolFamily::Audio)
            .zone_count(4)
            .scheduler(scheduler)
            .build();
        assert_eq!(
            Err(EngineConfigError::RefreshNotShorterThanReadiness),
            config.validate()
        );
    }

    #[rstest]
    #[case("3=Kitchen", 3, "Kitchen")]
    #[case(" 12 = Main Hall ", 12, "Main Hall")]
    fn zone_names_parse(#[case] input: &str, #[case] zone: u16, #[case] label: &str) {
        assert_eq!(
            Ok(ZoneName {
                zone,
                label: label.to_string()
            }),
            input.parse()
        );
    }

    #[rstest]
    #[case("Kitchen")]
    #[case("x=Kitchen")]
    #[case("3=")]
    fn malformed_zone_names_are_rejected(#[case] input: &str) {
        assert_matches!(
            input.parse::<ZoneName>(),
            Err(FixtureError::InvalidZoneName { .. })
        );
    }
}
