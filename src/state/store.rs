use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::codec::scale_for;
use crate::protocol::{Attribute, ProtocolFamily, ZoneRange};

/// Mirrored state of one zone. Scaled attributes are held in native units.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ZoneRecord {
    pub name: Option<String>,
    pub power: Option<bool>,
    pub mute: Option<bool>,
    pub level: u8,
    pub source: Option<u8>,
    pub bass: u8,
    pub treble: u8,
    pub balance: u8,
    pub last_updated: Option<Instant>,
}

impl ZoneRecord {
    fn get(&self, attribute: Attribute) -> Option<u8> {
        match attribute {
            Attribute::Power => self.power.map(u8::from),
            Attribute::Mute => self.mute.map(u8::from),
            Attribute::Level => Some(self.level),
            Attribute::Source => self.source,
            Attribute::Bass => Some(self.bass),
            Attribute::Treble => Some(self.treble),
            Attribute::Balance => Some(self.balance),
        }
    }

    fn set(&mut self, attribute: Attribute, native: u8) {
        match attribute {
            Attribute::Power => self.power = Some(native != 0),
            Attribute::Mute => self.mute = Some(native != 0),
            Attribute::Level => self.level = native,
            Attribute::Source => self.source = Some(native),
            Attribute::Bass => self.bass = native,
            Attribute::Treble => self.treble = native,
            Attribute::Balance => self.balance = native,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_updated = Some(self.last_updated.map_or(now, |last| last.max(now)));
    }

    fn is_fresh(&self, now: Instant, threshold: Duration) -> bool {
        self.last_updated
            .is_some_and(|last| now.saturating_duration_since(last) < threshold)
    }
}

/// Externally scaled view of one zone, as shown by status output.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub zone: u16,
    pub name: Option<String>,
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    pub level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treble: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u8>,
    /// Seconds since the zone last reported, or `None` if it never has.
    pub age_secs: Option<u64>,
}

/// Fixed-capacity zone table shared by the decoder path and the scheduler.
///
/// The table is sized to the family's protocol maximum at construction;
/// only zones inside the configured range are ever written.
#[derive(Debug)]
pub struct ZoneStore {
    family: ProtocolFamily,
    zones: ZoneRange,
    records: Mutex<Vec<ZoneRecord>>,
}

impl ZoneStore {
    #[must_use]
    pub fn new(family: ProtocolFamily, zones: ZoneRange, names: &BTreeMap<u16, String>) -> Self {
        let capacity = usize::from(family.metadata().max_zones());
        let mut records = vec![ZoneRecord::default(); capacity];
        for (zone, name) in names {
            if let Some(record) = zones.slot(*zone).and_then(|slot| records.get_mut(slot)) {
                record.name = Some(name.clone());
            }
        }
        Self {
            family,
            zones,
            records: Mutex::new(records),
        }
    }

    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    #[must_use]
    pub fn zones(&self) -> ZoneRange {
        self.zones
    }

    /// Returns the native value of `attribute`, or `None` if the zone is not
    /// configured or has never reported that attribute.
    #[must_use]
    pub fn get(&self, zone: u16, attribute: Attribute) -> Option<u8> {
        let slot = self.zones.slot(zone)?;
        self.lock().get(slot).and_then(|record| record.get(attribute))
    }

    /// Writes one native value and refreshes the zone's timestamp.
    ///
    /// Returns `false` without writing when `zone` is not configured.
    pub fn set(&self, zone: u16, attribute: Attribute, native: u8) -> bool {
        let now = Instant::now();
        self.with_record(zone, |record| {
            record.set(attribute, native);
            record.touch(now);
        })
    }

    /// Refreshes the zone's timestamp without changing any attribute.
    pub fn touch(&self, zone: u16) -> bool {
        let now = Instant::now();
        self.with_record(zone, |record| record.touch(now))
    }

    #[must_use]
    pub fn is_fresh(&self, zone: u16, threshold: Duration) -> bool {
        let now = Instant::now();
        let Some(slot) = self.zones.slot(zone) else {
            return false;
        };
        self.lock()
            .get(slot)
            .is_some_and(|record| record.is_fresh(now, threshold))
    }

    /// Returns whether every configured zone reported within `threshold`.
    #[must_use]
    pub fn all_fresh(&self, threshold: Duration) -> bool {
        let now = Instant::now();
        self.configured(&self.lock())
            .all(|(_, record)| record.is_fresh(now, threshold))
    }

    /// Configured zones whose last report is older than `threshold`.
    #[must_use]
    pub fn stale_zones(&self, threshold: Duration) -> Vec<u16> {
        let now = Instant::now();
        self.configured(&self.lock())
            .filter(|(_, record)| !record.is_fresh(now, threshold))
            .map(|(zone, _)| zone)
            .collect()
    }

    #[must_use]
    pub fn name(&self, zone: u16) -> Option<String> {
        let slot = self.zones.slot(zone)?;
        self.lock().get(slot).and_then(|record| record.name.clone())
    }

    #[must_use]
    pub fn snapshot(&self, zone: u16) -> Option<ZoneSnapshot> {
        let slot = self.zones.slot(zone)?;
        let now = Instant::now();
        let records = self.lock();
        records
            .get(slot)
            .map(|record| self.snapshot_of(zone, record, now))
    }

    /// Snapshots every configured zone in zone order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ZoneSnapshot> {
        let now = Instant::now();
        let records = self.lock();
        self.configured(&records)
            .map(|(zone, record)| self.snapshot_of(zone, record, now))
            .collect()
    }

    fn snapshot_of(&self, zone: u16, record: &ZoneRecord, now: Instant) -> ZoneSnapshot {
        let audio = self.family == ProtocolFamily::Audio;
        let external = |attribute: Attribute, native: u8| {
            scale_for(self.family, attribute).map_or(native, |scale| scale.to_external(native))
        };
        ZoneSnapshot {
            zone,
            name: record.name.clone(),
            power: record.power,
            mute: record.mute,
            level: external(Attribute::Level, record.level),
            source: record.source,
            bass: audio.then(|| external(Attribute::Bass, record.bass)),
            treble: audio.then(|| external(Attribute::Treble, record.treble)),
            balance: audio.then(|| external(Attribute::Balance, record.balance)),
            age_secs: record
                .last_updated
                .map(|last| now.saturating_duration_since(last).as_secs()),
        }
    }

    fn configured<'a>(
        &self,
        records: &'a [ZoneRecord],
    ) -> impl Iterator<Item = (u16, &'a ZoneRecord)> + use<'a> {
        let zones = self.zones;
        zones
            .zones()
            .filter_map(move |zone| Some((zone, records.get(zones.slot(zone)?)?)))
    }

    fn with_record(&self, zone: u16, update: impl FnOnce(&mut ZoneRecord)) -> bool {
        let Some(slot) = self.zones.slot(zone) else {
            return false;
        };
        match self.lock().get_mut(slot) {
            Some(record) => {
                update(record);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ZoneRecord>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::time::advance;

    use super::*;

    const READINESS: Duration = Duration::from_secs(180);

    fn audio_store() -> ZoneStore {
        let names = BTreeMap::from([(2, "Kitchen".to_string()), (9, "Garage".to_string())]);
        ZoneStore::new(ProtocolFamily::Audio, ZoneRange::new(1, 3), &names)
    }

    #[tokio::test(start_paused = true)]
    async fn set_writes_value_and_touches_zone() {
        let store = audio_store();
        assert!(!store.is_fresh(1, READINESS));
        assert_eq!(None, store.get(1, Attribute::Power));

        assert!(store.set(1, Attribute::Power, 1));
        assert_eq!(Some(1), store.get(1, Attribute::Power));
        assert!(store.is_fresh(1, READINESS));
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    #[case(200)]
    #[tokio::test(start_paused = true)]
    async fn unconfigured_zones_are_never_written(#[case] zone: u16) {
        let store = audio_store();
        assert!(!store.set(zone, Attribute::Level, 10));
        assert!(!store.touch(zone));
        assert_eq!(None, store.get(zone, Attribute::Level));
    }

    #[tokio::test(start_paused = true)]
    async fn zone_goes_stale_after_threshold_and_recovers_on_touch() {
        let store = audio_store();
        for zone in 1..=3 {
            store.touch(zone);
        }
        assert!(store.all_fresh(READINESS));

        advance(Duration::from_secs(100)).await;
        store.touch(2);
        advance(Duration::from_secs(81)).await;
        assert!(!store.all_fresh(READINESS));
        assert_eq!(vec![1, 3], store.stale_zones(READINESS));

        store.set(1, Attribute::Mute, 0);
        store.touch(3);
        assert!(store.is_fresh(1, READINESS));
        assert!(store.all_fresh(READINESS));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_store_is_not_fresh() {
        assert!(!audio_store().all_fresh(READINESS));
    }

    #[tokio::test(start_paused = true)]
    async fn names_outside_configured_range_are_dropped() {
        let store = audio_store();
        assert_eq!(Some("Kitchen".to_string()), store.name(2));
        assert_eq!(None, store.name(9));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_convert_to_external_scale() {
        let store = audio_store();
        store.set(2, Attribute::Level, 8);
        store.set(2, Attribute::Balance, 32);
        store.set(2, Attribute::Source, 3);
        advance(Duration::from_secs(5)).await;

        let snapshot = store.snapshot(2).expect("zone 2 is configured");
        assert_eq!(21, snapshot.level);
        assert_eq!(Some(50), snapshot.balance);
        assert_eq!(Some(3), snapshot.source);
        assert_eq!(Some(5), snapshot.age_secs);
        assert_eq!(3, store.snapshots().len());
    }

    #[tokio::test(start_paused = true)]
    async fn lighting_snapshot_omits_audio_fields() {
        let store =
            ZoneStore::new(ProtocolFamily::Lighting, ZoneRange::new(0, 4), &BTreeMap::new());
        store.set(3, Attribute::Level, 255);
        let snapshot = store.snapshot(3).expect("group 3 is configured");
        assert_eq!(100, snapshot.level);
        assert_eq!(None, snapshot.bass);
        insta::assert_json_snapshot!(snapshot, @r#"
        {
          "zone": 3,
          "name": null,
          "power": null,
          "level": 100,
          "age_secs": 0
        }
        "#);
    }
}
