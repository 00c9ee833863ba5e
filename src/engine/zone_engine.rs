use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, trace, warn};

use super::config::{EngineConfig, SchedulerConfig};
use crate::codec::{
    AudioCommand, Command, FrameEncoder, LightingCommand, OutboundFrame, RampRate, scale_for,
};
use crate::decode::{DecodedFrame, FrameDecoder, FrameKind};
use crate::error::{BridgeError, EncodeError, EngineConfigError};
use crate::link::Transport;
use crate::protocol::{Attribute, ProtocolFamily, ZoneRange};
use crate::state::{ZoneSnapshot, ZoneStore};

/// One mirrored attribute change, in the external `0..=100` scale for
/// scaled attributes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct ZoneChange {
    pub attribute: Attribute,
    pub zone: u16,
    pub value: u8,
}

struct EngineShared {
    family: ProtocolFamily,
    encoder: FrameEncoder,
    decoder: FrameDecoder,
    store: ZoneStore,
    scheduler: SchedulerConfig,
    transport: Arc<dyn Transport>,
    changes: broadcast::Sender<ZoneChange>,
    ready: watch::Sender<bool>,
}

/// Zone synchronization engine for one controller link.
///
/// Cloning is cheap; clones share the same mirror, transport and channels.
#[derive(Clone)]
pub struct ZoneEngine {
    shared: Arc<EngineShared>,
}

impl std::fmt::Debug for ZoneEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneEngine")
            .field("family", &self.shared.family)
            .field("zones", &self.zones())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl ZoneEngine {
    /// Creates an engine writing to `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is inconsistent.
    pub fn new(
        config: &EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineConfigError> {
        config.validate()?;
        let family = config.family();
        let zones = config.zones();
        let (changes, _) = broadcast::channel(config.change_capacity());
        let shared = EngineShared {
            family,
            encoder: FrameEncoder::new(family, zones),
            decoder: FrameDecoder::new(family).with_cal_mode(config.cal_mode()),
            store: ZoneStore::new(family, zones, config.zone_names()),
            scheduler: config.scheduler(),
            transport,
            changes,
            ready: watch::Sender::new(false),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.shared.family
    }

    #[must_use]
    pub fn zones(&self) -> ZoneRange {
        self.shared.store.zones()
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.shared.scheduler
    }

    #[must_use]
    pub fn store(&self) -> &ZoneStore {
        &self.shared.store
    }

    #[must_use]
    pub fn encoder(&self) -> &FrameEncoder {
        &self.shared.encoder
    }

    /// Subscribes to attribute change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ZoneChange> {
        self.shared.changes.subscribe()
    }

    /// Watches the readiness flag.
    #[must_use]
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.shared.ready.subscribe()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    #[must_use]
    pub fn power(&self, zone: u16) -> Option<bool> {
        self.shared
            .store
            .get(zone, Attribute::Power)
            .map(|native| native != 0)
    }

    #[must_use]
    pub fn mute(&self, zone: u16) -> Option<bool> {
        self.shared
            .store
            .get(zone, Attribute::Mute)
            .map(|native| native != 0)
    }

    /// Brightness or volume in the external scale.
    #[must_use]
    pub fn level(&self, zone: u16) -> Option<u8> {
        self.external(zone, Attribute::Level)
    }

    #[must_use]
    pub fn source(&self, zone: u16) -> Option<u8> {
        self.shared.store.get(zone, Attribute::Source)
    }

    #[must_use]
    pub fn bass(&self, zone: u16) -> Option<u8> {
        self.external(zone, Attribute::Bass)
    }

    #[must_use]
    pub fn treble(&self, zone: u16) -> Option<u8> {
        self.external(zone, Attribute::Treble)
    }

    #[must_use]
    pub fn balance(&self, zone: u16) -> Option<u8> {
        self.external(zone, Attribute::Balance)
    }

    #[must_use]
    pub fn snapshot(&self, zone: u16) -> Option<ZoneSnapshot> {
        self.shared.store.snapshot(zone)
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<ZoneSnapshot> {
        self.shared.store.snapshots()
    }

    /// Switches a zone on or off.
    ///
    /// # Errors
    ///
    /// Returns an error when the zone is out of range or the send fails.
    pub async fn set_power(&self, zone: i32, on: bool) -> Result<(), BridgeError> {
        let command = match self.shared.family {
            ProtocolFamily::Lighting if on => LightingCommand::On { group: zone }.into(),
            ProtocolFamily::Lighting => LightingCommand::Off { group: zone }.into(),
            ProtocolFamily::Audio => AudioCommand::Power { zone, on }.into(),
        };
        self.send(&command).await
    }

    /// Sets brightness or volume, `level` in `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns an error when the zone is out of range or the send fails.
    pub async fn set_level(&self, zone: i32, level: i32) -> Result<(), BridgeError> {
        let command = match self.shared.family {
            ProtocolFamily::Lighting => LightingCommand::Ramp {
                group: zone,
                level,
                rate: RampRate::Instant,
            }
            .into(),
            ProtocolFamily::Audio => AudioCommand::Volume { zone, level }.into(),
        };
        self.send(&command).await
    }

    /// Ramps a lighting group to `level` over `rate`.
    ///
    /// # Errors
    ///
    /// Returns an error for audio engines, out-of-range groups, or failed sends.
    pub async fn ramp(&self, group: i32, level: i32, rate: RampRate) -> Result<(), BridgeError> {
        self.send(&LightingCommand::Ramp { group, level, rate }.into())
            .await
    }

    /// Stops a running lighting ramp.
    ///
    /// # Errors
    ///
    /// Returns an error for audio engines, out-of-range groups, or failed sends.
    pub async fn stop_ramp(&self, group: i32) -> Result<(), BridgeError> {
        self.send(&LightingCommand::StopRamp { group }.into()).await
    }

    /// # Errors
    ///
    /// Returns an error for lighting engines, out-of-range zones, or failed sends.
    pub async fn set_mute(&self, zone: i32, on: bool) -> Result<(), BridgeError> {
        self.send(&AudioCommand::Mute { zone, on }.into()).await
    }

    /// # Errors
    ///
    /// Returns an error for lighting engines, invalid sources, out-of-range
    /// zones, or failed sends.
    pub async fn set_source(&self, zone: i32, source: u8) -> Result<(), BridgeError> {
        self.send(&AudioCommand::Source { zone, source }.into())
            .await
    }

    /// # Errors
    ///
    /// Returns an error for lighting engines, out-of-range zones, or failed sends.
    pub async fn set_bass(&self, zone: i32, value: i32) -> Result<(), BridgeError> {
        self.send(&AudioCommand::Bass { zone, value }.into()).await
    }

    /// # Errors
    ///
    /// Returns an error for lighting engines, out-of-range zones, or failed sends.
    pub async fn set_treble(&self, zone: i32, value: i32) -> Result<(), BridgeError> {
        self.send(&AudioCommand::Treble { zone, value }.into())
            .await
    }

    /// # Errors
    ///
    /// Returns an error for lighting engines, out-of-range zones, or failed sends.
    pub async fn set_balance(&self, zone: i32, value: i32) -> Result<(), BridgeError> {
        self.send(&AudioCommand::Balance { zone, value }.into())
            .await
    }

    /// Switches every configured zone on.
    ///
    /// # Errors
    ///
    /// Returns the first send failure; later zones are not attempted.
    pub async fn all_on(&self) -> Result<(), BridgeError> {
        self.for_each_zone(|zone| self.power_command(zone, true)).await
    }

    /// Switches every configured zone off.
    ///
    /// # Errors
    ///
    /// Returns the first send failure; later zones are not attempted.
    pub async fn all_off(&self) -> Result<(), BridgeError> {
        self.for_each_zone(|zone| self.power_command(zone, false)).await
    }

    /// Mutes or unmutes every configured audio zone.
    ///
    /// # Errors
    ///
    /// Returns an error for lighting engines before anything is sent, or the
    /// first send failure.
    pub async fn all_mute(&self, on: bool) -> Result<(), BridgeError> {
        self.for_each_zone(|zone| AudioCommand::Mute { zone, on }.into())
            .await
    }

    /// Sends raw text; the terminator is appended when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when `text` is empty or the send fails.
    pub async fn raw(&self, text: &str) -> Result<(), BridgeError> {
        self.send(&Command::Raw(text.to_string())).await
    }

    /// Encodes and sends one command.
    ///
    /// # Errors
    ///
    /// Returns an encode error without sending anything, or the transport
    /// error from the send.
    #[instrument(skip(self), level = "debug", fields(command = command.name()))]
    pub async fn send(&self, command: &Command) -> Result<(), BridgeError> {
        let frame = self.shared.encoder.encode(command)?;
        self.send_frame(&frame).await
    }

    /// Decodes one inbound frame and applies it to the mirror.
    ///
    /// Malformed frames are logged and dropped.
    pub fn handle_frame(&self, frame: &str) {
        match self.shared.decoder.decode(frame) {
            Ok(decoded) => self.apply(&decoded, frame),
            Err(error) => debug!(frame, %error, "dropping undecodable frame"),
        }
    }

    /// Sends the link-up sequence: interface setup, then a query of every zone.
    ///
    /// # Errors
    ///
    /// Returns the first send failure; the scheduler's next tick retries stale
    /// zones individually.
    #[instrument(skip(self), level = "info", fields(family = %self.shared.family))]
    pub async fn resync(&self) -> Result<(), BridgeError> {
        let encoder = &self.shared.encoder;
        for frame in encoder.init_sequence().iter().chain(&encoder.full_query()) {
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    /// Recomputes readiness and, when `link_up`, re-queries stale zones. One
    /// query goes out per reply span, so a lighting block is asked for once.
    ///
    /// Send failures are logged and never abort the tick.
    pub async fn tick(&self, link_up: bool) {
        let scheduler = self.shared.scheduler;
        let ready = self
            .shared
            .store
            .all_fresh(scheduler.readiness_threshold());
        self.publish_readiness(ready);
        if !link_up {
            trace!("link down, skipping stale refresh");
            return;
        }

        let stale = self.shared.store.stale_zones(scheduler.refresh_threshold());
        if !stale.is_empty() {
            debug!(count = stale.len(), "refreshing stale zones");
        }
        // Stale zones come in ascending order; skip those an earlier reply covers.
        let span = u32::from(self.shared.encoder.refresh_span());
        let mut covered_until = 0;
        for zone in stale {
            if u32::from(zone) < covered_until {
                continue;
            }
            covered_until = u32::from(zone) + span;
            let result = match self.shared.encoder.refresh_query(zone) {
                Ok(frame) => self.send_frame(&frame).await,
                Err(error) => Err(error.into()),
            };
            if let Err(error) = result {
                warn!(zone, %error, "stale zone refresh failed");
            }
        }
    }

    async fn send_frame(&self, frame: &OutboundFrame) -> Result<(), BridgeError> {
        trace!(frame = %frame, "sending frame");
        self.shared.transport.send(frame.as_bytes()).await?;
        Ok(())
    }

    fn apply(&self, decoded: &DecodedFrame, frame: &str) {
        match decoded.kind {
            FrameKind::DeviceError => warn!(frame, "device reported an error"),
            FrameKind::Acknowledgement | FrameKind::QueryEcho => {
                trace!(kind = %decoded.kind, "frame carries no state");
            }
            _ => {}
        }

        let store = &self.shared.store;
        for zone in &decoded.touched {
            store.touch(*zone);
        }
        for update in &decoded.updates {
            if !store.set(update.zone, update.attribute, update.native) {
                trace!(zone = update.zone, "ignoring update for unconfigured zone");
                continue;
            }
            let value = scale_for(self.shared.family, update.attribute)
                .map_or(update.native, |scale| scale.to_external(update.native));
            let change = ZoneChange {
                attribute: update.attribute,
                zone: update.zone,
                value,
            };
            trace!(?change, "zone changed");
            // No subscribers is fine.
            let _ = self.shared.changes.send(change);
        }

        if !decoded.touched.is_empty()
            && !self.is_ready()
            && store.all_fresh(self.shared.scheduler.readiness_threshold())
        {
            self.publish_readiness(true);
        }
    }

    fn publish_readiness(&self, ready: bool) {
        let changed = self.shared.ready.send_if_modified(|current| {
            let changed = *current != ready;
            *current = ready;
            changed
        });
        if changed {
            info!(ready, "readiness changed");
        }
    }

    fn external(&self, zone: u16, attribute: Attribute) -> Option<u8> {
        let native = self.shared.store.get(zone, attribute)?;
        let scale = scale_for(self.shared.family, attribute)?;
        Some(scale.to_external(native))
    }

    fn power_command(&self, zone: i32, on: bool) -> Command {
        match self.shared.family {
            ProtocolFamily::Lighting if on => LightingCommand::On { group: zone }.into(),
            ProtocolFamily::Lighting => LightingCommand::Off { group: zone }.into(),
            ProtocolFamily::Audio => AudioCommand::Power { zone, on }.into(),
        }
    }

    async fn for_each_zone(&self, command: impl Fn(i32) -> Command) -> Result<(), BridgeError> {
        let frames = self
            .zones()
            .zones()
            .map(|zone| self.shared.encoder.encode(&command(i32::from(zone))))
            .collect::<Result<Vec<_>, EncodeError>>()?;
        for frame in &frames {
            self.send_frame(frame).await?;
        }
        Ok(())
    }
}
