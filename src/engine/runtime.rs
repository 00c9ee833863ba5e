use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::EngineConfig;
use super::zone_engine::ZoneEngine;
use super::scheduler::PollScheduler;
use crate::error::EngineConfigError;
use crate::link::{ConnectionSupervisor, Connector, LinkConfig};

const FRAME_BUFFER: usize = 256;

/// A running bridge: supervisor, inbound frame task and scheduler around one
/// engine.
#[derive(Debug)]
pub struct BridgeRuntime {
    engine: ZoneEngine,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeRuntime {
    /// Starts every task. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is inconsistent; nothing is started.
    pub fn start(
        config: &EngineConfig,
        connector: Arc<dyn Connector>,
        link_config: LinkConfig,
    ) -> Result<Self, EngineConfigError> {
        let supervisor = ConnectionSupervisor::new(connector, link_config);
        let link = supervisor.handle();
        let engine = ZoneEngine::new(config, link.clone())?;
        let cancel = CancellationToken::new();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);

        let scheduler = PollScheduler::new(engine.clone()).spawn(link.subscribe(), cancel.clone());
        let inbound = tokio::spawn(route_frames(engine.clone(), frames_rx, cancel.clone()));
        let supervisor = supervisor.spawn(frames_tx, cancel.clone());
        info!(family = %engine.family(), zones = engine.zones().count(), "bridge started");

        Ok(Self {
            engine,
            connected: link.connected(),
            cancel,
            tasks: vec![supervisor, inbound, scheduler],
        })
    }

    #[must_use]
    pub fn engine(&self) -> &ZoneEngine {
        &self.engine
    }

    /// Waits up to `limit` for the link to come up.
    pub async fn wait_connected(&mut self, limit: Duration) -> bool {
        matches!(
            tokio::time::timeout(limit, self.connected.wait_for(|up| *up)).await,
            Ok(Ok(_))
        )
    }

    /// Waits up to `limit` for the engine to become ready.
    pub async fn wait_ready(&self, limit: Duration) -> bool {
        let mut readiness = self.engine.readiness();
        matches!(
            tokio::time::timeout(limit, readiness.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        )
    }

    /// Stops every task and waits for them to finish. No change notification
    /// is emitted after this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                debug!(%error, "bridge task ended abnormally");
            }
        }
        info!("bridge stopped");
    }
}

async fn route_frames(
    engine: ZoneEngine,
    mut frames: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        engine.handle_frame(&frame);
    }
}
