use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::zone_engine::ZoneEngine;
use crate::link::LinkEvent;

/// Periodic driver that keeps the mirror fresh and readiness current.
///
/// Every tick recomputes readiness and re-queries stale zones. Each time the
/// link comes up the engine's resync sequence is sent and the interval
/// restarts.
#[derive(Debug)]
pub struct PollScheduler {
    engine: ZoneEngine,
}

impl PollScheduler {
    #[must_use]
    pub fn new(engine: ZoneEngine) -> Self {
        Self { engine }
    }

    /// Runs the scheduler until `cancel` fires.
    pub fn spawn(
        self,
        events: broadcast::Receiver<LinkEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    #[instrument(skip_all, fields(family = %self.engine.family()))]
    async fn run(self, mut events: broadcast::Receiver<LinkEvent>, cancel: CancellationToken) {
        let period = self.engine.scheduler_config().poll_interval();
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut link_up = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv(), if !events.is_closed() => match event {
                    Ok(LinkEvent::Established { session }) => {
                        link_up = true;
                        info!(session, "link up, resynchronising");
                        if let Err(error) = self.engine.resync().await {
                            warn!(%error, "resync failed");
                        }
                        ticks.reset();
                    }
                    Ok(LinkEvent::Lost) => {
                        link_up = false;
                        debug!("link lost");
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed link events"),
                    Err(RecvError::Closed) => debug!("link event stream closed"),
                },
                _ = ticks.tick() => self.engine.tick(link_up).await,
            }
        }
        debug!("scheduler stopped");
    }
}
