use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{BridgeRuntime, ZoneEngine};

const REFRESH: Duration = Duration::from_millis(100);

/// Stderr progress bar counting zones that have reported while `status`
/// waits for readiness.
#[derive(Debug)]
pub(crate) struct ReportProgress {
    enabled: bool,
}

impl ReportProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Waits up to `limit` for readiness, redrawing the reported-zone count.
    pub(crate) async fn wait_ready(&self, runtime: &BridgeRuntime, limit: Duration) -> bool {
        if !self.enabled {
            return runtime.wait_ready(limit).await;
        }

        let engine = runtime.engine();
        let bar = new_bar(u64::from(engine.zones().count()));
        let wait = runtime.wait_ready(limit);
        tokio::pin!(wait);
        let mut redraw = tokio::time::interval(REFRESH);
        let ready = loop {
            tokio::select! {
                ready = &mut wait => break ready,
                _ = redraw.tick() => bar.set_position(reported_zones(engine)),
            }
        };
        bar.set_position(reported_zones(engine));
        bar.finish_and_clear();
        ready
    }
}

/// Configured zones with a report younger than the readiness threshold.
pub(crate) fn reported_zones(engine: &ZoneEngine) -> u64 {
    let threshold = engine.scheduler_config().readiness_threshold();
    let stale = engine.store().stale_zones(threshold).len();
    let stale = u64::try_from(stale).unwrap_or(u64::MAX);
    u64::from(engine.zones().count()).saturating_sub(stale)
}

fn new_bar(zones: u64) -> ProgressBar {
    let bar = ProgressBar::new(zones);
    bar.set_style(bar_style());
    bar.set_message("Waiting for zones to report");
    bar.enable_steady_tick(REFRESH);
    bar
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan.bold} {msg} [{bar:24.cyan/blue}] {pos}/{len} {elapsed:.dim}",
    )
    .unwrap_or_else(|_error| ProgressStyle::default_bar())
    .progress_chars("=> ")
}
