//! Zone synchronization engine: API façade, scheduler and runtime wiring.

mod config;
mod runtime;
mod scheduler;
mod zone_engine;

pub use config::{EngineConfig, SchedulerConfig, ZoneName};
pub use runtime::BridgeRuntime;
pub use scheduler::PollScheduler;
pub use zone_engine::{ZoneChange, ZoneEngine};
