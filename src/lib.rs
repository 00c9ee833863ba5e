//! Zone synchronization bridge for serial lighting-bus and audio-matrix
//! controllers.
//!
//! A [`ZoneEngine`] mirrors every configured zone from decoded status
//! frames, sends validated commands over a supervised link, and publishes
//! [`ZoneChange`] notifications and a readiness flag.

mod app;
mod cli;
mod codec;
mod decode;
mod engine;
mod error;
mod link;
mod protocol;
mod state;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    await_link, run, run_with_clients, run_with_clients_and_log_level, run_with_log_level,
    start_bridge,
};
pub use cli::{
    Args, BridgeSettings, Command as CliCommand, ControlAction, ControlArgs, DecodeArgs, FakeArgs,
    LogLevel, OutputFormat, StatusArgs, SwitchState, WatchArgs, WatchStopReason, WatchSummary,
};
pub use codec::{
    AudioCommand, Command, FrameEncoder, LightingCommand, OutboundFrame, RampRate, Scale,
    checksum, is_balanced, scale_for,
};
pub use decode::{
    CalStateMode, DecodedFrame, FrameDecodeError, FrameDecoder, FrameKind, ZoneUpdate,
    level_from_pair,
};
pub use engine::{
    BridgeRuntime, EngineConfig, PollScheduler, SchedulerConfig, ZoneChange, ZoneEngine, ZoneName,
};
pub use error::{BridgeError, EncodeError, EngineConfigError, FixtureError, TransportError};
pub use link::{
    ConnectionSupervisor, Connector, ConnectorSpec, DEFAULT_BAUD_RATE, DelimitedFrameCodec,
    FakeConnector, FakeFrames, FakeLinkConfig, LinkConfig, LinkEvent, LinkHandle, LinkStreams,
    RecordingTransport, SerialConnector, TcpConnector, Transport,
};
pub use protocol::{Attribute, FamilyMetadata, ProtocolFamily, ZoneRange};
pub use state::{ZoneRecord, ZoneSnapshot, ZoneStore};
pub use terminal::{SystemTerminalClient, TerminalClient};
