pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod offline;
pub(crate) mod status;
pub(crate) mod ui;
pub(crate) mod watch;

pub use self::command::{Args, BridgeSettings, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::control::{ControlAction, ControlArgs, SwitchState};
pub use self::offline::DecodeArgs;
pub use self::status::StatusArgs;
pub use self::watch::{WatchArgs, WatchStopReason, WatchSummary};
