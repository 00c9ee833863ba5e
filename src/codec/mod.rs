//! Outbound frame construction for both protocol families.

pub(crate) mod audio;
mod checksum;
mod command;
pub(crate) mod lighting;
mod ramp;
mod scale;

pub use checksum::{checksum, is_balanced};
pub use command::{AudioCommand, Command, FrameEncoder, LightingCommand, OutboundFrame};
pub use ramp::RampRate;
pub use scale::{Scale, scale_for};
