use derive_more::From;
use thiserror::Error;

use crate::protocol::ProtocolFamily;

/// Errors returned while building outbound frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EncodeError {
    /// The command targets a zone outside the configured range.
    #[error("zone {zone} is out of range ({first}..={last})")]
    OutOfRangeTarget { zone: i32, first: u16, last: u16 },
    /// The command belongs to the other protocol family.
    #[error("`{command}` is not supported by the {family} protocol")]
    Unsupported {
        command: &'static str,
        family: ProtocolFamily,
    },
    /// The requested input source does not exist on the device.
    #[error("source {input} is out of range (1..={max})")]
    InvalidSource { input: u8, max: u8 },
    /// A raw passthrough frame was empty.
    #[error("raw frame must not be empty")]
    EmptyRawFrame,
}

/// Errors returned by the physical link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("link I/O failed")]
    Io(#[from] std::io::Error),
    #[error("failed to open serial port `{path}`")]
    Serial {
        path: String,
        source: tokio_serial::Error,
    },
    #[error("link is not connected")]
    NotConnected,
    #[error("send did not complete within {timeout:?}")]
    SendTimeout { timeout: std::time::Duration },
}

/// Errors returned when an engine configuration is inconsistent.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EngineConfigError {
    #[error("zone count {count} is out of range for the {family} protocol (1..={max})")]
    ZoneCountOutOfRange {
        count: u16,
        family: ProtocolFamily,
        max: u16,
    },
    #[error("zone name given for zone {zone}, which is outside the configured range")]
    NamedZoneOutOfRange { zone: u16 },
    #[error("refresh threshold must be shorter than the readiness threshold")]
    RefreshNotShorterThanReadiness,
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
}

/// Errors returned when parsing fake link fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("fake frame fixtures cannot contain empty frames")]
    EmptyFrame,
    #[error("zone name `{value}` must have the form `ZONE=LABEL`")]
    InvalidZoneName { value: String },
}

/// Errors returned when validating runtime CLI options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("no link selected; pass one of --serial, --tcp or --fake")]
    MissingLink,
    #[error("the link did not come up within {timeout:?}")]
    LinkTimeout { timeout: std::time::Duration },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level bridge errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum BridgeError {
    #[error(transparent)]
    #[from(EncodeError, Box<EncodeError>)]
    Encode(Box<EncodeError>),
    #[error(transparent)]
    #[from(TransportError, Box<TransportError>)]
    Transport(Box<TransportError>),
    #[error(transparent)]
    #[from(EngineConfigError, Box<EngineConfigError>)]
    Config(Box<EngineConfigError>),
}
