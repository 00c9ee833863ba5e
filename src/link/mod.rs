//! Physical link ownership: connectors, framing and reconnect supervision.

mod connector;
mod delimited;
mod fake_backend;
mod supervisor;
mod transport;

pub use connector::{ConnectorSpec, DEFAULT_BAUD_RATE, SerialConnector, TcpConnector};
pub use delimited::DelimitedFrameCodec;
pub use fake_backend::{FakeConnector, FakeFrames, FakeLinkConfig, RecordingTransport};
pub use supervisor::{ConnectionSupervisor, LinkConfig, LinkHandle};
pub use transport::{Connector, LinkEvent, LinkStreams, Transport};
