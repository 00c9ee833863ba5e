use async_trait::async_trait;
use derive_more::Display;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// Outbound half of a link as seen by the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes one complete frame, terminator included.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Link-state transitions published by the connection supervisor.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum LinkEvent {
    /// A new connection is up. `session` increases with every reconnect.
    #[display("established (session {session})")]
    Established { session: u64 },
    #[display("lost")]
    Lost,
}

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read and write halves of one open connection.
pub struct LinkStreams {
    pub(crate) reader: BoxedReader,
    pub(crate) writer: BoxedWriter,
}

impl LinkStreams {
    pub(crate) fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl std::fmt::Debug for LinkStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStreams").finish_non_exhaustive()
    }
}

/// Opens connections to the controller.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one connection.
    async fn connect(&self) -> Result<LinkStreams, TransportError>;

    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;
}
