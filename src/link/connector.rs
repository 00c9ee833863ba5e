use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, instrument};

use super::fake_backend::{FakeConnector, FakeLinkConfig};
use super::transport::{Connector, LinkStreams};
use crate::error::TransportError;

/// Default serial speed for both controller families.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Runtime link selection.
#[derive(Debug, Clone)]
pub enum ConnectorSpec {
    Serial { path: String, baud_rate: u32 },
    Tcp { address: String },
    Fake(FakeLinkConfig),
}

impl ConnectorSpec {
    /// Builds the connector for this selection.
    #[must_use]
    pub fn into_connector(self) -> Arc<dyn Connector> {
        match self {
            Self::Serial { path, baud_rate } => Arc::new(SerialConnector { path, baud_rate }),
            Self::Tcp { address } => Arc::new(TcpConnector { address }),
            Self::Fake(config) => {
                info!("using fake link");
                Arc::new(FakeConnector::new(config))
            }
        }
    }
}

/// Serial port link, 8N1 without flow control.
#[derive(Debug)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
}

#[async_trait]
impl Connector for SerialConnector {
    #[instrument(
        skip(self),
        level = "debug",
        fields(path = %self.path, baud_rate = self.baud_rate)
    )]
    async fn connect(&self) -> Result<LinkStreams, TransportError> {
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|source| TransportError::Serial {
                path: self.path.clone(),
                source,
            })?;
        Ok(LinkStreams::new(port))
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.path, self.baud_rate)
    }
}

/// TCP link to a serial-over-IP gateway.
#[derive(Debug)]
pub struct TcpConnector {
    address: String,
}

#[async_trait]
impl Connector for TcpConnector {
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    async fn connect(&self) -> Result<LinkStreams, TransportError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(LinkStreams::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.address)
    }
}
