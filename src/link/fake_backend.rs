use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::delimited::DelimitedFrameCodec;
use super::transport::{Connector, LinkStreams, Transport};
use crate::error::{FixtureError, TransportError};

const DUPLEX_CAPACITY: usize = 4096;

/// Inbound frames replayed by the fake link, parsed from `F1;F2;...`.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct FakeFrames {
    frames: Vec<String>,
}

impl FromStr for FakeFrames {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let frames = value
            .split(';')
            .map(str::trim)
            .map(|frame| {
                if frame.is_empty() {
                    Err(FixtureError::EmptyFrame)
                } else {
                    Ok(frame.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { frames })
    }
}

/// Settings for the in-memory fake link.
#[derive(Debug, Clone, Default, Builder)]
pub struct FakeLinkConfig {
    /// Frames the fake device sends after every connect.
    #[builder(default)]
    frames: FakeFrames,
    /// Delay before each device frame.
    #[builder(default)]
    frame_delay: Duration,
}

#[derive(Debug, Default)]
struct FakeConnection {
    cancel: CancellationToken,
    inject: Option<mpsc::UnboundedSender<String>>,
}

/// Connector backed by an in-memory duplex pipe and a scripted device task.
#[derive(Debug)]
pub struct FakeConnector {
    config: FakeLinkConfig,
    sent: Arc<Mutex<Vec<String>>>,
    connections: AtomicUsize,
    current: Mutex<FakeConnection>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(config: FakeLinkConfig) -> Self {
        Self {
            config,
            sent: Arc::default(),
            connections: AtomicUsize::new(0),
            current: Mutex::default(),
        }
    }

    /// Frames the device has received so far, without terminators.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sends `frame` from the device on the current connection.
    ///
    /// Returns `false` when no connection is open.
    pub fn inject(&self, frame: &str) -> bool {
        lock(&self.current)
            .inject
            .as_ref()
            .is_some_and(|inject| inject.send(frame.to_string()).is_ok())
    }

    /// Closes the current connection from the device side.
    pub fn drop_connection(&self) {
        let connection = std::mem::take(&mut *lock(&self.current));
        connection.cancel.cancel();
    }
}

#[async_trait]
impl Connector for FakeConnector {
    #[instrument(skip(self), level = "debug")]
    async fn connect(&self) -> Result<LinkStreams, TransportError> {
        let (client, device) = tokio::io::duplex(DUPLEX_CAPACITY);
        let (device_reader, mut device_writer) = tokio::io::split(device);
        let (inject, mut injected) = mpsc::unbounded_channel::<String>();
        for frame in self.config.frames.frames.iter().cloned() {
            let _ = inject.send(frame);
        }

        let cancel = CancellationToken::new();
        let previous = std::mem::replace(
            &mut *lock(&self.current),
            FakeConnection {
                cancel: cancel.clone(),
                inject: Some(inject),
            },
        );
        previous.cancel.cancel();
        let connection = self.connections.fetch_add(1, Ordering::SeqCst) + 1;

        let sent = Arc::clone(&self.sent);
        let frame_delay = self.config.frame_delay;
        tokio::spawn(async move {
            let mut lines = FramedRead::new(device_reader, DelimitedFrameCodec::default());
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    Some(frame) = injected.recv() => {
                        sleep(frame_delay).await;
                        let line = format!("{frame}\r\n");
                        if device_writer.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    line = lines.next() => match line {
                        Some(Ok(line)) => lock(&sent).push(line),
                        _ => break,
                    },
                }
            }
            debug!(connection, "fake device closed");
        });

        Ok(LinkStreams::new(client))
    }

    fn describe(&self) -> String {
        "fake link".to_string()
    }
}

/// Transport that records every frame instead of writing it anywhere.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose sends always fail as not connected.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    /// Recorded frames, without terminators.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Removes and returns the recorded frames.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.sent))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.failing {
            return Err(TransportError::NotConnected);
        }
        let text = String::from_utf8_lossy(frame);
        lock(&self.sent).push(text.trim_end_matches(['\r', '\n']).to_string());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn fake_frames_parse_semicolon_separated_list() {
        let frames: Vec<String> = "#1ZS PR1+; OK"
            .parse::<FakeFrames>()
            .expect("fixture should parse")
            .into();
        assert_eq!(vec!["#1ZS PR1+", "OK"], frames);
    }

    #[test]
    fn fake_frames_reject_empty_entries() {
        assert_matches!("OK;;OK".parse::<FakeFrames>(), Err(FixtureError::EmptyFrame));
    }

    #[tokio::test]
    async fn fake_connector_replays_frames_and_records_writes() {
        let frames = "OK".parse().expect("fixture should parse");
        let connector = FakeConnector::new(FakeLinkConfig::builder().frames(frames).build());
        let mut streams = connector.connect().await.expect("fake connect");

        let mut greeting = [0u8; 4];
        streams.reader.read_exact(&mut greeting).await.expect("read frame");
        assert_eq!(b"OK\r\n", &greeting);

        streams.writer.write_all(b"?1ZS+\r").await.expect("write frame");
        while connector.sent().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(vec!["?1ZS+"], connector.sent());
        assert_eq!(1, connector.connections());
    }

    #[tokio::test]
    async fn dropped_connection_reaches_end_of_stream() {
        let connector = FakeConnector::new(FakeLinkConfig::default());
        let mut streams = connector.connect().await.expect("fake connect");
        connector.drop_connection();

        let mut buffer = Vec::new();
        let read = streams.reader.read_to_end(&mut buffer).await.expect("read to end");
        assert_eq!(0, read);
        assert!(!connector.inject("OK"));
    }

    #[tokio::test]
    async fn recording_transport_strips_terminators() {
        let transport = RecordingTransport::new();
        transport.send(b"!1PR1+\r").await.expect("send");
        assert_eq!(vec!["!1PR1+"], transport.take());
        assert!(transport.sent().is_empty());

        assert_matches!(
            RecordingTransport::failing().send(b"x").await,
            Err(TransportError::NotConnected)
        );
    }
}
