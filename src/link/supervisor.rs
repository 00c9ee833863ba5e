use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::delimited::DelimitedFrameCodec;
use super::transport::{BoxedReader, BoxedWriter, Connector, LinkEvent, LinkStreams, Transport};
use crate::error::TransportError;
use crate::utils::format_frame;

const LINK_EVENT_CAPACITY: usize = 16;

/// Connection supervision settings.
#[derive(Debug, Clone, Builder)]
pub struct LinkConfig {
    /// Upper bound for one outbound write.
    #[builder(default = Duration::from_millis(500))]
    send_timeout: Duration,
    /// Delay before the first reconnect attempt.
    #[builder(default = Duration::from_secs(1))]
    reconnect_delay: Duration,
    /// Reconnect backoff ceiling.
    #[builder(default = Duration::from_secs(30))]
    max_reconnect_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The write side of the supervised link, shared with the engine.
#[derive(Debug)]
pub struct LinkHandle {
    writer: Mutex<Option<WriterSlot>>,
    send_timeout: Duration,
    events: broadcast::Sender<LinkEvent>,
    connected: watch::Sender<bool>,
    sessions: AtomicU64,
}

/// Writer of the current session and the token that ends that session when
/// a write on it fails.
struct WriterSlot {
    writer: BoxedWriter,
    failed: CancellationToken,
}

impl WriterSlot {
    async fn write(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }
}

impl std::fmt::Debug for WriterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSlot")
            .field("failed", &self.failed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl LinkHandle {
    fn new(send_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(LINK_EVENT_CAPACITY);
        Self {
            writer: Mutex::new(None),
            send_timeout,
            events,
            connected: watch::Sender::new(false),
            sessions: AtomicU64::new(0),
        }
    }

    /// Subscribes to link-state transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Watches whether a connection is currently open.
    #[must_use]
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Installs the writer of a new session. The returned token is cancelled
    /// when a write on this writer fails.
    async fn attach(&self, writer: BoxedWriter) -> (u64, CancellationToken) {
        let failed = CancellationToken::new();
        *self.writer.lock().await = Some(WriterSlot {
            writer,
            failed: failed.clone(),
        });
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.connected.send_replace(true);
        let _ = self.events.send(LinkEvent::Established { session });
        (session, failed)
    }

    async fn detach(&self) {
        *self.writer.lock().await = None;
        self.connected.send_replace(false);
        let _ = self.events.send(LinkEvent::Lost);
    }
}

#[async_trait]
impl Transport for LinkHandle {
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let write = async {
            let mut current = self.writer.lock().await;
            let Some(slot) = current.as_mut() else {
                return Err(TransportError::NotConnected);
            };
            let written = slot.write(frame).await;
            if let Err(error) = &written {
                warn!(%error, "link write failed");
                slot.failed.cancel();
            }
            Ok(written?)
        };
        match timeout(self.send_timeout, write).await {
            Ok(Ok(())) => {
                debug!(frame = %format_frame(frame), "sent frame");
                Ok(())
            }
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => {
                warn!(timeout = ?self.send_timeout, "send timed out");
                Err(TransportError::SendTimeout {
                    timeout: self.send_timeout,
                })
            }
        }
    }
}

/// Why one connection ended.
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    ConsumerGone,
    EndOfStream,
    WriteFailed,
    ReadFailed(std::io::Error),
}

/// Owns the physical link: connects, reconnects with backoff, and forwards
/// delimited inbound frames.
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    config: LinkConfig,
    handle: Arc<LinkHandle>,
}

impl ConnectionSupervisor {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: LinkConfig) -> Self {
        let handle = Arc::new(LinkHandle::new(config.send_timeout));
        Self {
            connector,
            config,
            handle,
        }
    }

    /// Shared write side; subscribe through it before calling [`Self::spawn`]
    /// to observe the first link-up.
    #[must_use]
    pub fn handle(&self) -> Arc<LinkHandle> {
        Arc::clone(&self.handle)
    }

    /// Starts supervising. Inbound frames are delivered on `frames` until
    /// `cancel` fires or the receiver is dropped.
    pub fn spawn(self, frames: mpsc::Sender<String>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(frames, cancel))
    }

    #[instrument(skip_all, fields(link = %self.connector.describe()))]
    async fn run(self, frames: mpsc::Sender<String>, cancel: CancellationToken) {
        let mut delay = self.config.reconnect_delay;
        loop {
            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                connected = self.connector.connect() => connected,
            };
            match connected {
                Ok(LinkStreams { reader, writer }) => {
                    delay = self.config.reconnect_delay;
                    let (session, write_failed) = self.handle.attach(writer).await;
                    info!(session, "link established");
                    let end = Self::pump(reader, &frames, &cancel, &write_failed).await;
                    self.handle.detach().await;
                    match end {
                        SessionEnd::Cancelled | SessionEnd::ConsumerGone => {
                            info!(session, "link closed");
                            break;
                        }
                        SessionEnd::ReadFailed(error) => {
                            warn!(session, %error, "link read failed");
                        }
                        end => warn!(session, ?end, "link lost"),
                    }
                }
                Err(error) => warn!(%error, retry_in = ?delay, "link connect failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
            delay = (delay * 2).min(self.config.max_reconnect_delay);
        }
    }

    async fn pump(
        reader: BoxedReader,
        frames: &mpsc::Sender<String>,
        cancel: &CancellationToken,
        write_failed: &CancellationToken,
    ) -> SessionEnd {
        let mut lines = FramedRead::new(reader, DelimitedFrameCodec::default());
        loop {
            tokio::select! {
                () = cancel.cancelled() => return SessionEnd::Cancelled,
                () = write_failed.cancelled() => return SessionEnd::WriteFailed,
                line = lines.next() => match line {
                    Some(Ok(frame)) => {
                        if frames.send(frame).await.is_err() {
                            return SessionEnd::ConsumerGone;
                        }
                    }
                    Some(Err(error)) => return SessionEnd::ReadFailed(error),
                    None => return SessionEnd::EndOfStream,
                },
            }
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("link", &self.connector.describe())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
