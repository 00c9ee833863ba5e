use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

const DEFAULT_MAX_FRAME_LEN: usize = 1024;

/// Splits inbound bytes into frames on CR or LF.
///
/// Empty lines are skipped. A line longer than the maximum frame length is
/// discarded up to its delimiter.
#[derive(Debug, Clone)]
pub struct DelimitedFrameCodec {
    max_frame_len: usize,
    discarding: bool,
}

impl DelimitedFrameCodec {
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            discarding: false,
        }
    }
}

impl Default for DelimitedFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for DelimitedFrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|byte| matches!(byte, b'\r' | b'\n')) else {
                if src.len() > self.max_frame_len {
                    warn!(len = src.len(), "discarding oversized inbound line");
                    src.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            let line = src.split_to(end);
            src.advance(1);
            if std::mem::take(&mut self.discarding) || line.is_empty() {
                continue;
            }
            let frame = String::from_utf8_lossy(&line).into_owned();
            trace!(frame = %frame, "received frame");
            return Ok(Some(frame));
        }
    }
}
