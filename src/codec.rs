//! Chat line codec
//!
//! Newline framing with a length cap. An over-long line is discarded up to
//! its newline and reading carries on with the next line, so one oversized
//! message never ends a connection.
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::config::MAX_LINE_LENGTH;

/// Line codec that skips lines longer than its limit
#[derive(Debug)]
pub struct ChatCodec {
    inner: LinesCodec,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        loop {
            match self.inner.decode(src) {
                // LinesCodec keeps discarding until the next newline on the following call
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarding line over {} bytes", self.inner.max_length());
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        loop {
            match self.inner.decode_eof(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarding line over {} bytes", self.inner.max_length());
                }
                other => return other,
            }
        }
    }
}

impl<T> Encoder<T> for ChatCodec
where
    T: AsRef<str>,
{
    type Error = LinesCodecError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.inner.encode(line, dst)
    }
}
