//! Length-prefixed framing for protocol messages
//!
//! A frame is a 4-byte big-endian body length followed by a JSON body.
//! The decoder buffers partial input across reads and uses nom's streaming
//! parsers to tell an incomplete frame from a complete one.

use crate::error::{BandHubError, Result};
use nom::{bytes::streaming::take, number::streaming::be_u32, IResult};
use serde::{de::DeserializeOwned, Serialize};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Default upper bound on a frame body
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

fn frame_header(input: &[u8]) -> IResult<&[u8], u32> {
    be_u32(input)
}

fn frame_body(input: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len)(input)
}

/// Serialize a message into a self-delimited frame
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len())
        .map_err(|_| BandHubError::Server(format!("message of {} bytes is too large", body.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Per-connection decode state
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
        }
    }

    /// Append bytes received from the socket
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// True if some bytes of an unfinished frame are buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Decode the next complete message.
    ///
    /// Returns `Ok(None)` when more bytes are needed and `MalformedStream`
    /// when the buffered bytes can never form a valid message.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let (rest, len) = match frame_header(&self.buffer) {
            Ok(parsed) => parsed,
            Err(nom::Err::Incomplete(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let len = len as usize;
        if len == 0 {
            return Err(BandHubError::MalformedStream("empty frame".to_string()));
        }
        if len > self.max_frame_len {
            return Err(BandHubError::MalformedStream(format!(
                "frame of {} bytes exceeds limit of {}",
                len, self.max_frame_len
            )));
        }

        let message = match frame_body(rest, len) {
            Ok((_, body)) => serde_json::from_slice(body)
                .map_err(|e| BandHubError::MalformedStream(format!("invalid message body: {}", e)))?,
            Err(nom::Err::Incomplete(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        self.buffer.drain(..HEADER_LEN + len);
        Ok(Some(message))
    }
}
