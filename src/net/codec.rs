//! Length-prefix framing for chat messages.
//!
//! TCP is a stream protocol without message boundaries: the receiver observes
//! arbitrary byte chunks. Every message therefore travels as one frame:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | Payload           |
//! +----------------+-------------------+
//! ```
//!
//! The decoder is push-based: feed it whatever a read returned and collect
//! the payloads that became complete.

use std::sync::Arc;

use crate::error::{PayloadTooLarge, ReadError};

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Longest payload the length header can describe.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

fn frame_header(len: usize) -> Result<[u8; FRAME_HEADER_SIZE], PayloadTooLarge> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| PayloadTooLarge {
            len,
            max: MAX_PAYLOAD_LEN,
        })
}

/// Encode a payload into a shareable frame.
///
/// The same frame is enqueued on every recipient, so it is built once and
/// reference-counted. Payloads longer than [`MAX_PAYLOAD_LEN`] are refused.
pub fn encode_frame(payload: &[u8]) -> Result<Arc<[u8]>, PayloadTooLarge> {
    let header = frame_header(payload.len())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame.into())
}

/// Internal state for incremental decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Accumulating the 4-byte length header.
    Header,
    /// Accumulating a payload of the given length.
    Body { len: usize },
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameDecoder {
    /// Create a decoder that rejects payloads longer than `max_len`.
    pub fn new(max_len: usize) -> Self {
        Self {
            state: DecodeState::Header,
            buffer: Vec::with_capacity(FRAME_HEADER_SIZE),
            max_len,
        }
    }

    /// Bytes of an incomplete frame currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk of received bytes, appending completed payloads to `out`.
    ///
    /// An oversized length header is a protocol violation; the decoder is
    /// unusable afterwards and the connection must be closed.
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<Vec<u8>>) -> Result<(), ReadError> {
        while !chunk.is_empty() {
            let wanted = match self.state {
                DecodeState::Header => FRAME_HEADER_SIZE,
                DecodeState::Body { len } => len,
            };
            let take = (wanted - self.buffer.len()).min(chunk.len());
            self.buffer.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if self.buffer.len() == wanted {
                self.advance(out)?;
            }
        }
        Ok(())
    }

    fn advance(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), ReadError> {
        match self.state {
            DecodeState::Header => {
                let mut header = [0u8; FRAME_HEADER_SIZE];
                header.copy_from_slice(&self.buffer);
                let len = u32::from_be_bytes(header) as usize;
                if len > self.max_len {
                    return Err(ReadError::FrameTooLarge {
                        len,
                        max: self.max_len,
                    });
                }
                self.buffer.clear();
                if len == 0 {
                    out.push(Vec::new());
                } else {
                    self.buffer.reserve(len);
                    self.state = DecodeState::Body { len };
                }
            }
            DecodeState::Body { .. } => {
                out.push(std::mem::take(&mut self.buffer));
                self.state = DecodeState::Header;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn encodes_big_endian_length() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn header_refuses_lengths_beyond_u32() {
        assert_eq!(frame_header(MAX_PAYLOAD_LEN), Ok([0xff; 4]));
        assert_eq!(
            frame_header(MAX_PAYLOAD_LEN + 1),
            Err(PayloadTooLarge {
                len: MAX_PAYLOAD_LEN + 1,
                max: MAX_PAYLOAD_LEN,
            })
        );
    }

    #[test]
    fn decodes_frame_split_across_many_reads() {
        let frame = encode_frame(b"hello world").unwrap();
        let mut decoder = FrameDecoder::new(1024);
        let chunks: Vec<&[u8]> = frame.chunks(3).collect();
        let out = decode_all(&mut decoder, &chunks);
        assert_eq!(out, vec![b"hello world".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decodes_several_frames_from_one_read() {
        let mut wire = Vec::new();
        for msg in [&b"one"[..], b"two", b"three"] {
            wire.extend_from_slice(&encode_frame(msg).unwrap());
        }
        let mut decoder = FrameDecoder::new(1024);
        let out = decode_all(&mut decoder, &[&wire]);
        assert_eq!(out, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn keeps_partial_frame_until_completed() {
        let frame = encode_frame(b"abcdef").unwrap();
        let mut decoder = FrameDecoder::new(1024);
        let out = decode_all(&mut decoder, &[&frame[..6]]);
        assert!(out.is_empty());
        assert_eq!(decoder.buffered(), 2);

        let out = decode_all(&mut decoder, &[&frame[6..]]);
        assert_eq!(out, vec![b"abcdef".to_vec()]);
    }

    #[test]
    fn empty_payload_is_a_frame() {
        let mut wire = encode_frame(b"").unwrap().to_vec();
        wire.extend_from_slice(&encode_frame(b"x").unwrap());
        let mut decoder = FrameDecoder::new(16);
        let out = decode_all(&mut decoder, &[&wire[..4], &wire[4..]]);
        assert_eq!(out, vec![Vec::new(), b"x".to_vec()]);
    }

    #[test]
    fn rejects_oversized_frame() {
        let frame = encode_frame(&[7u8; 32]).unwrap();
        let mut decoder = FrameDecoder::new(16);
        let mut out = Vec::new();
        let err = decoder.feed(&frame, &mut out).unwrap_err();
        assert!(matches!(err, ReadError::FrameTooLarge { len: 32, max: 16 }));
        assert!(out.is_empty());
    }
}
