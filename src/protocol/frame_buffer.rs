//! Stream framer: turns arbitrarily chunked reads into whole frames.
//!
//! Bytes accumulate in a `BytesMut`; complete frames are split off without
//! copying. Two states:
//! - `WaitingForHeader`: Need at least 12 bytes
//! - `WaitingForBody`: Header parsed, need the rest of the frame
//!
//! Frame boundaries come only from the declared size in the header. NUL
//! bytes inside the payload are argument separators and never end a frame.
//!
//! # Example
//!
//! ```
//! use gearman_client::protocol::{packet_type, Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = Frame::response(packet_type::NOOP, Vec::new()).encode().unwrap();
//!
//! let frames = buffer.push(&bytes).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0], bytes);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame boundary detection.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header (need 12 bytes).
    WaitingForHeader,
    /// Header parsed, waiting until `frame_len` bytes are buffered.
    WaitingForBody { frame_len: usize },
}

/// Buffer for accumulating incoming bytes and slicing off complete frames.
///
/// Each emitted `Bytes` is one whole wire frame (header included), ready
/// for [`Frame::decode`](super::Frame::decode).
pub struct FrameBuffer {
    /// Bytes received but not yet emitted.
    buffer: BytesMut,
    state: State,
    /// Largest payload a header may declare.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Framer accepting payloads up to 1GB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Framer with a custom payload limit.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Append `data` and return every frame it completes.
    ///
    /// A trailing partial frame stays buffered.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if a header declares a negative or oversized payload.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append without framing.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Slice off the next complete frame, if one is buffered.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the header declares an impossible size
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };

                    let frame_len = header.frame_len(self.max_payload_size)?;
                    self.state = State::WaitingForBody { frame_len };
                }

                State::WaitingForBody { frame_len } => {
                    if self.buffer.len() < frame_len {
                        return Ok(None);
                    }

                    self.state = State::WaitingForHeader;
                    return Ok(Some(self.buffer.split_to(frame_len).freeze()));
                }
            }
        }
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{packet_type, Frame, Magic};

    fn frame_bytes(packet_type: i32, args: &[&[u8]]) -> Bytes {
        let arguments = args.iter().map(|a| Bytes::copy_from_slice(a)).collect();
        Frame::response(packet_type, arguments).encode().unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(packet_type::WORK_DATA, &[b"H:1", b"hello"]);

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames, vec![bytes]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let f1 = frame_bytes(packet_type::JOB_CREATED, &[b"H:1"]);
        let f2 = frame_bytes(packet_type::WORK_DATA, &[b"H:1", b"x"]);
        let f3 = frame_bytes(packet_type::WORK_COMPLETE, &[b"H:1", b""]);

        let combined = [&f1[..], &f2[..], &f3[..]].concat();
        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames, vec![f1, f2, f3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(packet_type::WORK_DATA, &[b"H:1", b"test"]);

        assert!(buffer.push(&bytes[..5]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(frames, vec![bytes]);
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(
            packet_type::WORK_DATA,
            &[b"H:1", b"this is a longer payload that will be fragmented"],
        );

        let partial = HEADER_SIZE + 10;
        assert!(buffer.push(&bytes[..partial]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let frames = buffer.push(&bytes[partial..]).unwrap();
        assert_eq!(frames, vec![bytes]);
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_zero_argument_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(packet_type::NOOP, &[]);

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), HEADER_SIZE);
    }

    #[test]
    fn test_separators_do_not_end_frames() {
        let mut buffer = FrameBuffer::new();
        let f1 = frame_bytes(packet_type::WORK_COMPLETE, &[b"", b"", b""]);
        let f2 = frame_bytes(packet_type::NOOP, &[]);

        let combined = [&f1[..], &f2[..]].concat();
        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames, vec![f1, f2]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let f1 = frame_bytes(packet_type::JOB_CREATED, &[b"H:1"]);
        let f2 = frame_bytes(packet_type::WORK_STATUS, &[b"H:1", b"1", b"2"]);
        let combined = [&f1[..], &f2[..]].concat();

        let mut all = Vec::new();
        for byte in &combined {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all, vec![f1, f2]);
    }

    #[test]
    fn test_max_payload_validation() {
        let mut buffer = FrameBuffer::with_max_payload(100);
        let header = Header::new(Magic::Response, packet_type::WORK_DATA, 1000);

        let err = buffer.push(&header.encode()).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_negative_payload_rejected() {
        let mut buffer = FrameBuffer::new();
        let header = Header::new(Magic::Response, packet_type::WORK_DATA, -5);

        assert!(buffer.push(&header.encode()).is_err());
    }
}
