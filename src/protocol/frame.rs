//! Frame struct with codec and typed accessors.
//!
//! A frame is a magic, a packet type code and an ordered list of
//! arguments. Arguments are `bytes::Bytes` slices of the decoded buffer,
//! so decoding does not copy argument data.
//!
//! # Example
//!
//! ```
//! use gearman_client::protocol::{packet_type, Frame, Magic};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(
//!     Magic::Request,
//!     packet_type::SUBMIT_JOB,
//!     vec![Bytes::from_static(b"reverse"), Bytes::new(), Bytes::from_static(b"hello")],
//! );
//! let bytes = frame.encode().unwrap();
//! assert_eq!(Frame::decode(bytes).unwrap(), frame);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, Magic, HEADER_SIZE, SEPARATOR};
use crate::error::{GearmanError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request or response.
    pub magic: Magic,
    /// Packet type code (see [`packet_type`](super::packet_type)).
    pub packet_type: i32,
    /// Ordered arguments; none may contain a NUL byte.
    pub arguments: Vec<Bytes>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(magic: Magic, packet_type: i32, arguments: Vec<Bytes>) -> Self {
        Self {
            magic,
            packet_type,
            arguments,
        }
    }

    /// Create a request frame (client to server).
    pub fn request(packet_type: i32, arguments: Vec<Bytes>) -> Self {
        Self::new(Magic::Request, packet_type, arguments)
    }

    /// Create a response frame (server to client).
    pub fn response(packet_type: i32, arguments: Vec<Bytes>) -> Self {
        Self::new(Magic::Response, packet_type, arguments)
    }

    /// Get an argument by position.
    #[inline]
    pub fn argument(&self, index: usize) -> Option<&Bytes> {
        self.arguments.get(index)
    }

    /// Job handle carried as argument 0.
    ///
    /// Only meaningful for frame types that address a job. Returns `None`
    /// when the frame has no arguments.
    pub fn handle(&self) -> Option<String> {
        self.arguments
            .first()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
    }

    /// Size of the argument bytes: data plus one separator between each pair.
    pub fn payload_size(&self) -> usize {
        let data: usize = self.arguments.iter().map(Bytes::len).sum();
        data + self.arguments.len().saturating_sub(1)
    }

    /// Encode the frame to its exact wire representation.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if an argument contains the NUL separator or the
    /// payload does not fit the 32-bit size field.
    pub fn encode(&self) -> Result<Bytes> {
        if let Some(index) = self
            .arguments
            .iter()
            .position(|arg| arg.contains(&SEPARATOR))
        {
            return Err(GearmanError::Encoding(format!(
                "Argument {} contains a NUL separator byte",
                index
            )));
        }

        let size = self.payload_size();
        let declared = i32::try_from(size).map_err(|_| {
            GearmanError::Encoding(format!("Payload size {} does not fit in 32 bits", size))
        })?;

        let header = Header::new(self.magic, self.packet_type, declared);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + size);
        buf.put_slice(&header.encode());

        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                buf.put_u8(SEPARATOR);
            }
            buf.put_slice(arg);
        }

        Ok(buf.freeze())
    }

    /// Decode one complete frame buffer.
    ///
    /// The buffer must hold exactly one frame, as produced by the framer.
    /// An empty payload yields zero arguments.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the buffer is shorter than the header, the magic
    /// is unknown, or the declared size does not match the buffer.
    pub fn decode(buf: Bytes) -> Result<Self> {
        let header = Header::decode(&buf).ok_or_else(|| {
            GearmanError::Decoding(format!(
                "Buffer of {} bytes is shorter than the {}-byte header",
                buf.len(),
                HEADER_SIZE
            ))
        })?;

        let magic = Magic::from_bytes(header.magic)?;

        let remaining = buf.len() - HEADER_SIZE;
        if header.payload_size < 0 || header.payload_size as usize != remaining {
            return Err(GearmanError::Decoding(format!(
                "Header declares {} payload bytes but buffer holds {}",
                header.payload_size, remaining
            )));
        }

        let arguments = if remaining > 0 {
            split_arguments(buf.slice(HEADER_SIZE..))
        } else {
            Vec::new()
        };

        Ok(Self {
            magic,
            packet_type: header.packet_type,
            arguments,
        })
    }
}

/// Split a payload on the separator byte into zero-copy slices.
fn split_arguments(payload: Bytes) -> Vec<Bytes> {
    let mut arguments = Vec::new();
    let mut start = 0;

    for (i, byte) in payload.iter().enumerate() {
        if *byte == SEPARATOR {
            arguments.push(payload.slice(start..i));
            start = i + 1;
        }
    }
    arguments.push(payload.slice(start..));

    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet_type;

    fn args(values: &[&[u8]]) -> Vec<Bytes> {
        values.iter().map(|v| Bytes::copy_from_slice(v)).collect()
    }

    #[test]
    fn test_encode_three_arguments() {
        let frame = Frame::request(3, args(&[&[4], &[5], &[6]]));
        let bytes = frame.encode().unwrap();

        assert_eq!(
            &bytes[..],
            &[0, b'R', b'E', b'Q', 0, 0, 0, 3, 0, 0, 0, 5, 4, 0, 5, 0, 6]
        );
    }

    #[test]
    fn test_decode_three_arguments() {
        let bytes = Bytes::from_static(&[0, b'R', b'E', b'Q', 0, 0, 0, 3, 0, 0, 0, 5, 4, 0, 5, 0, 6]);
        let frame = Frame::decode(bytes).unwrap();

        assert_eq!(frame, Frame::request(3, args(&[&[4], &[5], &[6]])));
    }

    #[test]
    fn test_zero_arguments() {
        let frame = Frame::request(3, Vec::new());
        let bytes = frame.encode().unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(Frame::decode(bytes).unwrap(), frame);
    }

    #[test]
    fn test_empty_middle_argument_survives() {
        let frame = Frame::request(packet_type::SUBMIT_JOB, args(&[b"fn", b"", b"data"]));
        let bytes = frame.encode().unwrap();

        assert_eq!(frame.payload_size(), 8);
        assert_eq!(Frame::decode(bytes).unwrap(), frame);
    }

    #[test]
    fn test_encode_rejects_separator_in_argument() {
        let frame = Frame::request(packet_type::SUBMIT_JOB, args(&[b"fn", b"", b"a\0b"]));
        let err = frame.encode().unwrap_err();

        assert!(matches!(err, GearmanError::Encoding(_)));
        assert!(err.to_string().contains("Argument 2"));
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = Frame::decode(Bytes::from_static(b"\0RES\0\0")).unwrap_err();
        assert!(matches!(err, GearmanError::Decoding(_)));
    }

    #[test]
    fn test_decode_unknown_magic() {
        let bytes = Bytes::from_static(&[0, 1, 2, 3, 0, 0, 0, 3, 0, 0, 0, 0]);
        assert!(matches!(
            Frame::decode(bytes),
            Err(GearmanError::Decoding(_))
        ));
    }

    #[test]
    fn test_decode_size_mismatch() {
        let mut raw = Frame::response(packet_type::WORK_DATA, args(&[b"H", b"x"]))
            .encode()
            .unwrap()
            .to_vec();
        raw.push(b'y');

        let err = Frame::decode(Bytes::from(raw)).unwrap_err();
        assert!(err.to_string().contains("declares 3 payload bytes"));
    }

    #[test]
    fn test_handle() {
        let frame = Frame::response(packet_type::JOB_CREATED, args(&[b"The Handle"]));
        assert_eq!(frame.handle().as_deref(), Some("The Handle"));

        let empty = Frame::response(packet_type::NOOP, Vec::new());
        assert_eq!(empty.handle(), None);
    }

    #[test]
    fn test_decoded_arguments_share_buffer() {
        let bytes = Frame::response(packet_type::WORK_DATA, args(&[b"H:1", b"payload"]))
            .encode()
            .unwrap();
        let base = bytes.as_ptr();
        let frame = Frame::decode(bytes).unwrap();

        assert_eq!(frame.arguments[1].as_ptr(), base.wrapping_add(HEADER_SIZE + 4));
    }
}
