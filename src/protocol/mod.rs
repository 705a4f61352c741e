//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary job server protocol:
//! - 12-byte header encoding/decoding
//! - Frame codec (NUL-separated argument lists)
//! - Frame buffer for accumulating partial reads
//! - Async frame reader over any byte stream

mod frame;
mod frame_buffer;
mod reader;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use reader::{FrameReader, DEFAULT_READ_BUFFER_SIZE};
pub use wire_format::{
    packet_type, Header, Magic, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, REQ_MAGIC, RES_MAGIC,
    SEPARATOR,
};
