//! Wire format encoding and decoding.
//!
//! Implements the 12-byte header format:
//! ```text
//! ┌──────────┬──────────┬──────────┐
//! │ Magic    │ Type     │ Size     │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │
//! │ literal  │ int32 BE │ int32 BE │
//! └──────────┴──────────┴──────────┘
//! ```
//!
//! The header is followed by `size` bytes of arguments, separated by a
//! single NUL byte. The last argument is not terminated.

use crate::error::{GearmanError, Result};

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Argument separator byte.
pub const SEPARATOR: u8 = 0;

/// Magic literal for client/worker to server frames.
pub const REQ_MAGIC: [u8; 4] = *b"\0REQ";

/// Magic literal for server to client/worker frames.
pub const RES_MAGIC: [u8; 4] = *b"\0RES";

/// Packet type codes.
pub mod packet_type {
    pub const CAN_DO: i32 = 1;
    pub const CANT_DO: i32 = 2;
    pub const RESET_ABILITIES: i32 = 3;
    pub const PRE_SLEEP: i32 = 4;
    pub const NOOP: i32 = 6;
    pub const SUBMIT_JOB: i32 = 7;
    pub const JOB_CREATED: i32 = 8;
    pub const GRAB_JOB: i32 = 9;
    pub const NO_JOB: i32 = 10;
    pub const JOB_ASSIGN: i32 = 11;
    pub const WORK_STATUS: i32 = 12;
    pub const WORK_COMPLETE: i32 = 13;
    pub const WORK_FAIL: i32 = 14;
    pub const GET_STATUS: i32 = 15;
    pub const ECHO_REQ: i32 = 16;
    pub const ECHO_RES: i32 = 17;
    pub const SUBMIT_JOB_BG: i32 = 18;
    pub const ERROR: i32 = 19;
    pub const STATUS_RES: i32 = 20;
    pub const SUBMIT_JOB_HIGH: i32 = 21;
    pub const SET_CLIENT_ID: i32 = 22;
    pub const CAN_DO_TIMEOUT: i32 = 23;
    pub const ALL_YOURS: i32 = 24;
    pub const WORK_EXCEPTION: i32 = 25;
    pub const OPTION_REQ: i32 = 26;
    pub const OPTION_RES: i32 = 27;
    pub const WORK_DATA: i32 = 28;
    pub const WORK_WARNING: i32 = 29;
    pub const GRAB_JOB_UNIQ: i32 = 30;
    pub const JOB_ASSIGN_UNIQ: i32 = 31;
    pub const SUBMIT_JOB_HIGH_BG: i32 = 32;
    pub const SUBMIT_JOB_LOW: i32 = 33;
    pub const SUBMIT_JOB_LOW_BG: i32 = 34;

    /// Protocol name of a type code, for logging.
    pub fn name(code: i32) -> Option<&'static str> {
        let name = match code {
            CAN_DO => "CAN_DO",
            CANT_DO => "CANT_DO",
            RESET_ABILITIES => "RESET_ABILITIES",
            PRE_SLEEP => "PRE_SLEEP",
            NOOP => "NOOP",
            SUBMIT_JOB => "SUBMIT_JOB",
            JOB_CREATED => "JOB_CREATED",
            GRAB_JOB => "GRAB_JOB",
            NO_JOB => "NO_JOB",
            JOB_ASSIGN => "JOB_ASSIGN",
            WORK_STATUS => "WORK_STATUS",
            WORK_COMPLETE => "WORK_COMPLETE",
            WORK_FAIL => "WORK_FAIL",
            GET_STATUS => "GET_STATUS",
            ECHO_REQ => "ECHO_REQ",
            ECHO_RES => "ECHO_RES",
            SUBMIT_JOB_BG => "SUBMIT_JOB_BG",
            ERROR => "ERROR",
            STATUS_RES => "STATUS_RES",
            SUBMIT_JOB_HIGH => "SUBMIT_JOB_HIGH",
            SET_CLIENT_ID => "SET_CLIENT_ID",
            CAN_DO_TIMEOUT => "CAN_DO_TIMEOUT",
            ALL_YOURS => "ALL_YOURS",
            WORK_EXCEPTION => "WORK_EXCEPTION",
            OPTION_REQ => "OPTION_REQ",
            OPTION_RES => "OPTION_RES",
            WORK_DATA => "WORK_DATA",
            WORK_WARNING => "WORK_WARNING",
            GRAB_JOB_UNIQ => "GRAB_JOB_UNIQ",
            JOB_ASSIGN_UNIQ => "JOB_ASSIGN_UNIQ",
            SUBMIT_JOB_HIGH_BG => "SUBMIT_JOB_HIGH_BG",
            SUBMIT_JOB_LOW => "SUBMIT_JOB_LOW",
            SUBMIT_JOB_LOW_BG => "SUBMIT_JOB_LOW_BG",
            _ => return None,
        };
        Some(name)
    }
}

/// Frame category, carried as the 4-byte magic literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// `\0REQ`
    Request,
    /// `\0RES`
    Response,
}

impl Magic {
    /// The 4 literal bytes written on the wire.
    #[inline]
    pub fn as_bytes(&self) -> [u8; 4] {
        match self {
            Magic::Request => REQ_MAGIC,
            Magic::Response => RES_MAGIC,
        }
    }

    /// Parse the magic literal.
    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self> {
        match bytes {
            REQ_MAGIC => Ok(Magic::Request),
            RES_MAGIC => Ok(Magic::Response),
            other => Err(GearmanError::Decoding(format!(
                "Unknown magic {:02x?}",
                other
            ))),
        }
    }
}

/// Raw header as read from the wire.
///
/// The magic is kept verbatim; the framer only trusts `payload_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic literal (`\0REQ` or `\0RES` on a well-behaved stream).
    pub magic: [u8; 4],
    /// Packet type code.
    pub packet_type: i32,
    /// Declared size of the argument bytes following the header.
    pub payload_size: i32,
}

impl Header {
    /// Create a new header.
    pub fn new(magic: Magic, packet_type: i32, payload_size: i32) -> Self {
        Self {
            magic: magic.as_bytes(),
            packet_type,
            payload_size,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use gearman_client::protocol::{packet_type, Header, Magic};
    ///
    /// let header = Header::new(Magic::Request, packet_type::SUBMIT_JOB, 5);
    /// let bytes = header.encode();
    /// assert_eq!(&bytes[..4], b"\0REQ");
    /// assert_eq!(bytes.len(), 12);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.packet_type.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            packet_type: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            payload_size: i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Check the declared payload size and return it as a length.
    ///
    /// Negative sizes and sizes above `max_payload_size` are rejected.
    pub fn validate(&self, max_payload_size: u32) -> Result<usize> {
        if self.payload_size < 0 {
            return Err(GearmanError::Decoding(format!(
                "Negative payload size {}",
                self.payload_size
            )));
        }
        let size = self.payload_size as u32;
        if size > max_payload_size {
            return Err(GearmanError::Decoding(format!(
                "Payload size {} exceeds maximum {}",
                size, max_payload_size
            )));
        }
        Ok(size as usize)
    }

    /// Total frame length (header + payload) for a validated header.
    #[inline]
    pub fn frame_len(&self, max_payload_size: u32) -> Result<usize> {
        Ok(HEADER_SIZE + self.validate(max_payload_size)?)
    }
}
