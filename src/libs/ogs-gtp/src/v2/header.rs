//! GTPv2 Header
//!
//! GTPv2-C header structure as specified in 3GPP TS 29.274, and the
//! request/response classification of the message types the serving
//! gateway exchanges.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use crate::error::{GtpError, GtpResult};

/// GTPv2-C header length (with TEID)
pub const GTPV2C_HEADER_LEN: usize = 12;

/// GTPv2-C header length (without TEID)
pub const GTPV2C_HEADER_LEN_NO_TEID: usize = 8;

/// Largest value carried by the 24-bit sequence number field
pub const GTP2_MAX_SQN: u32 = 0x00FF_FFFF;

/// High bit of the sequence number; the local counter wraps before reaching it
pub const GTP2_SQN_RESERVED_BIT: u32 = 0x0080_0000;

/// GTPv2-C Message Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gtp2MessageType {
    EchoRequest = 1,
    EchoResponse = 2,
    VersionNotSupportedIndication = 3,
    CreateSessionRequest = 32,
    CreateSessionResponse = 33,
    ModifyBearerRequest = 34,
    ModifyBearerResponse = 35,
    DeleteSessionRequest = 36,
    DeleteSessionResponse = 37,
    ReleaseAccessBearersRequest = 170,
    ReleaseAccessBearersResponse = 171,
    DownlinkDataNotification = 176,
    DownlinkDataNotificationAcknowledge = 177,
}

impl TryFrom<u8> for Gtp2MessageType {
    type Error = GtpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::EchoRequest),
            2 => Ok(Self::EchoResponse),
            3 => Ok(Self::VersionNotSupportedIndication),
            32 => Ok(Self::CreateSessionRequest),
            33 => Ok(Self::CreateSessionResponse),
            34 => Ok(Self::ModifyBearerRequest),
            35 => Ok(Self::ModifyBearerResponse),
            36 => Ok(Self::DeleteSessionRequest),
            37 => Ok(Self::DeleteSessionResponse),
            170 => Ok(Self::ReleaseAccessBearersRequest),
            171 => Ok(Self::ReleaseAccessBearersResponse),
            176 => Ok(Self::DownlinkDataNotification),
            177 => Ok(Self::DownlinkDataNotificationAcknowledge),
            _ => Err(GtpError::InvalidMessageType(value)),
        }
    }
}

impl Gtp2MessageType {
    /// Message name as logged
    pub fn name(&self) -> &'static str {
        match self {
            Self::EchoRequest => "ECHO_REQUEST",
            Self::EchoResponse => "ECHO_RESPONSE",
            Self::VersionNotSupportedIndication => "VERSION_NOT_SUPPORTED_INDICATION",
            Self::CreateSessionRequest => "CREATE_SESSION_REQUEST",
            Self::CreateSessionResponse => "CREATE_SESSION_RESPONSE",
            Self::ModifyBearerRequest => "MODIFY_BEARER_REQUEST",
            Self::ModifyBearerResponse => "MODIFY_BEARER_RESPONSE",
            Self::DeleteSessionRequest => "DELETE_SESSION_REQUEST",
            Self::DeleteSessionResponse => "DELETE_SESSION_RESPONSE",
            Self::ReleaseAccessBearersRequest => "RELEASE_ACCESS_BEARERS_REQUEST",
            Self::ReleaseAccessBearersResponse => "RELEASE_ACCESS_BEARERS_RESPONSE",
            Self::DownlinkDataNotification => "DOWNLINK_DATA_NOTIFICATION",
            Self::DownlinkDataNotificationAcknowledge => "DOWNLINK_DATA_NOTIFICATION_ACKNOWLEDGE",
        }
    }
}

/// Whether a message type may open a transaction on the receiving side
pub fn is_initial_message(message_type: u8) -> bool {
    matches!(
        Gtp2MessageType::try_from(message_type),
        Ok(Gtp2MessageType::EchoRequest
            | Gtp2MessageType::CreateSessionRequest
            | Gtp2MessageType::ModifyBearerRequest
            | Gtp2MessageType::DeleteSessionRequest
            | Gtp2MessageType::ReleaseAccessBearersRequest
            | Gtp2MessageType::DownlinkDataNotification)
    )
}

/// Response type triggered by an initial message type
pub fn triggered_message_type(initial: u8) -> Option<u8> {
    if is_initial_message(initial) {
        Some(initial + 1)
    } else {
        None
    }
}

/// Whether `received` is an acceptable answer to `initial`
pub fn is_triggered_message(initial: u8, received: u8) -> bool {
    triggered_message_type(initial) == Some(received)
}

/// GTPv2-C Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2Header {
    /// Version (3 bits) - should be 2 for GTPv2
    pub version: u8,
    /// Piggybacked flag (1 bit)
    pub piggybacked: bool,
    /// TEID presence flag (1 bit)
    pub teid_presence: bool,
    /// Message Type
    pub message_type: u8,
    /// Message Length (excluding first 4 bytes of header)
    pub length: u16,
    /// Tunnel Endpoint Identifier (optional, present if teid_presence=1)
    pub teid: Option<u32>,
    /// Sequence Number (24 bits)
    pub sequence_number: u32,
}

impl Gtp2Header {
    /// Create a new GTPv2-C header with TEID
    pub fn new(message_type: u8, teid: u32, sequence_number: u32) -> Self {
        Self {
            version: 2,
            piggybacked: false,
            teid_presence: true,
            message_type,
            length: 0,
            teid: Some(teid),
            sequence_number: sequence_number & GTP2_MAX_SQN,
        }
    }

    /// Create a new GTPv2-C header without TEID (echo messages)
    pub fn new_no_teid(message_type: u8, sequence_number: u32) -> Self {
        Self {
            version: 2,
            piggybacked: false,
            teid_presence: false,
            message_type,
            length: 0,
            teid: None,
            sequence_number: sequence_number & GTP2_MAX_SQN,
        }
    }

    /// Get the flags byte
    pub fn flags(&self) -> u8 {
        let mut flags = (self.version & 0x07) << 5;
        if self.piggybacked {
            flags |= 0x10;
        }
        if self.teid_presence {
            flags |= 0x08;
        }
        flags
    }

    /// Get header length
    pub fn header_len(&self) -> usize {
        if self.teid_presence {
            GTPV2C_HEADER_LEN
        } else {
            GTPV2C_HEADER_LEN_NO_TEID
        }
    }

    /// Set `length` for a body of `body_len` bytes
    pub fn set_body_len(&mut self, body_len: usize) -> GtpResult<()> {
        let len = self.header_len() - 4 + body_len;
        self.length = u16::try_from(len).map_err(|_| {
            GtpError::EncodingError(format!("message too long: {len} bytes"))
        })?;
        Ok(())
    }

    /// Encode header to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags());
        buf.put_u8(self.message_type);
        buf.put_u16(self.length);

        if self.teid_presence {
            buf.put_u32(self.teid.unwrap_or(0));
        }

        // Sequence number (24 bits) + spare (8 bits)
        buf.put_u32((self.sequence_number & GTP2_MAX_SQN) << 8);
    }

    /// Decode header from bytes
    pub fn decode(buf: &mut Bytes) -> GtpResult<Self> {
        if buf.remaining() < 4 {
            return Err(GtpError::BufferTooShort {
                needed: 4,
                available: buf.remaining(),
            });
        }

        let flags = buf.get_u8();
        let version = (flags >> 5) & 0x07;
        let piggybacked = (flags & 0x10) != 0;
        let teid_presence = (flags & 0x08) != 0;

        let message_type = buf.get_u8();
        let length = buf.get_u16();

        if version != 2 {
            return Err(GtpError::InvalidVersion(version));
        }

        let min_remaining = if teid_presence { 8 } else { 4 };
        if buf.remaining() < min_remaining {
            return Err(GtpError::BufferTooShort {
                needed: min_remaining,
                available: buf.remaining(),
            });
        }

        let teid = if teid_presence {
            Some(buf.get_u32())
        } else {
            None
        };

        let sequence_number = buf.get_u32() >> 8;

        Ok(Self {
            version,
            piggybacked,
            teid_presence,
            message_type,
            length,
            teid,
            sequence_number,
        })
    }
}
