//! GTPv2 Messages
//!
//! Decoded GTPv2-C messages exchanged by the serving gateway and their
//! datagram codec. The header is encoded as specified in TS 29.274; the
//! message body travels as a `bincode` image of the decoded structure.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use crate::error::{GtpError, GtpResult};
use super::header::{Gtp2Header, Gtp2MessageType};
use super::types::{
    Gtp2Ambr, Gtp2Arp, Gtp2BearerQos, Gtp2Cause, Gtp2FTeid, Gtp2Indication, Gtp2Paa,
    Gtp2PdnType, Gtp2PlmnId, Gtp2RatType, Gtp2UeTimeZone, Gtp2Uli,
};

/// Bearer Context grouped IE
///
/// One shape serves every bearer list the gateway relays; each message
/// fills only the members its IE instance defines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BearerContext {
    pub ebi: u8,
    pub cause: Option<Gtp2Cause>,
    pub s1u_enb_fteid: Option<Gtp2FTeid>,
    pub s1u_sgw_fteid: Option<Gtp2FTeid>,
    pub s5s8_u_sgw_fteid: Option<Gtp2FTeid>,
    pub s5s8_u_pgw_fteid: Option<Gtp2FTeid>,
    pub bearer_qos: Option<Gtp2BearerQos>,
}

impl BearerContext {
    pub fn new(ebi: u8) -> Self {
        Self {
            ebi,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub recovery: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub recovery: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub imsi: String,
    pub msisdn: Option<String>,
    pub mei: Option<String>,
    pub uli: Option<Gtp2Uli>,
    pub serving_network: Option<Gtp2PlmnId>,
    pub rat_type: Gtp2RatType,
    pub indication: Option<Gtp2Indication>,
    pub sender_fteid: Option<Gtp2FTeid>,
    pub pgw_s5s8_cp_fteid: Option<Gtp2FTeid>,
    pub apn: String,
    pub selection_mode: Option<u8>,
    pub pdn_type: Gtp2PdnType,
    pub paa: Option<Gtp2Paa>,
    pub apn_restriction: Option<u8>,
    pub apn_ambr: Option<Gtp2Ambr>,
    pub pco: Option<Vec<u8>>,
    pub bearer_contexts_to_be_created: Vec<BearerContext>,
    pub bearer_contexts_to_be_removed: Vec<BearerContext>,
    pub recovery: Option<u8>,
    pub ue_time_zone: Option<Gtp2UeTimeZone>,
}

impl CreateSessionRequest {
    /// Request with only the always-present members filled
    pub fn new(imsi: &str, apn: &str, pdn_type: Gtp2PdnType) -> Self {
        Self {
            imsi: imsi.to_string(),
            msisdn: None,
            mei: None,
            uli: None,
            serving_network: None,
            rat_type: Gtp2RatType::Eutran,
            indication: None,
            sender_fteid: None,
            pgw_s5s8_cp_fteid: None,
            apn: apn.to_string(),
            selection_mode: None,
            pdn_type,
            paa: None,
            apn_restriction: None,
            apn_ambr: None,
            pco: None,
            bearer_contexts_to_be_created: Vec::new(),
            bearer_contexts_to_be_removed: Vec::new(),
            recovery: None,
            ue_time_zone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub cause: Gtp2Cause,
    pub sender_fteid: Option<Gtp2FTeid>,
    pub pgw_s5s8_cp_fteid: Option<Gtp2FTeid>,
    pub paa: Option<Gtp2Paa>,
    pub apn_restriction: Option<u8>,
    pub apn_ambr: Option<Gtp2Ambr>,
    pub pco: Option<Vec<u8>>,
    pub bearer_contexts_created: Vec<BearerContext>,
    pub bearer_contexts_marked_for_removal: Vec<BearerContext>,
    pub recovery: Option<u8>,
}

impl CreateSessionResponse {
    pub fn new(cause: Gtp2Cause) -> Self {
        Self {
            cause,
            sender_fteid: None,
            pgw_s5s8_cp_fteid: None,
            paa: None,
            apn_restriction: None,
            apn_ambr: None,
            pco: None,
            bearer_contexts_created: Vec::new(),
            bearer_contexts_marked_for_removal: Vec::new(),
            recovery: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifyBearerRequest {
    pub mei: Option<String>,
    pub uli: Option<Gtp2Uli>,
    pub serving_network: Option<Gtp2PlmnId>,
    pub rat_type: Option<Gtp2RatType>,
    pub indication: Option<Gtp2Indication>,
    pub sender_fteid: Option<Gtp2FTeid>,
    pub apn_ambr: Option<Gtp2Ambr>,
    pub delay_value: Option<u8>,
    pub bearer_contexts_to_be_modified: Vec<BearerContext>,
    pub bearer_contexts_to_be_removed: Vec<BearerContext>,
    pub recovery: Option<u8>,
    pub ue_time_zone: Option<Gtp2UeTimeZone>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyBearerResponse {
    pub cause: Gtp2Cause,
    pub msisdn: Option<String>,
    pub linked_ebi: Option<u8>,
    pub apn_restriction: Option<u8>,
    pub pco: Option<Vec<u8>>,
    pub bearer_contexts_modified: Vec<BearerContext>,
    pub bearer_contexts_marked_for_removal: Vec<BearerContext>,
    pub recovery: Option<u8>,
}

impl ModifyBearerResponse {
    pub fn new(cause: Gtp2Cause) -> Self {
        Self {
            cause,
            msisdn: None,
            linked_ebi: None,
            apn_restriction: None,
            pco: None,
            bearer_contexts_modified: Vec::new(),
            bearer_contexts_marked_for_removal: Vec::new(),
            recovery: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteSessionRequest {
    pub cause: Option<Gtp2Cause>,
    pub linked_ebi: Option<u8>,
    pub uli: Option<Gtp2Uli>,
    pub indication: Option<Gtp2Indication>,
    pub pco: Option<Vec<u8>>,
    pub sender_fteid: Option<Gtp2FTeid>,
    pub ue_time_zone: Option<Gtp2UeTimeZone>,
    pub ran_nas_release_cause: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSessionResponse {
    pub cause: Gtp2Cause,
    pub recovery: Option<u8>,
    pub pco: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseAccessBearersRequest {
    pub list_of_rabs: Vec<u8>,
    pub originating_node: Option<u8>,
    pub indication: Option<Gtp2Indication>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAccessBearersResponse {
    pub cause: Gtp2Cause,
    pub recovery: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownlinkDataNotification {
    pub cause: Option<Gtp2Cause>,
    pub ebi: Option<u8>,
    pub arp: Option<Gtp2Arp>,
    pub imsi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkDataNotificationAcknowledge {
    pub cause: Gtp2Cause,
    pub data_notification_delay: Option<u8>,
    pub recovery: Option<u8>,
    pub imsi: Option<String>,
}

/// Decoded body of a GTPv2-C message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gtp2Body {
    EchoRequest(EchoRequest),
    EchoResponse(EchoResponse),
    CreateSessionRequest(CreateSessionRequest),
    CreateSessionResponse(CreateSessionResponse),
    ModifyBearerRequest(ModifyBearerRequest),
    ModifyBearerResponse(ModifyBearerResponse),
    DeleteSessionRequest(DeleteSessionRequest),
    DeleteSessionResponse(DeleteSessionResponse),
    ReleaseAccessBearersRequest(ReleaseAccessBearersRequest),
    ReleaseAccessBearersResponse(ReleaseAccessBearersResponse),
    DownlinkDataNotification(DownlinkDataNotification),
    DownlinkDataNotificationAcknowledge(DownlinkDataNotificationAcknowledge),
}

impl Gtp2Body {
    pub fn message_type(&self) -> Gtp2MessageType {
        match self {
            Gtp2Body::EchoRequest(_) => Gtp2MessageType::EchoRequest,
            Gtp2Body::EchoResponse(_) => Gtp2MessageType::EchoResponse,
            Gtp2Body::CreateSessionRequest(_) => Gtp2MessageType::CreateSessionRequest,
            Gtp2Body::CreateSessionResponse(_) => Gtp2MessageType::CreateSessionResponse,
            Gtp2Body::ModifyBearerRequest(_) => Gtp2MessageType::ModifyBearerRequest,
            Gtp2Body::ModifyBearerResponse(_) => Gtp2MessageType::ModifyBearerResponse,
            Gtp2Body::DeleteSessionRequest(_) => Gtp2MessageType::DeleteSessionRequest,
            Gtp2Body::DeleteSessionResponse(_) => Gtp2MessageType::DeleteSessionResponse,
            Gtp2Body::ReleaseAccessBearersRequest(_) => Gtp2MessageType::ReleaseAccessBearersRequest,
            Gtp2Body::ReleaseAccessBearersResponse(_) => Gtp2MessageType::ReleaseAccessBearersResponse,
            Gtp2Body::DownlinkDataNotification(_) => Gtp2MessageType::DownlinkDataNotification,
            Gtp2Body::DownlinkDataNotificationAcknowledge(_) => {
                Gtp2MessageType::DownlinkDataNotificationAcknowledge
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.message_type().name()
    }
}

/// GTPv2-C Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2Message {
    /// Destination TEID from the header (absent on echo)
    pub teid: u32,
    /// 24-bit sequence number
    pub sequence_number: u32,
    pub body: Gtp2Body,
}

impl Gtp2Message {
    /// Create a message; the sequence number is assigned by the transaction engine
    pub fn new(teid: u32, body: Gtp2Body) -> Self {
        Self {
            teid,
            sequence_number: 0,
            body,
        }
    }

    /// Create an Echo Request message
    pub fn echo_request(recovery: u8) -> Self {
        Self::new(0, Gtp2Body::EchoRequest(EchoRequest { recovery }))
    }

    /// Create an Echo Response message
    pub fn echo_response(recovery: u8) -> Self {
        Self::new(0, Gtp2Body::EchoResponse(EchoResponse { recovery }))
    }

    pub fn message_type(&self) -> Gtp2MessageType {
        self.body.message_type()
    }

    fn has_teid(&self) -> bool {
        !matches!(self.body, Gtp2Body::EchoRequest(_) | Gtp2Body::EchoResponse(_))
    }

    /// Encode to a datagram
    pub fn encode(&self) -> GtpResult<BytesMut> {
        let body = bincode::serialize(&self.body)
            .map_err(|e| GtpError::EncodingError(e.to_string()))?;

        let message_type = self.message_type() as u8;
        let mut header = if self.has_teid() {
            Gtp2Header::new(message_type, self.teid, self.sequence_number)
        } else {
            Gtp2Header::new_no_teid(message_type, self.sequence_number)
        };
        header.set_body_len(body.len())?;

        let mut buf = BytesMut::with_capacity(header.header_len() + body.len());
        header.encode(&mut buf);
        buf.put_slice(&body);
        Ok(buf)
    }

    /// Decode from a datagram
    pub fn decode(buf: &mut Bytes) -> GtpResult<Self> {
        let header = Gtp2Header::decode(buf)?;
        let message_type = Gtp2MessageType::try_from(header.message_type)?;

        let body_len = (header.length as usize + 4).saturating_sub(header.header_len());
        if buf.len() < body_len {
            return Err(GtpError::BufferTooShort {
                needed: body_len,
                available: buf.len(),
            });
        }

        let body: Gtp2Body = bincode::deserialize(&buf[..body_len])?;
        if body.message_type() != message_type {
            return Err(GtpError::InvalidFormat(format!(
                "header type {} carries {} body",
                message_type.name(),
                body.name()
            )));
        }

        Ok(Self {
            teid: header.teid.unwrap_or(0),
            sequence_number: header.sequence_number,
            body,
        })
    }
}
