//! GTPv2 Types
//!
//! Types and constants for GTPv2 protocol as specified in 3GPP TS 29.274.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use crate::error::GtpError;

/// GTPv2 Cause Values (TS 29.274 Section 8.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gtp2Cause {
    RequestAccepted = 16,
    RequestAcceptedPartially = 17,
    NewPdnTypeDueToNetworkPreference = 18,
    NewPdnTypeDueToSingleAddressBearerOnly = 19,
    ContextNotFound = 64,
    InvalidMessageFormat = 65,
    MandatoryIeIncorrect = 69,
    MandatoryIeMissing = 70,
    SystemFailure = 72,
    NoResourcesAvailable = 73,
    MissingOrUnknownApn = 78,
    UnableToPageUe = 90,
    RequestRejectedReasonNotSpecified = 94,
    RemotePeerNotResponding = 100,
    ConditionalIeMissing = 103,
}

impl Gtp2Cause {
    /// Acceptance causes occupy 16..=63
    pub fn is_accepted(&self) -> bool {
        (*self as u8) < 64
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Gtp2Cause {
    type Error = GtpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            16 => Ok(Self::RequestAccepted),
            17 => Ok(Self::RequestAcceptedPartially),
            18 => Ok(Self::NewPdnTypeDueToNetworkPreference),
            19 => Ok(Self::NewPdnTypeDueToSingleAddressBearerOnly),
            64 => Ok(Self::ContextNotFound),
            65 => Ok(Self::InvalidMessageFormat),
            69 => Ok(Self::MandatoryIeIncorrect),
            70 => Ok(Self::MandatoryIeMissing),
            72 => Ok(Self::SystemFailure),
            73 => Ok(Self::NoResourcesAvailable),
            78 => Ok(Self::MissingOrUnknownApn),
            90 => Ok(Self::UnableToPageUe),
            94 => Ok(Self::RequestRejectedReasonNotSpecified),
            100 => Ok(Self::RemotePeerNotResponding),
            103 => Ok(Self::ConditionalIeMissing),
            _ => Err(GtpError::InvalidFormat(format!("Unknown cause value: {value}"))),
        }
    }
}

/// PDN Type (TS 29.274 Section 8.34)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gtp2PdnType {
    Ipv4 = 1,
    Ipv6 = 2,
    Ipv4v6 = 3,
    NonIp = 5,
}

/// RAT Type values (TS 29.274 Section 8.17)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gtp2RatType {
    Utran = 1,
    Geran = 2,
    Wlan = 3,
    Gan = 4,
    HspaEvolution = 5,
    Eutran = 6,
    Virtual = 7,
    EutranNbIot = 8,
}

/// F-TEID Interface Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gtp2FTeidInterfaceType {
    S1uEnodebGtpU = 0,
    S1uSgwGtpU = 1,
    S5S8SgwGtpU = 4,
    S5S8PgwGtpU = 5,
    S5S8SgwGtpC = 6,
    S5S8PgwGtpC = 7,
    S11MmeGtpC = 10,
    S11S4SgwGtpC = 11,
}

/// Fully Qualified TEID (F-TEID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gtp2FTeid {
    pub interface_type: Gtp2FTeidInterfaceType,
    pub teid: u32,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl Gtp2FTeid {
    pub fn new_ipv4(interface_type: Gtp2FTeidInterfaceType, teid: u32, addr: Ipv4Addr) -> Self {
        Self {
            interface_type,
            teid,
            ipv4: Some(addr),
            ipv6: None,
        }
    }

    /// Same endpoint, ignoring the interface type
    pub fn same_endpoint(&self, other: &Gtp2FTeid) -> bool {
        self.teid == other.teid && self.ipv4 == other.ipv4 && self.ipv6 == other.ipv6
    }

    /// Copy of this endpoint presented under another interface type
    pub fn with_interface(&self, interface_type: Gtp2FTeidInterfaceType) -> Self {
        Self {
            interface_type,
            ..*self
        }
    }
}

/// PDN Address Allocation (PAA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gtp2Paa {
    pub pdn_type: Gtp2PdnType,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// Aggregate Maximum Bit Rate (AMBR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2Ambr {
    pub uplink: u32,
    pub downlink: u32,
}

impl Gtp2Ambr {
    pub fn new(uplink: u32, downlink: u32) -> Self {
        Self { uplink, downlink }
    }
}

/// Allocation/Retention Priority (ARP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2Arp {
    pub pre_emption_vulnerability: bool,
    pub priority_level: u8,
    pub pre_emption_capability: bool,
}

impl Gtp2Arp {
    pub fn encode(&self) -> u8 {
        ((self.pre_emption_vulnerability as u8) << 6)
            | ((self.priority_level & 0x0F) << 2)
            | (self.pre_emption_capability as u8)
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            pre_emption_vulnerability: (byte >> 6) & 0x01 != 0,
            priority_level: (byte >> 2) & 0x0F,
            pre_emption_capability: byte & 0x01 != 0,
        }
    }
}

/// Bearer Level QoS (TS 29.274 Section 8.15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2BearerQos {
    pub arp: Gtp2Arp,
    pub qci: u8,
    pub mbr_uplink: u64,
    pub mbr_downlink: u64,
    pub gbr_uplink: u64,
    pub gbr_downlink: u64,
}

/// Indication flags used by the serving gateway (TS 29.274 Section 8.12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2Indication {
    /// Operation Indication
    pub oi: bool,
    /// Scope Indication
    pub si: bool,
    /// Handover Indication
    pub hi: bool,
    /// Dual Address Bearer Flag
    pub daf: bool,
}

/// PLMN ID in its 3-octet BCD form
pub type Gtp2PlmnId = [u8; 3];

/// Tracking Area Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gtp2UliTai {
    pub plmn_id: Gtp2PlmnId,
    pub tac: u16,
}

/// E-UTRAN Cell Global Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gtp2UliEcgi {
    pub plmn_id: Gtp2PlmnId,
    pub cell_id: u32,
}

/// User Location Information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2Uli {
    pub tai: Option<Gtp2UliTai>,
    pub e_cgi: Option<Gtp2UliEcgi>,
}

/// UE Time Zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtp2UeTimeZone {
    pub timezone: u8,
    pub daylight_saving_time: u8,
}
