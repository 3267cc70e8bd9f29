//! GTPv2 Protocol Implementation
//!
//! This module implements GTPv2-C (Control Plane) as specified in 3GPP TS 29.274.

pub mod types;
pub mod header;
pub mod message;
pub mod teid_pool;
pub mod xact;

// Re-export header types
pub use header::{
    is_initial_message, is_triggered_message, triggered_message_type, Gtp2Header,
    Gtp2MessageType, GTP2_MAX_SQN, GTP2_SQN_RESERVED_BIT, GTPV2C_HEADER_LEN,
    GTPV2C_HEADER_LEN_NO_TEID,
};

// Re-export message types
pub use message::{
    BearerContext, CreateSessionRequest, CreateSessionResponse, DeleteSessionRequest,
    DeleteSessionResponse, DownlinkDataNotification, DownlinkDataNotificationAcknowledge,
    EchoRequest, EchoResponse, Gtp2Body, Gtp2Message, ModifyBearerRequest, ModifyBearerResponse,
    ReleaseAccessBearersRequest, ReleaseAccessBearersResponse,
};

// Re-export types
pub use types::{
    Gtp2Ambr, Gtp2Arp, Gtp2BearerQos, Gtp2Cause, Gtp2FTeid, Gtp2FTeidInterfaceType,
    Gtp2Indication, Gtp2Paa, Gtp2PdnType, Gtp2PlmnId, Gtp2RatType, Gtp2UeTimeZone, Gtp2Uli,
    Gtp2UliEcgi, Gtp2UliTai,
};

// Re-export TEID pool
pub use teid_pool::TeidPool;

// Re-export transaction engine
pub use xact::{
    GtpXactEngine, XactAction, XactConfig, XactMessage, XactTimeout, XactTimer, XactTransport,
    GTPV2C_N3_REQUESTS, GTPV2C_T3_RESPONSE_MS,
};
