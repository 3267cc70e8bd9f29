//! SGWC Event Definitions
//!
//! Events exchanged between the application task and the two GTP-C path
//! tasks. Every event names the task that produced it and the task that
//! consumes it.

use std::net::SocketAddr;

use ogs_gtp::v2::{Gtp2Message, XactAction};

/// Tasks exchanging events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// Context store and procedures
    SgwcApp,
    /// S11 path (MME side)
    SgwcS11,
    /// S5/S8-C path (PGW side)
    SgwcS5s8,
}

impl TaskId {
    pub fn name(&self) -> &'static str {
        match self {
            TaskId::SgwcApp => "SGWC_APP",
            TaskId::SgwcS11 => "SGWC_S11",
            TaskId::SgwcS5s8 => "SGWC_S5S8",
        }
    }

    /// GTP interface served by a path task
    pub fn interface(&self) -> Option<GtpInterface> {
        match self {
            TaskId::SgwcApp => None,
            TaskId::SgwcS11 => Some(GtpInterface::S11),
            TaskId::SgwcS5s8 => Some(GtpInterface::S5s8),
        }
    }
}

/// GTP-C interfaces of the serving gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GtpInterface {
    S11,
    S5s8,
}

impl GtpInterface {
    pub fn name(&self) -> &'static str {
        match self {
            GtpInterface::S11 => "S11",
            GtpInterface::S5s8 => "S5S8",
        }
    }

    /// Path task serving this interface
    pub fn task(&self) -> TaskId {
        match self {
            GtpInterface::S11 => TaskId::SgwcS11,
            GtpInterface::S5s8 => TaskId::SgwcS5s8,
        }
    }
}

/// Event types for SGWC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgwcEventId {
    /// FSM entry signal
    FsmEntry,
    /// FSM exit signal
    FsmExit,
    /// Inbound message from the MME
    S11Message,
    /// Inbound message from the PGW
    S5cMessage,
    /// S11 request retries exhausted
    S11NoResponse,
    /// S5/S8-C request retries exhausted
    S5cNoResponse,
    /// Outbound request
    SendRequest,
    /// Outbound response
    SendResponse,
}

impl SgwcEventId {
    /// Get the name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SgwcEventId::FsmEntry => "OGS_FSM_ENTRY_SIG",
            SgwcEventId::FsmExit => "OGS_FSM_EXIT_SIG",
            SgwcEventId::S11Message => "SGWC_EVT_S11_MESSAGE",
            SgwcEventId::S5cMessage => "SGWC_EVT_S5C_MESSAGE",
            SgwcEventId::S11NoResponse => "SGWC_EVT_S11_NO_RESPONSE",
            SgwcEventId::S5cNoResponse => "SGWC_EVT_S5C_NO_RESPONSE",
            SgwcEventId::SendRequest => "SGWC_EVT_SEND_REQUEST",
            SgwcEventId::SendResponse => "SGWC_EVT_SEND_RESPONSE",
        }
    }
}

/// Event payloads
#[derive(Debug, Clone)]
pub enum SgwcEventKind {
    FsmEntry,
    FsmExit,
    /// Correlated inbound message
    GtpMessage {
        gtpc_tx_id: u64,
        peer: SocketAddr,
        message: Gtp2Message,
    },
    /// Outbound request went unanswered
    RemotePeerNotResponding {
        gtpc_tx_id: u64,
        peer: SocketAddr,
        message_type: u8,
    },
    /// Open a transaction toward `dest`
    SendRequest {
        gtpc_tx_id: u64,
        dest: SocketAddr,
        message: Gtp2Message,
    },
    /// Answer the inbound transaction `gtpc_tx_id`
    SendResponse {
        gtpc_tx_id: u64,
        dest: SocketAddr,
        message: Gtp2Message,
        action: XactAction,
    },
}

/// SGWC Event structure
#[derive(Debug, Clone)]
pub struct SgwcEvent {
    pub origin: TaskId,
    pub destination: TaskId,
    pub kind: SgwcEventKind,
}

impl SgwcEvent {
    /// Create an FSM entry event
    pub fn entry() -> Self {
        Self {
            origin: TaskId::SgwcApp,
            destination: TaskId::SgwcApp,
            kind: SgwcEventKind::FsmEntry,
        }
    }

    /// Create an FSM exit event
    pub fn exit() -> Self {
        Self {
            origin: TaskId::SgwcApp,
            destination: TaskId::SgwcApp,
            kind: SgwcEventKind::FsmExit,
        }
    }

    /// Inbound message handed up by a path task
    pub fn gtp_message(
        iface: GtpInterface,
        gtpc_tx_id: u64,
        peer: SocketAddr,
        message: Gtp2Message,
    ) -> Self {
        Self {
            origin: iface.task(),
            destination: TaskId::SgwcApp,
            kind: SgwcEventKind::GtpMessage {
                gtpc_tx_id,
                peer,
                message,
            },
        }
    }

    /// Retry exhaustion reported by a path task
    pub fn peer_not_responding(
        iface: GtpInterface,
        gtpc_tx_id: u64,
        peer: SocketAddr,
        message_type: u8,
    ) -> Self {
        Self {
            origin: iface.task(),
            destination: TaskId::SgwcApp,
            kind: SgwcEventKind::RemotePeerNotResponding {
                gtpc_tx_id,
                peer,
                message_type,
            },
        }
    }

    /// Request for a path task to send
    pub fn send_request(
        iface: GtpInterface,
        gtpc_tx_id: u64,
        dest: SocketAddr,
        message: Gtp2Message,
    ) -> Self {
        Self {
            origin: TaskId::SgwcApp,
            destination: iface.task(),
            kind: SgwcEventKind::SendRequest {
                gtpc_tx_id,
                dest,
                message,
            },
        }
    }

    /// Response for a path task to send
    pub fn send_response(
        iface: GtpInterface,
        gtpc_tx_id: u64,
        dest: SocketAddr,
        message: Gtp2Message,
        action: XactAction,
    ) -> Self {
        Self {
            origin: TaskId::SgwcApp,
            destination: iface.task(),
            kind: SgwcEventKind::SendResponse {
                gtpc_tx_id,
                dest,
                message,
                action,
            },
        }
    }

    pub fn id(&self) -> SgwcEventId {
        match &self.kind {
            SgwcEventKind::FsmEntry => SgwcEventId::FsmEntry,
            SgwcEventKind::FsmExit => SgwcEventId::FsmExit,
            SgwcEventKind::GtpMessage { .. } => match self.origin {
                TaskId::SgwcS5s8 => SgwcEventId::S5cMessage,
                _ => SgwcEventId::S11Message,
            },
            SgwcEventKind::RemotePeerNotResponding { .. } => match self.origin {
                TaskId::SgwcS5s8 => SgwcEventId::S5cNoResponse,
                _ => SgwcEventId::S11NoResponse,
            },
            SgwcEventKind::SendRequest { .. } => SgwcEventId::SendRequest,
            SgwcEventKind::SendResponse { .. } => SgwcEventId::SendResponse,
        }
    }

    /// Get the name of the event
    pub fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Interface of the path task on either end of the event
    pub fn interface(&self) -> Option<GtpInterface> {
        self.origin.interface().or_else(|| self.destination.interface())
    }
}
