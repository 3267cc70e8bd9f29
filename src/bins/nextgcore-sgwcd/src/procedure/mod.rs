//! SGWC Procedures
//!
//! A procedure serves one inbound request. It validates the request,
//! fans it out as sub-requests to the peer on the other interface, folds
//! the answers (or their absence) back into the UE context and emits
//! exactly one response per connection it owns.
//!
//! Procedures are parked on their UE context while waiting for a peer.
//! The context takes a procedure out to run it and puts it back unless it
//! has completed or failed.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use ogs_gtp::v2::{Gtp2Body, Gtp2Cause, Gtp2Message, XactAction};

use crate::context::{PdnKey, SgwcContext};
use crate::error::SgwcResult;
use crate::event::GtpInterface;

pub mod create_session;
pub mod delete_session;
pub mod downlink_data_notification;
pub mod modify_bearer;
pub mod release_access_bearers;

pub use create_session::CreateSessionProcedure;
pub use delete_session::DeleteSessionProcedure;
pub use downlink_data_notification::DownlinkDataNotificationProcedure;
pub use modify_bearer::ModifyBearerProcedure;
pub use release_access_bearers::ReleaseAccessBearersProcedure;

/// Procedure lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureState {
    Created,
    Running,
    AwaitingPeer,
    Completed,
    Failed,
}

impl ProcedureState {
    pub fn name(&self) -> &'static str {
        match self {
            ProcedureState::Created => "CREATED",
            ProcedureState::Running => "RUNNING",
            ProcedureState::AwaitingPeer => "AWAITING_PEER",
            ProcedureState::Completed => "COMPLETED",
            ProcedureState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    CreateSession,
    ModifyBearer,
    DeleteSession,
    ReleaseAccessBearers,
    DownlinkDataNotification,
}

impl ProcedureKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcedureKind::CreateSession => "Create Session",
            ProcedureKind::ModifyBearer => "Modify Bearer",
            ProcedureKind::DeleteSession => "Delete Session",
            ProcedureKind::ReleaseAccessBearers => "Release Access Bearers",
            ProcedureKind::DownlinkDataNotification => "Downlink Data Notification",
        }
    }
}

/// State shared by every procedure
#[derive(Debug)]
pub struct ProcedureBase {
    /// Transaction of the triggering request
    pub gtpc_tx_id: u64,
    pub imsi: String,
    /// Source of the triggering request
    pub peer: SocketAddr,
    pub state: ProcedureState,
    /// Outstanding sub-requests and the connection each one serves
    pending: BTreeMap<u64, PdnKey>,
}

impl ProcedureBase {
    pub fn new(gtpc_tx_id: u64, imsi: &str, peer: SocketAddr) -> Self {
        Self {
            gtpc_tx_id,
            imsi: imsi.to_string(),
            peer,
            state: ProcedureState::Created,
            pending: BTreeMap::new(),
        }
    }

    pub fn has_trxn_id(&self, gtpc_tx_id: u64) -> bool {
        self.gtpc_tx_id == gtpc_tx_id || self.pending.contains_key(&gtpc_tx_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reserve a fresh transaction id for a sub-request on `key`
    pub(crate) fn issue(&mut self, ctx: &mut SgwcContext, key: PdnKey) -> SgwcResult<u64> {
        let tx = ctx.alloc_tx_id(&self.imsi)?;
        self.pending.insert(tx, key);
        Ok(tx)
    }

    /// Retire a sub-request; `None` when it is not ours or already answered
    pub(crate) fn resolve(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) -> Option<PdnKey> {
        let key = self.pending.remove(&gtpc_tx_id)?;
        ctx.release_tx_id(gtpc_tx_id);
        Some(key)
    }

    pub(crate) fn finish(&mut self, cause: Gtp2Cause) {
        self.state = if cause.is_accepted() {
            ProcedureState::Completed
        } else {
            ProcedureState::Failed
        };
    }

    /// Answer the triggering S11 request
    pub(crate) fn respond_s11(&self, ctx: &mut SgwcContext, body: Gtp2Body, action: XactAction) {
        let teid = ctx.ue(&self.imsi).map_or(0, |ue| ue.mme_s11_teid());
        self.respond_s11_teid(ctx, teid, body, action);
    }

    /// Answer the triggering S11 request with an explicit MME TEID
    pub(crate) fn respond_s11_teid(&self, ctx: &mut SgwcContext, teid: u32, body: Gtp2Body, action: XactAction) {
        ctx.send_response(GtpInterface::S11, self.peer, teid, body, self.gtpc_tx_id, action);
    }
}

/// Operations every procedure provides to the context
pub trait SgwcProcedure {
    fn base(&self) -> &ProcedureBase;

    fn kind(&self) -> ProcedureKind;

    /// Run from CREATED until the first suspension point
    fn run(&mut self, ctx: &mut SgwcContext);

    /// Peer answered sub-request `gtpc_tx_id`
    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message);

    /// Peer never answered sub-request `gtpc_tx_id`
    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64);

    fn gtpc_tx_id(&self) -> u64 {
        self.base().gtpc_tx_id
    }

    fn state(&self) -> ProcedureState {
        self.base().state
    }

    fn has_trxn_id(&self, gtpc_tx_id: u64) -> bool {
        self.base().has_trxn_id(gtpc_tx_id)
    }

    fn marked_for_removal(&self) -> bool {
        matches!(self.state(), ProcedureState::Completed | ProcedureState::Failed)
    }
}

/// Any procedure parked on a UE context
#[derive(Debug)]
pub enum Procedure {
    CreateSession(CreateSessionProcedure),
    ModifyBearer(ModifyBearerProcedure),
    DeleteSession(DeleteSessionProcedure),
    ReleaseAccessBearers(ReleaseAccessBearersProcedure),
    DownlinkDataNotification(DownlinkDataNotificationProcedure),
}

impl Procedure {
    fn inner(&self) -> &dyn SgwcProcedure {
        match self {
            Procedure::CreateSession(p) => p,
            Procedure::ModifyBearer(p) => p,
            Procedure::DeleteSession(p) => p,
            Procedure::ReleaseAccessBearers(p) => p,
            Procedure::DownlinkDataNotification(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SgwcProcedure {
        match self {
            Procedure::CreateSession(p) => p,
            Procedure::ModifyBearer(p) => p,
            Procedure::DeleteSession(p) => p,
            Procedure::ReleaseAccessBearers(p) => p,
            Procedure::DownlinkDataNotification(p) => p,
        }
    }
}

impl SgwcProcedure for Procedure {
    fn base(&self) -> &ProcedureBase {
        self.inner().base()
    }

    fn kind(&self) -> ProcedureKind {
        self.inner().kind()
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.inner_mut().run(ctx)
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        self.inner_mut().handle_peer_response(ctx, gtpc_tx_id, message)
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        self.inner_mut().handle_peer_failure(ctx, gtpc_tx_id)
    }
}

/// Fold per-bearer or per-connection causes into one response cause
///
/// Every item fully accepted gives Request Accepted, at least one accepted
/// gives Request Accepted Partially, none gives Context Not Found. An
/// empty set means nothing had to be done and is accepted.
pub fn aggregate_cause<I>(causes: I) -> Gtp2Cause
where
    I: IntoIterator<Item = Gtp2Cause>,
{
    let mut total = 0usize;
    let mut accepted = 0usize;
    let mut partial = false;
    for cause in causes {
        total += 1;
        if cause.is_accepted() {
            accepted += 1;
            partial |= cause == Gtp2Cause::RequestAcceptedPartially;
        }
    }

    if accepted == total && !partial {
        Gtp2Cause::RequestAccepted
    } else if accepted > 0 {
        Gtp2Cause::RequestAcceptedPartially
    } else {
        Gtp2Cause::ContextNotFound
    }
}
