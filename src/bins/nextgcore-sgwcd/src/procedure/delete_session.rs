//! Delete Session
//!
//! Tears down the connection named by the linked EBI, or every connection
//! of the UE when the Scope Indication is set or no EBI is given. Each
//! connection is deleted toward the PGW and answered to the MME on its own.

use std::net::SocketAddr;

use ogs_gtp::v2::{DeleteSessionRequest, Gtp2Body, Gtp2Cause, Gtp2Message, XactAction};

use crate::context::{PdnKey, SgwcContext};
use crate::event::GtpInterface;
use crate::procedure::{ProcedureBase, ProcedureKind, ProcedureState, SgwcProcedure};
use crate::{s11_build, s5c_build};

#[derive(Debug)]
pub struct DeleteSessionProcedure {
    base: ProcedureBase,
    request: DeleteSessionRequest,
    /// Worst cause reported so far
    cause: Gtp2Cause,
}

impl DeleteSessionProcedure {
    pub fn new(gtpc_tx_id: u64, imsi: &str, peer: SocketAddr, request: DeleteSessionRequest) -> Self {
        Self {
            base: ProcedureBase::new(gtpc_tx_id, imsi, peer),
            request,
            cause: Gtp2Cause::RequestAccepted,
        }
    }

    fn targets(&self, ctx: &SgwcContext) -> Vec<PdnKey> {
        let Some(ue) = ctx.ue(&self.base.imsi) else {
            return Vec::new();
        };
        let all = self.request.indication.is_some_and(|i| i.si);
        match self.request.linked_ebi {
            Some(ebi) if !all => ue.pdn_key_by_ebi(ebi).cloned().into_iter().collect(),
            _ => ue.pdns.keys().cloned().collect(),
        }
    }

    /// Answer the MME for one connection; the last answer closes the transaction.
    ///
    /// `owed` counts local answers still to follow this one.
    fn respond(&mut self, ctx: &mut SgwcContext, cause: Gtp2Cause, pco: Option<Vec<u8>>, owed: usize) {
        if !cause.is_accepted() {
            self.cause = cause;
        }
        let action = if self.base.pending_count() == 0 && owed == 0 {
            XactAction::Delete
        } else {
            XactAction::Keep
        };
        let body = s11_build::build_delete_session_response(cause, pco);
        self.base.respond_s11(ctx, body, action);
        if action == XactAction::Delete {
            self.base.finish(self.cause);
        }
    }
}

impl SgwcProcedure for DeleteSessionProcedure {
    fn base(&self) -> &ProcedureBase {
        &self.base
    }

    fn kind(&self) -> ProcedureKind {
        ProcedureKind::DeleteSession
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.base.state = ProcedureState::Running;
        let imsi = self.base.imsi.clone();

        let targets = self.targets(ctx);
        if targets.is_empty() {
            log::warn!(
                "[{}] No PDN connection for Delete Session EBI[{:?}]",
                imsi,
                self.request.linked_ebi
            );
            self.respond(ctx, Gtp2Cause::ContextNotFound, None, 0);
            return;
        }

        let mut unissued = Vec::new();
        for key in targets {
            let Some(pdn) = ctx.pdn(&imsi, &key) else {
                continue;
            };
            let (dest, teid) = (pdn.pgw_addr, pdn.pgw_s5c_teid());
            let body = s5c_build::build_delete_session_request(
                &self.request,
                pdn.default_ebi,
                ctx.sgw_s5c_fteid(pdn.sgw_s5c_teid),
            );
            match self.base.issue(ctx, key.clone()) {
                Ok(sub) => ctx.send_request(GtpInterface::S5s8, dest, teid, body, sub),
                Err(e) => {
                    log::error!("[{}] Delete Session APN[{}]: {}", imsi, key, e);
                    unissued.push((key, e.gtp_cause()));
                }
            }
        }

        let local = unissued.len();
        let mut owed = local;
        for (key, cause) in unissued {
            log::warn!("[{}] APN[{}] released locally", imsi, key);
            ctx.pdn_remove(&imsi, &key);
            owed -= 1;
            self.respond(ctx, cause, None, owed);
        }

        if self.base.pending_count() > 0 {
            self.base.state = ProcedureState::AwaitingPeer;
        } else if local == 0 {
            self.respond(ctx, Gtp2Cause::ContextNotFound, None, 0);
        }
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        let Some(key) = self.base.resolve(ctx, gtpc_tx_id) else {
            return;
        };
        ctx.pdn_remove(&self.base.imsi, &key);

        let (cause, pco) = match &message.body {
            Gtp2Body::DeleteSessionResponse(rsp) => (rsp.cause, rsp.pco.clone()),
            other => {
                log::error!("[{}] Unexpected {} for Delete Session", self.base.imsi, other.name());
                (Gtp2Cause::SystemFailure, None)
            }
        };
        log::info!("[{}] Session released APN[{}] cause {:?}", self.base.imsi, key, cause);
        self.respond(ctx, cause, pco, 0);
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        let Some(key) = self.base.resolve(ctx, gtpc_tx_id) else {
            return;
        };
        log::warn!("[{}] PGW not responding, APN[{}] released locally", self.base.imsi, key);
        ctx.pdn_remove(&self.base.imsi, &key);
        self.respond(ctx, Gtp2Cause::RemotePeerNotResponding, None, 0);
    }
}
