//! Release Access Bearers
//!
//! Releases the S1-U access bearers of every connection not yet released.
//! One sub-request per connection; a single aggregated answer to the MME.

use std::net::SocketAddr;

use ogs_gtp::v2::{Gtp2Body, Gtp2Cause, Gtp2Message, ReleaseAccessBearersRequest, XactAction};

use crate::context::{PdnKey, SgwcContext};
use crate::event::GtpInterface;
use crate::procedure::{aggregate_cause, ProcedureBase, ProcedureKind, ProcedureState, SgwcProcedure};
use crate::{s11_build, s5c_build};

#[derive(Debug)]
pub struct ReleaseAccessBearersProcedure {
    base: ProcedureBase,
    request: ReleaseAccessBearersRequest,
    outcomes: Vec<Gtp2Cause>,
}

impl ReleaseAccessBearersProcedure {
    pub fn new(
        gtpc_tx_id: u64,
        imsi: &str,
        peer: SocketAddr,
        request: ReleaseAccessBearersRequest,
    ) -> Self {
        Self {
            base: ProcedureBase::new(gtpc_tx_id, imsi, peer),
            request,
            outcomes: Vec::new(),
        }
    }

    fn release_locally(ctx: &mut SgwcContext, imsi: &str, key: &PdnKey) {
        if let Some(pdn) = ctx.pdn_mut(imsi, key) {
            pdn.released = true;
            for bearer in pdn.bearers.values_mut() {
                bearer.s1u_enb_fteid = None;
            }
        }
    }

    fn finalize(&mut self, ctx: &mut SgwcContext) {
        let cause = aggregate_cause(self.outcomes.iter().copied());
        log::debug!("[{}] Release Access Bearers done cause {:?}", self.base.imsi, cause);
        let body = s11_build::build_release_access_bearers_response(cause, ctx.config().restart_counter);
        self.base.respond_s11(ctx, body, XactAction::Delete);
        self.base.finish(cause);
    }
}

impl SgwcProcedure for ReleaseAccessBearersProcedure {
    fn base(&self) -> &ProcedureBase {
        &self.base
    }

    fn kind(&self) -> ProcedureKind {
        ProcedureKind::ReleaseAccessBearers
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.base.state = ProcedureState::Running;
        let imsi = self.base.imsi.clone();
        if !self.request.list_of_rabs.is_empty() {
            log::debug!("[{}] List of RABs {:?} applies to every connection", imsi, self.request.list_of_rabs);
        }

        let targets: Vec<(PdnKey, SocketAddr, u32)> = ctx
            .ue(&imsi)
            .map(|ue| {
                ue.pdns
                    .values()
                    .filter(|pdn| !pdn.released)
                    .map(|pdn| (pdn.key.clone(), pdn.pgw_addr, pdn.pgw_s5c_teid()))
                    .collect()
            })
            .unwrap_or_default();

        for (key, dest, teid) in targets {
            match self.base.issue(ctx, key.clone()) {
                Ok(sub) => {
                    let body = s5c_build::build_release_access_bearers_request();
                    ctx.send_request(GtpInterface::S5s8, dest, teid, body, sub);
                }
                Err(e) => {
                    log::error!("[{}] Release Access Bearers APN[{}]: {}", imsi, key, e);
                    self.outcomes.push(e.gtp_cause());
                }
            }
        }

        if self.base.pending_count() == 0 {
            self.finalize(ctx);
        } else {
            self.base.state = ProcedureState::AwaitingPeer;
        }
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        let Some(key) = self.base.resolve(ctx, gtpc_tx_id) else {
            return;
        };

        let cause = match &message.body {
            Gtp2Body::ReleaseAccessBearersResponse(rsp) => rsp.cause,
            other => {
                log::error!("[{}] Unexpected {} for Release Access Bearers", self.base.imsi, other.name());
                Gtp2Cause::SystemFailure
            }
        };
        if cause.is_accepted() {
            Self::release_locally(ctx, &self.base.imsi, &key);
        }
        self.outcomes.push(cause);

        if self.base.pending_count() == 0 {
            self.finalize(ctx);
        }
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        let Some(key) = self.base.resolve(ctx, gtpc_tx_id) else {
            return;
        };
        log::warn!("[{}] PGW not responding to Release Access Bearers APN[{}]", self.base.imsi, key);
        self.outcomes.push(Gtp2Cause::RemotePeerNotResponding);

        if self.base.pending_count() == 0 {
            self.finalize(ctx);
        }
    }
}
