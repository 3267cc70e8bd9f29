//! Create Session
//!
//! Creates the PDN connection and its bearers locally, relays the request
//! to the PGW and answers the MME once the PGW has answered.

use std::net::SocketAddr;

use ogs_gtp::v2::{
    BearerContext, CreateSessionRequest, CreateSessionResponse, Gtp2Body, Gtp2Cause,
    Gtp2FTeidInterfaceType, Gtp2Message, XactAction,
};

use crate::config::UserPlanePolicy;
use crate::context::{PdnKey, SgwcBearer, SgwcContext};
use crate::error::{SgwcError, SgwcResult};
use crate::event::GtpInterface;
use crate::procedure::{ProcedureBase, ProcedureKind, ProcedureState, SgwcProcedure};
use crate::{s11_build, s5c_build};

#[derive(Debug)]
pub struct CreateSessionProcedure {
    base: ProcedureBase,
    request: CreateSessionRequest,
    key: PdnKey,
}

impl CreateSessionProcedure {
    pub fn new(gtpc_tx_id: u64, peer: SocketAddr, request: CreateSessionRequest) -> Self {
        let key = PdnKey::new(&request.apn, request.pdn_type);
        Self {
            base: ProcedureBase::new(gtpc_tx_id, &request.imsi, peer),
            request,
            key,
        }
    }

    fn pgw_addr(&self, ctx: &SgwcContext) -> SocketAddr {
        let default = ctx.config().pgw;
        self.request
            .pgw_s5s8_cp_fteid
            .and_then(|fteid| fteid.ipv4)
            .map_or(default, |ipv4| SocketAddr::new(ipv4.into(), default.port()))
    }

    fn establish(&mut self, ctx: &mut SgwcContext) -> SgwcResult<()> {
        let imsi = self.base.imsi.clone();
        let default_ebi = self
            .request
            .bearer_contexts_to_be_created
            .first()
            .map(|bc| bc.ebi)
            .ok_or(SgwcError::MandatoryIeMissing("Bearer Contexts to be created"))?;

        let ue = ctx
            .ue(&imsi)
            .ok_or_else(|| SgwcError::NotFound(format!("IMSI[{imsi}]")))?;
        if ue.pdns.contains_key(&self.key) {
            return Err(SgwcError::AlreadyExists(format!("APN[{}]", self.key)));
        }

        for bc in &self.request.bearer_contexts_to_be_removed {
            if ctx.bearer_remove(&imsi, bc.ebi).is_none() {
                log::warn!("[{}] No bearer EBI[{}] to remove", imsi, bc.ebi);
            }
        }

        if let Some(ebi) = self
            .request
            .bearer_contexts_to_be_created
            .iter()
            .map(|bc| bc.ebi)
            .find(|&ebi| ctx.ue(&imsi).is_some_and(|ue| ue.bearer(ebi).is_some()))
        {
            return Err(SgwcError::AlreadyExists(format!("EBI[{ebi}]")));
        }

        let pgw_addr = self.pgw_addr(ctx);
        let pdn = ctx.pdn_add(&imsi, self.key.clone(), pgw_addr, default_ebi)?;
        for bc in &self.request.bearer_contexts_to_be_created {
            let mut bearer = SgwcBearer::new(bc.ebi);
            bearer.qos = bc.bearer_qos;
            bearer.s1u_enb_fteid = bc.s1u_enb_fteid;
            pdn.bearers.insert(bc.ebi, bearer);
        }
        let sgw_s5c_teid = pdn.sgw_s5c_teid;
        let sgw_s5c_fteid = ctx.sgw_s5c_fteid(sgw_s5c_teid);

        let sub = match self.base.issue(ctx, self.key.clone()) {
            Ok(tx) => tx,
            Err(e) => {
                ctx.pdn_remove(&imsi, &self.key);
                return Err(e);
            }
        };

        let body = s5c_build::build_create_session_request(
            &self.request,
            sgw_s5c_fteid,
            ctx.config().restart_counter,
        );
        ctx.send_request(GtpInterface::S5s8, pgw_addr, 0, body, sub);

        if let Some(ue) = ctx.ue_mut(&imsi) {
            ue.mme_s11_fteid = self.request.sender_fteid;
            ue.mme_addr = Some(self.base.peer);
        }
        Ok(())
    }

    /// MME TEID from this request's sender F-TEID
    fn mme_s11_teid(&self) -> u32 {
        self.request.sender_fteid.map_or(0, |fteid| fteid.teid)
    }

    fn respond(&self, ctx: &mut SgwcContext, body: Gtp2Body) {
        self.base
            .respond_s11_teid(ctx, self.mme_s11_teid(), body, XactAction::Delete);
    }

    /// Fold an accepted PGW answer into the connection and build the S11 answer
    fn complete(&mut self, ctx: &mut SgwcContext, rsp: &CreateSessionResponse) -> SgwcResult<Gtp2Body> {
        let imsi = self.base.imsi.clone();
        let key = self.key.clone();
        let policy = ctx.config().user_plane;
        let mut created = Vec::new();

        for bc in &rsp.bearer_contexts_created {
            let cause = bc.cause.unwrap_or(rsp.cause);
            let known = ctx.pdn(&imsi, &key).is_some_and(|pdn| pdn.bearers.contains_key(&bc.ebi));
            if !known {
                log::warn!("[{}] PGW answered for unknown EBI[{}]", imsi, bc.ebi);
                continue;
            }
            if !cause.is_accepted() {
                log::warn!("[{}] PGW rejected EBI[{}] cause {:?}", imsi, bc.ebi, cause);
                ctx.bearer_remove(&imsi, bc.ebi);
                created.push(BearerContext {
                    cause: Some(cause),
                    ..BearerContext::new(bc.ebi)
                });
                continue;
            }

            let (s1u_sgw_fteid, local_s1u_teid) = match policy {
                UserPlanePolicy::Collocated => (
                    bc.s5s8_u_pgw_fteid
                        .map(|fteid| fteid.with_interface(Gtp2FTeidInterfaceType::S1uSgwGtpU)),
                    None,
                ),
                UserPlanePolicy::Split => {
                    let fteid = ctx.alloc_s1u_fteid()?;
                    (Some(fteid), Some(fteid.teid))
                }
            };

            let pdn = ctx
                .pdn_mut(&imsi, &key)
                .ok_or_else(|| SgwcError::NotFound(format!("APN[{key}]")))?;
            if let Some(bearer) = pdn.bearers.get_mut(&bc.ebi) {
                bearer.s5s8_u_pgw_fteid = bc.s5s8_u_pgw_fteid;
                bearer.s1u_sgw_fteid = s1u_sgw_fteid;
                bearer.local_s1u_teid = local_s1u_teid;
                if bc.bearer_qos.is_some() {
                    bearer.qos = bc.bearer_qos;
                }
                created.push(BearerContext {
                    cause: Some(cause),
                    s1u_sgw_fteid,
                    s5s8_u_pgw_fteid: bc.s5s8_u_pgw_fteid,
                    bearer_qos: bearer.qos,
                    ..BearerContext::new(bc.ebi)
                });
            }
        }

        for bc in &rsp.bearer_contexts_marked_for_removal {
            ctx.bearer_remove(&imsi, bc.ebi);
        }

        let pdn = ctx
            .pdn_mut(&imsi, &key)
            .ok_or_else(|| SgwcError::NotFound(format!("APN[{key}]")))?;
        if !pdn.bearers.contains_key(&pdn.default_ebi) {
            return Err(SgwcError::NotFound(format!("default bearer EBI[{}]", pdn.default_ebi)));
        }
        pdn.pgw_s5c_fteid = rsp.pgw_s5s8_cp_fteid.or(rsp.sender_fteid);
        pdn.paa = rsp.paa.or(self.request.paa);
        pdn.apn_ambr = rsp.apn_ambr.or(self.request.apn_ambr);

        let ue = ctx
            .ue(&imsi)
            .ok_or_else(|| SgwcError::NotFound(format!("IMSI[{imsi}]")))?;
        let pdn = ue
            .pdns
            .get(&key)
            .ok_or_else(|| SgwcError::NotFound(format!("APN[{key}]")))?;
        log::info!(
            "[{}] Session established APN[{}] MME_S11_TEID[0x{:x}] SGW_S5C_TEID[0x{:x}]",
            imsi,
            key,
            ue.mme_s11_teid(),
            pdn.sgw_s5c_teid
        );
        Ok(s11_build::build_create_session_response(
            ue,
            pdn,
            ctx.sgw_s11_fteid(ue.sgw_s11_teid),
            rsp,
            created,
            ctx.config().restart_counter,
        ))
    }

    fn reject(&mut self, ctx: &mut SgwcContext, cause: Gtp2Cause) {
        let body = Gtp2Body::CreateSessionResponse(CreateSessionResponse::new(cause));
        self.respond(ctx, body);
        self.base.state = ProcedureState::Failed;
    }
}

impl SgwcProcedure for CreateSessionProcedure {
    fn base(&self) -> &ProcedureBase {
        &self.base
    }

    fn kind(&self) -> ProcedureKind {
        ProcedureKind::CreateSession
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.base.state = ProcedureState::Running;
        match self.establish(ctx) {
            Ok(()) => self.base.state = ProcedureState::AwaitingPeer,
            Err(e) => {
                log::error!("[{}] Create Session APN[{}]: {}", self.base.imsi, self.key, e);
                self.reject(ctx, e.gtp_cause());
            }
        }
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        if self.base.resolve(ctx, gtpc_tx_id).is_none() {
            return;
        }
        let imsi = self.base.imsi.clone();

        let Gtp2Body::CreateSessionResponse(rsp) = &message.body else {
            log::error!("[{}] Unexpected {} for Create Session", imsi, message.body.name());
            ctx.pdn_remove(&imsi, &self.key);
            self.reject(ctx, Gtp2Cause::SystemFailure);
            return;
        };

        if !rsp.cause.is_accepted() {
            log::warn!("[{}] PGW rejected APN[{}] cause {:?}", imsi, self.key, rsp.cause);
            ctx.pdn_remove(&imsi, &self.key);
            let body = Gtp2Body::CreateSessionResponse(CreateSessionResponse {
                pco: rsp.pco.clone(),
                ..CreateSessionResponse::new(rsp.cause)
            });
            self.respond(ctx, body);
            self.base.finish(rsp.cause);
            return;
        }

        match self.complete(ctx, rsp) {
            Ok(body) => {
                self.respond(ctx, body);
                self.base.finish(rsp.cause);
            }
            Err(e) => {
                log::error!("[{}] Create Session APN[{}]: {}", imsi, self.key, e);
                ctx.pdn_remove(&imsi, &self.key);
                self.reject(ctx, e.gtp_cause());
            }
        }
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        if self.base.resolve(ctx, gtpc_tx_id).is_none() {
            return;
        }
        log::warn!("[{}] PGW not responding for APN[{}]", self.base.imsi, self.key);
        ctx.pdn_remove(&self.base.imsi, &self.key);
        self.reject(ctx, Gtp2Cause::RemotePeerNotResponding);
    }
}
