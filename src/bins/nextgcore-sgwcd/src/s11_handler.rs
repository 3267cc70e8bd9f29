//! SGWC S11 Handler
//!
//! Handlers for GTPv2-C messages from the MME. Requests locate or create
//! the UE context and start a procedure; responses are handed to the
//! procedure that issued the matching request.

use std::net::SocketAddr;

use ogs_gtp::v2::{
    CreateSessionRequest, DeleteSessionRequest, Gtp2Body, Gtp2Cause, Gtp2Message,
    Gtp2MessageType, ModifyBearerRequest, ReleaseAccessBearersRequest, XactAction,
};

use crate::context::SgwcContext;
use crate::event::GtpInterface;
use crate::procedure::{
    CreateSessionProcedure, DeleteSessionProcedure, ModifyBearerProcedure, Procedure,
    ReleaseAccessBearersProcedure,
};
use crate::s11_build;

/// Entry point for every correlated S11 message
pub fn handle_message(ctx: &mut SgwcContext, gtpc_tx_id: u64, peer: SocketAddr, message: Gtp2Message) {
    let (teid, sequence_number) = (message.teid, message.sequence_number);
    match message.body {
        Gtp2Body::CreateSessionRequest(req) => {
            handle_create_session_request(ctx, gtpc_tx_id, peer, teid, req)
        }
        Gtp2Body::ModifyBearerRequest(req) => {
            handle_modify_bearer_request(ctx, gtpc_tx_id, peer, teid, req)
        }
        Gtp2Body::DeleteSessionRequest(req) => {
            handle_delete_session_request(ctx, gtpc_tx_id, peer, teid, req)
        }
        Gtp2Body::ReleaseAccessBearersRequest(req) => {
            handle_release_access_bearers_request(ctx, gtpc_tx_id, peer, teid, req)
        }
        body @ Gtp2Body::DownlinkDataNotificationAcknowledge(_) => {
            log::debug!("Downlink Data Notification Acknowledge XID[{gtpc_tx_id}]");
            ctx.deliver_peer_response(
                gtpc_tx_id,
                Gtp2Message {
                    teid,
                    sequence_number,
                    body,
                },
            );
        }
        other => {
            log::warn!("Not implemented(type:{}) on S11", other.name());
        }
    }
}

/// Answer a request that never reached a procedure
fn reject(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    request_type: Gtp2MessageType,
    cause: Gtp2Cause,
) {
    match s11_build::build_error_response(request_type, cause) {
        Some(body) => {
            ctx.send_response(GtpInterface::S11, peer, teid, body, gtpc_tx_id, XactAction::Delete)
        }
        None => log::error!("No error response for {}", request_type.name()),
    }
}

/// UE addressed by a request header TEID, answering Context Not Found when absent
fn ue_by_teid(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    request_type: Gtp2MessageType,
) -> Option<String> {
    match ctx.imsi_by_s11_teid(teid) {
        Some(imsi) => Some(imsi),
        None => {
            log::error!("No Context for SGW_S11_TEID[0x{teid:x}] in {}", request_type.name());
            reject(ctx, gtpc_tx_id, peer, 0, request_type, Gtp2Cause::ContextNotFound);
            None
        }
    }
}

pub fn handle_create_session_request(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    req: CreateSessionRequest,
) {
    const REQUEST: Gtp2MessageType = Gtp2MessageType::CreateSessionRequest;
    log::info!("Create Session Request");

    let Some(sender_fteid) = req.sender_fteid else {
        log::error!("No Sender F-TEID");
        reject(ctx, gtpc_tx_id, peer, 0, REQUEST, Gtp2Cause::MandatoryIeMissing);
        return;
    };
    if req.imsi.is_empty() || req.bearer_contexts_to_be_created.is_empty() {
        log::error!("No IMSI or Bearer Context");
        reject(ctx, gtpc_tx_id, peer, sender_fteid.teid, REQUEST, Gtp2Cause::MandatoryIeMissing);
        return;
    }

    let imsi = if teid != 0 {
        match ctx.imsi_by_s11_teid(teid) {
            Some(imsi) if imsi == req.imsi => imsi,
            _ => {
                log::error!("No Context for SGW_S11_TEID[0x{teid:x}] IMSI[{}]", req.imsi);
                reject(ctx, gtpc_tx_id, peer, sender_fteid.teid, REQUEST, Gtp2Cause::ContextNotFound);
                return;
            }
        }
    } else {
        req.imsi.clone()
    };

    if ctx.ue(&imsi).is_none() {
        if let Err(e) = ctx.ue_add(&imsi) {
            log::error!("Failed to create SGWC UE context: {e}");
            reject(ctx, gtpc_tx_id, peer, sender_fteid.teid, REQUEST, e.gtp_cause());
            return;
        }
    }
    if let Some(ue) = ctx.ue(&imsi) {
        log::info!("UE IMSI[{}] APN[{}]", imsi, req.apn);
        log::info!(
            "    MME_S11_TEID[0x{:x}] SGW_S11_TEID[0x{:x}]",
            sender_fteid.teid,
            ue.sgw_s11_teid
        );
    }

    let procedure = CreateSessionProcedure::new(gtpc_tx_id, peer, req);
    ctx.start_procedure(&imsi, Procedure::CreateSession(procedure));
}

pub fn handle_modify_bearer_request(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    req: ModifyBearerRequest,
) {
    log::info!("Modify Bearer Request");
    let Some(imsi) = ue_by_teid(ctx, gtpc_tx_id, peer, teid, Gtp2MessageType::ModifyBearerRequest)
    else {
        return;
    };

    if let Some(ue) = ctx.ue_mut(&imsi) {
        if let Some(sender_fteid) = req.sender_fteid {
            ue.mme_s11_fteid = Some(sender_fteid);
        }
        ue.mme_addr = Some(peer);
        log::info!(
            "    MME_S11_TEID[0x{:x}] SGW_S11_TEID[0x{:x}]",
            ue.mme_s11_teid(),
            ue.sgw_s11_teid
        );
    }

    let procedure = ModifyBearerProcedure::new(gtpc_tx_id, &imsi, peer, req);
    ctx.start_procedure(&imsi, Procedure::ModifyBearer(procedure));
}

pub fn handle_delete_session_request(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    req: DeleteSessionRequest,
) {
    log::info!("Delete Session Request");
    let Some(imsi) = ue_by_teid(ctx, gtpc_tx_id, peer, teid, Gtp2MessageType::DeleteSessionRequest)
    else {
        return;
    };
    if let Some(ue) = ctx.ue(&imsi) {
        log::info!(
            "    MME_S11_TEID[0x{:x}] SGW_S11_TEID[0x{:x}]",
            ue.mme_s11_teid(),
            ue.sgw_s11_teid
        );
    }

    let procedure = DeleteSessionProcedure::new(gtpc_tx_id, &imsi, peer, req);
    ctx.start_procedure(&imsi, Procedure::DeleteSession(procedure));
}

pub fn handle_release_access_bearers_request(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    req: ReleaseAccessBearersRequest,
) {
    log::info!("Release Access Bearers Request");
    let Some(imsi) = ue_by_teid(
        ctx,
        gtpc_tx_id,
        peer,
        teid,
        Gtp2MessageType::ReleaseAccessBearersRequest,
    ) else {
        return;
    };

    let procedure = ReleaseAccessBearersProcedure::new(gtpc_tx_id, &imsi, peer, req);
    ctx.start_procedure(&imsi, Procedure::ReleaseAccessBearers(procedure));
}
