//! SGWC S5-C Handler
//!
//! Handlers for GTPv2-C messages from the PGW. Responses are matched to
//! their procedure by transaction id, which also covers responses sent
//! with a zero TEID. Downlink Data Notification starts a procedure.

use std::net::SocketAddr;

use ogs_gtp::v2::{DownlinkDataNotification, Gtp2Body, Gtp2Cause, Gtp2Message, XactAction};

use crate::context::SgwcContext;
use crate::event::GtpInterface;
use crate::procedure::{DownlinkDataNotificationProcedure, Procedure};
use crate::s5c_build;

/// Entry point for every correlated S5/S8-C message
pub fn handle_message(ctx: &mut SgwcContext, gtpc_tx_id: u64, peer: SocketAddr, message: Gtp2Message) {
    let (teid, sequence_number) = (message.teid, message.sequence_number);
    match message.body {
        Gtp2Body::DownlinkDataNotification(ddn) => {
            handle_downlink_data_notification(ctx, gtpc_tx_id, peer, teid, ddn)
        }
        body @ (Gtp2Body::CreateSessionResponse(_)
        | Gtp2Body::ModifyBearerResponse(_)
        | Gtp2Body::DeleteSessionResponse(_)
        | Gtp2Body::ReleaseAccessBearersResponse(_)) => {
            log::info!("{} XID[{}] TEID[0x{:x}]", body.name(), gtpc_tx_id, teid);
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
            log::warn!("Not implemented(type:{}) on S5-C", other.name());
        }
    }
}

fn reject(ctx: &mut SgwcContext, gtpc_tx_id: u64, peer: SocketAddr, teid: u32, cause: Gtp2Cause) {
    let body = s5c_build::build_downlink_data_notification_ack(cause, None, ctx.config().restart_counter);
    ctx.send_response(GtpInterface::S5s8, peer, teid, body, gtpc_tx_id, XactAction::Delete);
}

pub fn handle_downlink_data_notification(
    ctx: &mut SgwcContext,
    gtpc_tx_id: u64,
    peer: SocketAddr,
    teid: u32,
    ddn: DownlinkDataNotification,
) {
    log::info!("Downlink Data Notification");

    let Some((imsi, key)) = ctx.pdn_ref_by_s5c_teid(teid) else {
        log::error!("No Context for SGW_S5C_TEID[0x{teid:x}]");
        reject(ctx, gtpc_tx_id, peer, 0, Gtp2Cause::ContextNotFound);
        return;
    };
    let Some(pdn) = ctx.pdn(&imsi, &key) else {
        reject(ctx, gtpc_tx_id, peer, 0, Gtp2Cause::ContextNotFound);
        return;
    };
    let pgw_teid = pdn.pgw_s5c_teid();

    if let Some(ebi) = ddn.ebi {
        if !pdn.bearers.contains_key(&ebi) {
            log::error!("No Bearer Context [EBI:{ebi}]");
            reject(ctx, gtpc_tx_id, peer, pgw_teid, Gtp2Cause::ContextNotFound);
            return;
        }
    }
    log::info!("    IMSI[{}] APN[{}] PGW_S5C_TEID[0x{:x}]", imsi, key, pgw_teid);

    let procedure = DownlinkDataNotificationProcedure::new(gtpc_tx_id, &imsi, peer, key, ddn);
    ctx.start_procedure(&imsi, Procedure::DownlinkDataNotification(procedure));
}
