//! Downlink Data Notification
//!
//! Relays a PGW notification for an idle UE to the MME and acknowledges
//! the PGW with the MME's answer.

use std::net::SocketAddr;

use ogs_gtp::v2::{DownlinkDataNotification, Gtp2Body, Gtp2Cause, Gtp2Message, XactAction};

use crate::context::{PdnKey, SgwcContext};
use crate::event::GtpInterface;
use crate::procedure::{ProcedureBase, ProcedureKind, ProcedureState, SgwcProcedure};
use crate::{s11_build, s5c_build};

#[derive(Debug)]
pub struct DownlinkDataNotificationProcedure {
    base: ProcedureBase,
    request: DownlinkDataNotification,
    key: PdnKey,
}

impl DownlinkDataNotificationProcedure {
    /// `peer` is the PGW that sent the notification
    pub fn new(
        gtpc_tx_id: u64,
        imsi: &str,
        peer: SocketAddr,
        key: PdnKey,
        request: DownlinkDataNotification,
    ) -> Self {
        Self {
            base: ProcedureBase::new(gtpc_tx_id, imsi, peer),
            request,
            key,
        }
    }

    fn acknowledge(&mut self, ctx: &mut SgwcContext, cause: Gtp2Cause, data_notification_delay: Option<u8>) {
        let teid = ctx.pdn(&self.base.imsi, &self.key).map_or(0, |pdn| pdn.pgw_s5c_teid());
        let body = s5c_build::build_downlink_data_notification_ack(
            cause,
            data_notification_delay,
            ctx.config().restart_counter,
        );
        ctx.send_response(
            GtpInterface::S5s8,
            self.base.peer,
            teid,
            body,
            self.base.gtpc_tx_id,
            XactAction::Delete,
        );
        self.base.finish(cause);
    }
}

impl SgwcProcedure for DownlinkDataNotificationProcedure {
    fn base(&self) -> &ProcedureBase {
        &self.base
    }

    fn kind(&self) -> ProcedureKind {
        ProcedureKind::DownlinkDataNotification
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.base.state = ProcedureState::Running;
        let imsi = self.base.imsi.clone();

        let Some((mme_addr, body, mme_teid)) = ctx.ue(&imsi).and_then(|ue| {
            let pdn = ue.pdns.get(&self.key)?;
            let ebi = self.request.ebi.unwrap_or(pdn.default_ebi);
            let arp = self
                .request
                .arp
                .or_else(|| pdn.bearers.get(&ebi).and_then(|b| b.qos).map(|qos| qos.arp));
            let body = s11_build::build_downlink_data_notification(ue, ebi, arp, self.request.cause);
            Some((ue.mme_addr?, body, ue.mme_s11_teid()))
        }) else {
            log::warn!("[{}] No MME to notify for APN[{}]", imsi, self.key);
            self.acknowledge(ctx, Gtp2Cause::ContextNotFound, None);
            return;
        };

        match self.base.issue(ctx, self.key.clone()) {
            Ok(sub) => {
                ctx.send_request(GtpInterface::S11, mme_addr, mme_teid, body, sub);
                self.base.state = ProcedureState::AwaitingPeer;
            }
            Err(e) => {
                log::error!("[{}] Downlink Data Notification: {}", imsi, e);
                self.acknowledge(ctx, e.gtp_cause(), None);
            }
        }
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        if self.base.resolve(ctx, gtpc_tx_id).is_none() {
            return;
        }
        match &message.body {
            Gtp2Body::DownlinkDataNotificationAcknowledge(ack) => {
                log::debug!("[{}] Downlink Data Notification Ack cause {:?}", self.base.imsi, ack.cause);
                self.acknowledge(ctx, ack.cause, ack.data_notification_delay);
            }
            other => {
                log::error!("[{}] Unexpected {} for Downlink Data Notification", self.base.imsi, other.name());
                self.acknowledge(ctx, Gtp2Cause::SystemFailure, None);
            }
        }
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        if self.base.resolve(ctx, gtpc_tx_id).is_none() {
            return;
        }
        log::warn!("[{}] MME not responding to Downlink Data Notification", self.base.imsi);
        self.acknowledge(ctx, Gtp2Cause::RemotePeerNotResponding, None);
    }
}
