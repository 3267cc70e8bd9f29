//! Modify Bearer
//!
//! Bearers whose S1-U eNodeB endpoint is unchanged are accepted locally.
//! The rest are grouped by PDN connection and relayed to the PGW, one
//! sub-request per connection. The MME gets a single answer once every
//! connection has been resolved.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use ogs_gtp::v2::{
    BearerContext, Gtp2Body, Gtp2Cause, Gtp2FTeid, Gtp2Message, ModifyBearerRequest, XactAction,
};

use crate::context::{PdnKey, SgwcContext};
use crate::event::GtpInterface;
use crate::procedure::{aggregate_cause, ProcedureBase, ProcedureKind, ProcedureState, SgwcProcedure};
use crate::{s11_build, s5c_build};

/// Result for one bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerOutcome {
    pub cause: Gtp2Cause,
    pub s1u_sgw_fteid: Option<Gtp2FTeid>,
}

impl BearerOutcome {
    fn rejected(cause: Gtp2Cause) -> Self {
        Self {
            cause,
            s1u_sgw_fteid: None,
        }
    }
}

/// Bearers of one connection carried by one sub-request
#[derive(Debug, Default)]
struct ModifyGroup {
    to_modify: Vec<BearerContext>,
    to_remove: Vec<u8>,
}

#[derive(Debug)]
pub struct ModifyBearerProcedure {
    base: ProcedureBase,
    request: ModifyBearerRequest,
    groups: BTreeMap<u64, ModifyGroup>,
    modified: BTreeMap<u8, BearerOutcome>,
    removed: BTreeMap<u8, BearerOutcome>,
}

impl ModifyBearerProcedure {
    pub fn new(gtpc_tx_id: u64, imsi: &str, peer: SocketAddr, request: ModifyBearerRequest) -> Self {
        Self {
            base: ProcedureBase::new(gtpc_tx_id, imsi, peer),
            request,
            groups: BTreeMap::new(),
            modified: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }

    /// Accept unchanged bearers and group the others by connection
    fn partition(&mut self, ctx: &SgwcContext) -> BTreeMap<PdnKey, ModifyGroup> {
        let mut partitions: BTreeMap<PdnKey, ModifyGroup> = BTreeMap::new();
        let Some(ue) = ctx.ue(&self.base.imsi) else {
            return partitions;
        };

        for bc in &self.request.bearer_contexts_to_be_modified {
            let (Some(key), Some(bearer)) = (ue.pdn_key_by_ebi(bc.ebi), ue.bearer(bc.ebi)) else {
                log::warn!("[{}] No bearer EBI[{}] to modify", self.base.imsi, bc.ebi);
                self.modified
                    .insert(bc.ebi, BearerOutcome::rejected(Gtp2Cause::ContextNotFound));
                continue;
            };

            let unchanged = match (bc.s1u_enb_fteid, bearer.s1u_enb_fteid) {
                (None, _) => true,
                (Some(new), Some(old)) => new.same_endpoint(&old),
                (Some(_), None) => false,
            };
            if unchanged {
                self.modified.insert(
                    bc.ebi,
                    BearerOutcome {
                        cause: Gtp2Cause::RequestAccepted,
                        s1u_sgw_fteid: bearer.s1u_sgw_fteid,
                    },
                );
            } else {
                partitions.entry(key.clone()).or_default().to_modify.push(bc.clone());
            }
        }

        for bc in &self.request.bearer_contexts_to_be_removed {
            match ue.pdn_key_by_ebi(bc.ebi) {
                Some(key) => partitions.entry(key.clone()).or_default().to_remove.push(bc.ebi),
                None => {
                    log::warn!("[{}] No bearer EBI[{}] to remove", self.base.imsi, bc.ebi);
                    self.removed
                        .insert(bc.ebi, BearerOutcome::rejected(Gtp2Cause::ContextNotFound));
                }
            }
        }
        partitions
    }

    fn record_group(&mut self, ctx: &mut SgwcContext, group: ModifyGroup, rsp: Option<&ModifyBearerResponseView>) {
        let imsi = self.base.imsi.clone();
        for bc in group.to_modify {
            let cause = match rsp {
                Some(view) => view.bearer_cause(&view.modified, bc.ebi),
                None => Gtp2Cause::RemotePeerNotResponding,
            };
            let s1u_sgw_fteid = if cause.is_accepted() {
                commit_enb_fteid(ctx, &imsi, &bc)
            } else {
                log::warn!("[{}] EBI[{}] not modified cause {:?}", imsi, bc.ebi, cause);
                None
            };
            self.modified.insert(bc.ebi, BearerOutcome { cause, s1u_sgw_fteid });
        }

        for ebi in group.to_remove {
            let cause = match rsp {
                Some(view) => view.bearer_cause(&view.marked, ebi),
                None => Gtp2Cause::RemotePeerNotResponding,
            };
            if cause.is_accepted() {
                ctx.bearer_remove(&imsi, ebi);
            }
            self.removed.insert(ebi, BearerOutcome::rejected(cause));
        }
    }

    fn finalize(&mut self, ctx: &mut SgwcContext) {
        let cause = aggregate_cause(
            self.modified
                .values()
                .chain(self.removed.values())
                .map(|outcome| outcome.cause),
        );

        let modified = self
            .modified
            .iter()
            .map(|(&ebi, outcome)| BearerContext {
                cause: Some(outcome.cause),
                s1u_sgw_fteid: outcome.s1u_sgw_fteid,
                ..BearerContext::new(ebi)
            })
            .collect();
        let removed = self
            .removed
            .iter()
            .map(|(&ebi, outcome)| BearerContext {
                cause: Some(outcome.cause),
                ..BearerContext::new(ebi)
            })
            .collect();

        let linked_ebi = self
            .request
            .bearer_contexts_to_be_modified
            .first()
            .and_then(|bc| ctx.ue(&self.base.imsi)?.pdn_by_ebi(bc.ebi))
            .map(|pdn| pdn.default_ebi);

        log::debug!("[{}] Modify Bearer done cause {:?}", self.base.imsi, cause);
        let body = s11_build::build_modify_bearer_response(cause, linked_ebi, modified, removed);
        self.base.respond_s11(ctx, body, XactAction::Delete);
        self.base.finish(cause);
    }
}

/// Store the eNodeB endpoint the PGW accepted; returns the S1-U SGW F-TEID
fn commit_enb_fteid(ctx: &mut SgwcContext, imsi: &str, bc: &BearerContext) -> Option<Gtp2FTeid> {
    let pdn = ctx
        .ue_mut(imsi)?
        .pdns
        .values_mut()
        .find(|pdn| pdn.bearers.contains_key(&bc.ebi))?;
    pdn.released = false;
    let bearer = pdn.bearers.get_mut(&bc.ebi)?;
    bearer.s1u_enb_fteid = bc.s1u_enb_fteid;
    bearer.s1u_sgw_fteid
}

/// Per-bearer causes of a PGW answer; absent bearers take the message cause
struct ModifyBearerResponseView {
    cause: Gtp2Cause,
    modified: Vec<BearerContext>,
    marked: Vec<BearerContext>,
}

impl ModifyBearerResponseView {
    fn bearer_cause(&self, list: &[BearerContext], ebi: u8) -> Gtp2Cause {
        list.iter()
            .find(|bc| bc.ebi == ebi)
            .and_then(|bc| bc.cause)
            .unwrap_or(self.cause)
    }
}

impl SgwcProcedure for ModifyBearerProcedure {
    fn base(&self) -> &ProcedureBase {
        &self.base
    }

    fn kind(&self) -> ProcedureKind {
        ProcedureKind::ModifyBearer
    }

    fn run(&mut self, ctx: &mut SgwcContext) {
        self.base.state = ProcedureState::Running;
        let imsi = self.base.imsi.clone();

        if self.request.bearer_contexts_to_be_modified.is_empty()
            && self.request.bearer_contexts_to_be_removed.is_empty()
        {
            log::error!("[{imsi}] Modify Bearer without bearer contexts");
            let cause = Gtp2Cause::ConditionalIeMissing;
            let body = s11_build::build_modify_bearer_response(cause, None, Vec::new(), Vec::new());
            self.base.respond_s11(ctx, body, XactAction::Delete);
            self.base.finish(cause);
            return;
        }

        for (key, group) in self.partition(ctx) {
            let Some((dest, teid)) = ctx
                .pdn(&imsi, &key)
                .map(|pdn| (pdn.pgw_addr, pdn.pgw_s5c_teid()))
            else {
                continue;
            };

            match self.base.issue(ctx, key.clone()) {
                Ok(sub) => {
                    let body = s5c_build::build_modify_bearer_request(
                        &self.request,
                        &group.to_modify,
                        &group.to_remove,
                    );
                    ctx.send_request(GtpInterface::S5s8, dest, teid, body, sub);
                    self.groups.insert(sub, group);
                }
                Err(e) => {
                    log::error!("[{}] Modify Bearer APN[{}]: {}", imsi, key, e);
                    for bc in &group.to_modify {
                        self.modified.insert(bc.ebi, BearerOutcome::rejected(e.gtp_cause()));
                    }
                    for &ebi in &group.to_remove {
                        self.removed.insert(ebi, BearerOutcome::rejected(e.gtp_cause()));
                    }
                }
            }
        }

        if self.groups.is_empty() {
            self.finalize(ctx);
        } else {
            self.base.state = ProcedureState::AwaitingPeer;
        }
    }

    fn handle_peer_response(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64, message: &Gtp2Message) {
        let Some(group) = self.groups.remove(&gtpc_tx_id) else {
            return;
        };
        self.base.resolve(ctx, gtpc_tx_id);

        let view = match &message.body {
            Gtp2Body::ModifyBearerResponse(rsp) => ModifyBearerResponseView {
                cause: rsp.cause,
                modified: rsp.bearer_contexts_modified.clone(),
                marked: rsp.bearer_contexts_marked_for_removal.clone(),
            },
            other => {
                log::error!("[{}] Unexpected {} for Modify Bearer", self.base.imsi, other.name());
                ModifyBearerResponseView {
                    cause: Gtp2Cause::SystemFailure,
                    modified: Vec::new(),
                    marked: Vec::new(),
                }
            }
        };
        self.record_group(ctx, group, Some(&view));

        if self.groups.is_empty() {
            self.finalize(ctx);
        }
    }

    fn handle_peer_failure(&mut self, ctx: &mut SgwcContext, gtpc_tx_id: u64) {
        let Some(group) = self.groups.remove(&gtpc_tx_id) else {
            return;
        };
        self.base.resolve(ctx, gtpc_tx_id);
        log::warn!("[{}] PGW not responding to Modify Bearer", self.base.imsi);
        self.record_group(ctx, group, None);

        if self.groups.is_empty() {
            self.finalize(ctx);
        }
    }
}
