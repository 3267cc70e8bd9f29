//! SGWC Context Management
//!
//! UE contexts keyed by IMSI, their PDN connections keyed by (APN, PDN type)
//! and the EPS bearers of each connection. Secondary indices resolve a
//! context from the local S11 TEID, the local S5/S8-C TEID and the
//! transaction ids of outstanding sub-requests.
//!
//! The context is owned by the application task. Procedures run to their
//! next suspension point against `&mut SgwcContext` and queue outbound
//! events in the outbox, which the task drains after every dispatch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use ogs_core::UidGenerator;
use ogs_gtp::v2::{
    Gtp2Ambr, Gtp2BearerQos, Gtp2Body, Gtp2FTeid, Gtp2FTeidInterfaceType, Gtp2Message, Gtp2Paa,
    Gtp2PdnType, TeidPool, XactAction,
};

use crate::config::SgwcConfig;
use crate::error::{SgwcError, SgwcResult};
use crate::event::{GtpInterface, SgwcEvent, SgwcEventKind, TaskId};
use crate::procedure::{Procedure, SgwcProcedure};
use crate::{s11_handler, s5c_handler};

// ============================================================================
// Data Model
// ============================================================================

/// Key of a PDN connection within its UE
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PdnKey {
    pub apn: String,
    pub pdn_type: Gtp2PdnType,
}

impl PdnKey {
    pub fn new(apn: &str, pdn_type: Gtp2PdnType) -> Self {
        Self {
            apn: apn.to_string(),
            pdn_type,
        }
    }
}

impl fmt::Display for PdnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.apn, self.pdn_type)
    }
}

/// EPS bearer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgwcBearer {
    pub ebi: u8,
    pub qos: Option<Gtp2BearerQos>,
    pub s1u_enb_fteid: Option<Gtp2FTeid>,
    pub s1u_sgw_fteid: Option<Gtp2FTeid>,
    pub s5s8_u_pgw_fteid: Option<Gtp2FTeid>,
    /// S1-U TEID owned by this gateway (split user plane only)
    pub local_s1u_teid: Option<u32>,
}

impl SgwcBearer {
    pub fn new(ebi: u8) -> Self {
        Self {
            ebi,
            qos: None,
            s1u_enb_fteid: None,
            s1u_sgw_fteid: None,
            s5s8_u_pgw_fteid: None,
            local_s1u_teid: None,
        }
    }
}

/// PDN connection
#[derive(Debug, Clone)]
pub struct SgwcPdn {
    pub key: PdnKey,
    /// SGW-S5C-TEID (derived from pool)
    pub sgw_s5c_teid: u32,
    /// PGW-S5C F-TEID (received from PGW)
    pub pgw_s5c_fteid: Option<Gtp2FTeid>,
    pub pgw_addr: SocketAddr,
    pub default_ebi: u8,
    pub paa: Option<Gtp2Paa>,
    pub apn_ambr: Option<Gtp2Ambr>,
    pub bearers: BTreeMap<u8, SgwcBearer>,
    /// Access bearers released toward the eNodeB
    pub released: bool,
}

impl SgwcPdn {
    pub fn pgw_s5c_teid(&self) -> u32 {
        self.pgw_s5c_fteid.map_or(0, |f| f.teid)
    }
}

/// UE context
#[derive(Debug)]
pub struct SgwcUe {
    pub imsi: String,
    /// SGW-S11-TEID (derived from pool)
    pub sgw_s11_teid: u32,
    /// MME-S11 F-TEID (received from MME)
    pub mme_s11_fteid: Option<Gtp2FTeid>,
    /// Source address of the last S11 request
    pub mme_addr: Option<SocketAddr>,
    pub pdns: BTreeMap<PdnKey, SgwcPdn>,
    /// Procedures waiting on a peer
    pub procedures: Vec<Procedure>,
}

impl SgwcUe {
    fn new(imsi: &str, sgw_s11_teid: u32) -> Self {
        Self {
            imsi: imsi.to_string(),
            sgw_s11_teid,
            mme_s11_fteid: None,
            mme_addr: None,
            pdns: BTreeMap::new(),
            procedures: Vec::new(),
        }
    }

    pub fn mme_s11_teid(&self) -> u32 {
        self.mme_s11_fteid.map_or(0, |f| f.teid)
    }

    /// Key of the connection holding bearer `ebi`
    pub fn pdn_key_by_ebi(&self, ebi: u8) -> Option<&PdnKey> {
        self.pdns
            .values()
            .find(|pdn| pdn.bearers.contains_key(&ebi))
            .map(|pdn| &pdn.key)
    }

    pub fn pdn_by_ebi(&self, ebi: u8) -> Option<&SgwcPdn> {
        self.pdns.values().find(|pdn| pdn.bearers.contains_key(&ebi))
    }

    pub fn bearer(&self, ebi: u8) -> Option<&SgwcBearer> {
        self.pdn_by_ebi(ebi).and_then(|pdn| pdn.bearers.get(&ebi))
    }

    pub fn bearer_mut(&mut self, ebi: u8) -> Option<&mut SgwcBearer> {
        self.pdns.values_mut().find_map(|pdn| pdn.bearers.get_mut(&ebi))
    }
}

// ============================================================================
// SGWC Context
// ============================================================================

/// SGWC application context
pub struct SgwcContext {
    config: Arc<SgwcConfig>,
    /// Transaction ids, shared with both transaction engines
    ids: Arc<UidGenerator>,
    teid_pool: TeidPool,
    ues: HashMap<String, SgwcUe>,
    s11_teid_index: HashMap<u32, String>,
    s5c_teid_index: HashMap<u32, (String, PdnKey)>,
    /// Outstanding sub-request transaction id -> IMSI
    xact_index: HashMap<u64, String>,
    outbox: Vec<SgwcEvent>,
}

impl SgwcContext {
    pub fn new(config: Arc<SgwcConfig>, ids: Arc<UidGenerator>) -> Self {
        Self::with_teid_pool(config, ids, TeidPool::new())
    }

    pub fn with_teid_pool(config: Arc<SgwcConfig>, ids: Arc<UidGenerator>, teid_pool: TeidPool) -> Self {
        Self {
            config,
            ids,
            teid_pool,
            ues: HashMap::new(),
            s11_teid_index: HashMap::new(),
            s5c_teid_index: HashMap::new(),
            xact_index: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &SgwcConfig {
        &self.config
    }

    pub fn teid_pool(&self) -> &TeidPool {
        &self.teid_pool
    }

    pub fn ue_count(&self) -> usize {
        self.ues.len()
    }

    pub fn ue(&self, imsi: &str) -> Option<&SgwcUe> {
        self.ues.get(imsi)
    }

    pub fn ue_mut(&mut self, imsi: &str) -> Option<&mut SgwcUe> {
        self.ues.get_mut(imsi)
    }

    pub fn pdn(&self, imsi: &str, key: &PdnKey) -> Option<&SgwcPdn> {
        self.ues.get(imsi).and_then(|ue| ue.pdns.get(key))
    }

    pub fn pdn_mut(&mut self, imsi: &str, key: &PdnKey) -> Option<&mut SgwcPdn> {
        self.ues.get_mut(imsi).and_then(|ue| ue.pdns.get_mut(key))
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Find a UE context by IMSI
    pub fn resolve_by_subscriber_id(&self, imsi: &str) -> Option<&SgwcUe> {
        self.ues.get(imsi)
    }

    /// Find a UE context by its local S11 TEID
    pub fn resolve_by_local_tunnel_id(&self, teid: u32) -> Option<&SgwcUe> {
        self.s11_teid_index.get(&teid).and_then(|imsi| self.ues.get(imsi))
    }

    /// Find a PDN connection by its local S5/S8-C TEID
    pub fn resolve_pdn_by_local_tunnel_id(&self, teid: u32) -> Option<(&SgwcUe, &SgwcPdn)> {
        let (imsi, key) = self.s5c_teid_index.get(&teid)?;
        let ue = self.ues.get(imsi)?;
        ue.pdns.get(key).map(|pdn| (ue, pdn))
    }

    /// Find the PDN connection of a UE holding bearer `ebi`
    pub fn resolve_by_bearer_id(&self, imsi: &str, ebi: u8) -> Option<&SgwcPdn> {
        self.ues.get(imsi).and_then(|ue| ue.pdn_by_ebi(ebi))
    }

    pub(crate) fn imsi_by_s11_teid(&self, teid: u32) -> Option<String> {
        self.s11_teid_index.get(&teid).cloned()
    }

    pub(crate) fn pdn_ref_by_s5c_teid(&self, teid: u32) -> Option<(String, PdnKey)> {
        self.s5c_teid_index.get(&teid).cloned()
    }

    // ------------------------------------------------------------------------
    // UE / PDN / Bearer lifecycle
    // ------------------------------------------------------------------------

    /// Create a UE context with a fresh S11 TEID
    pub fn ue_add(&mut self, imsi: &str) -> SgwcResult<&mut SgwcUe> {
        if self.ues.contains_key(imsi) {
            return Err(SgwcError::AlreadyExists(format!("IMSI[{imsi}]")));
        }
        let teid = self.teid_pool.allocate()?;
        self.s11_teid_index.insert(teid, imsi.to_string());
        log::info!("[Added] Number of SGWC-UEs is now {}", self.ues.len() + 1);
        log::debug!("    IMSI[{imsi}] SGW_S11_TEID[0x{teid:x}]");
        Ok(self.ues.entry(imsi.to_string()).or_insert_with(|| SgwcUe::new(imsi, teid)))
    }

    /// Remove a UE context together with its connections
    pub fn ue_remove(&mut self, imsi: &str) -> Option<SgwcUe> {
        let mut ue = self.ues.remove(imsi)?;
        for (_, pdn) in std::mem::take(&mut ue.pdns) {
            self.release_pdn_resources(&pdn);
        }
        self.s11_teid_index.remove(&ue.sgw_s11_teid);
        self.teid_pool.release(ue.sgw_s11_teid);
        self.xact_index.retain(|_, owner| owner.as_str() != imsi);
        log::info!("[Removed] Number of SGWC-UEs is now {}", self.ues.len());
        Some(ue)
    }

    /// Create a PDN connection with a fresh S5/S8-C TEID
    pub fn pdn_add(
        &mut self,
        imsi: &str,
        key: PdnKey,
        pgw_addr: SocketAddr,
        default_ebi: u8,
    ) -> SgwcResult<&mut SgwcPdn> {
        let ue = self
            .ues
            .get(imsi)
            .ok_or_else(|| SgwcError::NotFound(format!("IMSI[{imsi}]")))?;
        if ue.pdns.contains_key(&key) {
            return Err(SgwcError::AlreadyExists(format!("IMSI[{imsi}] APN[{key}]")));
        }

        let teid = self.teid_pool.allocate()?;
        self.s5c_teid_index.insert(teid, (imsi.to_string(), key.clone()));
        log::debug!("    IMSI[{imsi}] APN[{key}] SGW_S5C_TEID[0x{teid:x}]");

        let pdn = SgwcPdn {
            key: key.clone(),
            sgw_s5c_teid: teid,
            pgw_s5c_fteid: None,
            pgw_addr,
            default_ebi,
            paa: None,
            apn_ambr: None,
            bearers: BTreeMap::new(),
            released: false,
        };
        let ue = self
            .ues
            .get_mut(imsi)
            .ok_or_else(|| SgwcError::NotFound(format!("IMSI[{imsi}]")))?;
        Ok(ue.pdns.entry(key).or_insert(pdn))
    }

    /// Remove a PDN connection and release its TEIDs
    pub fn pdn_remove(&mut self, imsi: &str, key: &PdnKey) -> Option<SgwcPdn> {
        let pdn = self.ues.get_mut(imsi)?.pdns.remove(key)?;
        self.release_pdn_resources(&pdn);
        log::debug!("    IMSI[{imsi}] APN[{key}] removed");
        Some(pdn)
    }

    fn release_pdn_resources(&mut self, pdn: &SgwcPdn) {
        self.s5c_teid_index.remove(&pdn.sgw_s5c_teid);
        self.teid_pool.release(pdn.sgw_s5c_teid);
        for bearer in pdn.bearers.values() {
            if let Some(teid) = bearer.local_s1u_teid {
                self.teid_pool.release(teid);
            }
        }
    }

    /// Remove one bearer; returns the bearer if it existed
    pub fn bearer_remove(&mut self, imsi: &str, ebi: u8) -> Option<SgwcBearer> {
        let ue = self.ues.get_mut(imsi)?;
        let bearer = ue
            .pdns
            .values_mut()
            .find_map(|pdn| pdn.bearers.remove(&ebi))?;
        if let Some(teid) = bearer.local_s1u_teid {
            self.teid_pool.release(teid);
        }
        log::debug!("    IMSI[{imsi}] EBI[{ebi}] removed");
        Some(bearer)
    }

    /// Allocate an S1-U TEID on the configured user-plane address
    pub(crate) fn alloc_s1u_fteid(&mut self) -> SgwcResult<Gtp2FTeid> {
        let teid = self.teid_pool.allocate()?;
        Ok(Gtp2FTeid::new_ipv4(
            Gtp2FTeidInterfaceType::S1uSgwGtpU,
            teid,
            self.config.gtpu.s1u,
        ))
    }

    pub(crate) fn sgw_s11_fteid(&self, teid: u32) -> Gtp2FTeid {
        Gtp2FTeid::new_ipv4(Gtp2FTeidInterfaceType::S11S4SgwGtpC, teid, self.config.s11_ipv4())
    }

    pub(crate) fn sgw_s5c_fteid(&self, teid: u32) -> Gtp2FTeid {
        Gtp2FTeid::new_ipv4(Gtp2FTeidInterfaceType::S5S8SgwGtpC, teid, self.config.s5c_ipv4())
    }

    /// Drop a UE that has neither connections nor running procedures
    fn reap(&mut self, imsi: &str) {
        let idle = self
            .ues
            .get(imsi)
            .is_some_and(|ue| ue.pdns.is_empty() && ue.procedures.is_empty());
        if idle {
            self.ue_remove(imsi);
        }
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Allocate a transaction id for a sub-request issued on behalf of `imsi`
    pub(crate) fn alloc_tx_id(&mut self, imsi: &str) -> SgwcResult<u64> {
        let tx = self
            .ids
            .get_uid()
            .ok_or_else(|| SgwcError::ResourceExhausted("transaction ids".to_string()))?;
        self.xact_index.insert(tx, imsi.to_string());
        Ok(tx)
    }

    pub(crate) fn release_tx_id(&mut self, gtpc_tx_id: u64) {
        self.xact_index.remove(&gtpc_tx_id);
    }

    pub fn pending_tx_count(&self) -> usize {
        self.xact_index.len()
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    pub(crate) fn send_request(
        &mut self,
        iface: GtpInterface,
        dest: SocketAddr,
        teid: u32,
        body: Gtp2Body,
        gtpc_tx_id: u64,
    ) {
        log::debug!("[{}] {} XID[{}] to {}", iface.name(), body.name(), gtpc_tx_id, dest);
        self.outbox.push(SgwcEvent::send_request(
            iface,
            gtpc_tx_id,
            dest,
            Gtp2Message::new(teid, body),
        ));
    }

    pub(crate) fn send_response(
        &mut self,
        iface: GtpInterface,
        dest: SocketAddr,
        teid: u32,
        body: Gtp2Body,
        gtpc_tx_id: u64,
        action: XactAction,
    ) {
        log::debug!("[{}] {} XID[{}] to {}", iface.name(), body.name(), gtpc_tx_id, dest);
        self.outbox.push(SgwcEvent::send_response(
            iface,
            gtpc_tx_id,
            dest,
            Gtp2Message::new(teid, body),
            action,
        ));
    }

    /// Events queued since the last drain
    pub fn outbox(&self) -> &[SgwcEvent] {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<SgwcEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Handle one event addressed to the application task
    pub fn dispatch(&mut self, event: SgwcEvent) {
        let origin = event.origin;
        match event.kind {
            SgwcEventKind::GtpMessage {
                gtpc_tx_id,
                peer,
                message,
            } => match origin {
                TaskId::SgwcS11 => s11_handler::handle_message(self, gtpc_tx_id, peer, message),
                TaskId::SgwcS5s8 => s5c_handler::handle_message(self, gtpc_tx_id, peer, message),
                TaskId::SgwcApp => {
                    log::error!("GTP message XID[{gtpc_tx_id}] without an originating path")
                }
            },
            SgwcEventKind::RemotePeerNotResponding {
                gtpc_tx_id,
                peer,
                message_type,
            } => {
                log::warn!(
                    "[{}] No response from {} for type {} XID[{}]",
                    origin.name(),
                    peer,
                    message_type,
                    gtpc_tx_id
                );
                self.deliver_peer_failure(gtpc_tx_id);
            }
            SgwcEventKind::FsmEntry | SgwcEventKind::FsmExit => {}
            SgwcEventKind::SendRequest { gtpc_tx_id, .. }
            | SgwcEventKind::SendResponse { gtpc_tx_id, .. } => {
                log::error!("Outbound event XID[{gtpc_tx_id}] delivered to {}", TaskId::SgwcApp.name());
            }
        }
    }

    /// Run a new procedure for `imsi` until it first suspends
    pub(crate) fn start_procedure(&mut self, imsi: &str, mut procedure: Procedure) {
        let gtpc_tx_id = procedure.gtpc_tx_id();
        if let Some(existing) = self
            .ues
            .get(imsi)
            .and_then(|ue| ue.procedures.iter().find(|p| p.has_trxn_id(gtpc_tx_id)))
        {
            if existing.kind() != procedure.kind() {
                log::error!(
                    "[{}] XID[{}] bound to {} procedure, {} rejected",
                    imsi,
                    gtpc_tx_id,
                    existing.kind().name(),
                    procedure.kind().name()
                );
            } else {
                log::warn!("[{}] Duplicate {} XID[{}] ignored", imsi, procedure.kind().name(), gtpc_tx_id);
            }
            return;
        }

        log::debug!("[{}] {} procedure XID[{}] started", imsi, procedure.kind().name(), gtpc_tx_id);
        procedure.run(self);
        self.settle(imsi, procedure);
    }

    /// Hand a peer response to the procedure that issued the sub-request
    pub(crate) fn deliver_peer_response(&mut self, gtpc_tx_id: u64, message: Gtp2Message) -> bool {
        let Some((imsi, mut procedure)) = self.take_procedure(gtpc_tx_id) else {
            log::warn!("No procedure waiting on XID[{}] for {}", gtpc_tx_id, message.body.name());
            return false;
        };
        procedure.handle_peer_response(self, gtpc_tx_id, &message);
        self.settle(&imsi, procedure);
        true
    }

    /// Tell the procedure that issued a sub-request its peer never answered
    pub(crate) fn deliver_peer_failure(&mut self, gtpc_tx_id: u64) -> bool {
        let Some((imsi, mut procedure)) = self.take_procedure(gtpc_tx_id) else {
            log::warn!("No procedure waiting on XID[{gtpc_tx_id}]");
            return false;
        };
        procedure.handle_peer_failure(self, gtpc_tx_id);
        self.settle(&imsi, procedure);
        true
    }

    fn take_procedure(&mut self, gtpc_tx_id: u64) -> Option<(String, Procedure)> {
        let imsi = self.xact_index.get(&gtpc_tx_id).cloned()?;
        let ue = self.ues.get_mut(&imsi)?;
        let index = ue.procedures.iter().position(|p| p.has_trxn_id(gtpc_tx_id))?;
        Some((imsi, ue.procedures.remove(index)))
    }

    fn settle(&mut self, imsi: &str, procedure: Procedure) {
        if procedure.marked_for_removal() {
            log::debug!(
                "[{}] {} procedure XID[{}] {}",
                imsi,
                procedure.kind().name(),
                procedure.gtpc_tx_id(),
                procedure.state().name()
            );
        } else if let Some(ue) = self.ues.get_mut(imsi) {
            ue.procedures.push(procedure);
        } else {
            log::warn!("[{imsi}] Context gone, {} procedure dropped", procedure.kind().name());
        }
        self.reap(imsi);
    }
}

impl fmt::Debug for SgwcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SgwcContext")
            .field("ues", &self.ues.len())
            .field("pending_tx", &self.xact_index.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
