//! GTPv2-C Transaction Engine
//!
//! Reliable request/response exchange over datagrams (TS 29.274 Section 7.6):
//! sequence number assignment, T3/N3 retransmission, duplicate suppression
//! and response correlation. The engine knows nothing about message
//! contents beyond their type and sequence number.
//!
//! Every transaction is identified upward by an opaque `gtpc_tx_id` drawn
//! from a shared [`UidGenerator`]. The engine frees that id when it deletes
//! the transaction record.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ogs_core::async_timer::AsyncTimerMgr;
use ogs_core::UidGenerator;

use crate::error::{GtpError, GtpResult};
use super::header::{
    is_initial_message, is_triggered_message, GTP2_SQN_RESERVED_BIT,
};
use super::message::Gtp2Message;

// ============================================================================
// Constants
// ============================================================================

/// T3-RESPONSE timer
pub const GTPV2C_T3_RESPONSE_MS: u64 = 1000;

/// N3-REQUESTS counter
pub const GTPV2C_N3_REQUESTS: u32 = 3;

/// Slack added to `T3 * (N3 + 1)` before a record is reclaimed
pub const GTPV2C_CLEANUP_SLACK_MS: u64 = 1000;

// ============================================================================
// Traits
// ============================================================================

/// What the engine needs to know about a message
pub trait XactMessage: Clone + fmt::Debug {
    fn message_type(&self) -> u8;
    fn sequence_number(&self) -> u32;
    fn set_sequence_number(&mut self, sqn: u32);
}

impl XactMessage for Gtp2Message {
    fn message_type(&self) -> u8 {
        self.body.message_type() as u8
    }

    fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    fn set_sequence_number(&mut self, sqn: u32) {
        self.sequence_number = sqn;
    }
}

/// Outbound datagram sink
pub trait XactTransport<M> {
    fn send_to(&mut self, dest: SocketAddr, msg: &M) -> GtpResult<()>;
}

// ============================================================================
// Types
// ============================================================================

/// Retransmission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XactConfig {
    pub t3_response: Duration,
    pub n3_requests: u32,
    /// First sequence number handed out is `initial_sqn + 1`
    pub initial_sqn: u32,
}

impl XactConfig {
    pub fn cleanup_interval(&self) -> Duration {
        self.t3_response * (self.n3_requests + 1) + Duration::from_millis(GTPV2C_CLEANUP_SLACK_MS)
    }
}

impl Default for XactConfig {
    fn default() -> Self {
        Self {
            t3_response: Duration::from_millis(GTPV2C_T3_RESPONSE_MS),
            n3_requests: GTPV2C_N3_REQUESTS,
            initial_sqn: 0,
        }
    }
}

/// What to do with an inbound transaction after answering it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactAction {
    /// Reclaim the record now
    Delete,
    /// Keep the record until its cleanup timer fires
    Keep,
}

/// Timer tags; each carries the sequence number of its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactTimer {
    Retry(u32),
    Cleanup(u32),
    Tombstone(u32),
}

/// Who opened the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactOrigin {
    Local,
    Remote,
}

/// Retry budget exhausted on an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XactTimeout {
    pub gtpc_tx_id: u64,
    pub sequence_number: u32,
    pub message_type: u8,
    pub remote: SocketAddr,
}

#[derive(Debug)]
struct XactRecord<M> {
    gtpc_tx_id: u64,
    origin: XactOrigin,
    initial_type: u8,
    expected_type: Option<u8>,
    answered: bool,
    /// Retry budget exhausted; late responses are no longer correlated
    timed_out: bool,
    retry_count: u32,
    retry_timer: Option<u64>,
    cleanup_timer: Option<u64>,
    /// Local: the request to retransmit. Remote: the last response sent.
    retry_msg: Option<M>,
    remote: SocketAddr,
}

/// Sequence number of an inbound transaction answered with `XactAction::Delete`
#[derive(Debug)]
struct Tombstone<M> {
    timer_id: u64,
    initial_type: u8,
    response: M,
}

// ============================================================================
// Engine
// ============================================================================

pub struct GtpXactEngine<M: XactMessage, T: XactTransport<M>> {
    name: String,
    config: XactConfig,
    ids: Arc<UidGenerator>,
    transport: T,
    timers: AsyncTimerMgr<XactTimer>,
    seq_num: u32,
    records: HashMap<u32, XactRecord<M>>,
    tx_to_sqn: HashMap<u64, u32>,
    tombstones: HashMap<u32, Tombstone<M>>,
}

impl<M: XactMessage, T: XactTransport<M>> GtpXactEngine<M, T> {
    pub fn new(name: &str, config: XactConfig, ids: Arc<UidGenerator>, transport: T) -> Self {
        Self::with_timer_mgr(name, config, ids, transport, AsyncTimerMgr::new())
    }

    pub fn with_timer_mgr(
        name: &str,
        config: XactConfig,
        ids: Arc<UidGenerator>,
        transport: T,
        timers: AsyncTimerMgr<XactTimer>,
    ) -> Self {
        log::info!(
            "[{}] gtpv2c engine created, initial SQN[{}] T3[{:?}] N3[{}]",
            name,
            config.initial_sqn & (GTP2_SQN_RESERVED_BIT - 1),
            config.t3_response,
            config.n3_requests
        );
        Self {
            name: name.to_string(),
            config,
            ids,
            transport,
            timers,
            seq_num: config.initial_sqn & (GTP2_SQN_RESERVED_BIT - 1),
            records: HashMap::new(),
            tx_to_sqn: HashMap::new(),
            tombstones: HashMap::new(),
        }
    }

    pub fn timers(&self) -> &AsyncTimerMgr<XactTimer> {
        &self.timers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn next_expiration(&self) -> Option<Duration> {
        self.timers.next_expiration()
    }

    /// Number of live transaction records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn has_transaction(&self, gtpc_tx_id: u64) -> bool {
        self.tx_to_sqn.contains_key(&gtpc_tx_id)
    }

    pub fn sequence_number_of(&self, gtpc_tx_id: u64) -> Option<u32> {
        self.tx_to_sqn.get(&gtpc_tx_id).copied()
    }

    /// Free an opaque id that never reached a transaction record
    pub fn release_unbound_tx_id(&self, gtpc_tx_id: u64) -> bool {
        if self.tx_to_sqn.contains_key(&gtpc_tx_id) {
            return false;
        }
        self.ids.free_uid(gtpc_tx_id)
    }

    fn next_sequence_number(&mut self) -> u32 {
        for _ in 0..GTP2_SQN_RESERVED_BIT {
            self.seq_num += 1;
            if self.seq_num & GTP2_SQN_RESERVED_BIT != 0 {
                self.seq_num = 0;
            }
            if !self.records.contains_key(&self.seq_num)
                && !self.tombstones.contains_key(&self.seq_num)
            {
                break;
            }
        }
        self.seq_num
    }

    fn transmit(&mut self, dest: SocketAddr, msg: &M) {
        if let Err(e) = self.transport.send_to(dest, msg) {
            log::error!(
                "[{}] send type {} SQN[{}] to {} failed: {}",
                self.name,
                msg.message_type(),
                msg.sequence_number(),
                dest,
                e
            );
        }
    }

    fn arm(&self, timer: XactTimer, duration: Duration) -> u64 {
        self.timers.start(timer, duration)
    }

    /// Send a request opening a new transaction and return its sequence number
    pub fn send_request(
        &mut self,
        dest: SocketAddr,
        mut msg: M,
        expected_response_kind: u8,
        gtpc_tx_id: u64,
    ) -> GtpResult<u32> {
        if let Some(&sqn) = self.tx_to_sqn.get(&gtpc_tx_id) {
            log::error!(
                "[{}] XID[{}] already bound to SQN[{}], request discarded",
                self.name,
                gtpc_tx_id,
                sqn
            );
            return Err(GtpError::DuplicateTransaction {
                sqn,
                message_type: msg.message_type(),
            });
        }

        let sqn = self.next_sequence_number();
        msg.set_sequence_number(sqn);

        let retry_timer = self.arm(XactTimer::Retry(sqn), self.config.t3_response);
        let cleanup_timer = self.arm(XactTimer::Cleanup(sqn), self.config.cleanup_interval());

        log::debug!(
            "[{}] Sending type {} SQN[{}] XID[{}] to {}",
            self.name,
            msg.message_type(),
            sqn,
            gtpc_tx_id,
            dest
        );
        self.transmit(dest, &msg);

        self.records.insert(
            sqn,
            XactRecord {
                gtpc_tx_id,
                origin: XactOrigin::Local,
                initial_type: msg.message_type(),
                expected_type: Some(expected_response_kind),
                answered: false,
                timed_out: false,
                retry_count: 0,
                retry_timer: Some(retry_timer),
                cleanup_timer: Some(cleanup_timer),
                retry_msg: Some(msg),
                remote: dest,
            },
        );
        self.tx_to_sqn.insert(gtpc_tx_id, sqn);
        Ok(sqn)
    }

    /// Answer an inbound transaction
    pub fn send_response(
        &mut self,
        dest: SocketAddr,
        mut msg: M,
        gtpc_tx_id: u64,
        action: XactAction,
    ) -> GtpResult<()> {
        let sqn = *self
            .tx_to_sqn
            .get(&gtpc_tx_id)
            .ok_or(GtpError::TransactionNotFound(gtpc_tx_id))?;

        msg.set_sequence_number(sqn);
        log::debug!(
            "[{}] Sending type {} SQN[{}] XID[{}] to {} ({:?})",
            self.name,
            msg.message_type(),
            sqn,
            gtpc_tx_id,
            dest,
            action
        );
        self.transmit(dest, &msg);

        let initial_type = match self.records.get_mut(&sqn) {
            Some(record) => {
                record.expected_type.get_or_insert(msg.message_type());
                record.answered = true;
                record.initial_type
            }
            None => return Err(GtpError::TransactionNotFound(gtpc_tx_id)),
        };

        match action {
            XactAction::Keep => {
                if let Some(record) = self.records.get_mut(&sqn) {
                    record.retry_msg = Some(msg);
                }
            }
            XactAction::Delete => {
                self.remove_record(sqn);
                let timer_id = self.arm(XactTimer::Tombstone(sqn), self.config.cleanup_interval());
                if let Some(old) = self.tombstones.insert(
                    sqn,
                    Tombstone {
                        timer_id,
                        initial_type,
                        response: msg,
                    },
                ) {
                    self.timers.timer_remove(old.timer_id);
                }
            }
        }
        Ok(())
    }

    /// Correlate an inbound message. Returns the transaction id to hand upward.
    pub fn handle_incoming(&mut self, msg: &M, source: SocketAddr) -> GtpResult<u64> {
        let sqn = msg.sequence_number();
        let msg_type = msg.message_type();

        if let Some(record) = self.records.get_mut(&sqn) {
            match record.origin {
                XactOrigin::Local => {
                    let pinned_ok = record.expected_type.map_or(true, |e| e == msg_type);
                    if pinned_ok && is_triggered_message(record.initial_type, msg_type) {
                        if record.timed_out {
                            log::warn!(
                                "[{}] Late response type {} SQN[{}] XID[{}] after timeout, discarded",
                                self.name,
                                msg_type,
                                sqn,
                                record.gtpc_tx_id
                            );
                            return Err(GtpError::UnexpectedMessage { sqn, message_type: msg_type });
                        }
                        if record.answered {
                            log::warn!(
                                "[{}] Duplicate response type {} SQN[{}] XID[{}] discarded",
                                self.name,
                                msg_type,
                                sqn,
                                record.gtpc_tx_id
                            );
                            return Err(GtpError::DuplicateTransaction { sqn, message_type: msg_type });
                        }
                        record.answered = true;
                        record.expected_type.get_or_insert(msg_type);
                        record.retry_msg = None;
                        let gtpc_tx_id = record.gtpc_tx_id;
                        if let Some(timer_id) = record.retry_timer.take() {
                            self.timers.timer_remove(timer_id);
                        }
                        log::debug!(
                            "[{}] Received type {} SQN[{}] XID[{}] from {}",
                            self.name,
                            msg_type,
                            sqn,
                            gtpc_tx_id,
                            source
                        );
                        return Ok(gtpc_tx_id);
                    }

                    if is_initial_message(msg_type) {
                        log::error!(
                            "[{}] Request type {} SQN[{}] collides with pending type {}",
                            self.name,
                            msg_type,
                            sqn,
                            record.initial_type
                        );
                        return Err(GtpError::DuplicateTransaction { sqn, message_type: msg_type });
                    }
                    let expected = record.expected_type.unwrap_or(0);
                    log::error!(
                        "[{}] Received type {} SQN[{}], expected {}",
                        self.name,
                        msg_type,
                        sqn,
                        expected
                    );
                    return Err(GtpError::ProtocolMismatch { sqn, expected, received: msg_type });
                }
                XactOrigin::Remote => {
                    if msg_type == record.initial_type {
                        let replay = record.retry_msg.clone();
                        log::warn!(
                            "[{}] Retransmitted request type {} SQN[{}] XID[{}]",
                            self.name,
                            msg_type,
                            sqn,
                            record.gtpc_tx_id
                        );
                        if let Some(response) = replay {
                            self.transmit(source, &response);
                        }
                        return Err(GtpError::DuplicateTransaction { sqn, message_type: msg_type });
                    }
                    if is_initial_message(msg_type) {
                        return Err(GtpError::DuplicateTransaction { sqn, message_type: msg_type });
                    }
                    let expected = record.expected_type.unwrap_or(0);
                    return Err(GtpError::ProtocolMismatch { sqn, expected, received: msg_type });
                }
            }
        }

        if let Some(tombstone) = self.tombstones.get(&sqn) {
            if tombstone.initial_type == msg_type {
                let response = tombstone.response.clone();
                log::warn!(
                    "[{}] Late retransmission type {} SQN[{}], replaying response",
                    self.name,
                    msg_type,
                    sqn
                );
                self.transmit(source, &response);
            }
            return Err(GtpError::DuplicateTransaction { sqn, message_type: msg_type });
        }

        if !is_initial_message(msg_type) {
            log::error!(
                "[{}] Received type {} SQN[{}] matches no transaction, discarded",
                self.name,
                msg_type,
                sqn
            );
            return Err(GtpError::UnexpectedMessage { sqn, message_type: msg_type });
        }

        let gtpc_tx_id = self
            .ids
            .get_uid()
            .ok_or_else(|| GtpError::ResourceExhausted("transaction ids".to_string()))?;
        let cleanup_timer = self.arm(XactTimer::Cleanup(sqn), self.config.cleanup_interval());

        self.records.insert(
            sqn,
            XactRecord {
                gtpc_tx_id,
                origin: XactOrigin::Remote,
                initial_type: msg_type,
                expected_type: None,
                answered: false,
                timed_out: false,
                retry_count: 0,
                retry_timer: None,
                cleanup_timer: Some(cleanup_timer),
                retry_msg: None,
                remote: source,
            },
        );
        self.tx_to_sqn.insert(gtpc_tx_id, sqn);

        log::debug!(
            "[{}] Received type {} SQN[{}] from {}, new XID[{}]",
            self.name,
            msg_type,
            sqn,
            source,
            gtpc_tx_id
        );
        Ok(gtpc_tx_id)
    }

    /// React to one expired timer
    pub fn on_timer_fire(&mut self, timer_id: u64, timer: XactTimer) -> Option<XactTimeout> {
        match timer {
            XactTimer::Retry(sqn) => {
                let n3 = self.config.n3_requests;
                let record = self.records.get_mut(&sqn)?;
                if record.retry_timer != Some(timer_id) {
                    return None;
                }
                record.retry_timer = None;

                if record.retry_count < n3 {
                    record.retry_count += 1;
                    let remote = record.remote;
                    let retry_count = record.retry_count;
                    let msg = record.retry_msg.clone()?;
                    log::debug!(
                        "[{}] Retry {} type {} SQN[{}]",
                        self.name,
                        retry_count,
                        msg.message_type(),
                        sqn
                    );
                    let retry_timer = self.arm(XactTimer::Retry(sqn), self.config.t3_response);
                    if let Some(record) = self.records.get_mut(&sqn) {
                        record.retry_timer = Some(retry_timer);
                    }
                    self.transmit(remote, &msg);
                    None
                } else {
                    record.timed_out = true;
                    log::warn!(
                        "[{}] No response for type {} SQN[{}] XID[{}] after {} retries",
                        self.name,
                        record.initial_type,
                        sqn,
                        record.gtpc_tx_id,
                        record.retry_count
                    );
                    Some(XactTimeout {
                        gtpc_tx_id: record.gtpc_tx_id,
                        sequence_number: sqn,
                        message_type: record.initial_type,
                        remote: record.remote,
                    })
                }
            }
            XactTimer::Cleanup(sqn) => {
                if self.records.get(&sqn)?.cleanup_timer == Some(timer_id) {
                    log::debug!("[{}] Cleanup SQN[{}]", self.name, sqn);
                    self.remove_record(sqn);
                }
                None
            }
            XactTimer::Tombstone(sqn) => {
                if self.tombstones.get(&sqn).map(|t| t.timer_id) == Some(timer_id) {
                    self.tombstones.remove(&sqn);
                }
                None
            }
        }
    }

    /// Fire every expired timer; returns the exhausted transactions
    pub fn process_timers(&mut self) -> Vec<XactTimeout> {
        self.timers
            .process_expired()
            .into_iter()
            .filter_map(|entry| self.on_timer_fire(entry.id, entry.timer_type))
            .collect()
    }

    fn remove_record(&mut self, sqn: u32) {
        if let Some(record) = self.records.remove(&sqn) {
            if let Some(timer_id) = record.retry_timer {
                self.timers.timer_remove(timer_id);
            }
            if let Some(timer_id) = record.cleanup_timer {
                self.timers.timer_remove(timer_id);
            }
            self.tx_to_sqn.remove(&record.gtpc_tx_id);
            self.ids.free_uid(record.gtpc_tx_id);
        }
    }
}

impl<M: XactMessage, T: XactTransport<M>> fmt::Debug for GtpXactEngine<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GtpXactEngine")
            .field("name", &self.name)
            .field("seq_num", &self.seq_num)
            .field("records", &self.records.len())
            .field("tombstones", &self.tombstones.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::v2::header::Gtp2MessageType;
    use crate::v2::message::{
        CreateSessionRequest, CreateSessionResponse, Gtp2Body, ModifyBearerResponse,
    };
    use crate::v2::types::{Gtp2Cause, Gtp2PdnType};

    /// Records every datagram handed to it
    #[derive(Debug, Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Vec<(SocketAddr, Gtp2Message)>,
    }

    impl XactTransport<Gtp2Message> for RecordingTransport {
        fn send_to(&mut self, dest: SocketAddr, msg: &Gtp2Message) -> GtpResult<()> {
            self.sent.push((dest, msg.clone()));
            Ok(())
        }
    }

    pub(crate) type TestEngine = GtpXactEngine<Gtp2Message, RecordingTransport>;

    pub(crate) fn engine_with(config: XactConfig) -> (TestEngine, Arc<UidGenerator>) {
        let ids = Arc::new(UidGenerator::new());
        let engine = GtpXactEngine::with_timer_mgr(
            "test",
            config,
            Arc::clone(&ids),
            RecordingTransport::default(),
            AsyncTimerMgr::with_manual_clock(),
        );
        (engine, ids)
    }

    pub(crate) fn peer() -> SocketAddr {
        "127.0.0.2:2123".parse().unwrap()
    }

    pub(crate) fn csr() -> Gtp2Message {
        Gtp2Message::new(
            0,
            Gtp2Body::CreateSessionRequest(CreateSessionRequest::new(
                "001010000000001",
                "internet",
                Gtp2PdnType::Ipv4,
            )),
        )
    }

    pub(crate) fn csr_response(sqn: u32) -> Gtp2Message {
        let mut msg = Gtp2Message::new(
            1,
            Gtp2Body::CreateSessionResponse(CreateSessionResponse::new(Gtp2Cause::RequestAccepted)),
        );
        msg.sequence_number = sqn;
        msg
    }

    const CSR_RSP: u8 = Gtp2MessageType::CreateSessionResponse as u8;

    #[test]
    fn test_send_request_transmits_and_arms_timers() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();

        let sqn = engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();
        assert_eq!(sqn, 1);
        assert_eq!(engine.transport().sent.len(), 1);
        assert_eq!(engine.transport().sent[0].1.sequence_number, 1);
        assert_eq!(engine.timers().count(), 2);
        assert_eq!(engine.sequence_number_of(tx), Some(1));
    }

    #[test]
    fn test_response_correlates_and_cancels_retry() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        let sqn = engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();

        assert_eq!(engine.handle_incoming(&csr_response(sqn), peer()), Ok(tx));
        assert_eq!(engine.timers().count(), 1);

        engine.timers().advance(Duration::from_secs(4));
        assert!(engine.process_timers().is_empty());
        assert_eq!(engine.transport().sent.len(), 1);
        assert!(engine.has_transaction(tx));

        engine.timers().advance(Duration::from_secs(2));
        engine.process_timers();
        assert!(!engine.has_transaction(tx));
        assert!(!ids.is_used(tx));
    }

    #[test]
    fn test_duplicate_response_rejected() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        let sqn = engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();

        assert!(engine.handle_incoming(&csr_response(sqn), peer()).is_ok());
        assert!(matches!(
            engine.handle_incoming(&csr_response(sqn), peer()),
            Err(GtpError::DuplicateTransaction { .. })
        ));
    }

    #[test]
    fn test_wrong_response_kind_is_protocol_mismatch() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        let sqn = engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();

        let mut wrong = Gtp2Message::new(
            1,
            Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::RequestAccepted)),
        );
        wrong.sequence_number = sqn;
        assert_eq!(
            engine.handle_incoming(&wrong, peer()),
            Err(GtpError::ProtocolMismatch {
                sqn,
                expected: CSR_RSP,
                received: Gtp2MessageType::ModifyBearerResponse as u8,
            })
        );
        // still awaiting the right one
        assert_eq!(engine.handle_incoming(&csr_response(sqn), peer()), Ok(tx));
    }

    #[test]
    fn test_retry_then_peer_not_responding_once() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();

        let mut timeouts = Vec::new();
        for _ in 0..10 {
            engine.timers().advance(Duration::from_millis(1000));
            timeouts.extend(engine.process_timers());
        }

        assert_eq!(engine.transport().sent.len(), (GTPV2C_N3_REQUESTS + 1) as usize);
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].gtpc_tx_id, tx);
        assert_eq!(engine.record_count(), 0);
        assert_eq!(engine.timers().count(), 0);
    }

    #[test]
    fn test_peer_not_responding_keeps_record_until_cleanup() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();

        let mut timeouts = Vec::new();
        for _ in 0..4 {
            engine.timers().advance(Duration::from_millis(1000));
            timeouts.extend(engine.process_timers());
        }
        assert_eq!(timeouts.len(), 1);
        assert!(engine.has_transaction(tx));

        engine.timers().advance(Duration::from_millis(1000));
        assert!(engine.process_timers().is_empty());
        assert!(!engine.has_transaction(tx));
    }

    #[test]
    fn test_inbound_request_opens_transaction() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let mut req = csr();
        req.sequence_number = 77;

        let tx = engine.handle_incoming(&req, peer()).unwrap();
        assert!(ids.is_used(tx));
        assert_eq!(engine.sequence_number_of(tx), Some(77));

        engine
            .send_response(peer(), csr_response(0), tx, XactAction::Delete)
            .unwrap();
        assert_eq!(engine.transport().sent[0].1.sequence_number, 77);
        assert!(!engine.has_transaction(tx));
        assert!(!ids.is_used(tx));
    }

    #[test]
    fn test_duplicate_after_delete_replays_response() {
        let (mut engine, _ids) = engine_with(XactConfig::default());
        let mut req = csr();
        req.sequence_number = 77;

        let tx = engine.handle_incoming(&req, peer()).unwrap();
        engine
            .send_response(peer(), csr_response(0), tx, XactAction::Delete)
            .unwrap();

        assert!(matches!(
            engine.handle_incoming(&req, peer()),
            Err(GtpError::DuplicateTransaction { sqn: 77, .. })
        ));
        assert_eq!(engine.transport().sent.len(), 2);

        engine.timers().advance(XactConfig::default().cleanup_interval());
        engine.process_timers();
        assert!(engine.handle_incoming(&req, peer()).is_ok());
    }

    #[test]
    fn test_retransmitted_request_while_pending() {
        let (mut engine, _ids) = engine_with(XactConfig::default());
        let mut req = csr();
        req.sequence_number = 5;

        let tx = engine.handle_incoming(&req, peer()).unwrap();
        assert!(matches!(
            engine.handle_incoming(&req, peer()),
            Err(GtpError::DuplicateTransaction { .. })
        ));
        // nothing answered yet, nothing to replay
        assert!(engine.transport().sent.is_empty());

        engine
            .send_response(peer(), csr_response(0), tx, XactAction::Keep)
            .unwrap();
        assert!(engine.handle_incoming(&req, peer()).is_err());
        assert_eq!(engine.transport().sent.len(), 2);
    }

    #[test]
    fn test_unmatched_response_dropped() {
        let (mut engine, _ids) = engine_with(XactConfig::default());
        assert!(matches!(
            engine.handle_incoming(&csr_response(99), peer()),
            Err(GtpError::UnexpectedMessage { sqn: 99, .. })
        ));
        assert_eq!(engine.record_count(), 0);
    }

    #[test]
    fn test_response_for_unknown_transaction() {
        let (mut engine, _ids) = engine_with(XactConfig::default());
        assert_eq!(
            engine.send_response(peer(), csr_response(0), 1234, XactAction::Delete),
            Err(GtpError::TransactionNotFound(1234))
        );
    }

    #[test]
    fn test_sequence_number_wraps_before_reserved_bit() {
        let config = XactConfig {
            initial_sqn: GTP2_SQN_RESERVED_BIT - 2,
            ..XactConfig::default()
        };
        let (mut engine, ids) = engine_with(config);

        let a = engine.send_request(peer(), csr(), CSR_RSP, ids.get_uid().unwrap()).unwrap();
        let b = engine.send_request(peer(), csr(), CSR_RSP, ids.get_uid().unwrap()).unwrap();
        let c = engine.send_request(peer(), csr(), CSR_RSP, ids.get_uid().unwrap()).unwrap();
        assert_eq!(a, GTP2_SQN_RESERVED_BIT - 1);
        assert_eq!(b, 0);
        assert_eq!(c, 1);
    }

    #[test]
    fn test_tx_id_reuse_rejected() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let tx = ids.get_uid().unwrap();
        engine.send_request(peer(), csr(), CSR_RSP, tx).unwrap();
        assert!(matches!(
            engine.send_request(peer(), csr(), CSR_RSP, tx),
            Err(GtpError::DuplicateTransaction { .. })
        ));
        assert_eq!(engine.transport().sent.len(), 1);
    }

    #[test]
    fn test_release_unbound_tx_id() {
        let (mut engine, ids) = engine_with(XactConfig::default());
        let bound = ids.get_uid().unwrap();
        engine.send_request(peer(), csr(), CSR_RSP, bound).unwrap();
        assert!(!engine.release_unbound_tx_id(bound));
        assert!(ids.is_used(bound));

        let unbound = ids.get_uid().unwrap();
        assert!(engine.release_unbound_tx_id(unbound));
        assert!(!ids.is_used(unbound));
        assert!(!engine.release_unbound_tx_id(unbound));
    }
}
