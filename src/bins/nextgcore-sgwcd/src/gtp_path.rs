//! SGWC GTP Path Management
//!
//! One path task per GTP-C interface. A path owns the UDP socket and the
//! transaction engine of its interface: inbound datagrams are decoded and
//! correlated before being handed to the application task, outbound
//! requests and responses from the application task are sent through the
//! engine, and retry exhaustion is reported back as an event.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ogs_core::{compute_poll_interval, AsyncTimerMgr, UidGenerator};
use ogs_gtp::v2::{
    triggered_message_type, Gtp2Body, Gtp2Message, GtpXactEngine, XactAction, XactConfig,
    XactTimer, XactTransport,
};
use ogs_gtp::{GtpError, GtpResult};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::event::{GtpInterface, SgwcEvent, SgwcEventKind, TaskId};

/// Largest GTPv2-C datagram accepted
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Upper bound on how long a path sleeps without checking its timers
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Transport
// ============================================================================

/// Datagram sink over a bound tokio socket
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }
}

impl XactTransport<Gtp2Message> for UdpTransport {
    fn send_to(&mut self, dest: SocketAddr, msg: &Gtp2Message) -> GtpResult<()> {
        let buf = msg.encode()?;
        self.socket
            .try_send_to(&buf, dest)
            .map(|_| ())
            .map_err(|e| GtpError::Transport(e.to_string()))
    }
}

// ============================================================================
// Path
// ============================================================================

/// GTP-C path of one interface
pub struct GtpPath<T: XactTransport<Gtp2Message>> {
    iface: GtpInterface,
    engine: GtpXactEngine<Gtp2Message, T>,
    restart_counter: u8,
}

impl<T: XactTransport<Gtp2Message>> GtpPath<T> {
    pub fn new(
        iface: GtpInterface,
        config: XactConfig,
        ids: Arc<UidGenerator>,
        transport: T,
        restart_counter: u8,
    ) -> Self {
        Self {
            iface,
            engine: GtpXactEngine::new(iface.name(), config, ids, transport),
            restart_counter,
        }
    }

    /// Path driven by an externally advanced clock
    pub fn with_timer_mgr(
        iface: GtpInterface,
        config: XactConfig,
        ids: Arc<UidGenerator>,
        transport: T,
        restart_counter: u8,
        timers: AsyncTimerMgr<XactTimer>,
    ) -> Self {
        Self {
            iface,
            engine: GtpXactEngine::with_timer_mgr(iface.name(), config, ids, transport, timers),
            restart_counter,
        }
    }

    pub fn interface(&self) -> GtpInterface {
        self.iface
    }

    pub fn engine(&self) -> &GtpXactEngine<Gtp2Message, T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GtpXactEngine<Gtp2Message, T> {
        &mut self.engine
    }

    /// Decode and correlate one received datagram
    pub fn handle_datagram(&mut self, data: &[u8], src: SocketAddr) -> Option<SgwcEvent> {
        let mut buf = Bytes::copy_from_slice(data);
        match Gtp2Message::decode(&mut buf) {
            Ok(message) => self.handle_message(message, src),
            Err(e) => {
                log::warn!("[{}] Dropping malformed datagram from {}: {}", self.iface.name(), src, e);
                None
            }
        }
    }

    /// Correlate a decoded message; echo is answered on the path itself
    pub fn handle_message(&mut self, message: Gtp2Message, src: SocketAddr) -> Option<SgwcEvent> {
        let gtpc_tx_id = match self.engine.handle_incoming(&message, src) {
            Ok(gtpc_tx_id) => gtpc_tx_id,
            Err(GtpError::DuplicateTransaction { sqn, message_type }) => {
                log::debug!(
                    "[{}] Duplicate type {} SQN[{}] from {} absorbed",
                    self.iface.name(),
                    message_type,
                    sqn,
                    src
                );
                return None;
            }
            Err(e) => {
                log::warn!("[{}] {} from {} discarded: {}", self.iface.name(), message.body.name(), src, e);
                return None;
            }
        };

        if let Gtp2Body::EchoRequest(req) = &message.body {
            log::debug!("[{}] Echo Request from {} recovery {}", self.iface.name(), src, req.recovery);
            let response = Gtp2Message::echo_response(self.restart_counter);
            if let Err(e) = self.engine.send_response(src, response, gtpc_tx_id, XactAction::Delete) {
                log::error!("[{}] Echo Response to {} failed: {}", self.iface.name(), src, e);
            }
            return None;
        }
        if let Gtp2Body::EchoResponse(rsp) = &message.body {
            log::debug!("[{}] Echo Response from {} recovery {}", self.iface.name(), src, rsp.recovery);
            return None;
        }
        Some(SgwcEvent::gtp_message(self.iface, gtpc_tx_id, src, message))
    }

    /// Send what the application task queued for this path.
    ///
    /// A request the engine refuses is reported back as unanswered so the
    /// procedure waiting on it can conclude.
    pub fn handle_app_event(&mut self, event: SgwcEvent) -> Option<SgwcEvent> {
        let name = event.name();
        match event.kind {
            SgwcEventKind::SendRequest {
                gtpc_tx_id,
                dest,
                message,
            } => {
                let message_type = message.message_type() as u8;
                let Some(expected) = triggered_message_type(message_type) else {
                    log::error!(
                        "[{}] {} is not a request, XID[{}] dropped",
                        self.iface.name(),
                        message.body.name(),
                        gtpc_tx_id
                    );
                    self.engine.release_unbound_tx_id(gtpc_tx_id);
                    return Some(SgwcEvent::peer_not_responding(self.iface, gtpc_tx_id, dest, message_type));
                };
                match self.engine.send_request(dest, message, expected, gtpc_tx_id) {
                    Ok(_) => None,
                    Err(e) => {
                        log::error!("[{}] Request XID[{}] to {} failed: {}", self.iface.name(), gtpc_tx_id, dest, e);
                        self.engine.release_unbound_tx_id(gtpc_tx_id);
                        Some(SgwcEvent::peer_not_responding(self.iface, gtpc_tx_id, dest, message_type))
                    }
                }
            }
            SgwcEventKind::SendResponse {
                gtpc_tx_id,
                dest,
                message,
                action,
            } => {
                if let Err(e) = self.engine.send_response(dest, message, gtpc_tx_id, action) {
                    log::error!("[{}] Response XID[{}] to {} failed: {}", self.iface.name(), gtpc_tx_id, dest, e);
                }
                None
            }
            _ => {
                log::error!("[{}] Unexpected event {} on path", self.iface.name(), name);
                None
            }
        }
    }

    /// Fire expired timers and report exhausted requests
    pub fn process_timers(&mut self) -> Vec<SgwcEvent> {
        self.engine
            .process_timers()
            .into_iter()
            .map(|t| SgwcEvent::peer_not_responding(self.iface, t.gtpc_tx_id, t.remote, t.message_type))
            .collect()
    }
}

impl<T: XactTransport<Gtp2Message>> std::fmt::Debug for GtpPath<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GtpPath")
            .field("iface", &self.iface)
            .field("engine", &self.engine)
            .finish()
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Hand an application event to the path task it names
pub fn route(
    event: SgwcEvent,
    s11: &UnboundedSender<SgwcEvent>,
    s5c: &UnboundedSender<SgwcEvent>,
) {
    let target = match event.destination {
        TaskId::SgwcS11 => s11,
        TaskId::SgwcS5s8 => s5c,
        TaskId::SgwcApp => {
            log::error!("{} addressed to {}, dropped", event.name(), TaskId::SgwcApp.name());
            return;
        }
    };
    if target.send(event).is_err() {
        log::error!("Path task mailbox closed");
    }
}

fn forward(app: &UnboundedSender<SgwcEvent>, event: SgwcEvent) {
    if app.send(event).is_err() {
        log::error!("Application task mailbox closed");
    }
}

/// Path task: socket, application mailbox and retransmission timers
pub async fn run_path(
    mut path: GtpPath<UdpTransport>,
    socket: Arc<UdpSocket>,
    mut mailbox: UnboundedReceiver<SgwcEvent>,
    app: UnboundedSender<SgwcEvent>,
    running: Arc<AtomicBool>,
) {
    let name = path.interface().name();
    log::info!("[{}] path task started on {:?}", name, socket.local_addr().ok());
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    while running.load(Ordering::SeqCst) {
        let wait = compute_poll_interval(path.engine().timers(), MAX_POLL_INTERVAL);
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    if let Some(event) = path.handle_datagram(&buf[..len], src) {
                        forward(&app, event);
                    }
                }
                Err(e) => log::error!("[{}] recv_from failed: {}", name, e),
            },
            event = mailbox.recv() => match event {
                Some(event) => {
                    if let Some(event) = path.handle_app_event(event) {
                        forward(&app, event);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep(wait) => {}
        }

        for event in path.process_timers() {
            forward(&app, event);
        }
    }

    log::info!("[{}] path task stopped", name);
}

// ============================================================================
// Tests
// ============================================================================
