//! SGWC State Machine
//!
//! Top-level state machine of the application task. Once operational it
//! hands every GTP event to the context store; the outbound events the
//! context queues are routed to the path tasks after each dispatch.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::context::SgwcContext;
use crate::event::{SgwcEvent, SgwcEventId};
use crate::gtp_path;

/// FSM state type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgwcState {
    Initial,
    Operational,
    Final,
}

/// SGWC FSM context
#[derive(Debug)]
pub struct SgwcFsm {
    pub state: SgwcState,
    context: SgwcContext,
}

impl SgwcFsm {
    pub fn new(context: SgwcContext) -> Self {
        Self {
            state: SgwcState::Initial,
            context,
        }
    }

    pub fn context(&self) -> &SgwcContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SgwcContext {
        &mut self.context
    }

    pub fn is_operational(&self) -> bool {
        self.state == SgwcState::Operational
    }

    /// Dispatch event to state machine
    pub fn dispatch(&mut self, event: SgwcEvent) {
        sgwc_sm_debug(&event);
        match self.state {
            SgwcState::Initial => self.state_initial(event),
            SgwcState::Operational => self.state_operational(event),
            SgwcState::Final => {}
        }
    }

    fn state_initial(&mut self, event: SgwcEvent) {
        match event.id() {
            SgwcEventId::FsmEntry => {
                self.state = SgwcState::Operational;
                log::info!("SGWC state machine: Initial -> Operational");
            }
            SgwcEventId::FsmExit => {
                self.state = SgwcState::Final;
            }
            _ => log::warn!("{} before start, dropped", event.name()),
        }
    }

    fn state_operational(&mut self, event: SgwcEvent) {
        match event.id() {
            SgwcEventId::FsmEntry => {}
            SgwcEventId::FsmExit => {
                log::info!(
                    "SGWC state machine: Operational -> Final ({} UE, {} pending)",
                    self.context.ue_count(),
                    self.context.pending_tx_count()
                );
                self.state = SgwcState::Final;
            }
            _ => self.context.dispatch(event),
        }
    }
}

/// Debug logging for state machine events
pub fn sgwc_sm_debug(event: &SgwcEvent) {
    log::trace!(
        "SGWC SM event: {} [{} -> {}]",
        event.name(),
        event.origin.name(),
        event.destination.name()
    );
}

/// Application task: runs until the exit event or until every sender is gone
pub async fn run_app(
    mut fsm: SgwcFsm,
    mut mailbox: UnboundedReceiver<SgwcEvent>,
    s11: UnboundedSender<SgwcEvent>,
    s5c: UnboundedSender<SgwcEvent>,
) -> SgwcFsm {
    fsm.dispatch(SgwcEvent::entry());

    while let Some(event) = mailbox.recv().await {
        fsm.dispatch(event);
        for outbound in fsm.context_mut().drain_outbox() {
            gtp_path::route(outbound, &s11, &s5c);
        }
        if fsm.state == SgwcState::Final {
            break;
        }
    }

    log::info!("SGWC application task stopped");
    fsm
}

// ============================================================================
// Tests
// ============================================================================
