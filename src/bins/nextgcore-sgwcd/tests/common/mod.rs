//! Common test utilities
//!
//! An in-memory gateway: both GTP-C paths run on recording transports and
//! manual clocks, and the outbox of the application task is routed to the
//! paths after every dispatch. Tests play the MME and the PGW by handing
//! messages to the paths and reading what the paths transmitted.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use nextgcore_sgwcd::{GtpInterface, GtpPath, SgwcConfig, SgwcContext, SgwcEvent, SgwcFsm, TaskId};
use ogs_core::{AsyncTimerMgr, UidGenerator};
use ogs_gtp::v2::{
    BearerContext, CreateSessionRequest, CreateSessionResponse, Gtp2Arp, Gtp2BearerQos, Gtp2Body,
    Gtp2Cause, Gtp2FTeid, Gtp2FTeidInterfaceType, Gtp2Message, Gtp2PdnType, XactTransport,
};
use ogs_gtp::GtpResult;

pub const IMSI: &str = "001010000000001";
pub const MME_S11_TEID: u32 = 0x100;

pub fn mme() -> SocketAddr {
    "127.0.0.2:2123".parse().unwrap()
}

pub fn pgw() -> SocketAddr {
    SgwcConfig::default().pgw
}

/// Records every datagram handed to it
#[derive(Debug, Default)]
pub struct Wire {
    pub sent: Vec<(SocketAddr, Gtp2Message)>,
}

impl XactTransport<Gtp2Message> for Wire {
    fn send_to(&mut self, dest: SocketAddr, msg: &Gtp2Message) -> GtpResult<()> {
        self.sent.push((dest, msg.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub fsm: SgwcFsm,
    pub s11: GtpPath<Wire>,
    pub s5c: GtpPath<Wire>,
    mme_sqn: u32,
    pgw_sqn: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SgwcConfig::default())
    }

    pub fn with_config(config: SgwcConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let config = Arc::new(config);
        let ids = Arc::new(UidGenerator::new());
        let path = |iface| {
            GtpPath::with_timer_mgr(
                iface,
                config.xact_config(),
                Arc::clone(&ids),
                Wire::default(),
                config.restart_counter,
                AsyncTimerMgr::with_manual_clock(),
            )
        };
        let s11 = path(GtpInterface::S11);
        let s5c = path(GtpInterface::S5s8);

        let mut fsm = SgwcFsm::new(SgwcContext::new(Arc::clone(&config), Arc::clone(&ids)));
        fsm.dispatch(SgwcEvent::entry());

        Self {
            fsm,
            s11,
            s5c,
            mme_sqn: 0,
            pgw_sqn: 0x1000,
        }
    }

    pub fn context(&self) -> &SgwcContext {
        self.fsm.context()
    }

    /// MME opens a transaction; returns its sequence number
    pub fn mme_request(&mut self, teid: u32, body: Gtp2Body) -> u32 {
        self.mme_sqn += 1;
        let mut msg = Gtp2Message::new(teid, body);
        msg.sequence_number = self.mme_sqn;
        self.from_mme(msg);
        self.mme_sqn
    }

    /// PGW opens a transaction; returns its sequence number
    pub fn pgw_request(&mut self, teid: u32, body: Gtp2Body) -> u32 {
        self.pgw_sqn += 1;
        let mut msg = Gtp2Message::new(teid, body);
        msg.sequence_number = self.pgw_sqn;
        self.from_pgw(msg);
        self.pgw_sqn
    }

    /// PGW answers `request`
    pub fn pgw_reply(&mut self, request: &Gtp2Message, teid: u32, body: Gtp2Body) {
        let mut msg = Gtp2Message::new(teid, body);
        msg.sequence_number = request.sequence_number;
        self.from_pgw(msg);
    }

    /// MME answers `request`
    pub fn mme_reply(&mut self, request: &Gtp2Message, teid: u32, body: Gtp2Body) {
        let mut msg = Gtp2Message::new(teid, body);
        msg.sequence_number = request.sequence_number;
        self.from_mme(msg);
    }

    pub fn from_mme(&mut self, msg: Gtp2Message) {
        if let Some(event) = self.s11.handle_message(msg, mme()) {
            self.deliver(event);
        }
    }

    pub fn from_pgw(&mut self, msg: Gtp2Message) {
        if let Some(event) = self.s5c.handle_message(msg, pgw()) {
            self.deliver(event);
        }
    }

    fn deliver(&mut self, event: SgwcEvent) {
        self.fsm.dispatch(event);
        self.pump();
    }

    /// Route queued outbound events until the outbox stays empty
    fn pump(&mut self) {
        loop {
            let outbox = self.fsm.context_mut().drain_outbox();
            if outbox.is_empty() {
                break;
            }
            for event in outbox {
                let back = match event.destination {
                    TaskId::SgwcS11 => self.s11.handle_app_event(event),
                    TaskId::SgwcS5s8 => self.s5c.handle_app_event(event),
                    TaskId::SgwcApp => None,
                };
                if let Some(back) = back {
                    self.fsm.dispatch(back);
                }
            }
        }
    }

    /// Move both path clocks and deliver whatever expired
    pub fn advance(&mut self, by: Duration) {
        self.s11.engine().timers().advance(by);
        self.s5c.engine().timers().advance(by);
        let mut events = self.s11.process_timers();
        events.extend(self.s5c.process_timers());
        for event in events {
            self.deliver(event);
        }
    }

    /// Messages sent to the MME since the last call
    pub fn take_mme(&mut self) -> Vec<Gtp2Message> {
        take(&mut self.s11)
    }

    /// Messages sent to the PGW since the last call
    pub fn take_pgw(&mut self) -> Vec<Gtp2Message> {
        take(&mut self.s5c)
    }

    /// Attach one PDN connection and return the SGW S11 and S5/S8-C TEIDs
    pub fn establish(&mut self, apn: &str, ebi: u8, pgw_c_teid: u32, pgw_u_teid: u32) -> (u32, u32) {
        let teid = self.context().ue(IMSI).map_or(0, |ue| ue.sgw_s11_teid);
        self.mme_request(teid, create_session_request(apn, ebi));

        let request = self.take_pgw().pop().expect("S5 Create Session Request");
        let Gtp2Body::CreateSessionRequest(req) = &request.body else {
            panic!("unexpected {:?}", request.body);
        };
        let sgw_s5c_teid = req.sender_fteid.expect("SGW S5/S8-C F-TEID").teid;
        self.pgw_reply(
            &request,
            sgw_s5c_teid,
            create_session_response(ebi, pgw_c_teid, pgw_u_teid),
        );

        let response = self.take_mme().pop().expect("S11 Create Session Response");
        let Gtp2Body::CreateSessionResponse(rsp) = &response.body else {
            panic!("unexpected {:?}", response.body);
        };
        assert_eq!(rsp.cause, Gtp2Cause::RequestAccepted);
        (rsp.sender_fteid.expect("SGW S11 F-TEID").teid, sgw_s5c_teid)
    }
}

fn take(path: &mut GtpPath<Wire>) -> Vec<Gtp2Message> {
    std::mem::take(&mut path.engine_mut().transport_mut().sent)
        .into_iter()
        .map(|(_, msg)| msg)
        .collect()
}

pub fn arp() -> Gtp2Arp {
    Gtp2Arp {
        pre_emption_vulnerability: true,
        priority_level: 9,
        pre_emption_capability: false,
    }
}

pub fn create_session_request(apn: &str, ebi: u8) -> Gtp2Body {
    let mut req = CreateSessionRequest::new(IMSI, apn, Gtp2PdnType::Ipv4);
    req.sender_fteid = Some(Gtp2FTeid::new_ipv4(
        Gtp2FTeidInterfaceType::S11MmeGtpC,
        MME_S11_TEID,
        Ipv4Addr::new(127, 0, 0, 2),
    ));
    req.bearer_contexts_to_be_created = vec![BearerContext {
        bearer_qos: Some(Gtp2BearerQos {
            arp: arp(),
            qci: 9,
            ..Default::default()
        }),
        ..BearerContext::new(ebi)
    }];
    Gtp2Body::CreateSessionRequest(req)
}

pub fn create_session_response(ebi: u8, pgw_c_teid: u32, pgw_u_teid: u32) -> Gtp2Body {
    let pgw_ip = Ipv4Addr::new(127, 0, 0, 4);
    Gtp2Body::CreateSessionResponse(CreateSessionResponse {
        pgw_s5s8_cp_fteid: Some(Gtp2FTeid::new_ipv4(
            Gtp2FTeidInterfaceType::S5S8PgwGtpC,
            pgw_c_teid,
            pgw_ip,
        )),
        bearer_contexts_created: vec![BearerContext {
            cause: Some(Gtp2Cause::RequestAccepted),
            s5s8_u_pgw_fteid: Some(Gtp2FTeid::new_ipv4(
                Gtp2FTeidInterfaceType::S5S8PgwGtpU,
                pgw_u_teid,
                pgw_ip,
            )),
            ..BearerContext::new(ebi)
        }],
        ..CreateSessionResponse::new(Gtp2Cause::RequestAccepted)
    })
}

pub fn enb_fteid(teid: u32) -> Gtp2FTeid {
    Gtp2FTeid::new_ipv4(
        Gtp2FTeidInterfaceType::S1uEnodebGtpU,
        teid,
        Ipv4Addr::new(10, 0, 0, 1),
    )
}
