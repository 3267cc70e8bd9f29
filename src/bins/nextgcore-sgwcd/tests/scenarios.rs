//! End-to-end session scenarios
//!
//! MME and PGW are played by the test; every message crosses a GTP-C path
//! and its transaction engine before it reaches a procedure.

mod common;

use std::time::Duration;

use common::*;
use nextgcore_sgwcd::{PdnKey, SgwcConfig, UserPlanePolicy};
use ogs_gtp::v2::{
    BearerContext, DeleteSessionRequest, DeleteSessionResponse, DownlinkDataNotification,
    DownlinkDataNotificationAcknowledge, Gtp2Body, Gtp2Cause, Gtp2FTeidInterfaceType,
    Gtp2Indication, Gtp2MessageType, Gtp2PdnType, ModifyBearerRequest, ModifyBearerResponse,
    ReleaseAccessBearersRequest, ReleaseAccessBearersResponse,
};

const T3: Duration = Duration::from_millis(1000);

fn internet() -> PdnKey {
    PdnKey::new("internet", Gtp2PdnType::Ipv4)
}

fn ims() -> PdnKey {
    PdnKey::new("ims", Gtp2PdnType::Ipv4)
}

fn release_access_bearers_response(cause: Gtp2Cause) -> Gtp2Body {
    Gtp2Body::ReleaseAccessBearersResponse(ReleaseAccessBearersResponse {
        cause,
        recovery: None,
    })
}

// ============================================================================
// Create Session
// ============================================================================

#[test]
fn test_create_session_collocated_user_plane() {
    let mut h = Harness::new();
    let sqn = h.mme_request(0, create_session_request("internet", 5));

    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    let request = &sent[0];
    assert_eq!(request.teid, 0);
    let Gtp2Body::CreateSessionRequest(req) = &request.body else {
        panic!("unexpected {:?}", request.body);
    };
    let sgw_s5c = req.sender_fteid.unwrap();
    assert_eq!(sgw_s5c.interface_type, Gtp2FTeidInterfaceType::S5S8SgwGtpC);
    assert_eq!(req.imsi, IMSI);
    assert!(h.take_mme().is_empty());

    h.pgw_reply(request, sgw_s5c.teid, create_session_response(5, 0x200, 0xAABBCCDD));

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, MME_S11_TEID);
    assert_eq!(sent[0].sequence_number, sqn);
    let Gtp2Body::CreateSessionResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(rsp.cause, Gtp2Cause::RequestAccepted);
    let s1u = rsp.bearer_contexts_created[0].s1u_sgw_fteid.unwrap();
    assert_eq!(s1u.teid, 0xAABBCCDD);
    assert_eq!(s1u.interface_type, Gtp2FTeidInterfaceType::S1uSgwGtpU);
    assert_eq!(rsp.pgw_s5s8_cp_fteid.map(|f| f.teid), Some(0x200));

    let (ue, pdn) = h.context().resolve_pdn_by_local_tunnel_id(sgw_s5c.teid).unwrap();
    assert_eq!(ue.imsi, IMSI);
    assert_eq!(pdn.key, internet());
    assert_eq!(pdn.pgw_s5c_teid(), 0x200);
    assert!(ue.procedures.is_empty());
    assert_eq!(h.context().pending_tx_count(), 0);
}

#[test]
fn test_create_session_split_user_plane() {
    let config = SgwcConfig {
        user_plane: UserPlanePolicy::Split,
        ..SgwcConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);
    h.pgw_reply(&request, 1, create_session_response(5, 0x200, 0xAABBCCDD));

    let sent = h.take_mme();
    let Gtp2Body::CreateSessionResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    let s1u = rsp.bearer_contexts_created[0].s1u_sgw_fteid.unwrap();
    assert_ne!(s1u.teid, 0xAABBCCDD);
    assert_eq!(s1u.interface_type, Gtp2FTeidInterfaceType::S1uSgwGtpU);
    assert_eq!(s1u.ipv4, Some(SgwcConfig::default().gtpu.s1u));

    let bearer = h.context().ue(IMSI).unwrap().bearer(5).unwrap();
    assert_eq!(bearer.local_s1u_teid, Some(s1u.teid));
}

#[test]
fn test_create_session_rejected_by_pgw() {
    let mut h = Harness::new();
    h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);
    h.pgw_reply(
        &request,
        1,
        Gtp2Body::CreateSessionResponse(ogs_gtp::v2::CreateSessionResponse::new(
            Gtp2Cause::MissingOrUnknownApn,
        )),
    );

    let sent = h.take_mme();
    let Gtp2Body::CreateSessionResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(rsp.cause, Gtp2Cause::MissingOrUnknownApn);
    assert_eq!(h.context().ue_count(), 0);
}

#[test]
fn test_create_session_missing_sender_fteid() {
    let mut h = Harness::new();
    let Gtp2Body::CreateSessionRequest(mut req) = create_session_request("internet", 5) else {
        unreachable!()
    };
    req.sender_fteid = None;
    h.mme_request(0, Gtp2Body::CreateSessionRequest(req));

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp) if rsp.cause == Gtp2Cause::MandatoryIeMissing
    ));
    assert!(h.take_pgw().is_empty());
    assert_eq!(h.context().ue_count(), 0);
}

#[test]
fn test_create_session_duplicate_connection() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);

    h.mme_request(sgw_s11, create_session_request("internet", 6));
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp)
            if rsp.cause == Gtp2Cause::RequestRejectedReasonNotSpecified
    ));
    assert!(h.take_pgw().is_empty());
    assert_eq!(h.context().ue(IMSI).unwrap().pdns.len(), 1);
}

#[test]
fn test_create_session_duplicate_while_pending() {
    let mut h = Harness::new();
    h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);

    h.mme_request(0, create_session_request("internet", 5));
    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp)
            if rsp.cause == Gtp2Cause::RequestRejectedReasonNotSpecified
    ));
    assert!(h.take_pgw().is_empty());

    // The first request still completes
    let Gtp2Body::CreateSessionRequest(req) = &request.body else {
        panic!("unexpected {:?}", request.body);
    };
    let sgw_s5c_teid = req.sender_fteid.unwrap().teid;
    h.pgw_reply(&request, sgw_s5c_teid, create_session_response(5, 0x200, 0x300));
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
    assert_eq!(h.context().ue(IMSI).unwrap().pdns.len(), 1);
    assert_eq!(h.context().pending_tx_count(), 0);
}

#[test]
fn test_rejected_duplicate_keeps_pending_mme_teid() {
    let mut h = Harness::new();
    h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);

    let mut duplicate = create_session_request("internet", 5);
    if let Gtp2Body::CreateSessionRequest(req) = &mut duplicate {
        req.sender_fteid.as_mut().unwrap().teid = 0x999;
    }
    h.mme_request(0, duplicate);
    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0x999);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp)
            if rsp.cause == Gtp2Cause::RequestRejectedReasonNotSpecified
    ));
    assert_eq!(h.context().ue(IMSI).unwrap().mme_s11_teid(), MME_S11_TEID);

    h.pgw_reply(&request, 1, create_session_response(5, 0x200, 0x300));
    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, MME_S11_TEID);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
}

#[test]
fn test_retransmitted_request_absorbed_then_replayed() {
    let mut h = Harness::new();
    let sqn = h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);

    // Retransmission while the PGW is still working
    let mut again = ogs_gtp::v2::Gtp2Message::new(0, create_session_request("internet", 5));
    again.sequence_number = sqn;
    h.from_mme(again.clone());
    assert!(h.take_pgw().is_empty());
    assert!(h.take_mme().is_empty());

    h.pgw_reply(&request, 1, create_session_response(5, 0x200, 0x300));
    let first = h.take_mme();
    assert_eq!(first.len(), 1);

    // Retransmission after the answer gets the same answer back
    h.from_mme(again);
    let replay = h.take_mme();
    assert_eq!(replay, first);
    assert!(h.take_pgw().is_empty());
}

// ============================================================================
// Modify Bearer
// ============================================================================

#[test]
fn test_modify_bearer_partial_acceptance_across_connections() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.establish("ims", 6, 0x201, 0x301);

    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![
                BearerContext {
                    s1u_enb_fteid: Some(enb_fteid(0x501)),
                    ..BearerContext::new(5)
                },
                BearerContext {
                    s1u_enb_fteid: Some(enb_fteid(0x601)),
                    ..BearerContext::new(6)
                },
            ],
            ..Default::default()
        }),
    );

    let sent = h.take_pgw();
    assert_eq!(sent.len(), 2);
    let to_internet = sent.iter().find(|m| m.teid == 0x200).unwrap().clone();
    let to_ims = sent.iter().find(|m| m.teid == 0x201).unwrap().clone();

    // Answers arrive in the opposite order of the requests
    h.pgw_reply(
        &to_internet,
        1,
        Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::RequestAccepted)),
    );
    assert!(h.take_mme().is_empty());
    h.pgw_reply(
        &to_ims,
        2,
        Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::ContextNotFound)),
    );

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    let Gtp2Body::ModifyBearerResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(rsp.cause, Gtp2Cause::RequestAcceptedPartially);
    assert_eq!(rsp.linked_ebi, Some(5));
    assert_eq!(rsp.bearer_contexts_modified.len(), 2);
    let bearer5 = rsp.bearer_contexts_modified.iter().find(|bc| bc.ebi == 5).unwrap();
    assert_eq!(bearer5.cause, Some(Gtp2Cause::RequestAccepted));
    assert_eq!(bearer5.s1u_sgw_fteid.map(|f| f.teid), Some(0x300));
    let bearer6 = rsp.bearer_contexts_modified.iter().find(|bc| bc.ebi == 6).unwrap();
    assert_eq!(bearer6.cause, Some(Gtp2Cause::ContextNotFound));

    let ue = h.context().ue(IMSI).unwrap();
    assert_eq!(ue.bearer(5).unwrap().s1u_enb_fteid, Some(enb_fteid(0x501)));
    assert!(ue.procedures.is_empty());
}

#[test]
fn test_modify_bearer_rejected_by_pgw_keeps_enb_endpoint() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    let modify = || {
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![BearerContext {
                s1u_enb_fteid: Some(enb_fteid(0x501)),
                ..BearerContext::new(5)
            }],
            ..Default::default()
        })
    };

    h.mme_request(sgw_s11, modify());
    let request = h.take_pgw().remove(0);
    h.pgw_reply(
        &request,
        1,
        Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::ContextNotFound)),
    );
    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    let Gtp2Body::ModifyBearerResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(rsp.cause, Gtp2Cause::ContextNotFound);
    assert_eq!(rsp.bearer_contexts_modified[0].s1u_sgw_fteid, None);
    assert_eq!(h.context().ue(IMSI).unwrap().bearer(5).unwrap().s1u_enb_fteid, None);

    // The same endpoint is still a change and goes to the PGW again
    h.mme_request(sgw_s11, modify());
    assert_eq!(h.take_pgw().len(), 1);
}

#[test]
fn test_modify_bearer_one_connection_times_out() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.establish("ims", 6, 0x201, 0x301);

    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![
                BearerContext {
                    s1u_enb_fteid: Some(enb_fteid(0x501)),
                    ..BearerContext::new(5)
                },
                BearerContext {
                    s1u_enb_fteid: Some(enb_fteid(0x601)),
                    ..BearerContext::new(6)
                },
            ],
            ..Default::default()
        }),
    );
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 2);
    let to_internet = sent.iter().find(|m| m.teid == 0x200).unwrap().clone();
    h.pgw_reply(
        &to_internet,
        1,
        Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::RequestAccepted)),
    );
    assert!(h.take_mme().is_empty());

    for _ in 0..4 {
        h.advance(T3);
    }
    assert_eq!(h.take_pgw().len(), 3);

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    let Gtp2Body::ModifyBearerResponse(rsp) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(rsp.cause, Gtp2Cause::RequestAcceptedPartially);
    let bearer5 = rsp.bearer_contexts_modified.iter().find(|bc| bc.ebi == 5).unwrap();
    assert_eq!(bearer5.cause, Some(Gtp2Cause::RequestAccepted));
    let bearer6 = rsp.bearer_contexts_modified.iter().find(|bc| bc.ebi == 6).unwrap();
    assert_eq!(bearer6.cause, Some(Gtp2Cause::RemotePeerNotResponding));

    let ue = h.context().ue(IMSI).unwrap();
    assert_eq!(ue.bearer(5).unwrap().s1u_enb_fteid, Some(enb_fteid(0x501)));
    assert_eq!(ue.bearer(6).unwrap().s1u_enb_fteid, None);
    assert!(ue.procedures.is_empty());
    assert_eq!(h.context().pending_tx_count(), 0);
}

#[test]
fn test_modify_bearer_unchanged_endpoint_answered_locally() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.mme_request(
        sgw_s11,
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![BearerContext::new(5)],
            ..Default::default()
        }),
    );

    assert!(h.take_pgw().is_empty());
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::ModifyBearerResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
}

#[test]
fn test_modify_bearer_unknown_teid() {
    let mut h = Harness::new();
    h.mme_request(
        0x4242,
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![BearerContext::new(5)],
            ..Default::default()
        }),
    );

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::ModifyBearerResponse(rsp) if rsp.cause == Gtp2Cause::ContextNotFound
    ));
}

// ============================================================================
// Release Access Bearers
// ============================================================================

#[test]
fn test_release_access_bearers_skips_released_and_reports_silent_pgw() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.establish("ims", 6, 0x201, 0x301);

    // Release both connections
    h.mme_request(
        sgw_s11,
        Gtp2Body::ReleaseAccessBearersRequest(ReleaseAccessBearersRequest::default()),
    );
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 2);
    for request in &sent {
        h.pgw_reply(request, 1, release_access_bearers_response(Gtp2Cause::RequestAccepted));
    }
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::ReleaseAccessBearersResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
    assert!(h.context().pdn(IMSI, &internet()).unwrap().released);

    // Re-establish S1-U for the ims connection only
    h.mme_request(
        sgw_s11,
        Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
            bearer_contexts_to_be_modified: vec![BearerContext {
                s1u_enb_fteid: Some(enb_fteid(0x601)),
                ..BearerContext::new(6)
            }],
            ..Default::default()
        }),
    );
    let request = h.take_pgw().remove(0);
    h.pgw_reply(
        &request,
        1,
        Gtp2Body::ModifyBearerResponse(ModifyBearerResponse::new(Gtp2Cause::RequestAccepted)),
    );
    h.take_mme();
    assert!(!h.context().pdn(IMSI, &ims()).unwrap().released);

    // Only the ims connection is released again, and the PGW stays silent
    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::ReleaseAccessBearersRequest(ReleaseAccessBearersRequest::default()),
    );
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0x201);

    for _ in 0..4 {
        h.advance(T3);
    }
    assert_eq!(h.take_pgw().len(), 3);

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::ReleaseAccessBearersResponse(rsp) if rsp.cause == Gtp2Cause::ContextNotFound
    ));
    assert!(!h.context().pdn(IMSI, &ims()).unwrap().released);
}

#[test]
fn test_release_access_bearers_nothing_to_release() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.mme_request(
        sgw_s11,
        Gtp2Body::ReleaseAccessBearersRequest(ReleaseAccessBearersRequest::default()),
    );
    let request = h.take_pgw().remove(0);
    h.pgw_reply(&request, 1, release_access_bearers_response(Gtp2Cause::RequestAccepted));
    h.take_mme();

    h.mme_request(
        sgw_s11,
        Gtp2Body::ReleaseAccessBearersRequest(ReleaseAccessBearersRequest::default()),
    );
    assert!(h.take_pgw().is_empty());
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::ReleaseAccessBearersResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
}

// ============================================================================
// Retransmission
// ============================================================================

#[test]
fn test_create_session_pgw_not_responding() {
    let mut h = Harness::new();
    let sqn = h.mme_request(0, create_session_request("internet", 5));
    let request = h.take_pgw().remove(0);

    // Retries at 1, 2 and 3 seconds
    for _ in 0..3 {
        h.advance(T3);
        let sent = h.take_pgw();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], request);
        assert!(h.take_mme().is_empty());
    }

    // Exhausted at 4 seconds
    h.advance(T3);
    assert!(h.take_pgw().is_empty());
    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::CreateSessionResponse(rsp) if rsp.cause == Gtp2Cause::RemotePeerNotResponding
    ));
    assert_eq!(h.context().ue_count(), 0);

    // A late answer is not correlated
    h.pgw_reply(&request, 1, create_session_response(5, 0x200, 0x300));
    assert!(h.take_mme().is_empty());
    assert_eq!(h.context().ue_count(), 0);

    // Record reclaimed at 5 seconds
    assert_eq!(h.s5c.engine().record_count(), 1);
    h.advance(T3);
    assert_eq!(h.s5c.engine().record_count(), 0);
}

// ============================================================================
// Delete Session
// ============================================================================

#[test]
fn test_delete_session_all_connections() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.establish("ims", 6, 0x201, 0x301);

    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::DeleteSessionRequest(DeleteSessionRequest {
            indication: Some(Gtp2Indication {
                si: true,
                ..Default::default()
            }),
            ..Default::default()
        }),
    );
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 2);

    let delete_rsp = || {
        Gtp2Body::DeleteSessionResponse(DeleteSessionResponse {
            cause: Gtp2Cause::RequestAccepted,
            recovery: None,
            pco: None,
        })
    };
    h.pgw_reply(&sent[0], 1, delete_rsp());
    let first = h.take_mme();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].sequence_number, sqn);
    assert_eq!(h.context().ue(IMSI).unwrap().pdns.len(), 1);

    h.pgw_reply(&sent[1], 2, delete_rsp());
    let second = h.take_mme();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].sequence_number, sqn);
    assert!(matches!(
        &second[0].body,
        Gtp2Body::DeleteSessionResponse(rsp) if rsp.cause == Gtp2Cause::RequestAccepted
    ));
    assert_eq!(h.context().ue_count(), 0);
    assert!(h.context().resolve_by_local_tunnel_id(sgw_s11).is_none());
    assert_eq!(h.context().teid_pool().allocated(), 0);
}

#[test]
fn test_delete_session_single_connection() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.establish("ims", 6, 0x201, 0x301);

    h.mme_request(
        sgw_s11,
        Gtp2Body::DeleteSessionRequest(DeleteSessionRequest {
            linked_ebi: Some(6),
            ..Default::default()
        }),
    );
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0x201);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DeleteSessionRequest(req) if req.linked_ebi == Some(6)
    ));

    h.pgw_reply(
        &sent[0],
        1,
        Gtp2Body::DeleteSessionResponse(DeleteSessionResponse {
            cause: Gtp2Cause::RequestAccepted,
            recovery: None,
            pco: None,
        }),
    );
    assert_eq!(h.take_mme().len(), 1);
    let ue = h.context().ue(IMSI).unwrap();
    assert_eq!(ue.pdns.len(), 1);
    assert!(ue.pdns.contains_key(&internet()));
}

#[test]
fn test_delete_session_rejected_by_pgw_still_released() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);

    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::DeleteSessionRequest(DeleteSessionRequest {
            linked_ebi: Some(5),
            ..Default::default()
        }),
    );
    let request = h.take_pgw().remove(0);
    h.pgw_reply(
        &request,
        1,
        Gtp2Body::DeleteSessionResponse(DeleteSessionResponse {
            cause: Gtp2Cause::SystemFailure,
            recovery: None,
            pco: None,
        }),
    );

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    assert_eq!(sent[0].teid, MME_S11_TEID);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DeleteSessionResponse(rsp) if rsp.cause == Gtp2Cause::SystemFailure
    ));
    assert_eq!(h.context().ue_count(), 0);
    assert_eq!(h.context().teid_pool().allocated(), 0);
}

#[test]
fn test_delete_session_pgw_not_responding() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);

    let sqn = h.mme_request(
        sgw_s11,
        Gtp2Body::DeleteSessionRequest(DeleteSessionRequest::default()),
    );
    assert_eq!(h.take_pgw().len(), 1);

    for _ in 0..3 {
        h.advance(T3);
        assert_eq!(h.take_pgw().len(), 1);
        assert!(h.take_mme().is_empty());
    }
    h.advance(T3);

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sequence_number, sqn);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DeleteSessionResponse(rsp) if rsp.cause == Gtp2Cause::RemotePeerNotResponding
    ));
    assert_eq!(h.context().ue_count(), 0);
    assert!(h.context().resolve_by_local_tunnel_id(sgw_s11).is_none());
}

#[test]
fn test_delete_session_unknown_ebi() {
    let mut h = Harness::new();
    let (sgw_s11, _) = h.establish("internet", 5, 0x200, 0x300);
    h.mme_request(
        sgw_s11,
        Gtp2Body::DeleteSessionRequest(DeleteSessionRequest {
            linked_ebi: Some(9),
            ..Default::default()
        }),
    );
    assert!(h.take_pgw().is_empty());
    let sent = h.take_mme();
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DeleteSessionResponse(rsp) if rsp.cause == Gtp2Cause::ContextNotFound
    ));
    assert_eq!(h.context().ue(IMSI).unwrap().pdns.len(), 1);
}

// ============================================================================
// Downlink Data Notification
// ============================================================================

#[test]
fn test_downlink_data_notification_relayed() {
    let mut h = Harness::new();
    let (_, sgw_s5c) = h.establish("internet", 5, 0x200, 0x300);

    let sqn = h.pgw_request(
        sgw_s5c,
        Gtp2Body::DownlinkDataNotification(DownlinkDataNotification {
            ebi: Some(5),
            ..Default::default()
        }),
    );

    let sent = h.take_mme();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, MME_S11_TEID);
    let Gtp2Body::DownlinkDataNotification(ddn) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(ddn.ebi, Some(5));
    assert_eq!(ddn.arp, Some(arp()));

    h.mme_reply(
        &sent[0],
        0,
        Gtp2Body::DownlinkDataNotificationAcknowledge(DownlinkDataNotificationAcknowledge {
            cause: Gtp2Cause::RequestAccepted,
            data_notification_delay: Some(3),
            recovery: None,
            imsi: None,
        }),
    );

    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0x200);
    assert_eq!(sent[0].sequence_number, sqn);
    let Gtp2Body::DownlinkDataNotificationAcknowledge(ack) = &sent[0].body else {
        panic!("unexpected {:?}", sent[0].body);
    };
    assert_eq!(ack.cause, Gtp2Cause::RequestAccepted);
    assert_eq!(ack.data_notification_delay, Some(3));
}

#[test]
fn test_downlink_data_notification_unknown_teid() {
    let mut h = Harness::new();
    h.establish("internet", 5, 0x200, 0x300);

    h.pgw_request(
        0x9999,
        Gtp2Body::DownlinkDataNotification(DownlinkDataNotification::default()),
    );
    assert!(h.take_mme().is_empty());
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].teid, 0);
    assert_eq!(sent[0].message_type(), Gtp2MessageType::DownlinkDataNotificationAcknowledge);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DownlinkDataNotificationAcknowledge(ack) if ack.cause == Gtp2Cause::ContextNotFound
    ));
}

#[test]
fn test_downlink_data_notification_mme_not_responding() {
    let mut h = Harness::new();
    let (_, sgw_s5c) = h.establish("internet", 5, 0x200, 0x300);

    h.pgw_request(
        sgw_s5c,
        Gtp2Body::DownlinkDataNotification(DownlinkDataNotification::default()),
    );
    assert_eq!(h.take_mme().len(), 1);

    for _ in 0..4 {
        h.advance(T3);
    }
    assert_eq!(h.take_mme().len(), 3);
    let sent = h.take_pgw();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].body,
        Gtp2Body::DownlinkDataNotificationAcknowledge(ack)
            if ack.cause == Gtp2Cause::RemotePeerNotResponding
    ));
    // The connection survives a silent MME
    assert!(h.context().pdn(IMSI, &internet()).is_some());
}
