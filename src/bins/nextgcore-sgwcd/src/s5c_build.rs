//! SGWC S5/S8-C Message Builder
//!
//! Builds the GTPv2-C message bodies sent toward the PGW. Requests relayed
//! from the MME keep the members the PGW needs and replace the sender
//! F-TEID with this gateway's S5/S8-C endpoint.

use ogs_gtp::v2::{
    BearerContext, CreateSessionRequest, DeleteSessionRequest,
    DownlinkDataNotificationAcknowledge, Gtp2Body, Gtp2Cause, Gtp2FTeid, ModifyBearerRequest,
    ReleaseAccessBearersRequest,
};

/// Build Create Session Request
pub fn build_create_session_request(
    request: &CreateSessionRequest,
    sgw_s5c_fteid: Gtp2FTeid,
    recovery: u8,
) -> Gtp2Body {
    let bearer_contexts_to_be_created = request
        .bearer_contexts_to_be_created
        .iter()
        .map(|bc| BearerContext {
            bearer_qos: bc.bearer_qos,
            ..BearerContext::new(bc.ebi)
        })
        .collect();

    Gtp2Body::CreateSessionRequest(CreateSessionRequest {
        sender_fteid: Some(sgw_s5c_fteid),
        pgw_s5s8_cp_fteid: None,
        bearer_contexts_to_be_created,
        bearer_contexts_to_be_removed: Vec::new(),
        recovery: Some(recovery),
        ..request.clone()
    })
}

/// Build Modify Bearer Request for the bearers of one connection
pub fn build_modify_bearer_request(
    request: &ModifyBearerRequest,
    to_be_modified: &[BearerContext],
    to_be_removed: &[u8],
) -> Gtp2Body {
    Gtp2Body::ModifyBearerRequest(ModifyBearerRequest {
        mei: request.mei.clone(),
        uli: request.uli,
        serving_network: request.serving_network,
        rat_type: request.rat_type,
        indication: request.indication,
        sender_fteid: None,
        apn_ambr: request.apn_ambr,
        delay_value: None,
        bearer_contexts_to_be_modified: to_be_modified
            .iter()
            .map(|bc| BearerContext {
                s1u_enb_fteid: bc.s1u_enb_fteid,
                ..BearerContext::new(bc.ebi)
            })
            .collect(),
        bearer_contexts_to_be_removed: to_be_removed.iter().map(|&ebi| BearerContext::new(ebi)).collect(),
        recovery: None,
        ue_time_zone: request.ue_time_zone,
    })
}

/// Build Delete Session Request for one connection
///
/// User location and time zone are relayed only when the MME set the
/// Operation Indication.
pub fn build_delete_session_request(
    request: &DeleteSessionRequest,
    linked_ebi: u8,
    sgw_s5c_fteid: Gtp2FTeid,
) -> Gtp2Body {
    let oi = request.indication.is_some_and(|i| i.oi);
    Gtp2Body::DeleteSessionRequest(DeleteSessionRequest {
        cause: request.cause,
        linked_ebi: Some(linked_ebi),
        uli: if oi { request.uli } else { None },
        indication: request.indication,
        pco: request.pco.clone(),
        sender_fteid: Some(sgw_s5c_fteid),
        ue_time_zone: if oi { request.ue_time_zone } else { None },
        ran_nas_release_cause: request.ran_nas_release_cause.clone(),
    })
}

/// Build Release Access Bearers Request
pub fn build_release_access_bearers_request() -> Gtp2Body {
    Gtp2Body::ReleaseAccessBearersRequest(ReleaseAccessBearersRequest::default())
}

/// Build Downlink Data Notification Acknowledge
pub fn build_downlink_data_notification_ack(
    cause: Gtp2Cause,
    data_notification_delay: Option<u8>,
    recovery: u8,
) -> Gtp2Body {
    Gtp2Body::DownlinkDataNotificationAcknowledge(DownlinkDataNotificationAcknowledge {
        cause,
        data_notification_delay,
        recovery: Some(recovery),
        imsi: None,
    })
}
