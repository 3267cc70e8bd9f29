//! SGWC S11 Message Builder
//!
//! Builds the GTPv2-C message bodies sent toward the MME.

use ogs_gtp::v2::{
    BearerContext, CreateSessionResponse, DeleteSessionResponse, DownlinkDataNotification,
    Gtp2Arp, Gtp2Body, Gtp2Cause, Gtp2FTeid, Gtp2MessageType, ModifyBearerResponse,
    ReleaseAccessBearersResponse,
};

use crate::context::{SgwcPdn, SgwcUe};

// ============================================================================
// S11 Message Builders
// ============================================================================

/// Build Create Session Response for an established connection
pub fn build_create_session_response(
    ue: &SgwcUe,
    pdn: &SgwcPdn,
    sgw_s11_fteid: Gtp2FTeid,
    from_pgw: &CreateSessionResponse,
    bearer_contexts_created: Vec<BearerContext>,
    recovery: u8,
) -> Gtp2Body {
    log::debug!(
        "[{}] Create Session Response APN[{}] SGW_S11_TEID[0x{:x}] PGW_S5C_TEID[0x{:x}]",
        ue.imsi,
        pdn.key,
        ue.sgw_s11_teid,
        pdn.pgw_s5c_teid()
    );

    Gtp2Body::CreateSessionResponse(CreateSessionResponse {
        cause: from_pgw.cause,
        sender_fteid: Some(sgw_s11_fteid),
        pgw_s5s8_cp_fteid: pdn.pgw_s5c_fteid,
        paa: pdn.paa,
        apn_restriction: from_pgw.apn_restriction,
        apn_ambr: pdn.apn_ambr,
        pco: from_pgw.pco.clone(),
        bearer_contexts_created,
        bearer_contexts_marked_for_removal: from_pgw.bearer_contexts_marked_for_removal.clone(),
        recovery: Some(recovery),
    })
}

/// Build Modify Bearer Response
pub fn build_modify_bearer_response(
    cause: Gtp2Cause,
    linked_ebi: Option<u8>,
    bearer_contexts_modified: Vec<BearerContext>,
    bearer_contexts_marked_for_removal: Vec<BearerContext>,
) -> Gtp2Body {
    Gtp2Body::ModifyBearerResponse(ModifyBearerResponse {
        linked_ebi,
        bearer_contexts_modified,
        bearer_contexts_marked_for_removal,
        ..ModifyBearerResponse::new(cause)
    })
}

/// Build Delete Session Response
pub fn build_delete_session_response(cause: Gtp2Cause, pco: Option<Vec<u8>>) -> Gtp2Body {
    Gtp2Body::DeleteSessionResponse(DeleteSessionResponse {
        cause,
        recovery: None,
        pco,
    })
}

/// Build Release Access Bearers Response
pub fn build_release_access_bearers_response(cause: Gtp2Cause, recovery: u8) -> Gtp2Body {
    Gtp2Body::ReleaseAccessBearersResponse(ReleaseAccessBearersResponse {
        cause,
        recovery: Some(recovery),
    })
}

/// Build Downlink Data Notification toward the MME
pub fn build_downlink_data_notification(
    ue: &SgwcUe,
    ebi: u8,
    arp: Option<Gtp2Arp>,
    cause: Option<Gtp2Cause>,
) -> Gtp2Body {
    Gtp2Body::DownlinkDataNotification(DownlinkDataNotification {
        cause,
        ebi: Some(ebi),
        arp,
        imsi: Some(ue.imsi.clone()),
    })
}

/// Build an error response carrying only `cause`
///
/// Returns `None` for request types this gateway does not answer on S11.
pub fn build_error_response(request_type: Gtp2MessageType, cause: Gtp2Cause) -> Option<Gtp2Body> {
    match request_type {
        Gtp2MessageType::CreateSessionRequest => {
            Some(Gtp2Body::CreateSessionResponse(CreateSessionResponse::new(cause)))
        }
        Gtp2MessageType::ModifyBearerRequest => {
            Some(build_modify_bearer_response(cause, None, Vec::new(), Vec::new()))
        }
        Gtp2MessageType::DeleteSessionRequest => Some(build_delete_session_response(cause, None)),
        Gtp2MessageType::ReleaseAccessBearersRequest => {
            Some(Gtp2Body::ReleaseAccessBearersResponse(ReleaseAccessBearersResponse {
                cause,
                recovery: None,
            }))
        }
        _ => None,
    }
}
