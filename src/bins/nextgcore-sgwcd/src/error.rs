//! SGWC Error types

use ogs_gtp::v2::Gtp2Cause;
use ogs_gtp::GtpError;
use thiserror::Error;

/// Errors raised while handling a procedure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SgwcError {
    /// No context under the given key
    #[error("Context not found: {0}")]
    NotFound(String),

    /// A context already exists under the given key
    #[error("Context already exists: {0}")]
    AlreadyExists(String),

    #[error("Mandatory IE missing: {0}")]
    MandatoryIeMissing(&'static str),

    #[error("Conditional IE missing: {0}")]
    ConditionalIeMissing(&'static str),

    /// TEID or transaction id space exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("GTP error: {0}")]
    Gtp(#[from] GtpError),
}

impl SgwcError {
    /// Cause carried in the response that reports this error
    pub fn gtp_cause(&self) -> Gtp2Cause {
        match self {
            SgwcError::NotFound(_) => Gtp2Cause::ContextNotFound,
            SgwcError::AlreadyExists(_) => Gtp2Cause::RequestRejectedReasonNotSpecified,
            SgwcError::MandatoryIeMissing(_) => Gtp2Cause::MandatoryIeMissing,
            SgwcError::ConditionalIeMissing(_) => Gtp2Cause::ConditionalIeMissing,
            SgwcError::ResourceExhausted(_) => Gtp2Cause::NoResourcesAvailable,
            SgwcError::Gtp(GtpError::ResourceExhausted(_)) => Gtp2Cause::NoResourcesAvailable,
            SgwcError::Gtp(_) => Gtp2Cause::SystemFailure,
        }
    }
}

pub type SgwcResult<T> = Result<T, SgwcError>;
