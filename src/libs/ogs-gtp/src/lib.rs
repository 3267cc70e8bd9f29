//! NextGCore GTP Protocol Library
//!
//! GTPv2-C messages, header codec and transaction engine as specified in
//! 3GPP TS 29.274.

pub mod error;
pub mod v2;


pub use error::{GtpError, GtpResult};

/// GTPv2-C UDP port (2123)
pub const GTPV2_C_UDP_PORT: u16 = 2123;
