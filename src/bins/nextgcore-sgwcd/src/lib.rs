//! NextGCore SGWC (Serving Gateway Control Plane)
//!
//! Control plane of the EPC Serving Gateway:
//! - S11 interface: GTPv2-C sessions with the MME
//! - S5/S8-C interface: GTPv2-C sessions with the PGW
//!
//! The daemon runs three tasks: the application task owning the context
//! store and its procedures, and one path task per GTP-C interface owning
//! the socket and transaction engine of that interface.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod gtp_path;
pub mod procedure;
pub mod s11_build;
pub mod s11_handler;
pub mod s5c_build;
pub mod s5c_handler;
pub mod sm;


pub use config::{SgwcConfig, UserPlanePolicy};
pub use context::{PdnKey, SgwcBearer, SgwcContext, SgwcPdn, SgwcUe};
pub use error::{SgwcError, SgwcResult};
pub use event::{GtpInterface, SgwcEvent, SgwcEventId, SgwcEventKind, TaskId};
pub use gtp_path::{GtpPath, UdpTransport};
pub use procedure::{aggregate_cause, Procedure, ProcedureKind, ProcedureState};
pub use sm::{SgwcFsm, SgwcState};
