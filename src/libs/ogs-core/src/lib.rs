//! NextGCore core library
//!
//! Runtime primitives shared by NextGCore network functions.

pub mod async_timer;
pub mod log;
pub mod uid;

pub use async_timer::{compute_poll_interval, AsyncTimerEntry, AsyncTimerMgr};
pub use uid::UidGenerator;
