//! TEID Pool for GTPv2-C
//!
//! Manages allocation and release of Tunnel Endpoint Identifiers (TEIDs).
//! Released TEIDs become available again once the counter wraps.

use std::sync::Arc;
use ogs_core::UidGenerator;
use crate::error::{GtpError, GtpResult};

/// TEID Pool for allocating unique, non-zero TEIDs
#[derive(Debug, Clone)]
pub struct TeidPool {
    ids: Arc<UidGenerator>,
}

impl TeidPool {
    /// Create a new TEID pool with default range (1..=0xFFFFFFFF)
    pub fn new() -> Self {
        Self {
            ids: Arc::new(UidGenerator::with_max(u32::MAX as u64)),
        }
    }

    /// Create a TEID pool over `1..=max`
    pub fn with_max(max: u32) -> GtpResult<Self> {
        if max == 0 {
            return Err(GtpError::InvalidFormat(
                "TEID max must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            ids: Arc::new(UidGenerator::with_max(max as u64)),
        })
    }

    /// Allocate a new TEID
    pub fn allocate(&self) -> GtpResult<u32> {
        self.ids
            .get_uid()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| GtpError::ResourceExhausted("TEID pool exhausted".to_string()))
    }

    /// Release a TEID
    pub fn release(&self, teid: u32) {
        if !self.ids.free_uid(teid as u64) {
            log::warn!("Release of unallocated TEID[0x{teid:x}]");
        }
    }

    /// Number of TEIDs currently allocated
    pub fn allocated(&self) -> usize {
        self.ids.in_use()
    }
}

impl Default for TeidPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teid_allocation() {
        let pool = TeidPool::new();
        let teid1 = pool.allocate().unwrap();
        let teid2 = pool.allocate().unwrap();
        assert_eq!(teid1, 1);
        assert_eq!(teid2, 2);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn test_teid_release_and_reuse() {
        let pool = TeidPool::with_max(2).unwrap();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());

        pool.release(a);
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn test_invalid_max() {
        assert!(TeidPool::with_max(0).is_err());
    }

    #[test]
    fn test_clone_shares_state() {
        let pool = TeidPool::new();
        let clone = pool.clone();
        let a = pool.allocate().unwrap();
        let b = clone.allocate().unwrap();
        assert_ne!(a, b);
    }
}
