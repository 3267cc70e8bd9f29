//! Unique identifier generator
//!
//! Hands out non-zero integer ids that stay reserved until explicitly freed.
//! A single generator is shared (through `Arc`) by every task that needs
//! opaque transaction ids, so all state sits behind one mutex.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug)]
struct UidState {
    last: u64,
    in_use: HashSet<u64>,
}

/// Internally synchronized id generator over `1..=max`
#[derive(Debug)]
pub struct UidGenerator {
    state: Mutex<UidState>,
    max: u64,
}

impl UidGenerator {
    /// Generator over the full `u64` range
    pub fn new() -> Self {
        Self::with_max(u64::MAX)
    }

    /// Generator over `1..=max`
    pub fn with_max(max: u64) -> Self {
        Self {
            state: Mutex::new(UidState {
                last: 0,
                in_use: HashSet::new(),
            }),
            max: max.max(1),
        }
    }

    /// Reserve the next free id, skipping ids still in use.
    ///
    /// Returns `None` only when every id in range is reserved.
    pub fn get_uid(&self) -> Option<u64> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.in_use.len() as u64 >= self.max {
            return None;
        }

        let mut candidate = state.last;
        loop {
            candidate = if candidate >= self.max { 1 } else { candidate + 1 };
            if !state.in_use.contains(&candidate) {
                break;
            }
        }

        state.last = candidate;
        state.in_use.insert(candidate);
        Some(candidate)
    }

    /// Release an id so it may be handed out again
    pub fn free_uid(&self, uid: u64) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.in_use.remove(&uid)
    }

    /// Whether an id is currently reserved
    pub fn is_used(&self, uid: u64) -> bool {
        self.state
            .lock()
            .map(|s| s.in_use.contains(&uid))
            .unwrap_or(false)
    }

    /// Number of reserved ids
    pub fn in_use(&self) -> usize {
        self.state.lock().map(|s| s.in_use.len()).unwrap_or(0)
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}
