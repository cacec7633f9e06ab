//! Hard reset: wipe the credential namespace and restart.
//!
//! Recovery can be requested from several places at once (the reset
//! button, the telemetry worker on a 401, the stream worker on a 404, a
//! credential-flavoured disconnect). The latch collapses all of them into
//! one wipe-and-restart; later requests in the same boot are no-ops.
//!
//! A failed wipe still restarts. The identity may then survive the boot,
//! but every path that requested recovery will fire again and retry the
//! wipe, so the device converges instead of wedging.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, warn};

use crate::app::credentials::CredentialStore;
use crate::app::ports::{RestartPort, StoragePort};

/// One-shot admission gate for the hard reset.
#[derive(Debug, Default)]
pub struct RecoveryLatch {
    fired: AtomicBool,
}

impl RecoveryLatch {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// `true` exactly once; every later call returns `false`.
    pub fn try_fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }
}

/// Wipe stored credentials and restart. Never returns control to the
/// caller's state machine in any meaningful sense: after `restart()` the
/// process is gone on real hardware.
pub fn hard_reset<S: StoragePort, R: RestartPort>(
    store: &mut CredentialStore<S>,
    restart: &R,
) {
    warn!("recovery: hard reset requested, wiping credentials");
    if let Err(e) = store.wipe() {
        // Restart regardless; the next boot's recovery path retries.
        error!("recovery: credential wipe failed ({e}), restarting anyway");
    }
    restart.restart();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::cell::Cell;

    #[test]
    fn latch_fires_exactly_once() {
        let latch = RecoveryLatch::new();
        assert!(latch.try_fire());
        assert!(!latch.try_fire());
        assert!(!latch.try_fire());
    }

    struct CountingRestart {
        count: Cell<u32>,
    }

    impl RestartPort for CountingRestart {
        fn restart(&self) {
            self.count.set(self.count.get() + 1);
        }
    }

    struct FailingStorage;

    impl StoragePort for FailingStorage {
        fn get(&self, _: &str, _: &mut [u8]) -> Result<Option<usize>, StoreError> {
            Ok(None)
        }
        fn set(&mut self, _: &str, _: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::WriteFailed)
        }
        fn erase(&mut self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::EraseFailed)
        }
        fn erase_all(&mut self) -> Result<(), StoreError> {
            Err(StoreError::EraseFailed)
        }
        fn commit(&mut self) -> Result<(), StoreError> {
            Err(StoreError::CommitFailed)
        }
    }

    #[test]
    fn failed_wipe_still_restarts() {
        let mut store = CredentialStore::new(FailingStorage);
        let restart = CountingRestart { count: Cell::new(0) };
        hard_reset(&mut store, &restart);
        assert_eq!(restart.count.get(), 1);
    }
}
