//! Per-address write serialization.
//!
//! Two writes from the same address can read the same pending nonce and
//! collide. [`WriteLocks`] gives callers an async mutex per address to hold
//! from the nonce query through broadcast. Different addresses never block
//! each other.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by signer address.
///
/// Cloning shares the underlying table.
#[derive(Clone, Debug, Default)]
pub struct WriteLocks {
    locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

impl WriteLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive write access for `address`.
    ///
    /// The lock is released when the returned guard is dropped, including on
    /// early return and on panic unwinding.
    pub async fn acquire(&self, address: Address) -> WriteGuard {
        let slot = {
            let entry = self
                .locks
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        #[cfg(feature = "telemetry")]
        tracing::trace!(%address, "waiting for write lock");
        let guard = slot.lock_owned().await;
        WriteGuard {
            address,
            _guard: guard,
        }
    }

    /// Returns `true` if a writer currently holds the lock for `address`.
    #[must_use]
    pub fn is_locked(&self, address: Address) -> bool {
        self.locks
            .get(&address)
            .is_some_and(|slot| slot.try_lock().is_err())
    }
}

/// Exclusive write access for one address.
#[derive(Debug)]
pub struct WriteGuard {
    address: Address,
    _guard: OwnedMutexGuard<()>,
}

impl WriteGuard {
    /// The address this guard serializes.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_address_is_exclusive() {
        let locks = WriteLocks::new();
        let addr = Address::repeat_byte(1);
        let guard = locks.acquire(addr).await;
        assert!(locks.is_locked(addr));

        let contender = tokio::time::timeout(Duration::from_millis(50), locks.acquire(addr)).await;
        assert!(contender.is_err());

        drop(guard);
        assert!(!locks.is_locked(addr));
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(addr)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let locks = WriteLocks::new();
        let _a = locks.acquire(Address::repeat_byte(1)).await;
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(Address::repeat_byte(2)),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        async fn failing_write(locks: &WriteLocks, addr: Address) -> Result<(), &'static str> {
            let _guard = locks.acquire(addr).await;
            Err("broadcast failed")
        }
        let locks = WriteLocks::new();
        let addr = Address::repeat_byte(3);
        assert!(failing_write(&locks, addr).await.is_err());
        assert!(!locks.is_locked(addr));
    }
}
