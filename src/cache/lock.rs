//! Lock helpers shared by the cache tiers.
//!
//! Tier state is plain data, so a panic in another holder never leaves it
//! half-written in a way later readers can't cope with. Poisoned locks are
//! recovered with a warning instead of propagating the panic.

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, tier: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                tier,
                result = "poisoned_recovered",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}
