//! Poison recovery extension trait for std::sync::Mutex

use crate::error::Result;
use std::sync::{Mutex, MutexGuard};

/// Extension trait for Mutex with poison recovery
pub trait MutexExt<T> {
    /// Lock the mutex, recovering from poison errors
    fn lock_recovered(&self) -> Result<MutexGuard<'_, T>>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_recovered(&self) -> Result<MutexGuard<'_, T>> {
        match self.lock() {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                log::warn!("Mutex was poisoned, recovering");
                Ok(poisoned.into_inner())
            }
        }
    }
}
