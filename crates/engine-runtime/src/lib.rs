use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod controller;
pub mod factory;
pub mod keys;
pub mod manifest;
pub mod payload;
pub mod upload;

/// Locks `mutex`, recovering the data if a holder panicked. Every critical
/// section here is a plain field update, so the data stays consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
