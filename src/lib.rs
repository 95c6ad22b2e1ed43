pub mod alarm;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod connector;
pub mod dashboard;
pub mod history;
pub mod inspection;
pub mod prom_metrics;
pub mod row;
pub mod submission;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
