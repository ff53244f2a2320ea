//! Small internal helpers.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard from a poisoned lock.
///
/// Runtime state transitions are short critical sections that leave the
/// protected data consistent at every await-free step; a panic elsewhere must
/// not wedge the whole floor.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
