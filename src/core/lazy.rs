//! Compute-once cache for expensive, immutable derivations.

use std::sync::{Mutex, OnceLock};

/// A value computed at most once, with fallible initialization.
///
/// The mutex serializes only the first computation; once the cell is set,
/// readers go through `OnceLock::get` without locking. Initialization
/// failures are not cached, so a later call may retry.
pub(crate) struct Lazy<T> {
    cell: OnceLock<T>,
    init: Mutex<()>,
}

impl<T> Lazy<T> {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub(crate) fn get_or_try_init<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let _guard = self.init.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.cell.get().is_none() {
            let value = f()?;
            // Cannot race: the guard is held and the cell was just observed empty.
            let _ = self.cell.set(value);
        }
        Ok(self
            .cell
            .get()
            .expect("cell populated under init guard"))
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(v) => write!(f, "Lazy({:?})", v),
            None => write!(f, "Lazy(<uninit>)"),
        }
    }
}
