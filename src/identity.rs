// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves the identity of the currently running task.
//!
//! A task is either an OS thread or a future wrapped in
//! [`ApplyContext`](crate::ApplyContext).  Threads get an identity lazily, stored
//! in native thread-local storage.  While an `ApplyContext` is polled it
//! installs its own identity over the thread's, and restores the previous one
//! afterwards.
//!
//! Identities come from a single process-wide counter and are never reused.

use std::cell::Cell;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

static TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task.
///
/// Stable for the lifetime of the task; never handed out twice in one process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskID(pub(crate) u64);

impl TaskID {
    /// Allocates an identity no other task has had.
    pub(crate) fn fresh() -> TaskID {
        TaskID(TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric identity.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for TaskID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the calling thread's identity.
///
/// When the thread exits, whatever is still registered for it (a root entry
/// or a leaked scope) is removed from the registry.
struct ThreadSlot {
    task: TaskID,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        // Logging is unavailable here: other thread-locals may already be gone.
        crate::registry::registry().remove(self.task);
    }
}

thread_local! {
    static THREAD_TASK: ThreadSlot = ThreadSlot { task: TaskID::fresh() };
    static POLLING_TASK: Cell<Option<TaskID>> = const { Cell::new(None) };
}

/// Returns the identity of the currently running task.
///
/// # Examples
///
/// ```
/// let a = scoped_context::identity();
/// let b = scoped_context::identity();
/// assert_eq!(a, b);
///
/// let other = std::thread::spawn(scoped_context::identity).join().unwrap();
/// assert_ne!(a, other);
/// ```
pub fn identity() -> TaskID {
    POLLING_TASK
        .with(Cell::get)
        .unwrap_or_else(|| THREAD_TASK.with(|slot| slot.task))
}

/// Restores the previously installed identity when dropped.
#[must_use]
pub(crate) struct EnterTask {
    prior: Option<TaskID>,
}

/// Installs `task` as the current identity until the returned value drops.
pub(crate) fn enter(task: TaskID) -> EnterTask {
    let prior = POLLING_TASK.with(|c| c.replace(Some(task)));
    EnterTask { prior }
}

impl Drop for EnterTask {
    fn drop(&mut self) {
        POLLING_TASK.with(|c| c.set(self.prior));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::*;

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn stable_within_a_thread() {
        assert_eq!(identity(), identity());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn distinct_across_threads() {
        let here = identity();
        let ids: Vec<TaskID> = (0..8)
            .map(|_| std::thread::spawn(identity))
            .map(|h| h.join().unwrap())
            .collect();
        for id in &ids {
            assert_ne!(*id, here);
        }
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn enter_nests_and_restores() {
        let thread = identity();
        let outer = TaskID::fresh();
        let inner = TaskID::fresh();
        {
            let _outer = enter(outer);
            assert_eq!(identity(), outer);
            {
                let _inner = enter(inner);
                assert_eq!(identity(), inner);
            }
            assert_eq!(identity(), outer);
        }
        assert_eq!(identity(), thread);
    }
}
