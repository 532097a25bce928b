// SPDX-License-Identifier: MIT OR Apache-2.0

//! Root initialization and the everyday accessors.

use crate::context::{Context, background};
use crate::error::Error;
use crate::identity::identity;
use crate::registry::registry;
use crate::scope::{ScopeGuard, enter_scope};

/// Seeds the calling task with a fresh [`background`] context and returns it.
///
/// Call this once, at the top of `main`, before any other function in this
/// crate.  Threads started with [`spawn`](crate::spawn::spawn) and futures
/// wrapped in [`ApplyContext`](crate::ApplyContext) are seeded automatically.
///
/// The root entry is never popped; it goes away when the thread exits.
/// Calling `initialize` again on a task that already has a context pushes
/// another root on top and logs a warning.
///
/// ```rust
/// fn main() {
///     let root = scoped_context::initialize();
///     assert_eq!(scoped_context::get(), root);
/// }
/// ```
pub fn initialize() -> Context {
    let task = identity();
    let context = background();
    let depth = registry().push(task, context.clone());
    if depth > 1 {
        let logged_task = task.as_u64();
        let logged_depth = depth as u64;
        logwise::warn_sync!(
            "initialize() called again on task {task}; stack depth is now {depth}",
            task = logged_task,
            depth = logged_depth
        );
    }
    context
}

/// Returns the current task's context.
///
/// # Panics
///
/// Panics with [`Error::NotRegistered`] when the current thread was not
/// started with [`spawn`](crate::spawn::spawn) and [`initialize`] was never
/// called on it.  Use [`try_get`] to handle that case.
pub fn get() -> Context {
    match try_get() {
        Ok(context) => context,
        Err(err) => panic!("{err}"),
    }
}

/// Returns the current task's context, or [`Error::NotRegistered`].
pub fn try_get() -> Result<Context, Error> {
    registry().peek(identity())
}

/// Makes `context` current until the returned guard is released.
///
/// Same as [`enter_scope`](crate::enter_scope).
///
/// ```rust
/// use scoped_context::{get, initialize, set, with_value};
///
/// let c0 = initialize();
/// let c1 = with_value(&c0, 1u32);
/// let unset = set(c1.clone());
/// assert_eq!(get(), c1);
/// unset.release().unwrap();
/// assert_eq!(get(), c0);
/// ```
pub fn set(context: Context) -> ScopeGuard {
    enter_scope(context)
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::context::with_value;

    // Each test runs on its own thread so a root entry never outlives it.
    fn on_fresh_thread<F: FnOnce() + Send + 'static>(f: F) {
        std::thread::spawn(f).join().unwrap();
    }

    #[test]
    fn initialize_then_set_and_release() {
        on_fresh_thread(|| {
            let c0 = initialize();
            let c1 = with_value(&c0, "c1");
            let release1 = set(c1.clone());
            assert_eq!(get(), c1);
            release1.release().unwrap();
            assert_eq!(get(), c0);
        });
    }

    #[test]
    fn get_without_registration_fails() {
        on_fresh_thread(|| {
            let err = try_get().unwrap_err();
            assert_eq!(err, Error::NotRegistered { task: identity() });
        });
        let result = std::thread::spawn(get).join();
        assert!(result.is_err());
    }

    #[test]
    fn reinitialize_pushes_another_root() {
        on_fresh_thread(|| {
            let first = initialize();
            let second = initialize();
            assert_ne!(first, second);
            assert_eq!(get(), second);
            assert_eq!(registry().depth(identity()), 2);
        });
    }

    #[test]
    fn root_entry_is_removed_when_thread_exits() {
        let task = std::thread::spawn(|| {
            initialize();
            identity()
        })
        .join()
        .unwrap();
        assert!(!registry().contains(task));
    }
}
