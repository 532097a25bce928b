// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nested scopes over the current task's context stack.
//!
//! [`enter_scope`] pushes a context and returns a [`ScopeGuard`].  While the
//! guard is alive, [`get`](crate::get) returns that context.  Releasing the
//! guard, explicitly or by dropping it, restores the context that was active
//! before.
//!
//! Guards must be released in reverse order of creation.  The guard remembers
//! the stack depth it was pushed at; releasing at any other depth is an
//! [`Error::UnbalancedScope`].  A guard may be sent to another thread, but
//! only the task that entered the scope may release it; any other task gets
//! [`Error::ForeignRelease`].

use crate::context::Context;
use crate::error::Error;
use crate::identity::{TaskID, identity};
use crate::registry::registry;

/// Keeps a context active until released.
///
/// Dropping the guard releases it.  A drop that finds the stack unbalanced
/// panics, unless the thread is already unwinding, in which case the problem
/// is logged instead.
#[must_use = "dropping the guard immediately ends the scope"]
#[derive(Debug)]
pub struct ScopeGuard {
    task: TaskID,
    depth: usize,
    released: bool,
}

/// Makes `context` the current task's context until the guard is released.
///
/// ```rust
/// use scoped_context::{background, enter_scope, get, with_value};
///
/// # let _root = enter_scope(background());
/// let outer = get();
/// let inner = with_value(&outer, 5u8);
/// {
///     let _guard = enter_scope(inner.clone());
///     assert_eq!(get(), inner);
/// }
/// assert_eq!(get(), outer);
/// ```
pub fn enter_scope(context: Context) -> ScopeGuard {
    ScopeGuard::push(identity(), context)
}

/// Runs `f` with `context` as the current context.
///
/// ```rust
/// use scoped_context::{background, get, scope, with_value};
///
/// let ctx = with_value(&background(), "request-7");
/// let seen = scope(ctx.clone(), || get().value::<&str>().copied());
/// assert_eq!(seen, Some("request-7"));
/// ```
pub fn scope<F, R>(context: Context, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = enter_scope(context);
    f()
}

impl ScopeGuard {
    pub(crate) fn push(task: TaskID, context: Context) -> ScopeGuard {
        let depth = registry().push(task, context);
        ScopeGuard {
            task,
            depth,
            released: false,
        }
    }

    /// The task whose stack this guard belongs to.
    pub fn task(&self) -> TaskID {
        self.task
    }

    /// The stack depth recorded when the scope was entered.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Ends the scope, reporting an imbalance instead of panicking.
    ///
    /// On error the stack is left as it was found.
    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        self.pop()
    }

    fn pop(&self) -> Result<(), Error> {
        let caller = identity();
        if caller != self.task {
            return Err(Error::ForeignRelease {
                task: self.task,
                caller,
            });
        }
        registry().pop(self.task, self.depth).map(drop)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.pop() {
            if std::thread::panicking() {
                let message = err.to_string();
                logwise::error_sync!("while unwinding: {err}", err = message);
            } else {
                panic!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{background, with_value};
    use crate::get;

    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::*;

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn nested_scopes_restore_previous() {
        let root = background();
        let _root = enter_scope(root.clone());
        let mut expected = vec![root.clone()];
        let mut guards = Vec::new();
        for n in 0..5u32 {
            let next = with_value(expected.last().unwrap(), n);
            guards.push(enter_scope(next.clone()));
            expected.push(next);
            assert_eq!(get(), *expected.last().unwrap());
        }
        while let Some(guard) = guards.pop() {
            guard.release().unwrap();
            expected.pop();
            assert_eq!(get(), *expected.last().unwrap());
        }
        assert_eq!(get(), root);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn guard_records_task_and_depth() {
        let outer = enter_scope(background());
        let inner = enter_scope(background());
        assert_eq!(outer.task(), identity());
        assert_eq!(inner.depth(), outer.depth() + 1);
        inner.release().unwrap();
        outer.release().unwrap();
        assert!(!registry().contains(identity()));
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn releasing_outer_first_is_unbalanced() {
        let outer = enter_scope(background());
        let outer_depth = outer.depth();
        let inner = enter_scope(background());
        let err = outer.release().unwrap_err();
        assert!(err.has_open_inner_scope());
        inner.release().unwrap();
        // the outer entry is still pinned; clear it by hand
        registry().pop(identity(), outer_depth).unwrap();
        assert!(!registry().contains(identity()));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn dropping_outer_first_panics() {
        let result = std::thread::spawn(|| {
            let outer = enter_scope(background());
            let inner = enter_scope(background());
            drop(outer);
            drop(inner);
        })
        .join();
        assert!(result.is_err());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn release_from_another_thread_is_refused() {
        let owner = identity();
        let outer = background();
        let _outer = enter_scope(outer.clone());
        let inner = with_value(&outer, "inner");
        let guard = enter_scope(inner.clone());
        let depth = guard.depth();

        let err = std::thread::spawn(move || guard.release().unwrap_err())
            .join()
            .unwrap();
        assert!(matches!(err, Error::ForeignRelease { task, .. } if task == owner));
        // the owner's stack is untouched
        assert_eq!(registry().depth(owner), depth);
        assert_eq!(get(), inner);
        registry().pop(owner, depth).unwrap();
        assert_eq!(get(), outer);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn dropping_on_another_thread_panics() {
        let owner = identity();
        let _outer = enter_scope(background());
        let guard = enter_scope(background());
        let depth = guard.depth();
        let result = std::thread::spawn(move || drop(guard)).join();
        assert!(result.is_err());
        assert_eq!(registry().depth(owner), depth);
        registry().pop(owner, depth).unwrap();
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn scope_releases_after_closure() {
        let ctx = background();
        let before = registry().depth(identity());
        let seen = scope(ctx.clone(), get);
        assert_eq!(seen, ctx);
        assert_eq!(registry().depth(identity()), before);
    }
}
