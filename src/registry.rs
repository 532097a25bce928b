// SPDX-License-Identifier: MIT OR Apache-2.0

//! The context stack store.
//!
//! Maps each registered [`TaskID`] to a stack of [`Context`] values.  The top
//! of a task's stack is its active context.  An identity is present exactly as
//! long as its stack is non-empty.
//!
//! The whole map sits behind one reader/writer [`Spinlock`].  Reads take the
//! shared lock, `push` and `pop` take the exclusive lock.  Only the owning task
//! pushes and pops its own stack, so contention is only ever across tasks.
//!
//! Most code should go through [`get`](crate::get) and [`set`](crate::set);
//! the registry is public for diagnostics and for tests that need to observe
//! the raw discipline.

use crate::context::Context;
use crate::error::Error;
use crate::identity::TaskID;
use crate::spinlock::Spinlock;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A map from task identity to that task's context stack.
pub struct Registry {
    stacks: Spinlock<HashMap<TaskID, Vec<Context>>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry {
            stacks: Spinlock::new(HashMap::new()),
        }
    }

    /// Returns the active context of `task`.
    ///
    /// Fails with [`Error::NotRegistered`] if nothing was ever pushed for it.
    pub fn peek(&self, task: TaskID) -> Result<Context, Error> {
        self.stacks
            .with(|stacks| stacks.get(&task).and_then(|stack| stack.last()).cloned())
            .ok_or(Error::NotRegistered { task })
    }

    /// Pushes `context` onto `task`'s stack and returns the new depth.
    pub fn push(&self, task: TaskID, context: Context) -> usize {
        let depth = self.stacks.with_mut(|stacks| {
            let stack = stacks.entry(task).or_default();
            stack.push(context);
            stack.len()
        });
        let logged_task = task.0;
        let logged_depth = depth as u64;
        logwise::debuginternal_sync!(
            "push task={task} depth={depth}",
            task = logged_task,
            depth = logged_depth
        );
        depth
    }

    /// Pops the top of `task`'s stack, which must be exactly `expected_depth` deep.
    ///
    /// A deeper stack means a scope entered later is still open; a shallower
    /// one means this scope was already released.  Both fail with
    /// [`Error::UnbalancedScope`] and leave the stack untouched.
    ///
    /// When the stack empties, `task` is removed from the registry.
    pub fn pop(&self, task: TaskID, expected_depth: usize) -> Result<Context, Error> {
        let unbalanced = |found: usize| Error::UnbalancedScope {
            task,
            expected: expected_depth,
            found,
        };
        let popped = self.stacks.with_mut(|stacks| {
            let stack = match stacks.get_mut(&task) {
                Some(stack) if stack.len() == expected_depth => stack,
                other => return Err(unbalanced(other.map_or(0, |s| s.len()))),
            };
            let top = stack.pop();
            if stack.is_empty() {
                stacks.remove(&task);
            }
            top.ok_or_else(|| unbalanced(0))
        })?;
        let logged_task = task.0;
        let logged_depth = expected_depth as u64;
        logwise::debuginternal_sync!(
            "pop task={task} depth={depth}",
            task = logged_task,
            depth = logged_depth
        );
        Ok(popped)
    }

    /// Current depth of `task`'s stack; zero when unregistered.
    pub fn depth(&self, task: TaskID) -> usize {
        self.stacks
            .with(|stacks| stacks.get(&task).map_or(0, Vec::len))
    }

    /// Whether `task` has an entry.
    pub fn contains(&self, task: TaskID) -> bool {
        self.stacks.with(|stacks| stacks.contains_key(&task))
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.stacks.with(HashMap::len)
    }

    /// Whether no task has an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops `task`'s whole stack regardless of depth.
    pub(crate) fn remove(&self, task: TaskID) -> Option<Vec<Context>> {
        self.stacks.with_mut(|stacks| stacks.remove(&task))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::background;

    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::*;

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn peek_unregistered_fails() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        assert_eq!(registry.peek(task), Err(Error::NotRegistered { task }));
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn push_reports_depth_and_peek_sees_top() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        let a = background();
        let b = background();
        assert_eq!(registry.push(task, a.clone()), 1);
        assert_eq!(registry.push(task, b.clone()), 2);
        assert_eq!(registry.peek(task), Ok(b.clone()));
        assert_eq!(registry.pop(task, 2), Ok(b));
        assert_eq!(registry.peek(task), Ok(a.clone()));
        assert_eq!(registry.pop(task, 1), Ok(a));
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn emptied_stack_is_removed() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        registry.push(task, background());
        assert!(registry.contains(task));
        assert_eq!(registry.len(), 1);
        registry.pop(task, 1).unwrap();
        assert!(!registry.contains(task));
        assert!(registry.is_empty());
        assert_eq!(registry.depth(task), 0);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn double_pop_is_unbalanced() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        registry.push(task, background());
        let depth = registry.push(task, background());
        registry.pop(task, depth).unwrap();
        let err = registry.pop(task, depth).unwrap_err();
        assert!(err.is_double_release());
        // the outer entry is untouched
        assert_eq!(registry.depth(task), 1);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn double_pop_of_last_entry_is_unbalanced() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        registry.push(task, background());
        registry.pop(task, 1).unwrap();
        let err = registry.pop(task, 1).unwrap_err();
        assert_eq!(
            err,
            Error::UnbalancedScope {
                task,
                expected: 1,
                found: 0
            }
        );
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
    fn outer_pop_with_inner_open_is_unbalanced() {
        let registry = Registry::new();
        let task = TaskID::fresh();
        let outer = registry.push(task, background());
        let inner = registry.push(task, background());
        let err = registry.pop(task, outer).unwrap_err();
        assert!(err.has_open_inner_scope());
        assert_eq!(registry.depth(task), 2);
        registry.pop(task, inner).unwrap();
        registry.pop(task, outer).unwrap();
        assert!(!registry.contains(task));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn tasks_do_not_interfere() {
        use std::sync::Arc;
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let task = TaskID::fresh();
                    let mine = background();
                    for _ in 0..200 {
                        let depth = registry.push(task, mine.clone());
                        assert_eq!(depth, 1);
                        assert_eq!(registry.peek(task), Ok(mine.clone()));
                        registry.pop(task, depth).unwrap();
                    }
                    task
                })
            })
            .collect();
        for handle in handles {
            let task = handle.join().unwrap();
            assert!(!registry.contains(task));
        }
        assert!(registry.is_empty());
    }
}
