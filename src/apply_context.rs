// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context propagation for futures.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use crate::context::Context;
use crate::identity::{self, TaskID};
use crate::root::get;
use crate::scope::ScopeGuard;

/// A [`Future`] that runs as its own task with its own context stack.
///
/// Executors poll futures from whatever thread is free, so a future cannot
/// rely on the polling thread's context.  `ApplyContext` gives the wrapped
/// future a task identity of its own, seeds that task's stack with a context,
/// and installs the identity around every poll.  Inside the future,
/// [`get`](crate::get), [`set`](crate::set) and [`spawn`](crate::spawn::spawn)
/// behave exactly as they do on a thread, and scopes may stay open across
/// `.await` points.
///
/// The seeded entry is released when the `ApplyContext` is dropped, after the
/// wrapped future itself has been dropped.
///
/// # Examples
///
/// ```rust
/// use scoped_context::{ApplyContext, background, get, with_value};
///
/// async fn handler() -> Option<u32> {
///     get().value::<u32>().copied()
/// }
///
/// # test_executors::spin_on(async {
/// let ctx = with_value(&background(), 7u32);
/// let answer = ApplyContext::new(ctx, handler()).await;
/// assert_eq!(answer, Some(7));
/// # });
/// ```
pub struct ApplyContext<F> {
    task: TaskID,
    future: Option<F>,
    seed: Option<ScopeGuard>,
}

impl<F> ApplyContext<F> {
    /// Wraps `f` so it runs with `context`.
    pub fn new(context: Context, f: F) -> Self {
        let task = TaskID::fresh();
        let seed = ScopeGuard::push(task, context);
        let logged_task = task.as_u64();
        logwise::debuginternal_sync!("seeded future task {task}", task = logged_task);
        Self {
            task,
            future: Some(f),
            seed: Some(seed),
        }
    }

    /// Wraps `f` so it runs with the caller's current context.
    ///
    /// # Panics
    ///
    /// Panics if the caller has no context.
    pub fn inherit(f: F) -> Self {
        Self::new(get(), f)
    }

    /// The identity the wrapped future runs as.
    pub fn task(&self) -> TaskID {
        self.task
    }
}

impl<F> Future for ApplyContext<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is never moved out of while pinned; it is only
        // dropped in place, by `Drop`.
        let this = unsafe { self.get_unchecked_mut() };
        let _task = identity::enter(this.task);
        match this.future.as_mut() {
            Some(fut) => unsafe { Pin::new_unchecked(fut) }.poll(cx),
            None => panic!("ApplyContext polled after its future was dropped"),
        }
    }
}

impl<F> Drop for ApplyContext<F> {
    fn drop(&mut self) {
        let _task = identity::enter(self.task);
        // Scopes the future still holds are released before the seed.
        self.future = None;
        drop(self.seed.take());
    }
}

impl<F> std::fmt::Debug for ApplyContext<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyContext")
            .field("task", &self.task)
            .field("done", &self.future.is_none())
            .finish()
    }
}
