// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancelable and deadline-bound contexts.

use super::context_impl::{Context, Derivation};
use super::deadline;
use crate::error::ContextError;
use crate::sys::{Duration, Instant};

/// Cancels the context it was returned with.
///
/// Canceling a context also cancels everything derived from it.  Calling
/// [`cancel`](CancelFunc::cancel) more than once is harmless; the first reason
/// sticks.
#[derive(Debug, Clone)]
pub struct CancelFunc {
    context: Context,
}

impl CancelFunc {
    /// Cancels the context.
    ///
    /// If the context's own deadline already passed, it stays
    /// [`DeadlineExceeded`](ContextError::DeadlineExceeded).
    pub fn cancel(&self) {
        let reason = match self.context.inner.derivation {
            Derivation::Deadline(d) if Instant::now() >= d => ContextError::DeadlineExceeded,
            _ => ContextError::Canceled,
        };
        if self.context.inner.finish(reason) {
            let id = self.context.inner.context_id;
            logwise::debuginternal_sync!("canceled context {id}", id = id);
        }
    }
}

/// Returns a copy of `parent` that can be canceled independently.
pub fn with_cancel(parent: &Context) -> (Context, CancelFunc) {
    let context = Context::derive(Some(parent.clone()), Derivation::Cancel);
    let cancel = CancelFunc {
        context: context.clone(),
    };
    (context, cancel)
}

/// Returns a copy of `parent` that is done once `deadline` passes.
///
/// A parent deadline that is earlier still applies.  Waiters on
/// [`Context::done`] are woken when the deadline passes.
pub fn with_deadline(parent: &Context, deadline: Instant) -> (Context, CancelFunc) {
    let inherited = parent.deadline();
    let context = Context::derive(Some(parent.clone()), Derivation::Deadline(deadline));
    // an earlier parent deadline already cancels this link through the token tree
    if inherited.is_none_or(|earlier| deadline < earlier) {
        deadline::watch(&context, deadline);
    }
    let cancel = CancelFunc {
        context: context.clone(),
    };
    (context, cancel)
}

/// `with_deadline(parent, now + timeout)`.
pub fn with_timeout(parent: &Context, timeout: Duration) -> (Context, CancelFunc) {
    with_deadline(parent, Instant::now() + timeout)
}
