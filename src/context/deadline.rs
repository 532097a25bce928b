// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background watcher that cancels contexts when their deadline passes.
//!
//! Deadline links register with a single watcher thread.  The thread sleeps
//! until the earliest pending deadline, then finishes every expired link,
//! which cancels its token and wakes anyone awaiting [`Context::done`].
//!
//! The watcher holds only weak references, so a context nobody holds anymore
//! is forgotten rather than kept alive until its deadline.

use super::context_impl::{Context, ContextInner};
use crate::error::ContextError;
use crate::sys::{Duration, Instant, thread};
use std::sync::{Arc, OnceLock, Weak};
use wasm_safe_mutex::mpsc;

struct Watch {
    deadline: Instant,
    context: Weak<ContextInner>,
}

impl Watch {
    /// Whether the watcher should keep this entry after `now`.
    fn pending(&self, now: Instant) -> bool {
        let Some(context) = self.context.upgrade() else {
            return false;
        };
        if context.done.get().is_some() {
            return false;
        }
        if now < self.deadline {
            return true;
        }
        if context.finish(ContextError::DeadlineExceeded) {
            let id = context.context_id;
            logwise::debuginternal_sync!("deadline passed for context {id}", id = id);
        }
        false
    }
}

static CHANNEL: OnceLock<mpsc::Sender<Watch>> = OnceLock::new();

fn channel() -> mpsc::Sender<Watch> {
    CHANNEL
        .get_or_init(|| {
            let (tx, rx) = mpsc::channel();
            spawn_watcher(rx);
            tx
        })
        .clone()
}

/// Arranges for `context` to be finished with
/// [`DeadlineExceeded`](ContextError::DeadlineExceeded) at `deadline`.
pub(crate) fn watch(context: &Context, deadline: Instant) {
    if Instant::now() >= deadline {
        context.inner.finish(ContextError::DeadlineExceeded);
        return;
    }
    let watch = Watch {
        deadline,
        context: Arc::downgrade(&context.inner),
    };
    if channel().send_sync(watch).is_err() {
        logwise::warn_sync!(
            "deadline watcher is not running; waiters will not be woken at the deadline"
        );
    }
}

fn spawn_watcher(receiver: mpsc::Receiver<Watch>) {
    let spawned = thread::Builder::new()
        .name("scoped_context-deadlines".to_string())
        .spawn(move || deadline_loop(receiver));
    if let Err(err) = spawned {
        let message = err.to_string();
        logwise::error_sync!("could not start deadline watcher: {err}", err = message);
    }
}

fn deadline_loop(receiver: mpsc::Receiver<Watch>) {
    let mut watches: Vec<Watch> = Vec::new();
    loop {
        let now = Instant::now();
        let next_deadline = watches
            .iter()
            .map(|watch| watch.deadline)
            .min()
            .unwrap_or_else(|| now + Duration::from_millis(250));

        match receiver.recv_sync_timeout(next_deadline) {
            Ok(watch) => watches.push(watch),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        watches.retain(|watch| watch.pending(now));
    }
}
