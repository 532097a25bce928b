// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Context implementation.

use crate::error::ContextError;
use crate::sys::Instant;
use std::any::{Any, TypeId};
use std::fmt::Display;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

pub(crate) static CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a context value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextID(pub(crate) u64);

impl Display for ContextID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a context differs from its parent.
#[derive(Debug)]
pub(crate) enum Derivation {
    Background,
    Cancel,
    Deadline(Instant),
    Value {
        type_id: TypeId,
        type_name: &'static str,
        value: Box<dyn Any + Send + Sync>,
    },
}

#[derive(Debug)]
pub(crate) struct ContextInner {
    pub(crate) parent: Option<Context>,
    pub(crate) context_id: u64,
    pub(crate) derivation: Derivation,
    /// Set at most once, by a [`CancelFunc`](super::CancelFunc) or when the
    /// deadline passes.  Always set before `token` is canceled.
    pub(crate) done: OnceLock<ContextError>,
    /// Value links share their parent's token; cancel and deadline links
    /// hold a child of it.
    pub(crate) token: CancellationToken,
}

impl ContextInner {
    /// Records `reason` and wakes every waiter on this link and its
    /// descendants.  Returns false if the link was already done.
    pub(crate) fn finish(&self, reason: ContextError) -> bool {
        if self.done.set(reason).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    fn reason_at(&self, now: Instant) -> Option<ContextError> {
        if let Some(reason) = self.done.get() {
            return Some(*reason);
        }
        match self.derivation {
            Derivation::Deadline(d) if now >= d => {
                // the watcher may not have fired yet
                self.finish(ContextError::DeadlineExceeded);
                self.done.get().copied()
            }
            _ => None,
        }
    }
}

/// An immutable carrier of cancellation, deadline and values.
///
/// Contexts are cheap to clone (Arc-based) and thread-safe.  Two contexts are
/// equal only if they are clones of the same value.
///
/// Create a root with [`background`], then derive from it with
/// [`with_cancel`](super::with_cancel), [`with_deadline`](super::with_deadline),
/// [`with_timeout`](super::with_timeout) or [`with_value`].
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(parent) = &self.inner.parent {
            write!(f, "{parent}.")?;
        }
        match &self.inner.derivation {
            Derivation::Background => f.write_str("context.Background"),
            Derivation::Cancel => f.write_str("WithCancel"),
            Derivation::Deadline(_) => f.write_str("WithDeadline"),
            Derivation::Value { type_name, .. } => write!(f, "WithValue({type_name})"),
        }
    }
}

/// Returns a new root context.
///
/// It is never canceled, has no deadline and holds no values.
pub fn background() -> Context {
    Context::derive(None, Derivation::Background)
}

/// Returns a copy of `parent` that also carries `value`.
///
/// Values are keyed by their type; a later `with_value` of the same type
/// shadows an earlier one.  Use a newtype to keep unrelated values apart.
///
/// ```rust
/// use scoped_context::{background, with_value};
///
/// struct User(&'static str);
///
/// let alice = with_value(&background(), User("alice"));
/// let bob = with_value(&alice, User("bob"));
/// assert_eq!(alice.value::<User>().map(|u| u.0), Some("alice"));
/// assert_eq!(bob.value::<User>().map(|u| u.0), Some("bob"));
/// ```
pub fn with_value<T: Any + Send + Sync>(parent: &Context, value: T) -> Context {
    Context::derive(
        Some(parent.clone()),
        Derivation::Value {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        },
    )
}

impl Context {
    pub(crate) fn derive(parent: Option<Context>, derivation: Derivation) -> Context {
        let token = match (&parent, &derivation) {
            (Some(parent), Derivation::Value { .. }) => parent.inner.token.clone(),
            (Some(parent), _) => parent.inner.token.child_token(),
            (None, _) => CancellationToken::new(),
        };
        Context {
            inner: Arc::new(ContextInner {
                parent,
                context_id: CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                derivation,
                done: OnceLock::new(),
                token,
            }),
        }
    }

    /// Iterates this context followed by its ancestors.
    fn chain(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(Some(self), |c| c.inner.parent.as_ref())
    }

    /// Returns the unique ID of this context.
    #[inline]
    pub fn context_id(&self) -> ContextID {
        ContextID(self.inner.context_id)
    }

    /// The parent this context was derived from, if any.
    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// Number of derivations between this context and its root.
    pub fn nesting_level(&self) -> usize {
        self.chain().count() - 1
    }

    /// Looks up the nearest value of type `T` along the chain.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.chain().find_map(|c| match &c.inner.derivation {
            Derivation::Value { type_id, value, .. } if *type_id == TypeId::of::<T>() => {
                value.downcast_ref::<T>()
            }
            _ => None,
        })
    }

    /// The earliest deadline along the chain.
    pub fn deadline(&self) -> Option<Instant> {
        self.chain()
            .filter_map(|c| match c.inner.derivation {
                Derivation::Deadline(d) => Some(d),
                _ => None,
            })
            .min()
    }

    /// Why this context is done, or `None` while it is still live.
    ///
    /// The nearest link that is done decides the reason.
    pub fn err(&self) -> Option<ContextError> {
        let now = Instant::now();
        self.chain().find_map(|c| c.inner.reason_at(now))
    }

    /// Shorthand for `self.err().is_some()`.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once this context is done, with the reason.
    ///
    /// Wakes when this context or an ancestor is canceled, or when the
    /// earliest deadline along the chain passes.  A context derived only from
    /// [`background`] and values never resolves.
    ///
    /// ```rust
    /// use scoped_context::{background, with_cancel, ContextError};
    ///
    /// let (ctx, cancel) = with_cancel(&background());
    /// let waiter = std::thread::spawn(move || test_executors::spin_on(ctx.done()));
    /// cancel.cancel();
    /// assert_eq!(waiter.join().unwrap(), ContextError::Canceled);
    /// ```
    pub fn done(&self) -> impl Future<Output = ContextError> + Send + 'static {
        let context = self.clone();
        async move {
            context.inner.token.cancelled().await;
            context.err().unwrap_or(ContextError::Canceled)
        }
    }

    /// Blocks the calling thread until this context is done.
    ///
    /// The thread-side counterpart of [`done`](Context::done).  Do not call
    /// this from async code, and do not call it on a browser main thread,
    /// which cannot block.
    pub fn wait(&self) -> ContextError {
        futures::executor::block_on(self.done())
    }
}
