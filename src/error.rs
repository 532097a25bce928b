// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors reported by the scoping discipline and by context values.

use crate::identity::TaskID;
use std::fmt::Display;

/// A violation of the scoping contract.
///
/// All variants are programmer errors rather than runtime faults.  The
/// panicking entry points ([`get`](crate::get), [`spawn`](crate::spawn::spawn),
/// dropping a [`ScopeGuard`](crate::ScopeGuard)) turn them into panics; the
/// `try_` and `release` forms hand them back so they can be inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The task read its context without one ever being pushed for it.
    ///
    /// This happens when a thread was started with `std::thread::spawn`
    /// instead of [`spawn`](crate::spawn::spawn), or when [`initialize`](crate::initialize)
    /// was never called on the main thread.
    NotRegistered {
        /// The task that has no entry.
        task: TaskID,
    },
    /// A scope was released out of order, or more than once.
    UnbalancedScope {
        /// The task whose stack was being popped.
        task: TaskID,
        /// The depth recorded when the scope was entered.
        expected: usize,
        /// The depth actually found at release time.
        found: usize,
    },
    /// A scope was released by a task other than the one that entered it.
    ///
    /// Guards may be moved between threads, but only the owning task may end
    /// the scope.  The owner's stack is left as it was.
    ForeignRelease {
        /// The task that entered the scope.
        task: TaskID,
        /// The task that tried to release it.
        caller: TaskID,
    },
}

impl Error {
    /// True when the scope had already been released.
    pub fn is_double_release(&self) -> bool {
        matches!(self, Error::UnbalancedScope { expected, found, .. } if found < expected)
    }

    /// True when a scope entered after this one is still open.
    pub fn has_open_inner_scope(&self) -> bool {
        matches!(self, Error::UnbalancedScope { expected, found, .. } if found > expected)
    }

    /// The task the error refers to.
    pub fn task(&self) -> TaskID {
        match self {
            Error::NotRegistered { task }
            | Error::UnbalancedScope { task, .. }
            | Error::ForeignRelease { task, .. } => *task,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotRegistered { task } => write!(
                f,
                "task {task} ran without a context; start it with scoped_context::spawn or call initialize() first"
            ),
            Error::UnbalancedScope {
                task,
                expected,
                found,
            } if found < expected => write!(
                f,
                "task {task} released a scope more than once (expected depth {expected}, found {found})"
            ),
            Error::UnbalancedScope {
                task,
                expected,
                found,
            } => write!(
                f,
                "task {task} has scopes that should be released before this one (expected depth {expected}, found {found})"
            ),
            Error::ForeignRelease { task, caller } => write!(
                f,
                "task {caller} tried to release a scope that belongs to task {task}"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// The reason a [`Context`](crate::Context) is done.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContextError {
    /// The context, or one of its ancestors, was canceled.
    Canceled,
    /// The earliest deadline along the context chain has passed.
    DeadlineExceeded,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::Canceled => f.write_str("context canceled"),
            ContextError::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

impl std::error::Error for ContextError {}
