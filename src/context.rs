// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable context values.
//!
//! A [`Context`] carries a cancellation signal, an optional deadline and typed
//! values.  Contexts form a chain from child to parent: a derived context
//! inherits everything from its parent unless it overrides it.
//!
//! ```rust
//! use scoped_context::{background, with_cancel, with_timeout, with_value, ContextError};
//! use std::time::Duration;
//!
//! #[derive(Debug, PartialEq)]
//! struct RequestId(u32);
//!
//! let root = background();
//! let tagged = with_value(&root, RequestId(42));
//! let (ctx, cancel) = with_cancel(&tagged);
//! let (bounded, _) = with_timeout(&ctx, Duration::from_secs(60));
//!
//! assert_eq!(bounded.value::<RequestId>(), Some(&RequestId(42)));
//! assert!(bounded.err().is_none());
//!
//! cancel.cancel();
//! assert_eq!(bounded.err(), Some(ContextError::Canceled));
//! assert!(tagged.err().is_none());
//! ```
//!
//! Cancellation runs through a tree of [`tokio_util::sync::CancellationToken`]s
//! that mirrors the context chain, so canceling a context wakes everything
//! waiting on it or on its descendants.  Await [`Context::done`] from async
//! code or block on [`Context::wait`] from a thread.  Deadlines are enforced by
//! a background watcher thread; [`Context::err`] also checks them directly, so
//! a passed deadline is visible even before the watcher runs.

mod cancel;
mod context_impl;
mod deadline;


pub use cancel::{CancelFunc, with_cancel, with_deadline, with_timeout};
pub use context_impl::{Context, ContextID, background, with_value};
