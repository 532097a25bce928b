// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starting threads that carry a context.
//!
//! A thread started with [`std::thread::spawn`] has no context, and calling
//! [`get`](crate::get) on it panics.  Use [`spawn`] to hand the new thread
//! the caller's current context, or [`spawn_with`] to choose one.
//!
//! The new thread's entry is released when its closure returns or panics;
//! a panic still reaches the [`JoinHandle`].

use crate::context::Context;
use crate::identity::identity;
use crate::root::get;
use crate::scope::ScopeGuard;
use crate::sys::thread;
use std::io;

pub use thread::JoinHandle;

/// Runs `f` on a new thread with the caller's current context.
///
/// # Panics
///
/// Panics if the caller has no context, or if the OS fails to create a thread.
///
/// ```rust
/// use scoped_context::{get, initialize, set, spawn, with_value};
///
/// let root = initialize();
/// let request = with_value(&root, "GET /");
/// let _unset = set(request.clone());
///
/// let seen = spawn(get).join().unwrap();
/// assert_eq!(seen, request);
/// ```
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_with(get(), f)
}

/// Runs `f` on a new thread whose context is `context`.
///
/// # Panics
///
/// Panics if the OS fails to create a thread.
pub fn spawn_with<F, T>(context: Context, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Builder::new()
        .spawn_with(context, f)
        .expect("failed to spawn thread")
}

/// Thread configuration, mirroring [`std::thread::Builder`].
///
/// ```rust
/// use scoped_context::{background, spawn::Builder};
///
/// let handle = Builder::new()
///     .name("worker".to_string())
///     .spawn_with(background(), || std::thread::current().name().map(str::to_owned))
///     .unwrap();
/// assert_eq!(handle.join().unwrap().as_deref(), Some("worker"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Builder {
    /// A builder with the platform's default name and stack size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the thread.
    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the thread's stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Like [`spawn`], but reports thread creation failure.
    pub fn spawn<F, T>(self, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with(get(), f)
    }

    /// Like [`spawn_with`], but reports thread creation failure.
    pub fn spawn_with<F, T>(self, context: Context, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || run_seeded(context, f))
    }
}

fn run_seeded<F, T>(context: Context, f: F) -> T
where
    F: FnOnce() -> T,
{
    let seed = ScopeGuard::push(identity(), context);
    let logged_task = seed.task().as_u64();
    let logged_depth = seed.depth() as u64;
    logwise::debuginternal_sync!(
        "seeded task {task} at depth {depth}",
        task = logged_task,
        depth = logged_depth
    );
    let result = f();
    drop(seed);
    result
}
