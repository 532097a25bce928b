//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# scoped_context

Implicit, task-scoped context propagation.

# The problem

Request-scoped values such as cancellation, deadlines, request IDs and tenants
are usually threaded through every function as an explicit `ctx` parameter.
That works, but every function in between has to accept and forward a value
it never looks at.

scoped_context instead gives every task (a thread, or a future wrapped in
[`ApplyContext`]) an implicit current [`Context`].  Callees fetch it when they
need it.

# Usage

Seed the main thread once:

```rust
fn main() {
    scoped_context::initialize();
    // program goes here
}
```

Read the current context instead of taking a parameter:

```rust
# scoped_context::initialize();
fn handle() {
    let ctx = scoped_context::get();
    if ctx.is_done() {
        return;
    }
    // use ctx
}
# handle();
```

Apply a context to a scope.  The context is active until the guard is
released or dropped, or until a deeper `set`:

```rust
use scoped_context::{get, initialize, set, with_timeout};
use std::time::Duration;

let root = initialize();
{
    let (ctx, _cancel) = with_timeout(&root, Duration::from_secs(5));
    let _unset = set(ctx.clone());
    assert_eq!(get(), ctx);
}
assert_eq!(get(), root);
```

Start threads with [`spawn`] (current context) or [`spawn_with`] (chosen
context) instead of `std::thread::spawn`:

```rust
# let root = scoped_context::initialize();
let child = scoped_context::spawn(|| scoped_context::get());
assert_eq!(child.join().unwrap(), root);
```

Wrap futures in [`ApplyContext`] before handing them to an executor.

# Rules

* Guards must be released in reverse order, and only once.  Violations are
  [`Error::UnbalancedScope`].
* A task that never had a context (a thread from `std::thread::spawn`, or a
  main thread that skipped [`initialize`]) cannot call [`get`]; it fails with
  [`Error::NotRegistered`].

Both are programmer errors and panic by default.  [`try_get`] and
[`ScopeGuard::release`] report them as `Result`s instead.

# Logging

Internal tracing goes through [logwise](https://crates.io/crates/logwise).
Build with the `logwise_internal` feature to see pushes, pops and spawns.
*/

mod apply_context;
pub mod context;
mod error;
mod identity;
pub mod registry;
mod root;
mod scope;
pub mod spawn;
mod spinlock;
mod sys;

logwise::declare_logging_domain!();

pub use apply_context::ApplyContext;
pub use context::{
    CancelFunc, Context, ContextID, background, with_cancel, with_deadline, with_timeout,
    with_value,
};
pub use error::{ContextError, Error};
pub use identity::{TaskID, identity};
pub use registry::{Registry, registry};
pub use root::{get, initialize, set, try_get};
pub use scope::{ScopeGuard, enter_scope, scope};
pub use spawn::{JoinHandle, spawn, spawn_with};
pub use sys::{Duration, Instant};
