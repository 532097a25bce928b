// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-specific time and thread types.
//!
//! On native platforms these come from `std`, while on WASM they come from
//! `web_time` and `wasm_thread`.  Deadlines are measured with [`Instant`], and
//! [`crate::spawn`] creates its threads through [`thread`].

#[cfg(not(target_arch = "wasm32"))]
pub use std::thread;
#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
pub use wasm_thread as thread;
#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};
