// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
A reader/writer spinlock.

On the wasm main thread, we can't necessarily lock, so the registry uses a
spinlock instead.  Critical sections must be held for as short a time as
possible and must never call back into user code.
*/

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const UNLOCKED: u8 = 0;
//we allow for 254 readers or 1 writer (val = 255)
const LOCKED_WRITE: u8 = u8::MAX;

pub(crate) struct Spinlock<T> {
    data: UnsafeCell<T>,
    locked: AtomicU8,
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send + Sync> Sync for Spinlock<T> {}

/// Releases the lock when dropped, so a panic inside a critical section
/// cannot leave the registry locked forever.
struct Unlock<'a> {
    locked: &'a AtomicU8,
    write: bool,
}

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        if self.write {
            self.locked.store(UNLOCKED, Release);
        } else {
            self.locked.fetch_sub(1, Release);
        }
    }
}

impl<T> Spinlock<T> {
    pub(crate) const fn new(data: T) -> Self {
        Spinlock {
            data: UnsafeCell::new(data),
            locked: AtomicU8::new(UNLOCKED),
        }
    }

    fn spin_lock_write(&self) -> Unlock<'_> {
        while self
            .locked
            .compare_exchange_weak(UNLOCKED, LOCKED_WRITE, Acquire, Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        Unlock {
            locked: &self.locked,
            write: true,
        }
    }

    fn spin_lock_read(&self) -> Unlock<'_> {
        while self
            .locked
            .fetch_update(Acquire, Relaxed, |v| {
                if v < (LOCKED_WRITE - 1) {
                    Some(v + 1)
                } else {
                    None
                }
            })
            .is_err()
        {
            std::hint::spin_loop();
        }
        Unlock {
            locked: &self.locked,
            write: false,
        }
    }

    /// Runs `f` with exclusive access.
    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let _unlock = self.spin_lock_write();
        // SAFETY: We hold the write lock until `_unlock` drops
        unsafe { f(&mut *self.data.get()) }
    }

    /// Runs `f` with shared access.
    pub(crate) fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let _unlock = self.spin_lock_read();
        // SAFETY: We hold a read lock until `_unlock` drops; writers are excluded
        unsafe { f(&*self.data.get()) }
    }
}
