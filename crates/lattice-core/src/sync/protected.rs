// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-write protected state with scope-guarded monitors.

use std::ops::{Deref, DerefMut};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An object guarded by a reader-writer lock.
///
/// [`read`](Protected::read) admits concurrent readers, [`write`](Protected::write)
/// is exclusive. Both return monitors that release on drop, so a lock can never
/// leak past its lexical scope. A panic inside a critical section does not
/// poison the state for later callers: the value is recovered as-is.
#[derive(Debug, Default)]
pub struct Protected<T> {
    lock: RwLock<T>,
}

impl<T> Protected<T> {
    /// Wraps `value` in a new protected object.
    pub fn new(value: T) -> Self {
        Self {
            lock: RwLock::new(value),
        }
    }

    /// Acquires a shared read monitor, blocking until no writer holds the lock.
    pub fn read(&self) -> ReadMonitor<'_, T> {
        ReadMonitor {
            guard: self.lock.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Acquires the exclusive write monitor, blocking until all monitors are
    /// released.
    pub fn write(&self) -> WriteMonitor<'_, T> {
        WriteMonitor {
            guard: self.lock.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Runs `f` under the read monitor and returns its result.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read())
    }

    /// Runs `f` under the write monitor and returns its result.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }

    /// Consumes the protected object and returns the inner value.
    pub fn into_inner(self) -> T {
        self.lock
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared access monitor returned by [`Protected::read`].
#[derive(Debug)]
pub struct ReadMonitor<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for ReadMonitor<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

/// Exclusive access monitor returned by [`Protected::write`].
#[derive(Debug)]
pub struct WriteMonitor<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> Deref for WriteMonitor<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteMonitor<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
