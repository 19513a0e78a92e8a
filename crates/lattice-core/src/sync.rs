// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concurrency primitives shared by the runtime registries.
//!
//! - [`Protected`]: read-write protected state with scope-guarded monitors.
//! - [`Publisher`] / [`AsyncPublisher`]: multi-subscriber fan-out, synchronous
//!   and deferred.
//! - [`RoundRobin`] / [`Rollover`]: even-distribution selection helpers.

mod pick;
mod protected;
mod publisher;

pub use pick::{Rollover, RoundRobin};
pub use protected::{Protected, ReadMonitor, WriteMonitor};
pub use publisher::{AsyncPublisher, Publisher, Subscription};
