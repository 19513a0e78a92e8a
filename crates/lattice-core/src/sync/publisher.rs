// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Multi-subscriber fan-out, synchronous and deferred.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use super::Protected;

struct Subscriber<T> {
    id: Uuid,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

/// Synchronous fan-out to a dynamic set of subscribers.
///
/// [`publish`](Publisher::publish) delivers to every subscriber in
/// registration order, on the publishing thread. A panicking subscriber is
/// contained and logged; the remaining subscribers still receive the value.
pub struct Publisher<T> {
    subscribers: Arc<Protected<Vec<Subscriber<T>>>>,
}

impl<T> Publisher<T> {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Protected::new(Vec::new())),
        }
    }

    /// Registers `callback` and returns its subscription handle.
    ///
    /// The callback stays registered until [`Subscription::release`] is
    /// called; dropping the handle alone does not unsubscribe.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription
    where
        T: 'static,
    {
        let id = Uuid::new_v4();
        self.subscribers.write().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });

        let subscribers = Arc::downgrade(&self.subscribers);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(subscribers) = Weak::upgrade(&subscribers) {
                    subscribers.write().retain(|s| s.id != id);
                }
            })),
        }
    }

    /// Delivers `value` to every current subscriber, in registration order.
    ///
    /// The subscriber set is snapshotted first, so callbacks may subscribe or
    /// release without deadlocking; such changes take effect from the next
    /// publish.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!("subscriber panicked during publish, continuing with remaining subscribers");
            }
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered subscriber.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Unregisters the subscriber. Idempotent by construction: the handle is
    /// consumed.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Deferred fan-out backed by a bounded queue and a worker task.
///
/// [`publish`](AsyncPublisher::publish) enqueues and returns immediately;
/// the worker delivers queued values to subscribers in order. Must be
/// created inside a tokio runtime.
pub struct AsyncPublisher<T> {
    inner: Arc<Publisher<T>>,
    tx: Option<mpsc::Sender<T>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> AsyncPublisher<T> {
    /// Spawns the delivery worker with a queue of `queue_depth` values.
    pub fn new(queue_depth: usize) -> Self {
        let inner = Arc::new(Publisher::new());
        let (tx, mut rx) = mpsc::channel::<T>(queue_depth);

        let worker_publisher = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                worker_publisher.publish(&value);
            }
        });

        Self {
            inner,
            tx: Some(tx),
            worker,
        }
    }

    /// Registers `callback` for deferred delivery.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.subscribe(callback)
    }

    /// Enqueues `value` for delivery. If the queue is full or the worker is
    /// gone the value is dropped with a warning; publication is
    /// fire-and-forget.
    pub fn publish(&self, value: T) {
        let Some(tx) = &self.tx else {
            warn!("publish after shutdown, dropping value");
            return;
        };
        match tx.try_send(value) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("event queue full, dropping value");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("delivery worker stopped, dropping value");
            }
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    /// Stops accepting values, drains the queue, and waits for the worker.
    pub async fn shutdown(mut self) {
        drop(self.tx.take());
        let _ = (&mut self.worker).await;
    }
}

impl<T> Drop for AsyncPublisher<T> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit on its own.
        drop(self.tx.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_delivery_in_registration_order() {
        let publisher = Publisher::new();
        let seen = Arc::new(Protected::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            let _subscription = publisher.subscribe(move |value: &u64| {
                seen.write().push((label, *value));
            });
        }

        publisher.publish(&9);
        assert_eq!(
            *seen.read(),
            vec![("first", 9), ("second", 9), ("third", 9)]
        );
    }

    #[test]
    fn test_release_stops_delivery() {
        let publisher = Publisher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let subscription = publisher.subscribe(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(&());
        subscription.release();
        publisher.publish(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_release_from_another_thread() {
        let publisher = Publisher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let subscription = publisher.subscribe(move |_: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::spawn(move || subscription.release())
            .join()
            .unwrap();

        publisher.publish(&1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_dropping_handle_keeps_subscription() {
        let publisher = Publisher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        drop(publisher.subscribe(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        publisher.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let publisher = Publisher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = publisher.subscribe(|_: &()| panic!("subscriber bug"));
        let counter = Arc::clone(&count);
        let _good = publisher.subscribe(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(&());
        publisher.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscribe_during_publish_does_not_deadlock() {
        let publisher = Arc::new(Publisher::new());

        let reentrant = Arc::clone(&publisher);
        let _subscription = publisher.subscribe(move |_: &()| {
            drop(reentrant.subscribe(|_: &()| {}));
        });

        publisher.publish(&());
        assert_eq!(publisher.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_async_publish_is_deferred_but_complete() {
        let publisher = AsyncPublisher::new(16);
        let seen = Arc::new(Protected::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _subscription = publisher.subscribe(move |value: &u64| {
            sink.write().push(*value);
        });

        for value in 0..10 {
            publisher.publish(value);
        }
        publisher.shutdown().await;

        assert_eq!(*seen.read(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_async_overflow_drops_instead_of_blocking() {
        let publisher = AsyncPublisher::new(1);

        // No subscribers and a tiny queue: some publishes will overflow.
        // The call must never block the publishing task.
        let done = tokio::time::timeout(Duration::from_secs(1), async {
            for value in 0..100_u64 {
                publisher.publish(value);
            }
        })
        .await;
        assert!(done.is_ok());
        publisher.shutdown().await;
    }
}
