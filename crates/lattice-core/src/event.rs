// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event observation and delivery.
//!
//! Receivers register under a `(path, name)` key; a posted event reaches
//! every receiver whose stored path matches the event's path and whose name
//! is equal. Delivery failures are contained per receiver: a payload of the
//! wrong shape or a panicking callback is logged and skipped, never fatal
//! to the remaining receivers or to the poster.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use lattice_cluster::Path;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::sync::Protected;

/// Addressing header of an event: where it happened and what it is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EventHeader {
    pub path: Path,
    pub name: String,
}

/// An event flowing through the service: an addressing header plus an
/// opaque JSON payload.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub header: EventHeader,
    pub payload: Value,
}

impl Event {
    pub fn new(path: Path, name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            header: EventHeader {
                path,
                name: name.into(),
            },
            payload: payload.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.header.path
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }
}

struct StoredReceiver {
    id: Uuid,
    receiver: Arc<dyn Fn(&Value) + Send + Sync>,
}

type ReceiverMap = HashMap<(Path, String), Vec<StoredReceiver>>;

/// Registry of event receivers and the synchronous dispatch over them.
#[derive(Default)]
pub struct EventService {
    receivers: Arc<Protected<ReceiverMap>>,
}

impl EventService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed receiver for events named `name` at `path`.
    ///
    /// The payload is converted to `T` per delivery; an event whose payload
    /// does not convert is skipped for this receiver only. `path` may be a
    /// wildcard to observe a whole subtree.
    pub fn observe<T, F>(&self, path: Path, name: impl Into<String>, receiver: F) -> Observation
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let observed_name = name.clone();
        self.observe_raw(path, name, move |payload: &Value| {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(typed) => receiver(typed),
                Err(error) => {
                    warn!(
                        name = %observed_name,
                        %error,
                        "event payload does not convert to receiver type, skipping"
                    );
                }
            }
        })
    }

    /// Registers an untyped receiver that sees the raw payload.
    pub fn observe_raw(
        &self,
        path: Path,
        name: impl Into<String>,
        receiver: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Observation {
        let key = (path, name.into());
        let id = Uuid::new_v4();

        self.receivers
            .write()
            .entry(key.clone())
            .or_default()
            .push(StoredReceiver {
                id,
                receiver: Arc::new(receiver),
            });

        let receivers = Arc::downgrade(&self.receivers);
        Observation {
            release: Some(Box::new(move || {
                release_receiver(&receivers, &key, id);
            })),
        }
    }

    /// Delivers `event` to every matching receiver before returning.
    ///
    /// Receivers registered under one key are invoked in registration
    /// order; no order is defined across keys.
    #[instrument(skip(self, event), fields(path = %event.header.path, name = %event.header.name))]
    pub fn post(&self, event: &Event) {
        let snapshot: Vec<Arc<dyn Fn(&Value) + Send + Sync>> = {
            let receivers = self.receivers.read();
            receivers
                .iter()
                .filter(|((path, name), _)| {
                    *name == event.header.name && path.matches(&event.header.path)
                })
                .flat_map(|(_, stored)| stored.iter().map(|s| Arc::clone(&s.receiver)))
                .collect()
        };

        for receiver in snapshot {
            if catch_unwind(AssertUnwindSafe(|| receiver(&event.payload))).is_err() {
                warn!("event receiver panicked, continuing delivery");
            }
        }
    }

    /// Number of registrations currently held for `(path, name)`.
    pub fn receiver_count(&self, path: &Path, name: &str) -> usize {
        self.receivers
            .read()
            .get(&(path.clone(), name.to_string()))
            .map_or(0, Vec::len)
    }
}

fn release_receiver(receivers: &Weak<Protected<ReceiverMap>>, key: &(Path, String), id: Uuid) {
    let Some(receivers) = Weak::upgrade(receivers) else {
        return;
    };
    let mut receivers = receivers.write();
    if let Some(stored) = receivers.get_mut(key) {
        stored.retain(|s| s.id != id);
        if stored.is_empty() {
            receivers.remove(key);
        }
    }
}

/// Handle to one receiver registration.
///
/// Releasing deregisters exactly this registration, identified by its
/// internal id, leaving other registrations of the same callback alone.
/// Dropping the handle without releasing keeps the receiver registered.
pub struct Observation {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Observation {
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn path(s: &str) -> Path {
        Path::from_path_string(s).unwrap()
    }

    #[test]
    fn test_typed_delivery_and_release() {
        let service = EventService::new();
        let seen = Arc::new(Protected::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let observation = service.observe(path("game/1"), "scoreChanged", move |score: i64| {
            sink.write().push(score);
        });

        service.post(&Event::new(path("game/1"), "scoreChanged", 42));
        assert_eq!(*seen.read(), vec![42]);

        observation.release();
        service.post(&Event::new(path("game/1"), "scoreChanged", 43));
        assert_eq!(*seen.read(), vec![42]);
        assert_eq!(service.receiver_count(&path("game/1"), "scoreChanged"), 0);
    }

    #[test]
    fn test_event_serializes_with_nested_header() {
        let event = Event::new(path("app://game/1"), "scoreChanged", 7);
        assert_eq!(event.path(), &path("app://game/1"));
        assert_eq!(event.name(), "scoreChanged");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["header"]["path"], "app://game/1");
        assert_eq!(json["header"]["name"], "scoreChanged");
        assert_eq!(json["payload"], 7);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_name_and_path_both_select() {
        let service = EventService::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let _observation = service.observe(path("game/1"), "scoreChanged", move |_: i64| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.post(&Event::new(path("game/2"), "scoreChanged", 1));
        service.post(&Event::new(path("game/1"), "playerJoined", 1));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        service.post(&Event::new(path("game/1"), "scoreChanged", 1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wildcard_observation_matches_subtree() {
        let service = EventService::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let _observation = service.observe(path("game/*"), "scoreChanged", move |_: i64| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.post(&Event::new(path("game/1"), "scoreChanged", 1));
        service.post(&Event::new(path("game/2"), "scoreChanged", 1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_conversion_failure_skips_only_that_receiver() {
        let service = EventService::new();
        let typed = Arc::new(AtomicUsize::new(0));
        let raw = Arc::new(AtomicUsize::new(0));

        let typed_counter = Arc::clone(&typed);
        let _strict = service.observe(path("game/1"), "scoreChanged", move |_: i64| {
            typed_counter.fetch_add(1, Ordering::SeqCst);
        });
        let raw_counter = Arc::clone(&raw);
        let _lenient = service.observe_raw(path("game/1"), "scoreChanged", move |_| {
            raw_counter.fetch_add(1, Ordering::SeqCst);
        });

        service.post(&Event::new(path("game/1"), "scoreChanged", "not a number"));
        assert_eq!(typed.load(Ordering::SeqCst), 0);
        assert_eq!(raw.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_receiver_does_not_abort_delivery() {
        let service = EventService::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = service.observe_raw(path("game/1"), "scoreChanged", |_| {
            panic!("receiver bug");
        });
        let counter = Arc::clone(&count);
        let _good = service.observe_raw(path("game/1"), "scoreChanged", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.post(&Event::new(path("game/1"), "scoreChanged", json!(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_is_per_registration() {
        let service = EventService::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter_a = Arc::clone(&count);
        let first = service.observe_raw(path("game/1"), "scoreChanged", move |_| {
            counter_a.fetch_add(1, Ordering::SeqCst);
        });
        let counter_b = Arc::clone(&count);
        let _second = service.observe_raw(path("game/1"), "scoreChanged", move |_| {
            counter_b.fetch_add(1, Ordering::SeqCst);
        });

        first.release();
        service.post(&Event::new(path("game/1"), "scoreChanged", json!(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(service.receiver_count(&path("game/1"), "scoreChanged"), 1);
    }
}
