// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Even-distribution selection helpers.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A wrapping counter for distributing picks over a bounded range.
///
/// Shared between threads without external locking; each call advances the
/// counter exactly once.
#[derive(Debug, Default)]
pub struct Rollover {
    counter: AtomicUsize,
}

impl Rollover {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next index in `0..bound`, or `None` when `bound` is zero.
    pub fn next(&self, bound: usize) -> Option<usize> {
        if bound == 0 {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % bound)
    }
}

/// Cycles over a fixed set of items, one per call.
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    rollover: Rollover,
}

impl<T> RoundRobin<T> {
    /// Creates a selector over `items`. An empty set is allowed and always
    /// yields `None`.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            rollover: Rollover::new(),
        }
    }

    /// Picks the next item in cycle order.
    pub fn next(&self) -> Option<&T> {
        self.rollover.next(self.items.len()).map(|i| &self.items[i])
    }

    /// The underlying items, in cycle order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// True when there is nothing to pick from.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cycles_in_order() {
        let picker = RoundRobin::new(vec!["a", "b", "c"]);
        let picks: Vec<_> = (0..7).map(|_| *picker.next().unwrap()).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_empty_set_yields_none() {
        let picker: RoundRobin<u64> = RoundRobin::new(Vec::new());
        assert!(picker.is_empty());
        assert!(picker.next().is_none());
    }

    #[test]
    fn test_rollover_zero_bound() {
        let rollover = Rollover::new();
        assert_eq!(rollover.next(0), None);
        assert_eq!(rollover.next(3), Some(0));
        assert_eq!(rollover.next(3), Some(1));
    }

    #[test]
    fn test_distribution_is_even_under_contention() {
        let picker = Arc::new(RoundRobin::new(vec![0_usize, 1, 2, 3]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let picker = Arc::clone(&picker);
                thread::spawn(move || {
                    let mut local = Vec::with_capacity(100);
                    for _ in 0..100 {
                        local.push(*picker.next().unwrap());
                    }
                    local
                })
            })
            .collect();

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for handle in handles {
            for pick in handle.join().unwrap() {
                *counts.entry(pick).or_default() += 1;
            }
        }

        // 400 picks over 4 items: exactly 100 each.
        for item in 0..4 {
            assert_eq!(counts[&item], 100);
        }
    }
}
