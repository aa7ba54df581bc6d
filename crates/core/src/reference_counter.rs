//! Reference accounting for stack items
//!
//! Every evaluation stack of one VM execution reports structural events to a
//! shared `ReferenceCounter`: one `add_stack_reference` when an item enters a
//! slot, one `remove_stack_reference` when it leaves. The counter uses these
//! to bound the total reachable object graph.
//!
//! The counter is an explicitly passed collaborator (`Rc<dyn ReferenceCounter>`
//! handed to each stack), never process-wide state, so independent executions
//! never share accounting.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────┐   add / remove   ┌─────────────────────────┐
//! │ EvaluationStack #1 │ ───────────────▶ │                         │
//! └────────────────────┘                  │  StackReferenceCounter  │
//! ┌────────────────────┐   add / remove   │  total, per item, peak  │
//! │ EvaluationStack #2 │ ───────────────▶ │                         │
//! └────────────────────┘                  └─────────────────────────┘
//! ```
//!
//! Notifications are infallible. Limits are checked separately with
//! `StackReferenceCounter::check_limit`, at a point the VM chooses (typically
//! after each instruction).

use crate::config::StackConfig;
use crate::error::{StackError, StackResult};
use crate::value::StackItem;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Receiver of stack reference notifications
///
/// Methods take `&self` so one counter can be shared by several stacks;
/// implementations use interior mutability.
pub trait ReferenceCounter {
    /// `item` entered a stack slot
    fn add_stack_reference(&self, item: &StackItem);

    /// `item` left a stack slot
    fn remove_stack_reference(&self, item: &StackItem);
}

/// Counter that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReferenceCounter;

impl ReferenceCounter for NoopReferenceCounter {
    fn add_stack_reference(&self, _item: &StackItem) {}

    fn remove_stack_reference(&self, _item: &StackItem) {}
}

/// Snapshot of a `StackReferenceCounter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ReferenceStats {
    /// Live stack references
    pub references: usize,
    /// High-water mark of `references`
    pub peak: usize,
    /// Distinct items currently referenced
    pub tracked_items: usize,
    /// `add_stack_reference` calls received
    pub adds: u64,
    /// `remove_stack_reference` calls received (including ignored ones)
    pub removes: u64,
}

/// Counts live stack references, in total and per item identity
#[derive(Debug)]
pub struct StackReferenceCounter {
    limit: usize,
    references: Cell<usize>,
    peak: Cell<usize>,
    adds: Cell<u64>,
    removes: Cell<u64>,
    // Set once the ceiling has been reported, reset when back under it
    over_limit: Cell<bool>,
    // Keyed by identity; the held handle keeps the key's address allocated
    per_item: RefCell<HashMap<usize, (StackItem, usize)>>,
}

impl Default for StackReferenceCounter {
    fn default() -> Self {
        Self::from_config(&StackConfig::default())
    }
}

impl StackReferenceCounter {
    pub fn new(limit: usize) -> Self {
        StackReferenceCounter {
            limit,
            references: Cell::new(0),
            peak: Cell::new(0),
            adds: Cell::new(0),
            removes: Cell::new(0),
            over_limit: Cell::new(false),
            per_item: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(config.max_stack_references)
    }

    /// Live stack references across every stack using this counter
    pub fn count(&self) -> usize {
        self.references.get()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Live stack references to one particular item
    pub fn references_to(&self, item: &StackItem) -> usize {
        self.per_item
            .borrow()
            .get(&item.id())
            .map_or(0, |(_, count)| *count)
    }

    pub fn stats(&self) -> ReferenceStats {
        ReferenceStats {
            references: self.references.get(),
            peak: self.peak.get(),
            tracked_items: self.per_item.borrow().len(),
            adds: self.adds.get(),
            removes: self.removes.get(),
        }
    }

    /// Fails when live references exceed the configured ceiling
    pub fn check_limit(&self) -> StackResult<()> {
        let references = self.references.get();
        if references > self.limit {
            Err(StackError::ReferenceLimitExceeded {
                references,
                limit: self.limit,
            })
        } else {
            Ok(())
        }
    }
}

impl ReferenceCounter for StackReferenceCounter {
    fn add_stack_reference(&self, item: &StackItem) {
        self.adds.set(self.adds.get() + 1);
        self.per_item
            .borrow_mut()
            .entry(item.id())
            .or_insert_with(|| (item.clone(), 0))
            .1 += 1;

        let references = self.references.get() + 1;
        self.references.set(references);
        if references > self.peak.get() {
            self.peak.set(references);
        }

        if references > self.limit && !self.over_limit.get() {
            self.over_limit.set(true);
            tracing::warn!(
                references,
                limit = self.limit,
                "stack references exceed limit"
            );
        }
    }

    fn remove_stack_reference(&self, item: &StackItem) {
        self.removes.set(self.removes.get() + 1);

        let mut per_item = self.per_item.borrow_mut();
        let Some((_, count)) = per_item.get_mut(&item.id()) else {
            tracing::debug!(item = %item, "remove for untracked item ignored");
            return;
        };
        *count -= 1;
        if *count == 0 {
            per_item.remove(&item.id());
        }

        let references = self.references.get().saturating_sub(1);
        self.references.set(references);
        if references <= self.limit {
            self.over_limit.set(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_item() {
        let counter = StackReferenceCounter::new(16);
        let a = StackItem::integer(1);
        let b = StackItem::integer(2);

        counter.add_stack_reference(&a);
        counter.add_stack_reference(&a);
        counter.add_stack_reference(&b);
        assert_eq!(counter.count(), 3);
        assert_eq!(counter.references_to(&a), 2);
        assert_eq!(counter.references_to(&b), 1);

        counter.remove_stack_reference(&a);
        assert_eq!(counter.references_to(&a), 1);

        let stats = counter.stats();
        assert_eq!(stats.references, 2);
        assert_eq!(stats.peak, 3);
        assert_eq!(stats.tracked_items, 2);
        assert_eq!(stats.adds, 3);
        assert_eq!(stats.removes, 1);
    }

    #[test]
    fn test_untracked_remove_does_not_underflow() {
        let counter = StackReferenceCounter::new(16);
        let stranger = StackItem::null();

        counter.remove_stack_reference(&stranger);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.stats().removes, 1);
    }

    #[test]
    fn test_check_limit() {
        let counter = StackReferenceCounter::new(2);
        let items: Vec<StackItem> = (0..3).map(StackItem::integer).collect();

        counter.add_stack_reference(&items[0]);
        counter.add_stack_reference(&items[1]);
        assert!(counter.check_limit().is_ok());

        counter.add_stack_reference(&items[2]);
        assert_eq!(
            counter.check_limit(),
            Err(StackError::ReferenceLimitExceeded {
                references: 3,
                limit: 2
            })
        );

        counter.remove_stack_reference(&items[2]);
        assert!(counter.check_limit().is_ok());
    }

    #[test]
    fn test_default_uses_config_limit() {
        let counter = StackReferenceCounter::default();
        assert_eq!(counter.limit(), crate::config::DEFAULT_MAX_STACK_REFERENCES);
    }

    #[test]
    fn test_tracked_item_outlives_its_stack_handles() {
        let counter = StackReferenceCounter::new(16);
        let item = StackItem::integer(9);
        let id = item.id();

        counter.add_stack_reference(&item);
        assert_eq!(item.handle_count(), 2);

        // only the counter holds it now, so its address cannot be reused
        drop(item);
        let fresh = StackItem::integer(10);
        assert_ne!(fresh.id(), id);
        assert_eq!(counter.references_to(&fresh), 0);
        assert_eq!(counter.stats().tracked_items, 1);
    }

    #[test]
    fn test_release_drops_held_handle() {
        let counter = StackReferenceCounter::new(16);
        let item = StackItem::null();

        counter.add_stack_reference(&item);
        counter.add_stack_reference(&item);
        counter.remove_stack_reference(&item);
        assert_eq!(item.handle_count(), 2);

        counter.remove_stack_reference(&item);
        assert_eq!(item.handle_count(), 1);
        assert_eq!(counter.stats().tracked_items, 0);
    }
}
