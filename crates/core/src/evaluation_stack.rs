//! Evaluation Stack Implementation
//!
//! The operand stack every opcode manipulates. Items are addressed by reverse
//! index: 0 is the top, `len - 1` the bottom. Negative indices count from the
//! bottom (`index += len`) for reads and removals.
//!
//! ## Layout
//!
//! ```text
//! slots (Vec, grows to the right)
//! ┌────────┬────────┬────────┬────────┐
//! │   a    │   b    │   c    │   d    │
//! └────────┴────────┴────────┴────────┘
//!  index 3  index 2  index 1  index 0 = top
//!  index -4 index -3 index -2 index -1
//! ```
//!
//! ## Reference accounting
//!
//! Each slot remembers whether this stack announced it to the reference
//! counter. Push and insert create owned slots (one `add_stack_reference`
//! each); removing an owned slot sends exactly one `remove_stack_reference`.
//!
//! `copy_to` creates shared placements on the target: the items become visible
//! on both stacks but the target never notifies the counter for them, neither
//! on copy nor when it later drops them. The source stack stays the
//! accounting owner and releases them through its own pop/remove/clear.
//!
//! Dropping a stack sends no notifications; the VM clears a stack before
//! discarding its execution context.
//!
//! ## Journal
//!
//! Journaled calls append one record before validating their arguments, so
//! failed calls appear in the journal too. The non-failing pops journal
//! `Remove 0`. `peek_without_log`, `copy_to` and the read-only accessors
//! never journal.

use crate::config::StackConfig;
use crate::error::{StackError, StackResult};
use crate::journal::{Journal, OpKind};
use crate::reference_counter::ReferenceCounter;
use crate::value::{FromStackItem, StackItem};
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
struct Slot {
    item: StackItem,
    // false for placements created by `copy_to` on the receiving stack
    owned: bool,
}

/// Reverse-indexed, reference-counted, journaled operand stack
pub struct EvaluationStack {
    slots: Vec<Slot>,
    reference_counter: Rc<dyn ReferenceCounter>,
    journal: Journal,
}

impl EvaluationStack {
    /// Create an empty stack reporting to `reference_counter`, journal enabled
    pub fn new(reference_counter: Rc<dyn ReferenceCounter>) -> Self {
        Self::with_config(reference_counter, &StackConfig::default())
    }

    pub fn with_config(reference_counter: Rc<dyn ReferenceCounter>, config: &StackConfig) -> Self {
        EvaluationStack {
            slots: Vec::new(),
            reference_counter,
            journal: Journal::new(config.journal),
        }
    }

    /// Number of items on the stack
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of items placed here by `copy_to` and not announced to the counter
    pub fn shared_len(&self) -> usize {
        self.slots.iter().filter(|s| !s.owned).count()
    }

    pub fn reference_counter(&self) -> &Rc<dyn ReferenceCounter> {
        &self.reference_counter
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Push `item` as the new top
    pub fn push(&mut self, item: StackItem) {
        self.journal.record(OpKind::Push, None);
        self.reference_counter.add_stack_reference(&item);
        tracing::trace!(item = %item, depth = self.slots.len() + 1, "push");
        self.slots.push(Slot { item, owned: true });
    }

    /// Insert `item` so that it ends up at reverse index `index`
    ///
    /// Accepts `0..=len`; `len` places the item at the bottom.
    pub fn insert(&mut self, index: isize, item: StackItem) -> StackResult<()> {
        self.journal.record(OpKind::Insert, Some(index));
        let depth = self.slots.len();
        if index < 0 || index as usize > depth {
            return self.fault(OpKind::Insert, Err(StackError::IndexOutOfRange { index, depth }));
        }
        let position = depth - index as usize;
        self.slots.insert(
            position,
            Slot {
                item: item.clone(),
                owned: true,
            },
        );
        self.reference_counter.add_stack_reference(&item);
        tracing::trace!(item = %item, index, depth = depth + 1, "insert");
        Ok(())
    }

    /// Remove and return the top item
    pub fn pop(&mut self) -> StackResult<StackItem> {
        self.journal.record(OpKind::Pop, None);
        let result = self.take(0);
        self.fault(OpKind::Pop, result)
    }

    /// Remove and return the top item viewed as `T`
    ///
    /// On `TypeMismatch` the stack and the reference counter are untouched.
    pub fn pop_as<T: FromStackItem>(&mut self) -> StackResult<T> {
        self.journal.record(OpKind::Pop, None);
        let result = self.take(0);
        self.fault(OpKind::Pop, result)
    }

    /// Non-failing `pop`: `None` on an empty stack
    ///
    /// Journals as `remove(0)`, the operation it delegates to.
    pub fn try_pop(&mut self) -> Option<StackItem> {
        self.journal.record(OpKind::Remove, Some(0));
        self.take(0).ok()
    }

    /// Non-failing `pop_as`: `None` on an empty stack or a type mismatch,
    /// leaving the stack unmodified
    pub fn try_pop_as<T: FromStackItem>(&mut self) -> Option<T> {
        self.journal.record(OpKind::Remove, Some(0));
        self.take(0).ok()
    }

    /// Remove the item at reverse index `index` viewed as `T`
    ///
    /// `pop_as::<T>()` is `remove::<T>(0)` with a different journal kind.
    pub fn remove<T: FromStackItem>(&mut self, index: isize) -> StackResult<T> {
        self.journal.record(OpKind::Remove, Some(index));
        let result = self.take(index);
        self.fault(OpKind::Remove, result)
    }

    /// Non-failing `remove`
    pub fn try_remove<T: FromStackItem>(&mut self, index: isize) -> Option<T> {
        self.journal.record(OpKind::Remove, Some(index));
        self.take(index).ok()
    }

    /// Reverse the order of the top `n` items in place
    ///
    /// Accepts `0..=len`; `n <= 1` changes nothing.
    pub fn reverse(&mut self, n: isize) -> StackResult<()> {
        self.journal.record(OpKind::Reverse, Some(n));
        let result = self.reverse_top(n);
        self.fault(OpKind::Reverse, result)
    }

    /// Non-failing `reverse`: false when `n` is out of range
    pub fn try_reverse(&mut self, n: isize) -> bool {
        self.journal.record(OpKind::Reverse, Some(n));
        self.reverse_top(n).is_ok()
    }

    /// Remove every item, releasing each owned one with the reference counter
    pub fn clear(&mut self) {
        self.journal.record(OpKind::Clear, None);
        let released = self.slots.len();
        for slot in self.slots.drain(..) {
            if slot.owned {
                self.reference_counter.remove_stack_reference(&slot.item);
            }
        }
        tracing::trace!(released, "clear");
    }

    /// Copy the top `count` items (all when `None`) onto the top of `target`,
    /// preserving their order
    ///
    /// The copies are shared placements on `target`: no counter notification
    /// now, none when `target` later drops them. A count larger than this
    /// stack copies everything.
    pub fn copy_to(&self, target: &mut EvaluationStack, count: Option<usize>) {
        let depth = self.slots.len();
        let count = count.unwrap_or(depth).min(depth);
        if count == 0 {
            return;
        }
        target
            .slots
            .extend(self.slots[depth - count..].iter().map(|slot| Slot {
                item: slot.item.clone(),
                owned: false,
            }));
        tracing::trace!(count, target_depth = target.slots.len(), "copy_to");
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Item at reverse index `index`, without removing it
    pub fn peek(&mut self, index: isize) -> StackResult<&StackItem> {
        self.journal.record(OpKind::Peek, Some(index));
        match self.read_position(index) {
            Ok(position) => Ok(&self.slots[position].item),
            Err(e) => {
                tracing::debug!(op = %OpKind::Peek, error = %e, "stack operation failed");
                Err(e)
            }
        }
    }

    /// `peek(0)`
    pub fn peek_top(&mut self) -> StackResult<&StackItem> {
        self.peek(0)
    }

    /// Non-failing `peek`
    pub fn try_peek(&mut self, index: isize) -> Option<&StackItem> {
        self.journal.record(OpKind::Peek, Some(index));
        let position = self.read_position(index).ok()?;
        Some(&self.slots[position].item)
    }

    /// Same read as `peek`, without a journal record
    pub fn peek_without_log(&self, index: isize) -> StackResult<&StackItem> {
        let position = self.read_position(index)?;
        Ok(&self.slots[position].item)
    }

    /// Items from bottom to top
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.slots.iter(),
        }
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Kind of the most recent journal record, `OpKind::None` when empty
    pub fn last_record_kind(&self) -> OpKind {
        self.journal.last_kind()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Vec position of a readable reverse index
    fn read_position(&self, index: isize) -> StackResult<usize> {
        let depth = self.slots.len();
        let normalized = if index < 0 { index + depth as isize } else { index };
        if normalized < 0 || normalized as usize >= depth {
            return Err(StackError::IndexOutOfRange { index, depth });
        }
        Ok(depth - normalized as usize - 1)
    }

    /// Vec position of a removable reverse index
    fn remove_position(&self, index: isize) -> StackResult<usize> {
        let depth = self.slots.len();
        if index >= 0 && index as usize >= depth {
            return Err(StackError::StackUnderflow { index, depth });
        }
        let normalized = if index < 0 { index + depth as isize } else { index };
        if normalized < 0 {
            return Err(StackError::IndexOutOfRange { index, depth });
        }
        Ok(depth - normalized as usize - 1)
    }

    /// Checked removal: downcast first, mutate only on success
    fn take<T: FromStackItem>(&mut self, index: isize) -> StackResult<T> {
        let position = self.remove_position(index)?;
        let item = &self.slots[position].item;
        let view = T::from_item(item).ok_or(StackError::TypeMismatch {
            expected: T::EXPECTED,
            actual: item.item_type(),
        })?;

        let slot = self.slots.remove(position);
        if slot.owned {
            self.reference_counter.remove_stack_reference(&slot.item);
        }
        tracing::trace!(item = %slot.item, index, depth = self.slots.len(), "remove");
        Ok(view)
    }

    fn reverse_top(&mut self, n: isize) -> StackResult<()> {
        let depth = self.slots.len();
        if n < 0 || n as usize > depth {
            return Err(StackError::InvalidArgument { count: n, depth });
        }
        if n <= 1 {
            return Ok(());
        }
        self.slots[depth - n as usize..].reverse();
        Ok(())
    }

    fn fault<T>(&self, op: OpKind, result: StackResult<T>) -> StackResult<T> {
        if let Err(e) = &result {
            tracing::debug!(op = %op, depth = self.slots.len(), error = %e, "stack operation failed");
        }
        result
    }
}

/// Bottom-to-top iterator over stack items
pub struct Iter<'a> {
    inner: std::slice::Iter<'a, Slot>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a StackItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|slot| &slot.item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|slot| &slot.item)
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a EvaluationStack {
    type Item = &'a StackItem;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for EvaluationStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationStack")
            .field("items", &self.iter().rev().collect::<Vec<_>>())
            .field("shared", &self.shared_len())
            .field("journal", &self.journal.len())
            .finish()
    }
}

/// Items top-first: `[top, ..., bottom]`
impl fmt::Display for EvaluationStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        f.write_str("]")
    }
}
