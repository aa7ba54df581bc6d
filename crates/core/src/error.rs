//! Stack Error Handling
//!
//! Every error here is a contract violation by the caller (the instruction
//! dispatcher). The stack never retries or recovers on its own; the enclosing
//! VM decides whether a fault ends the execution.
//!
//! Throwing-style entry points (`pop`, `pop_as`, `remove`, `insert`, `peek`,
//! `reverse`) return `StackResult`. Their `try_` counterparts return `Option`
//! or `bool` for call sites where absence or a wrong type is an expected branch.

use crate::value::ItemType;
use thiserror::Error;

/// Faults raised by evaluation stack operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// Pop or remove on an empty stack, or an index beyond the available depth
    #[error("stack underflow: index {index} with depth {depth}")]
    StackUnderflow { index: isize, depth: usize },

    /// Index still negative after normalization, or outside the accepted range
    #[error("index {index} out of range for stack depth {depth}")]
    IndexOutOfRange { index: isize, depth: usize },

    /// Checked downcast to the requested item type failed
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: ItemType,
    },

    /// Reverse count outside `[0, depth]`
    #[error("invalid reverse count {count} for stack depth {depth}")]
    InvalidArgument { count: isize, depth: usize },

    /// Reported by `StackReferenceCounter::check_limit`, never by the stack itself
    #[error("stack references {references} exceed limit {limit}")]
    ReferenceLimitExceeded { references: usize, limit: usize },
}

pub type StackResult<T> = Result<T, StackError>;
