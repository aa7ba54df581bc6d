//! Evalstack Core: the operand stack of a deterministic contract VM
//!
//! Every opcode of the VM reads and writes one `EvaluationStack`. The stack
//! reports each placement and removal to a shared `ReferenceCounter`, and
//! logs every call into an operation journal for debugger and replay tooling.
//!
//! Key design principles:
//! - StackItem: shared handle to an immutable `Value`, compared by identity
//! - EvaluationStack: reverse-indexed (0 = top), atomic typed removals
//! - ReferenceCounter: explicitly passed collaborator, one per VM execution
//!
//! # Modules
//!
//! - `config`: Environment-driven stack configuration
//! - `error`: `StackError` faults returned by stack operations
//! - `evaluation_stack`: The stack itself
//! - `journal`: Operation journal (`OpKind`, `OpRecord`)
//! - `reference_counter`: Reference accounting contract and default counter
//! - `value`: Item model and typed views

pub mod config;
pub mod error;
pub mod evaluation_stack;
pub mod journal;
pub mod reference_counter;
pub mod value;

pub use config::{DEFAULT_MAX_STACK_REFERENCES, StackConfig};
pub use error::{StackError, StackResult};
pub use evaluation_stack::EvaluationStack;
pub use journal::{Journal, OpKind, OpRecord};
pub use reference_counter::{
    NoopReferenceCounter, ReferenceCounter, ReferenceStats, StackReferenceCounter,
};
pub use value::{FromStackItem, ItemType, StackItem, Value};
