//! Operation Journal
//!
//! Append-only log of every journaled call into an `EvaluationStack`, kept
//! for external debugger and replay tooling. The stack never reads it back:
//! clearing it, disabling it, or never looking at it has no effect on stack
//! behavior.
//!
//! Records are appended before the call validates its arguments, so failed
//! calls show up too.

use serde::Serialize;
use std::fmt;

/// Kind of a journaled stack operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpKind {
    /// Sentinel returned by `Journal::last_kind` on an empty journal
    None,
    Clear,
    Insert,
    Peek,
    Pop,
    Push,
    Remove,
    Reverse,
    /// Reserved: no current operation emits it, callers may still match on it
    Set,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::None => "NONE",
            OpKind::Clear => "CLEAR",
            OpKind::Insert => "INSERT",
            OpKind::Peek => "PEEK",
            OpKind::Pop => "POP",
            OpKind::Push => "PUSH",
            OpKind::Remove => "REMOVE",
            OpKind::Reverse => "REVERSE",
            OpKind::Set => "SET",
        };
        f.write_str(name)
    }
}

/// One journal entry: the operation and its index argument, if it takes one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpRecord {
    pub kind: OpKind,
    pub index: Option<isize>,
}

impl OpRecord {
    pub fn new(kind: OpKind, index: Option<isize>) -> Self {
        OpRecord { kind, index }
    }
}

impl fmt::Display for OpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{} {}", self.kind, index),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Append-only operation log
#[derive(Debug, Clone)]
pub struct Journal {
    records: Vec<OpRecord>,
    enabled: bool,
}

impl Default for Journal {
    fn default() -> Self {
        Journal::new(true)
    }
}

impl Journal {
    /// Create a journal; a disabled journal ignores every `record` call
    pub fn new(enabled: bool) -> Self {
        Journal {
            records: Vec::new(),
            enabled,
        }
    }

    #[inline]
    pub fn record(&mut self, kind: OpKind, index: Option<isize>) {
        if self.enabled {
            self.records.push(OpRecord::new(kind, index));
        }
    }

    /// Records in call order
    pub fn records(&self) -> &[OpRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Kind of the most recent record, or `OpKind::None` when empty
    pub fn last_kind(&self) -> OpKind {
        self.records.last().map_or(OpKind::None, |r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// JSON array of records for debugger consumption
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_order_and_last_kind() {
        let mut journal = Journal::default();
        assert_eq!(journal.last_kind(), OpKind::None);

        journal.record(OpKind::Push, None);
        journal.record(OpKind::Peek, Some(-1));
        journal.record(OpKind::Pop, None);

        assert_eq!(journal.len(), 3);
        let kinds: Vec<OpKind> = journal.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![OpKind::Push, OpKind::Peek, OpKind::Pop]);
        assert_eq!(journal.records()[1].index, Some(-1));
        assert_eq!(journal.last_kind(), OpKind::Pop);

        journal.clear();
        assert!(journal.is_empty());
        assert_eq!(journal.last_kind(), OpKind::None);
    }

    #[test]
    fn test_disabled_journal_ignores_records() {
        let mut journal = Journal::new(false);
        journal.record(OpKind::Push, None);
        journal.record(OpKind::Clear, None);
        assert!(!journal.is_enabled());
        assert!(journal.is_empty());
        assert_eq!(journal.last_kind(), OpKind::None);
    }

    #[test]
    fn test_record_display() {
        assert_eq!(OpRecord::new(OpKind::Insert, Some(2)).to_string(), "INSERT 2");
        assert_eq!(OpRecord::new(OpKind::Clear, None).to_string(), "CLEAR");
        assert_eq!(OpKind::Set.to_string(), "SET");
    }

    #[test]
    fn test_to_json() {
        let mut journal = Journal::default();
        journal.record(OpKind::Reverse, Some(3));
        journal.record(OpKind::Push, None);
        assert_eq!(
            journal.to_json().expect("json"),
            r#"[{"kind":"Reverse","index":3},{"kind":"Push","index":null}]"#
        );
    }
}
