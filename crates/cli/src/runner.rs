//! Script execution against a live evaluation stack
//!
//! One `Runner` owns a main stack, a secondary `target` stack for `copy`, and
//! the reference counter they share. Lines run in order; the first fault stops
//! the run the way a VM enters its fault state, and the report still captures
//! the state at that point.

use crate::script::{Command, Line, Literal, TypeFilter};
use evalstack_core::value as view;
use evalstack_core::{
    EvaluationStack, OpRecord, ReferenceStats, StackConfig, StackError, StackItem,
    StackReferenceCounter, StackResult,
};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Value produced by a reading line (`peek`, `pop`, ...)
#[derive(Debug, Serialize)]
pub struct Observation {
    pub line: usize,
    pub command: String,
    pub result: String,
}

/// The line that stopped the run
#[derive(Debug, Serialize)]
pub struct Fault {
    pub line: usize,
    pub command: String,
    pub error: String,
}

/// Final state of a run
#[derive(Debug, Serialize)]
pub struct Report {
    /// Lines that completed without a fault
    pub executed: usize,
    /// Main stack, top first
    pub stack: Vec<StackItem>,
    /// Secondary stack, top first
    pub target: Vec<StackItem>,
    pub references: ReferenceStats,
    pub journal_enabled: bool,
    pub journal: Vec<OpRecord>,
    pub observations: Vec<Observation>,
    pub fault: Option<Fault>,
}

pub struct Runner {
    counter: Rc<StackReferenceCounter>,
    stack: EvaluationStack,
    target: EvaluationStack,
    observations: Vec<Observation>,
}

// Expands `$body` once per filter with `$view` aliased to the matching view type
macro_rules! with_view {
    ($filter:expr, $view:ident => $body:expr) => {
        match $filter {
            TypeFilter::Any => {
                type $view = StackItem;
                $body
            }
            TypeFilter::Null => {
                type $view = view::Null;
                $body
            }
            TypeFilter::Boolean => {
                type $view = view::Boolean;
                $body
            }
            TypeFilter::Integer => {
                type $view = view::Integer;
                $body
            }
            TypeFilter::ByteString => {
                type $view = view::ByteString;
                $body
            }
            TypeFilter::Buffer => {
                type $view = view::Buffer;
                $body
            }
            TypeFilter::Array => {
                type $view = view::Array;
                $body
            }
            TypeFilter::Struct => {
                type $view = view::Struct;
                $body
            }
            TypeFilter::Map => {
                type $view = view::Map;
                $body
            }
            TypeFilter::Pointer => {
                type $view = view::Pointer;
                $body
            }
            TypeFilter::Primitive => {
                type $view = view::PrimitiveType;
                $body
            }
            TypeFilter::Compound => {
                type $view = view::CompoundType;
                $body
            }
        }
    };
}

impl Runner {
    pub fn new(config: &StackConfig) -> Self {
        let counter = Rc::new(StackReferenceCounter::from_config(config));
        Runner {
            stack: EvaluationStack::with_config(counter.clone(), config),
            target: EvaluationStack::with_config(counter.clone(), config),
            counter,
            observations: Vec::new(),
        }
    }

    /// Execute `lines` until the end or the first fault
    pub fn run(mut self, lines: &[Line]) -> Report {
        let mut executed = 0;
        let mut fault = None;

        for line in lines {
            tracing::debug!(line = line.number, command = %line.command, "execute");
            let result = self
                .execute(line)
                .and_then(|()| self.counter.check_limit());
            match result {
                Ok(()) => executed += 1,
                Err(error) => {
                    tracing::debug!(line = line.number, error = %error, "script faulted");
                    fault = Some(Fault {
                        line: line.number,
                        command: line.command.to_string(),
                        error: error.to_string(),
                    });
                    break;
                }
            }
        }

        Report {
            executed,
            stack: self.stack.iter().rev().cloned().collect(),
            target: self.target.iter().rev().cloned().collect(),
            references: self.counter.stats(),
            journal_enabled: self.stack.journal().is_enabled(),
            journal: self.stack.journal().records().to_vec(),
            observations: self.observations,
            fault,
        }
    }

    fn execute(&mut self, line: &Line) -> StackResult<()> {
        match &line.command {
            Command::Push(literal) => self.stack.push(literal_item(literal)),
            Command::PushArray(n) => {
                let items = self.pop_items(*n)?;
                self.stack.push(StackItem::array(items));
            }
            Command::PushStruct(n) => {
                let fields = self.pop_items(*n)?;
                self.stack.push(StackItem::structure(fields));
            }
            Command::Pop(filter) => {
                let item = with_view!(*filter, V => self.stack.pop_as::<V>().map(StackItem::from))?;
                self.observe(line, item.to_string());
            }
            Command::TryPop(filter) => {
                let item = with_view!(*filter, V => self.stack.try_pop_as::<V>().map(StackItem::from));
                let result = item.map_or_else(|| "none".to_string(), |item| item.to_string());
                self.observe(line, result);
            }
            Command::Peek(index) => {
                let item = self.stack.peek(*index)?.to_string();
                self.observe(line, item);
            }
            Command::PeekQuiet(index) => {
                let item = self.stack.peek_without_log(*index)?.to_string();
                self.observe(line, item);
            }
            Command::Insert(index, literal) => self.stack.insert(*index, literal_item(literal))?,
            Command::Remove(index, filter) => {
                let item =
                    with_view!(*filter, V => self.stack.remove::<V>(*index).map(StackItem::from))?;
                self.observe(line, item.to_string());
            }
            Command::Reverse(n) => self.stack.reverse(*n)?,
            Command::Clear => self.stack.clear(),
            Command::Copy(count) => self.stack.copy_to(&mut self.target, *count),
        }
        Ok(())
    }

    /// Pop the top `n` items, returned bottom-to-top
    ///
    /// Faults before popping anything when fewer than `n` items are present.
    fn pop_items(&mut self, n: usize) -> Result<Vec<StackItem>, StackError> {
        let depth = self.stack.len();
        if n > depth {
            return Err(StackError::StackUnderflow {
                index: isize::try_from(n).map_or(isize::MAX, |n| n - 1),
                depth,
            });
        }
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.stack.pop()?);
        }
        items.reverse();
        Ok(items)
    }

    fn observe(&mut self, line: &Line, result: String) {
        self.observations.push(Observation {
            line: line.number,
            command: line.command.to_string(),
            result,
        });
    }
}

fn literal_item(literal: &Literal) -> StackItem {
    match literal {
        Literal::Null => StackItem::null(),
        Literal::Bool(b) => StackItem::boolean(*b),
        Literal::Int(n) => StackItem::integer(*n),
        Literal::Bytes(bytes) => StackItem::byte_string(bytes.clone()),
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[StackItem]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str("]")
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for obs in &self.observations {
            writeln!(f, "line {}: {} -> {}", obs.line, obs.command, obs.result)?;
        }

        f.write_str("stack (top first): ")?;
        write_items(f, &self.stack)?;
        writeln!(f)?;
        if !self.target.is_empty() {
            f.write_str("target (top first): ")?;
            write_items(f, &self.target)?;
            writeln!(f)?;
        }

        let refs = &self.references;
        writeln!(
            f,
            "references: {} live, peak {}, {} adds, {} removes",
            refs.references, refs.peak, refs.adds, refs.removes
        )?;

        if self.journal_enabled {
            writeln!(f, "journal ({} records):", self.journal.len())?;
            for record in &self.journal {
                writeln!(f, "  {}", record)?;
            }
        } else {
            writeln!(f, "journal: disabled")?;
        }

        if let Some(fault) = &self.fault {
            writeln!(
                f,
                "fault at line {} ({}): {}",
                fault.line, fault.command, fault.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;
    use evalstack_core::OpKind;

    fn run(source: &str) -> Report {
        let lines = parse_script(source).expect("script should parse");
        Runner::new(&StackConfig::default()).run(&lines)
    }

    #[test]
    fn test_run_basic_script() {
        let report = run("push int 1\npush int 2\npush int 3\nreverse 3\npeek 0\npop int");

        assert!(report.fault.is_none());
        assert_eq!(report.executed, 6);
        assert_eq!(report.stack.len(), 2);
        assert_eq!(report.stack[0].to_string(), "Integer(2)");
        assert_eq!(report.stack[1].to_string(), "Integer(3)");

        let results: Vec<&str> = report.observations.iter().map(|o| o.result.as_str()).collect();
        assert_eq!(results, vec!["Integer(1)", "Integer(1)"]);
        assert_eq!(report.references.references, 2);
    }

    #[test]
    fn test_fault_stops_run() {
        let report = run("push bool true\npop int\npush int 5");

        let fault = report.fault.as_ref().expect("fault");
        assert_eq!(fault.line, 2);
        assert_eq!(fault.error, "type mismatch: expected Integer, found Boolean");
        assert_eq!(report.executed, 1);
        assert_eq!(report.stack.len(), 1);
        assert_eq!(report.journal.last().map(|r| r.kind), Some(OpKind::Pop));
    }

    #[test]
    fn test_push_array_wraps_in_order() {
        let report = run("push int 1\npush int 2\npush array 2\npop array");

        assert!(report.fault.is_none());
        assert_eq!(report.observations[0].result, "Array[2]");
        assert!(report.stack.is_empty());
        assert_eq!(report.references.references, 0);
    }

    #[test]
    fn test_copy_fills_target_without_references() {
        let report = run("push int 1\npush int 2\ncopy 1");

        assert_eq!(report.target.len(), 1);
        assert_eq!(report.target[0].to_string(), "Integer(2)");
        assert_eq!(report.references.adds, 2);
    }

    #[test]
    fn test_peekq_not_journaled() {
        let report = run("push null\npeekq 0\npeek -1");
        let kinds: Vec<OpKind> = report.journal.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![OpKind::Push, OpKind::Peek]);
        assert_eq!(report.observations.len(), 2);
    }

    #[test]
    fn test_trypop_reports_none() {
        let report = run("push int 4\ntrypop map\ntrypop");
        let results: Vec<&str> = report.observations.iter().map(|o| o.result.as_str()).collect();
        assert_eq!(results, vec!["none", "Integer(4)"]);
        assert!(report.fault.is_none());
    }

    #[test]
    fn test_reference_limit_faults() {
        let lines = parse_script("push int 1\npush int 2\npush int 3").expect("parse");
        let config = StackConfig {
            max_stack_references: 2,
            ..StackConfig::default()
        };
        let report = Runner::new(&config).run(&lines);

        let fault = report.fault.as_ref().expect("fault");
        assert_eq!(fault.line, 3);
        assert_eq!(fault.error, "stack references 3 exceed limit 2");
    }

    #[test]
    fn test_report_display() {
        let lines = parse_script("push int 7\npeek 0").expect("parse");
        let config = StackConfig::default().without_journal();
        let text = Runner::new(&config).run(&lines).to_string();

        assert!(text.contains("line 2: peek 0 -> Integer(7)"));
        assert!(text.contains("stack (top first): [Integer(7)]"));
        assert!(text.contains("references: 1 live, peak 1, 1 adds, 0 removes"));
        assert!(text.contains("journal: disabled"));
    }

    #[test]
    fn test_report_json() {
        let report = run("push int 1\npop");
        let json: serde_json::Value =
            serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["executed"], 2);
        assert_eq!(json["journal"][0]["kind"], "Push");
        assert!(json["fault"].is_null());
    }

    #[test]
    fn test_push_array_underflow_is_atomic() {
        let report = run("push int 1\npush array 2");

        let fault = report.fault.as_ref().expect("fault");
        assert_eq!(fault.line, 2);
        assert_eq!(fault.error, "stack underflow: index 1 with depth 1");
        assert_eq!(report.stack.len(), 1);
        assert_eq!(report.references.removes, 0);
        assert_eq!(report.references.references, 1);
    }

    #[test]
    fn test_push_array_huge_count_faults() {
        let report = run("push int 1\npush struct 18446744073709551615");

        let fault = report.fault.as_ref().expect("fault");
        assert_eq!(fault.line, 2);
        assert_eq!(
            fault.error,
            format!("stack underflow: index {} with depth 1", isize::MAX)
        );
        assert_eq!(report.stack.len(), 1);
    }
}
