//! Stack script parser
//!
//! A script is one stack operation per line. Blank lines and `#` comments
//! are skipped.
//!
//! ```text
//! push int 7          push bool true      push bytes 01ab
//! push null           push array 2        push struct 2
//! pop                 pop int             trypop compound
//! peek 0              peekq -1            insert 1 int 9
//! remove 2 bytes      reverse 3           clear
//! copy                copy 2
//! ```
//!
//! Type filters: `any`, `null`, `bool`, `int`, `bytes`, `buffer`, `array`,
//! `struct`, `map`, `pointer`, `primitive`, `compound`.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Item a script can create directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Bytes(Vec<u8>),
}

/// Typed view requested by `pop`, `trypop` and `remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    Null,
    Boolean,
    Integer,
    ByteString,
    Buffer,
    Array,
    Struct,
    Map,
    Pointer,
    Primitive,
    Compound,
}

const FILTER_KEYWORDS: [(&str, TypeFilter); 12] = [
    ("any", TypeFilter::Any),
    ("null", TypeFilter::Null),
    ("bool", TypeFilter::Boolean),
    ("int", TypeFilter::Integer),
    ("bytes", TypeFilter::ByteString),
    ("buffer", TypeFilter::Buffer),
    ("array", TypeFilter::Array),
    ("struct", TypeFilter::Struct),
    ("map", TypeFilter::Map),
    ("pointer", TypeFilter::Pointer),
    ("primitive", TypeFilter::Primitive),
    ("compound", TypeFilter::Compound),
];

impl TypeFilter {
    fn parse(word: &str) -> Option<Self> {
        FILTER_KEYWORDS
            .iter()
            .find(|(keyword, _)| *keyword == word)
            .map(|(_, filter)| *filter)
    }

    /// Script keyword for this filter
    pub fn keyword(self) -> &'static str {
        FILTER_KEYWORDS
            .iter()
            .find(|(_, filter)| *filter == self)
            .map_or("any", |(keyword, _)| *keyword)
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Push(Literal),
    /// Pop the top N items and push them back wrapped in an array
    PushArray(usize),
    /// Pop the top N items and push them back wrapped in a struct
    PushStruct(usize),
    Pop(TypeFilter),
    TryPop(TypeFilter),
    Peek(isize),
    /// Peek without a journal record
    PeekQuiet(isize),
    Insert(isize, Literal),
    Remove(isize, TypeFilter),
    Reverse(isize),
    Clear,
    /// Copy onto the secondary stack
    Copy(Option<usize>),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Push(lit) => write!(f, "push {}", lit),
            Command::PushArray(n) => write!(f, "push array {}", n),
            Command::PushStruct(n) => write!(f, "push struct {}", n),
            Command::Pop(TypeFilter::Any) => f.write_str("pop"),
            Command::Pop(filter) => write!(f, "pop {}", filter),
            Command::TryPop(filter) => write!(f, "trypop {}", filter),
            Command::Peek(i) => write!(f, "peek {}", i),
            Command::PeekQuiet(i) => write!(f, "peekq {}", i),
            Command::Insert(i, lit) => write!(f, "insert {} {}", i, lit),
            Command::Remove(i, filter) => write!(f, "remove {} {}", i, filter),
            Command::Reverse(n) => write!(f, "reverse {}", n),
            Command::Clear => f.write_str("clear"),
            Command::Copy(None) => f.write_str("copy"),
            Command::Copy(Some(n)) => write!(f, "copy {}", n),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "bool {}", b),
            Literal::Int(n) => write!(f, "int {}", n),
            Literal::Bytes(bytes) => write!(f, "bytes {}", hex::encode(bytes)),
        }
    }
}

/// A parsed command with its 1-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub command: Command,
}

/// Parse script text
pub fn parse_script(source: &str) -> Result<Vec<Line>, ScriptError> {
    let mut lines = Vec::new();
    for (i, raw) in source.lines().enumerate() {
        let number = i + 1;
        let text = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let command = parse_command(&words).map_err(|message| ScriptError::Parse {
            line: number,
            message,
        })?;
        lines.push(Line { number, command });
    }
    Ok(lines)
}

/// Read and parse a script file
pub fn load_script(path: &Path) -> Result<Vec<Line>, ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&source)
}

fn parse_command(words: &[&str]) -> Result<Command, String> {
    let (op, args) = match words.split_first() {
        Some((op, args)) => (*op, args),
        None => return Err("empty command".to_string()),
    };

    match (op, args) {
        ("push", ["array", n]) => Ok(Command::PushArray(parse_count(n)?)),
        ("push", ["struct", n]) => Ok(Command::PushStruct(parse_count(n)?)),
        ("push", literal) => Ok(Command::Push(parse_literal(literal)?)),
        ("pop", []) => Ok(Command::Pop(TypeFilter::Any)),
        ("pop", [ty]) => Ok(Command::Pop(parse_filter(ty)?)),
        ("trypop", []) => Ok(Command::TryPop(TypeFilter::Any)),
        ("trypop", [ty]) => Ok(Command::TryPop(parse_filter(ty)?)),
        ("peek", [i]) => Ok(Command::Peek(parse_index(i)?)),
        ("peekq", [i]) => Ok(Command::PeekQuiet(parse_index(i)?)),
        ("insert", [i, literal @ ..]) => {
            Ok(Command::Insert(parse_index(i)?, parse_literal(literal)?))
        }
        ("remove", [i]) => Ok(Command::Remove(parse_index(i)?, TypeFilter::Any)),
        ("remove", [i, ty]) => Ok(Command::Remove(parse_index(i)?, parse_filter(ty)?)),
        ("reverse", [n]) => Ok(Command::Reverse(parse_index(n)?)),
        ("clear", []) => Ok(Command::Clear),
        ("copy", []) => Ok(Command::Copy(None)),
        ("copy", [n]) => Ok(Command::Copy(Some(parse_count(n)?))),
        (
            "pop" | "trypop" | "peek" | "peekq" | "insert" | "remove" | "reverse" | "clear"
            | "copy",
            _,
        ) => Err(format!("wrong arguments for '{}'", op)),
        _ => Err(format!("unknown operation '{}'", op)),
    }
}

fn parse_literal(words: &[&str]) -> Result<Literal, String> {
    match words {
        ["null"] => Ok(Literal::Null),
        ["bool", b] => match *b {
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            other => Err(format!("invalid boolean '{}'", other)),
        },
        ["int", n] => n
            .parse()
            .map(Literal::Int)
            .map_err(|_| format!("invalid integer '{}'", n)),
        ["bytes", h] => {
            let digits = h.strip_prefix("0x").unwrap_or(*h);
            hex::decode(digits)
                .map(Literal::Bytes)
                .map_err(|e| format!("invalid hex '{}': {}", h, e))
        }
        _ => Err(format!("expected a literal, found '{}'", words.join(" "))),
    }
}

fn parse_filter(word: &str) -> Result<TypeFilter, String> {
    TypeFilter::parse(word).ok_or_else(|| format!("unknown type '{}'", word))
}

fn parse_index(word: &str) -> Result<isize, String> {
    word.parse().map_err(|_| format!("invalid index '{}'", word))
}

fn parse_count(word: &str) -> Result<usize, String> {
    word.parse().map_err(|_| format!("invalid count '{}'", word))
}
