//! Stack Item Representation
//!
//! `Value` is what a contract program talks about; `StackItem` is the shared
//! handle the evaluation stack (and compound values) hold on to.
//!
//! # Sharing and identity
//!
//! A `StackItem` may sit in several stack slots and containers at once. Cloning
//! the handle shares the same `Value`, it never deep-copies. Equality and
//! hashing are by identity, which is what the stack and the reference counter
//! reason about: two separately pushed `Integer(1)` items are different items.
//!
//! Values are never mutated after creation, so `Rc` sharing cannot form cycles.
//!
//! # Typed views
//!
//! `FromStackItem` is the checked downcast used by typed pop/remove. Each view
//! (`Integer`, `Array`, `CompoundType`, ...) wraps the original handle, so a
//! value popped as `Array` is still the same item the reference counter saw.

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Runtime variant tag of a `Value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemType {
    Null,
    Boolean,
    Integer,
    ByteString,
    Buffer,
    Array,
    Struct,
    Map,
    Pointer,
}

impl ItemType {
    /// Boolean, Integer and ByteString
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ItemType::Boolean | ItemType::Integer | ItemType::ByteString
        )
    }

    /// Array, Struct and Map
    pub fn is_compound(self) -> bool {
        matches!(self, ItemType::Array | ItemType::Struct | ItemType::Map)
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemType::Null => "Null",
            ItemType::Boolean => "Boolean",
            ItemType::Integer => "Integer",
            ItemType::ByteString => "ByteString",
            ItemType::Buffer => "Buffer",
            ItemType::Array => "Array",
            ItemType::Struct => "Struct",
            ItemType::Map => "Map",
            ItemType::Pointer => "Pointer",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value: the payload behind a stack item
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Absence of a value
    Null,

    Boolean(bool),

    Integer(i64),

    /// Immutable byte sequence
    ByteString(Box<[u8]>),

    /// Byte buffer (mutable in the full VM, read-only to this core)
    Buffer(Box<[u8]>),

    /// Ordered container of items
    Array(Vec<StackItem>),

    /// Ordered container compared by value in the full VM
    Struct(Vec<StackItem>),

    /// Key-value container, insertion-ordered for deterministic iteration
    Map(Vec<(StackItem, StackItem)>),

    /// Instruction pointer into a script
    Pointer(usize),
}

impl Value {
    pub fn item_type(&self) -> ItemType {
        match self {
            Value::Null => ItemType::Null,
            Value::Boolean(_) => ItemType::Boolean,
            Value::Integer(_) => ItemType::Integer,
            Value::ByteString(_) => ItemType::ByteString,
            Value::Buffer(_) => ItemType::Buffer,
            Value::Array(_) => ItemType::Array,
            Value::Struct(_) => ItemType::Struct,
            Value::Map(_) => ItemType::Map,
            Value::Pointer(_) => ItemType::Pointer,
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "0x{}", hex::encode(bytes))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Integer(n) => write!(f, "Integer({})", n),
            Value::ByteString(bytes) => {
                f.write_str("ByteString(")?;
                write_hex(f, bytes)?;
                f.write_str(")")
            }
            Value::Buffer(bytes) => {
                f.write_str("Buffer(")?;
                write_hex(f, bytes)?;
                f.write_str(")")
            }
            Value::Array(items) => write!(f, "Array[{}]", items.len()),
            Value::Struct(fields) => write!(f, "Struct[{}]", fields.len()),
            Value::Map(entries) => write!(f, "Map{{{}}}", entries.len()),
            Value::Pointer(pos) => write!(f, "Pointer({})", pos),
        }
    }
}

/// Shared handle to a `Value`
#[derive(Clone)]
pub struct StackItem(Rc<Value>);

impl StackItem {
    pub fn new(value: Value) -> Self {
        StackItem(Rc::new(value))
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn integer(n: i64) -> Self {
        Self::new(Value::Integer(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(Value::Boolean(b))
    }

    pub fn byte_string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Value::ByteString(bytes.into().into_boxed_slice()))
    }

    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Value::Buffer(bytes.into().into_boxed_slice()))
    }

    pub fn array(items: Vec<StackItem>) -> Self {
        Self::new(Value::Array(items))
    }

    pub fn structure(fields: Vec<StackItem>) -> Self {
        Self::new(Value::Struct(fields))
    }

    pub fn map(entries: Vec<(StackItem, StackItem)>) -> Self {
        Self::new(Value::Map(entries))
    }

    pub fn pointer(position: usize) -> Self {
        Self::new(Value::Pointer(position))
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.0
    }

    #[inline]
    pub fn item_type(&self) -> ItemType {
        self.0.item_type()
    }

    /// Identity key, stable for as long as any handle to the item is alive
    #[inline]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// True when both handles refer to the same item
    #[inline]
    pub fn ptr_eq(&self, other: &StackItem) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles (stack slots, containers, locals) to this item
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

// PartialEq by identity (Rc pointer comparison)
impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for StackItem {}

impl Hash for StackItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for StackItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl From<Value> for StackItem {
    fn from(value: Value) -> Self {
        StackItem::new(value)
    }
}

impl From<i64> for StackItem {
    fn from(n: i64) -> Self {
        StackItem::new(Value::Integer(n))
    }
}

impl From<bool> for StackItem {
    fn from(b: bool) -> Self {
        StackItem::new(Value::Boolean(b))
    }
}

/// Checked downcast from a stack item to a typed view
///
/// `from_item` must be side-effect free and give a definite answer; typed
/// stack operations rely on calling it before they mutate anything.
pub trait FromStackItem: Sized {
    /// Name reported in `StackError::TypeMismatch`
    const EXPECTED: &'static str;

    fn from_item(item: &StackItem) -> Option<Self>;
}

impl FromStackItem for StackItem {
    const EXPECTED: &'static str = "StackItem";

    fn from_item(item: &StackItem) -> Option<Self> {
        Some(item.clone())
    }
}

macro_rules! item_view {
    ($(#[$meta:meta])* $name:ident => $pattern:pat) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(StackItem);

        impl $name {
            /// The underlying shared handle
            pub fn item(&self) -> &StackItem {
                &self.0
            }

            pub fn into_item(self) -> StackItem {
                self.0
            }
        }

        impl FromStackItem for $name {
            const EXPECTED: &'static str = stringify!($name);

            fn from_item(item: &StackItem) -> Option<Self> {
                if matches!(item.value(), $pattern) {
                    Some($name(item.clone()))
                } else {
                    None
                }
            }
        }

        impl From<$name> for StackItem {
            fn from(view: $name) -> StackItem {
                view.0
            }
        }
    };
}

item_view!(Null => Value::Null);
item_view!(Boolean => Value::Boolean(_));
item_view!(Integer => Value::Integer(_));
item_view!(ByteString => Value::ByteString(_));
item_view!(Buffer => Value::Buffer(_));
item_view!(Array => Value::Array(_));
item_view!(Struct => Value::Struct(_));
item_view!(Map => Value::Map(_));
item_view!(Pointer => Value::Pointer(_));
item_view!(
    /// Any of Boolean, Integer or ByteString
    PrimitiveType => Value::Boolean(_) | Value::Integer(_) | Value::ByteString(_)
);
item_view!(
    /// Any of Array, Struct or Map
    CompoundType => Value::Array(_) | Value::Struct(_) | Value::Map(_)
);

// Views are only built by `from_item`, so the payload always matches.

impl Boolean {
    pub fn value(&self) -> bool {
        match self.0.value() {
            Value::Boolean(b) => *b,
            other => unreachable!("Boolean view over {}", other.item_type()),
        }
    }
}

impl Integer {
    pub fn value(&self) -> i64 {
        match self.0.value() {
            Value::Integer(n) => *n,
            other => unreachable!("Integer view over {}", other.item_type()),
        }
    }
}

impl ByteString {
    pub fn as_bytes(&self) -> &[u8] {
        match self.0.value() {
            Value::ByteString(bytes) => bytes,
            other => unreachable!("ByteString view over {}", other.item_type()),
        }
    }
}

impl Buffer {
    pub fn as_bytes(&self) -> &[u8] {
        match self.0.value() {
            Value::Buffer(bytes) => bytes,
            other => unreachable!("Buffer view over {}", other.item_type()),
        }
    }
}

impl Array {
    pub fn items(&self) -> &[StackItem] {
        match self.0.value() {
            Value::Array(items) => items,
            other => unreachable!("Array view over {}", other.item_type()),
        }
    }
}

impl Struct {
    pub fn fields(&self) -> &[StackItem] {
        match self.0.value() {
            Value::Struct(fields) => fields,
            other => unreachable!("Struct view over {}", other.item_type()),
        }
    }
}

impl Map {
    pub fn entries(&self) -> &[(StackItem, StackItem)] {
        match self.0.value() {
            Value::Map(entries) => entries,
            other => unreachable!("Map view over {}", other.item_type()),
        }
    }
}

impl Pointer {
    pub fn position(&self) -> usize {
        match self.0.value() {
            Value::Pointer(pos) => *pos,
            other => unreachable!("Pointer view over {}", other.item_type()),
        }
    }
}

impl PrimitiveType {
    pub fn item_type(&self) -> ItemType {
        self.0.item_type()
    }
}

impl CompoundType {
    pub fn item_type(&self) -> ItemType {
        self.0.item_type()
    }

    /// Number of direct children (items, fields, or key-value pairs)
    pub fn len(&self) -> usize {
        match self.0.value() {
            Value::Array(items) | Value::Struct(items) => items.len(),
            Value::Map(entries) => entries.len(),
            other => unreachable!("CompoundType view over {}", other.item_type()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = StackItem::integer(1);
        let b = StackItem::integer(1);
        let a2 = a.clone();

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.id(), a2.id());
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn test_item_type_groups() {
        assert!(ItemType::Integer.is_primitive());
        assert!(ItemType::ByteString.is_primitive());
        assert!(!ItemType::Buffer.is_primitive());
        assert!(!ItemType::Null.is_primitive());
        assert!(ItemType::Map.is_compound());
        assert!(!ItemType::Pointer.is_compound());
    }

    #[test]
    fn test_views_downcast() {
        let n = StackItem::integer(42);
        let arr = StackItem::array(vec![n.clone(), StackItem::boolean(true)]);

        assert_eq!(Integer::from_item(&n).map(|i| i.value()), Some(42));
        assert!(Boolean::from_item(&n).is_none());
        assert!(PrimitiveType::from_item(&n).is_some());
        assert!(CompoundType::from_item(&n).is_none());

        let view = Array::from_item(&arr).expect("array view");
        assert_eq!(view.items().len(), 2);
        assert!(view.items()[0].ptr_eq(&n));
        // the view shares the original handle
        assert!(view.item().ptr_eq(&arr));

        let compound = CompoundType::from_item(&arr).expect("compound view");
        assert_eq!(compound.item_type(), ItemType::Array);
        assert_eq!(compound.len(), 2);
    }

    #[test]
    fn test_any_item_always_matches() {
        let item = StackItem::null();
        let same = StackItem::from_item(&item).expect("any item");
        assert!(same.ptr_eq(&item));
        assert!(Null::from_item(&item).is_some());
    }

    #[test]
    fn test_display() {
        assert_eq!(StackItem::integer(-3).to_string(), "Integer(-3)");
        assert_eq!(StackItem::byte_string(vec![0x01, 0xab]).to_string(), "ByteString(0x01ab)");
        assert_eq!(StackItem::map(vec![]).to_string(), "Map{0}");
        assert_eq!(
            StackItem::structure(vec![StackItem::null()]).to_string(),
            "Struct[1]"
        );
    }

    #[test]
    fn test_serialize_tagged() {
        let item = StackItem::array(vec![StackItem::integer(7), StackItem::boolean(false)]);
        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"Array","value":[{"type":"Integer","value":7},{"type":"Boolean","value":false}]}"#
        );
    }

    #[test]
    fn test_compound_and_pointer_accessors() {
        let key = StackItem::byte_string(b"k".to_vec());
        let val = StackItem::integer(1);
        let map = StackItem::map(vec![(key.clone(), val.clone())]);
        let view = Map::from_item(&map).expect("map view");
        assert_eq!(view.entries().len(), 1);
        assert!(view.entries()[0].0.ptr_eq(&key));
        assert!(view.entries()[0].1.ptr_eq(&val));

        let st = StackItem::structure(vec![val.clone(), StackItem::null()]);
        let fields = Struct::from_item(&st).expect("struct view");
        assert_eq!(fields.fields().len(), 2);
        assert!(fields.fields()[0].ptr_eq(&val));

        let ptr = StackItem::pointer(17);
        assert_eq!(Pointer::from_item(&ptr).map(|p| p.position()), Some(17));
        assert!(Pointer::from_item(&val).is_none());
    }

    #[test]
    fn test_into_item_returns_same_handle() {
        let item = StackItem::integer(5);
        let view = Integer::from_item(&item).expect("integer view");
        let back = view.into_item();
        assert!(back.ptr_eq(&item));

        let via_from: StackItem = Boolean::from_item(&StackItem::boolean(true))
            .expect("boolean view")
            .into();
        assert_eq!(via_from.item_type(), ItemType::Boolean);
    }
}
