//! Field shape descriptors.

/// Declares the expected wire shape of a field or operation parameter.
///
/// A `Shape` is pure metadata: it is built once per operation signature (or
/// per [`WireRecord`](crate::WireRecord) type) and reused for every message,
/// and it drives which flatten/reconstruct strategy
/// [`Message::append`](crate::Message::append) and
/// [`Message::extract`](crate::Message::extract) apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A plain string, passed through verbatim.
    Text,
    /// A scalar rendered as text (integer, boolean, ...). Missing decodes
    /// to the empty string, which typed accessors treat as the zero value.
    Scalar,
    /// A scalar whose absence is meaningful. The only shape that decodes a
    /// missing key to [`Value::Absent`](crate::Value::Absent) rather than a
    /// zero value.
    NullableScalar,
    /// An enumeration rendered by variant name.
    Symbol,
    /// An ordered list, flattened to `key[0]`, `key[1]`, ...
    List(Box<Shape>),
    /// A string-keyed map, flattened to `key[mapkey]` with the map key
    /// escaped independently of the structural delimiters.
    Map(Box<Shape>),
    /// A nested record, flattened to `key.field` per declared field.
    Record(Vec<FieldDef>),
}

impl Shape {
    /// A list of `element`-shaped items.
    pub fn list(element: Shape) -> Self {
        Shape::List(Box::new(element))
    }

    /// A map with `value`-shaped entries.
    pub fn map(value: Shape) -> Self {
        Shape::Map(Box::new(value))
    }

    /// A record with the given fields.
    pub fn record(fields: impl IntoIterator<Item = FieldDef>) -> Self {
        Shape::Record(fields.into_iter().collect())
    }
}

/// One declared field of a record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub shape: Shape,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}
