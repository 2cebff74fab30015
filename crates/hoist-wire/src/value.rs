//! The decoded value tree.

static ABSENT: Value = Value::Absent;
static NO_ITEMS: &[Value] = &[];
static NO_ENTRIES: &[(String, Value)] = &[];

/// A value as carried by the wire format: text at the leaves, lists, maps
/// and records above.
///
/// `Value` deliberately keeps leaves as strings; typed accessors
/// ([`as_u64`](Value::as_u64), [`as_bool`](Value::as_bool), ...) apply the
/// zero-value rule so that a missing or malformed scalar never fails a
/// message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    /// No value. Only produced for [`Shape::NullableScalar`](crate::Shape)
    /// fields whose key is missing; written as nothing.
    #[default]
    Absent,
    Text(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    Record(Vec<(String, Value)>),
}

impl Value {
    /// Build a record value from `(name, value)` pairs.
    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// The leaf text, if this is a text value.
    pub fn text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Leaf text, or `""` for anything else (the string zero value).
    pub fn as_str(&self) -> &str {
        self.text().unwrap_or("")
    }

    /// Parse the leaf as `u64`, defaulting to 0.
    pub fn as_u64(&self) -> u64 {
        self.as_str().parse().unwrap_or(0)
    }

    /// Parse the leaf as `i64`, defaulting to 0.
    pub fn as_i64(&self) -> i64 {
        self.as_str().parse().unwrap_or(0)
    }

    /// Parse the leaf as a boolean. Accepts the renderings the engine
    /// emits (`true`/`True`/`1`); everything else is false.
    pub fn as_bool(&self) -> bool {
        matches!(self.as_str(), "true" | "True" | "1")
    }

    /// List items, or an empty slice for non-lists.
    pub fn items(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            _ => NO_ITEMS,
        }
    }

    /// Map or record entries, or an empty slice otherwise.
    pub fn entries(&self) -> &[(String, Value)] {
        match self {
            Value::Map(entries) | Value::Record(entries) => entries,
            _ => NO_ENTRIES,
        }
    }

    /// Look up a record field by name; absent when missing.
    pub fn field(&self, name: &str) -> &Value {
        self.entries()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .unwrap_or(&ABSENT)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Text(n.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Text(n.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Text(if b { "true" } else { "false" }.to_owned())
    }
}

impl From<Option<bool>> for Value {
    fn from(opt: Option<bool>) -> Self {
        match opt {
            Some(b) => Value::from(b),
            None => Value::Absent,
        }
    }
}
