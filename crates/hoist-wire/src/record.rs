//! Declared wire shapes for message-carrying types.

use crate::{Shape, Value};

/// A type with a declared wire shape.
///
/// Implementations register their shape once (typically cached in a
/// `OnceLock`) and convert to and from the [`Value`] tree. `from_value` is
/// infallible by design: missing or malformed fields decode to zero values,
/// which is what keeps the protocol tolerant of schema drift between client
/// and engine versions.
pub trait WireRecord: Sized {
    /// The record's declared shape.
    fn shape() -> Shape;

    /// Render to a value tree matching [`shape`](WireRecord::shape).
    fn to_value(&self) -> Value;

    /// Rebuild from a value tree, substituting zero values for anything
    /// missing.
    fn from_value(value: &Value) -> Self;
}
