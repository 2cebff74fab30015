#![deny(unsafe_code)]

//! Wire-level message codec for the hoist engine protocol.
//!
//! The engine speaks a flat, key-addressed text format:
//!
//! ```text
//! command?key1=value1&key2=value2&...
//! ```
//!
//! Command, keys and values are percent-encoded. Structured data is
//! flattened into compound key paths: `items[0]` for list elements,
//! `flags[debug]` for map entries, `package.name` for record fields, and
//! combinations thereof (`packages[2].version`). A [`Shape`] descriptor
//! declared per field drives both flattening ([`Message::append`]) and
//! reconstruction ([`Message::extract`]).
//!
//! Decoding is deliberately lenient: a missing scalar yields its zero value
//! and a missing collection yields an empty one, so schema drift between
//! client and engine never fails a whole message.

mod flatten;
mod message;
mod path;
pub mod protocol;
mod record;
mod shape;
mod value;

pub use message::{Message, DEFAULT_PAIR_SEPARATOR};
pub use path::{escape_component, unescape_component};
pub use record::WireRecord;
pub use shape::{FieldDef, Shape};
pub use value::Value;
