//! The flat wire message and its text encoding.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped on the wire. Everything outside the RFC 3986
/// unreserved set, so the structural delimiters of compound key paths
/// (`[`, `]`, `.`) and the framing characters (`?`, `=`, `&`, newline)
/// all travel percent-encoded.
const WIRE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Default separator between `key=value` pairs in a message body.
pub const DEFAULT_PAIR_SEPARATOR: char = '&';

/// A single wire message: an operation name plus a flat bag of string
/// fields.
///
/// Field keys may be plain names or compound key paths encoding structure;
/// see [`Message::append`] and [`Message::extract`]. Order of fields is not
/// significant on the wire. A message is built either by parsing transport
/// bytes or by accumulating fields for an outgoing request, and is not
/// mutated once handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// The operation name. Empty for a few historical message forms.
    pub command: String,
    /// Flat key → value mapping. Values are never empty strings: the wire
    /// format cannot distinguish empty from absent, so empty means absent.
    pub fields: BTreeMap<String, String>,
}

impl Message {
    /// Create an empty message for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Parse a message from its wire text form, using the default `&` pair
    /// separator.
    ///
    /// Parsing never fails: malformed pairs are skipped, and input with no
    /// body yields a message with only a command.
    pub fn parse(raw: &str) -> Self {
        Self::parse_with(raw, DEFAULT_PAIR_SEPARATOR)
    }

    /// Parse with an explicit pair separator.
    pub fn parse_with(raw: &str, separator: char) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let (command, body) = match raw.split_once('?') {
            Some((command, body)) => (command, Some(body)),
            None => (raw, None),
        };

        let mut message = Self::new(decode(command));
        if let Some(body) = body {
            for pair in body.split(separator) {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                let key = decode(key);
                let value = decode(value);
                if key.is_empty() || value.is_empty() {
                    continue;
                }
                message.fields.insert(key, value);
            }
        }
        message
    }

    /// Render the message to its wire text form.
    ///
    /// Fields with an empty value are omitted; the format treats empty and
    /// absent identically.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&encode(&self.command));
        let mut separator = '?';
        for (key, value) in &self.fields {
            if value.is_empty() {
                continue;
            }
            out.push(separator);
            separator = DEFAULT_PAIR_SEPARATOR;
            out.push_str(&encode(key));
            out.push('=');
            out.push_str(&encode(value));
        }
        out
    }

    /// Set a raw field. Empty values are dropped, matching the wire's
    /// empty-means-absent rule.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.fields.insert(key.into(), value);
        }
    }

    /// Get a raw field value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Get a raw field value, or `""` when absent.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn encode(text: &str) -> String {
    utf8_percent_encode(text, WIRE).to_string()
}

fn decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}
