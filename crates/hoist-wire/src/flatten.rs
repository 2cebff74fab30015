//! Shape-driven flattening and reconstruction of structured values.

use std::collections::BTreeMap;

use crate::path::{bracketed_child, escape_component, unescape_component};
use crate::{Message, Shape, Value};

impl Message {
    /// Flatten `value` into the field bag under `key`, guided by `shape`.
    ///
    /// Scalars land at `key` directly; lists at `key[i]` in source order;
    /// maps at `key[mapkey]` with the map key escaped; records at
    /// `key.field` recursively. Absent and empty values write nothing, per
    /// the wire's empty-means-absent rule.
    pub fn append(&mut self, key: &str, value: &Value, shape: &Shape) {
        match shape {
            Shape::Text | Shape::Scalar | Shape::Symbol | Shape::NullableScalar => {
                if let Some(text) = value.text() {
                    if !text.is_empty() {
                        self.fields.insert(key.to_owned(), text.to_owned());
                    }
                }
            }
            Shape::List(element) => {
                for (index, item) in value.items().iter().enumerate() {
                    self.append(&format!("{key}[{index}]"), item, element);
                }
            }
            Shape::Map(entry) => {
                for (map_key, item) in value.entries() {
                    self.append(
                        &format!("{key}[{}]", escape_component(map_key)),
                        item,
                        entry,
                    );
                }
            }
            Shape::Record(fields) => {
                for def in fields {
                    self.append(&format!("{key}.{}", def.name), value.field(&def.name), &def.shape);
                }
            }
        }
    }

    /// Reconstruct the value bound to `key`, guided by `shape`.
    ///
    /// The inverse of [`append`](Message::append). A missing scalar key
    /// yields the shape's zero value, a missing collection prefix yields an
    /// empty collection; extraction never fails. List order is rebuilt from
    /// the numeric index suffix, map entries are ordered by key.
    pub fn extract(&self, key: &str, shape: &Shape) -> Value {
        match shape {
            Shape::Text | Shape::Scalar | Shape::Symbol => {
                Value::Text(self.get(key).unwrap_or("").to_owned())
            }
            Shape::NullableScalar => match self.get(key) {
                Some(text) => Value::Text(text.to_owned()),
                None => Value::Absent,
            },
            Shape::List(element) => {
                let prefix = format!("{key}[");
                let mut indices = BTreeMap::new();
                for field_key in self.fields.keys() {
                    if let Some(raw) = bracketed_child(field_key, &prefix) {
                        if let Ok(index) = raw.parse::<usize>() {
                            indices.insert(index, ());
                        }
                    }
                }
                Value::List(
                    indices
                        .into_keys()
                        .map(|index| self.extract(&format!("{key}[{index}]"), element))
                        .collect(),
                )
            }
            Shape::Map(entry) => {
                let prefix = format!("{key}[");
                // decoded key → raw (escaped) component, so recursion can
                // rebuild the exact field key
                let mut raw_keys = BTreeMap::new();
                for field_key in self.fields.keys() {
                    if let Some(raw) = bracketed_child(field_key, &prefix) {
                        raw_keys.insert(unescape_component(raw), raw.to_owned());
                    }
                }
                Value::Map(
                    raw_keys
                        .into_iter()
                        .map(|(decoded, raw)| {
                            let item = self.extract(&format!("{key}[{raw}]"), entry);
                            (decoded, item)
                        })
                        .collect(),
                )
            }
            Shape::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|def| {
                        let item = self.extract(&format!("{key}.{}", def.name), &def.shape);
                        (def.name.clone(), item)
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldDef;

    fn round_trip(key: &str, value: &Value, shape: &Shape) -> Value {
        let mut msg = Message::new("probe");
        msg.append(key, value, shape);
        let reparsed = Message::parse(&msg.serialize());
        reparsed.extract(key, shape)
    }

    fn package_shape() -> Shape {
        Shape::record([
            FieldDef::new("name", Shape::Text),
            FieldDef::new("version", Shape::Text),
            FieldDef::new("installed", Shape::Scalar),
        ])
    }

    #[test]
    fn scalar_round_trip() {
        let value = Value::from("1.2.8");
        assert_eq!(round_trip("version", &value, &Shape::Text), value);
    }

    #[test]
    fn symbol_round_trips_by_variant_name() {
        let value = Value::from("Stable");
        assert_eq!(round_trip("channel", &value, &Shape::Symbol), value);
    }

    #[test]
    fn list_of_strings_round_trip_preserves_order() {
        let value = Value::list([Value::from("a"), Value::from("b"), Value::from("c")]);
        let out = round_trip("items", &value, &Shape::list(Shape::Text));
        assert_eq!(
            out.items().iter().map(Value::as_str).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
    }

    #[test]
    fn long_list_orders_numerically_not_lexically() {
        let items: Vec<Value> = (0..12).map(|i| Value::from(format!("v{i}"))).collect();
        let value = Value::List(items);
        let out = round_trip("items", &value, &Shape::list(Shape::Text));
        assert_eq!(out, value);
    }

    #[test]
    fn list_of_records_round_trip() {
        let shape = Shape::list(package_shape());
        let value = Value::list([
            Value::record([
                ("name", Value::from("zlib")),
                ("version", Value::from("1.3")),
                ("installed", Value::from(true)),
            ]),
            Value::record([
                ("name", Value::from("openssl")),
                ("version", Value::from("3.2")),
                ("installed", Value::from(false)),
            ]),
        ]);
        let out = round_trip("packages", &value, &shape);
        assert_eq!(out.items().len(), 2);
        assert_eq!(out.items()[0].field("name").as_str(), "zlib");
        assert!(out.items()[0].field("installed").as_bool());
        assert_eq!(out.items()[1].field("version").as_str(), "3.2");
    }

    #[test]
    fn map_of_scalars_round_trip() {
        let value = Value::Map(vec![
            ("arch".into(), Value::from("x64")),
            ("channel".into(), Value::from("stable")),
        ]);
        let out = round_trip("flags", &value, &Shape::map(Shape::Text));
        assert_eq!(out, value);
    }

    #[test]
    fn map_of_records_round_trip() {
        let shape = Shape::map(package_shape());
        let value = Value::Map(vec![(
            "zlib-1.3".into(),
            Value::record([
                ("name", Value::from("zlib")),
                ("version", Value::from("1.3")),
                ("installed", Value::from(true)),
            ]),
        )]);
        let out = round_trip("by-name", &value, &shape);
        assert_eq!(out.entries().len(), 1);
        assert_eq!(out.entries()[0].0, "zlib-1.3");
        assert_eq!(out.entries()[0].1.field("version").as_str(), "1.3");
    }

    #[test]
    fn map_keys_with_structural_delimiters() {
        let value = Value::Map(vec![
            ("weird[key]".into(), Value::from("a")),
            ("dotted.key".into(), Value::from("b")),
            ("amp&eq=".into(), Value::from("c")),
        ]);
        let out = round_trip("odd", &value, &Shape::map(Shape::Text));
        let entries: BTreeMap<_, _> = out
            .entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().to_owned()))
            .collect();
        assert_eq!(entries["weird[key]"], "a");
        assert_eq!(entries["dotted.key"], "b");
        assert_eq!(entries["amp&eq="], "c");
    }

    #[test]
    fn nested_record_with_mixed_fields() {
        let shape = Shape::record([
            FieldDef::new("name", Shape::Text),
            FieldDef::new("tags", Shape::list(Shape::Text)),
            FieldDef::new("meta", Shape::map(Shape::Text)),
            FieldDef::new(
                "origin",
                Shape::record([
                    FieldDef::new("feed", Shape::Text),
                    FieldDef::new("priority", Shape::Scalar),
                ]),
            ),
        ]);
        let value = Value::record([
            ("name", Value::from("zlib")),
            ("tags", Value::list([Value::from("compression"), Value::from("core")])),
            ("meta", Value::Map(vec![("license".into(), Value::from("zlib"))])),
            (
                "origin",
                Value::record([
                    ("feed", Value::from("main")),
                    ("priority", Value::from(5u64)),
                ]),
            ),
        ]);
        let out = round_trip("package", &value, &shape);
        assert_eq!(out, value);
    }

    #[test]
    fn nullable_scalar_distinguishes_absent() {
        let mut msg = Message::new("probe");
        msg.append("force", &Value::Absent, &Shape::NullableScalar);
        assert!(msg.extract("force", &Shape::NullableScalar).is_absent());

        msg.append("force", &Value::from(false), &Shape::NullableScalar);
        let out = msg.extract("force", &Shape::NullableScalar);
        assert!(!out.is_absent());
        assert!(!out.as_bool());
    }

    #[test]
    fn missing_keys_yield_zero_values() {
        let msg = Message::parse("task-complete?rqid=1");
        assert_eq!(msg.extract("name", &Shape::Text).as_str(), "");
        assert_eq!(msg.extract("count", &Shape::Scalar).as_u64(), 0);
        assert!(msg.extract("items", &Shape::list(Shape::Text)).items().is_empty());
        assert!(msg.extract("flags", &Shape::map(Shape::Text)).entries().is_empty());
        let record = msg.extract("package", &package_shape());
        assert_eq!(record.field("name").as_str(), "");
    }

    #[test]
    fn unrelated_keys_do_not_leak_into_collections() {
        let mut msg = Message::new("probe");
        msg.set("items[0]", "a");
        msg.set("itemsx[0]", "decoy");
        msg.set("items[0]x", "decoy");
        msg.set("items[notanumber]", "decoy");
        let out = msg.extract("items", &Shape::list(Shape::Text));
        assert_eq!(out.items().len(), 1);
        assert_eq!(out.items()[0].as_str(), "a");
    }

    #[test]
    fn absent_record_fields_write_nothing() {
        let mut msg = Message::new("probe");
        let value = Value::record([("name", Value::from("zlib"))]);
        msg.append("package", &value, &package_shape());
        assert_eq!(msg.get("package.name"), Some("zlib"));
        assert_eq!(msg.get("package.version"), None);
    }
}
