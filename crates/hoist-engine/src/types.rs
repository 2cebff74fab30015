//! Typed records crossing the engine boundary.

use std::sync::OnceLock;

use hoist_wire::{FieldDef, Shape, Value, WireRecord};

/// One package as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    pub feed: String,
    pub description: String,
    pub installed: bool,
    pub wanted: bool,
}

impl WireRecord for PackageSummary {
    fn shape() -> Shape {
        static SHAPE: OnceLock<Shape> = OnceLock::new();
        SHAPE
            .get_or_init(|| {
                Shape::record([
                    FieldDef::new("name", Shape::Text),
                    FieldDef::new("version", Shape::Text),
                    FieldDef::new("feed", Shape::Text),
                    FieldDef::new("description", Shape::Text),
                    FieldDef::new("installed", Shape::Scalar),
                    FieldDef::new("wanted", Shape::Scalar),
                ])
            })
            .clone()
    }

    fn to_value(&self) -> Value {
        Value::record([
            ("name", Value::from(self.name.as_str())),
            ("version", Value::from(self.version.as_str())),
            ("feed", Value::from(self.feed.as_str())),
            ("description", Value::from(self.description.as_str())),
            ("installed", Value::from(self.installed)),
            ("wanted", Value::from(self.wanted)),
        ])
    }

    fn from_value(value: &Value) -> Self {
        Self {
            name: value.field("name").as_str().to_owned(),
            version: value.field("version").as_str().to_owned(),
            feed: value.field("feed").as_str().to_owned(),
            description: value.field("description").as_str().to_owned(),
            installed: value.field("installed").as_bool(),
            wanted: value.field("wanted").as_bool(),
        }
    }
}

/// A configured package feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedInfo {
    pub name: String,
    pub uri: String,
    pub suppressed: bool,
}

impl WireRecord for FeedInfo {
    fn shape() -> Shape {
        static SHAPE: OnceLock<Shape> = OnceLock::new();
        SHAPE
            .get_or_init(|| {
                Shape::record([
                    FieldDef::new("name", Shape::Text),
                    FieldDef::new("uri", Shape::Text),
                    FieldDef::new("suppressed", Shape::Scalar),
                ])
            })
            .clone()
    }

    fn to_value(&self) -> Value {
        Value::record([
            ("name", Value::from(self.name.as_str())),
            ("uri", Value::from(self.uri.as_str())),
            ("suppressed", Value::from(self.suppressed)),
        ])
    }

    fn from_value(value: &Value) -> Self {
        Self {
            name: value.field("name").as_str().to_owned(),
            uri: value.field("uri").as_str().to_owned(),
            suppressed: value.field("suppressed").as_bool(),
        }
    }
}

/// The engine's install policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyInfo {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub auto_update: bool,
}

fn text_list(value: &Value) -> Vec<String> {
    value
        .items()
        .iter()
        .map(|item| item.as_str().to_owned())
        .collect()
}

impl WireRecord for PolicyInfo {
    fn shape() -> Shape {
        static SHAPE: OnceLock<Shape> = OnceLock::new();
        SHAPE
            .get_or_init(|| {
                Shape::record([
                    FieldDef::new("allowed", Shape::list(Shape::Text)),
                    FieldDef::new("blocked", Shape::list(Shape::Text)),
                    FieldDef::new("auto-update", Shape::Scalar),
                ])
            })
            .clone()
    }

    fn to_value(&self) -> Value {
        Value::record([
            (
                "allowed",
                Value::list(self.allowed.iter().map(|name| Value::from(name.as_str()))),
            ),
            (
                "blocked",
                Value::list(self.blocked.iter().map(|name| Value::from(name.as_str()))),
            ),
            ("auto-update", Value::from(self.auto_update)),
        ])
    }

    fn from_value(value: &Value) -> Self {
        Self {
            allowed: text_list(value.field("allowed")),
            blocked: text_list(value.field("blocked")),
            auto_update: value.field("auto-update").as_bool(),
        }
    }
}

/// A deferred engine action, like a scheduled install or update check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduledTask {
    pub action: String,
    pub package: String,
    /// When to run, as the engine renders timestamps.
    pub start: String,
}

impl WireRecord for ScheduledTask {
    fn shape() -> Shape {
        static SHAPE: OnceLock<Shape> = OnceLock::new();
        SHAPE
            .get_or_init(|| {
                Shape::record([
                    FieldDef::new("action", Shape::Text),
                    FieldDef::new("package", Shape::Text),
                    FieldDef::new("start", Shape::Text),
                ])
            })
            .clone()
    }

    fn to_value(&self) -> Value {
        Value::record([
            ("action", Value::from(self.action.as_str())),
            ("package", Value::from(self.package.as_str())),
            ("start", Value::from(self.start.as_str())),
        ])
    }

    fn from_value(value: &Value) -> Self {
        Self {
            action: value.field("action").as_str().to_owned(),
            package: value.field("package").as_str().to_owned(),
            start: value.field("start").as_str().to_owned(),
        }
    }
}
