//! Metadata-driven encoding of configuration records into `NAME=VALUE`
//! environment assignments.
//!
//! Every record declares its fields through [`EnvRecord::env_fields`]: a
//! static table pairing each field with its [`FieldMeta`]. The encoder walks
//! that table in declaration order, so the output order is stable and no
//! runtime introspection is involved.

mod merge;

pub use merge::{merge_env, split_assignment};

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{BridgeError, Result};

/// Per-field encoding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMeta {
    /// Variable name fragment appended to the current prefix.
    pub env_key: &'static str,
    /// Prefix fragment for nested records and repeatable groups.
    pub nested_prefix: &'static str,
    /// Drop the assignment when its rendered value is empty.
    pub omit_empty: bool,
}

impl FieldMeta {
    pub const fn key(env_key: &'static str) -> Self {
        Self {
            env_key,
            nested_prefix: "",
            omit_empty: false,
        }
    }

    pub const fn nested(nested_prefix: &'static str) -> Self {
        Self {
            env_key: "",
            nested_prefix,
            omit_empty: false,
        }
    }

    /// A field carrying no encoding metadata.
    pub const fn untagged() -> Self {
        Self {
            env_key: "",
            nested_prefix: "",
            omit_empty: false,
        }
    }

    pub const fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    fn is_tagged(&self) -> bool {
        !self.env_key.is_empty() || !self.nested_prefix.is_empty()
    }

    /// Name used for groups: the nested prefix, falling back to the env key.
    fn group_name(&self) -> &'static str {
        if self.nested_prefix.is_empty() {
            self.env_key
        } else {
            self.nested_prefix
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar<'a> {
    Text(&'a str),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl Scalar<'_> {
    fn is_zero(&self) -> bool {
        match self {
            Scalar::Text(s) => s.is_empty(),
            Scalar::Int(v) => *v == 0,
            Scalar::UInt(v) => *v == 0,
            Scalar::Bool(v) => !*v,
        }
    }

    fn render(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s),
            Scalar::Int(v) => Cow::Owned(v.to_string()),
            Scalar::UInt(v) => Cow::Owned(v.to_string()),
            Scalar::Bool(true) => Cow::Borrowed("y"),
            Scalar::Bool(false) => Cow::Borrowed("n"),
        }
    }
}

impl<'a> From<&'a str> for Scalar<'a> {
    fn from(value: &'a str) -> Self {
        Scalar::Text(value)
    }
}

impl<'a> From<&'a String> for Scalar<'a> {
    fn from(value: &'a String) -> Self {
        Scalar::Text(value.as_str())
    }
}

impl From<bool> for Scalar<'_> {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i32> for Scalar<'_> {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<i64> for Scalar<'_> {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u32> for Scalar<'_> {
    fn from(value: u32) -> Self {
        Scalar::UInt(u64::from(value))
    }
}

impl From<u64> for Scalar<'_> {
    fn from(value: u64) -> Self {
        Scalar::UInt(value)
    }
}

pub enum FieldValue<'a> {
    Scalar(Scalar<'a>),
    /// Nullable scalar: skipped when `None`, encoded even when zero otherwise.
    Optional(Option<Scalar<'a>>),
    /// Nested record, always encoded under its prefix. Unlike a zero scalar
    /// it is never skipped, so booleans of an all-default record still emit
    /// (`PGBACKREST_ARCHIVE_ASYNC=n`).
    Record(&'a dyn EnvRecord),
    OptionalRecord(Option<&'a dyn EnvRecord>),
    /// Repeatable group of nested records.
    Group(Vec<&'a dyn EnvRecord>),
    /// Repeatable group of scalars.
    List(Vec<Scalar<'a>>),
}

impl<'a> FieldValue<'a> {
    pub fn scalar(value: impl Into<Scalar<'a>>) -> Self {
        FieldValue::Scalar(value.into())
    }

    pub fn optional<T>(value: Option<T>) -> Self
    where
        T: Into<Scalar<'a>>,
    {
        FieldValue::Optional(value.map(Into::into))
    }

    pub fn record<T: EnvRecord>(record: &'a T) -> Self {
        FieldValue::Record(record)
    }

    pub fn optional_record<T: EnvRecord>(record: Option<&'a T>) -> Self {
        FieldValue::OptionalRecord(record.map(|r| r as &dyn EnvRecord))
    }

    pub fn group<T: EnvRecord>(items: &'a [T]) -> Self {
        FieldValue::Group(items.iter().map(|i| i as &dyn EnvRecord).collect())
    }

    pub fn list<T>(items: &'a [T]) -> Self
    where
        &'a T: Into<Scalar<'a>>,
    {
        FieldValue::List(items.iter().map(Into::into).collect())
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Optional(_) => "optional scalar",
            FieldValue::Record(_) => "record",
            FieldValue::OptionalRecord(_) => "optional record",
            FieldValue::Group(_) => "record group",
            FieldValue::List(_) => "scalar list",
        }
    }
}

pub struct EnvField<'a> {
    pub meta: FieldMeta,
    pub value: FieldValue<'a>,
}

impl<'a> EnvField<'a> {
    pub fn new(meta: FieldMeta, value: FieldValue<'a>) -> Self {
        Self { meta, value }
    }
}

/// A configuration record whose fields can be encoded as environment
/// variables.
pub trait EnvRecord {
    /// Fields in declaration order.
    fn env_fields(&self) -> Vec<EnvField<'_>>;
}

/// Running ordinals for repeatable groups, keyed by the group's full prefix.
/// Lives for a single encoding pass.
#[derive(Debug, Default)]
struct GroupOrdinals {
    next: HashMap<String, usize>,
}

impl GroupOrdinals {
    fn next(&mut self, base: &str) -> usize {
        let counter = self.next.entry(base.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Encode `record` with every variable name starting with `prefix`.
pub fn encode(record: &dyn EnvRecord, prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut ordinals = GroupOrdinals::default();
    encode_record(record, prefix, &mut ordinals, &mut out);
    out
}

/// Encode an arbitrary field value; only records are accepted at the top
/// level.
pub fn encode_value(value: &FieldValue<'_>, prefix: &str) -> Result<Vec<String>> {
    match value {
        FieldValue::Record(record) | FieldValue::OptionalRecord(Some(record)) => {
            Ok(encode(*record, prefix))
        }
        other => Err(BridgeError::NotARecord { kind: other.kind() }),
    }
}

fn encode_record(
    record: &dyn EnvRecord,
    prefix: &str,
    ordinals: &mut GroupOrdinals,
    out: &mut Vec<String>,
) {
    for field in record.env_fields() {
        let meta = field.meta;
        if !meta.is_tagged() {
            // Untagged records are flattened into the parent, anything else is ignored.
            if let FieldValue::Record(inner) = field.value {
                encode_record(inner, prefix, ordinals, out);
            }
            continue;
        }

        match field.value {
            FieldValue::Scalar(value) => {
                if value.is_zero() && !matches!(value, Scalar::Bool(_)) {
                    continue;
                }
                push_assignment(out, meta, format!("{}{}", prefix, meta.env_key), value);
            }
            FieldValue::Optional(None) | FieldValue::OptionalRecord(None) => {}
            FieldValue::Optional(Some(value)) => {
                push_assignment(out, meta, format!("{}{}", prefix, meta.env_key), value);
            }
            FieldValue::Record(inner) | FieldValue::OptionalRecord(Some(inner)) => {
                let nested = format!("{}{}", prefix, meta.nested_prefix);
                encode_record(inner, &nested, ordinals, out);
            }
            FieldValue::Group(items) => {
                let base = format!("{}{}", prefix, meta.group_name());
                for item in items {
                    let element_prefix = format!("{}{}", base, ordinals.next(&base));
                    encode_record(item, &element_prefix, ordinals, out);
                }
            }
            FieldValue::List(items) => {
                let base = format!("{}{}", prefix, meta.group_name());
                for item in items {
                    let element_prefix = format!("{}{}", base, ordinals.next(&base));
                    let name = element_prefix
                        .strip_suffix('_')
                        .unwrap_or(&element_prefix)
                        .to_string();
                    push_assignment(out, meta, name, item);
                }
            }
        }
    }
}

fn push_assignment(out: &mut Vec<String>, meta: FieldMeta, name: String, value: Scalar<'_>) {
    let rendered = value.render();
    if meta.omit_empty && rendered.is_empty() {
        return;
    }
    out.push(format!("{}={}", name, rendered));
}
