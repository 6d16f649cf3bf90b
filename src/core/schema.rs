//! # Schema Compiler
//!
//! Flattens a declarative configuration value into an [`Args`] tree without any
//! per-backend mapping code. Each configuration type registers an explicit table of
//! its fields through [`Schema::describe`]; every field carries target-specific flag
//! rules keyed by a *target key* (e.g. `helm`, `argocd`), so the same logical field
//! can be emitted as `--server` for one tool and `--argocd-server` for another.
//!
//! Flag rules, looked up by target key in [`Field::tags`]:
//! - missing: the flag is derived from the field name (`dest_namespace` -> `--dest-namespace`).
//! - `""`: the field is excluded for this target.
//! - `"name"`: emitted as `--name <value>`.
//! - `"name,arg"` or `",arg"`: emitted as the bare value (positional).
//! - `"name,paramless"`: emitted as `--name` alone, for switches taking no operand.
//!
//! The [`FIELD_TAG_KARGO`] key set to `""` excludes a field for every target.
//! A field whose name ends in [`REFERENCE_SUFFIX`] holds a lookup key: its content is
//! compiled into a deferred reference instead of a literal.

use crate::{
    constants::{FIELD_TAG_KARGO, REFERENCE_SUFFIX},
    core::{
        args::{Arg, Args, DeferredRef},
        provider::ValueProvider,
    },
};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Errors produced while compiling a configuration value.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The compiled value is not a record.
    #[error("expected a record but got {kind}")]
    NotARecord {
        /// The shape that was found instead.
        kind: &'static str,
    },
    /// An element of a repeated field failed to compile.
    #[error("field {field}: {source}")]
    Field {
        /// Name of the repeated field.
        field: &'static str,
        /// The element's failure.
        #[source]
        source: Box<SchemaError>,
    },
    /// A failure reported by a type's own [`Schema::compile_self`].
    #[error("{0}")]
    Custom(String),
}

/// A configuration type the compiler can walk.
pub trait Schema {
    /// Describes the value. Records return [`Value::Record`] with their fields in
    /// declaration order.
    fn describe(&self) -> Value<'_>;

    /// Override hook: lets a value append itself for `target`, replacing the generic
    /// walk. `args` is the tree built so far; a returned tree replaces it entirely.
    /// Returning `None` falls back to generic compilation.
    fn compile_self(&self, _args: &Args, _target: &str) -> Result<Option<Args>, SchemaError> {
        Ok(None)
    }
}

/// One entry of a record's field table.
#[derive(Debug)]
pub struct Field<'a> {
    /// The field's name as declared on the type.
    pub name: &'static str,
    /// Flag rules keyed by target key.
    pub tags: &'static [(&'static str, &'static str)],
    /// The field's current value.
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    /// A field without any flag rule.
    pub fn new(name: &'static str, value: impl Into<Value<'a>>) -> Self {
        Self {
            name,
            tags: &[],
            value: value.into(),
        }
    }

    /// A field with flag rules.
    pub fn tagged(
        name: &'static str,
        tags: &'static [(&'static str, &'static str)],
        value: impl Into<Value<'a>>,
    ) -> Self {
        Self {
            name,
            tags,
            value: value.into(),
        }
    }

    fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, rule)| *rule)
    }

    fn is_reference(&self) -> bool {
        self.name.ends_with(REFERENCE_SUFFIX)
    }

    /// The field name lower-cased with word separators dropped: `foo_bar` is `--foobar`.
    /// Fields wanting dashes spell them out in a tag.
    fn default_flag(&self) -> String {
        self.name.replace('_', "").to_lowercase()
    }
}

/// The shape of a configuration value as seen by the compiler.
pub enum Value<'a> {
    /// A scalar rendered to text. Empty text contributes nothing.
    Text(String),
    /// A boolean, rendered `true`/`false` unless the flag is parameter-less.
    Bool(bool),
    /// An unset optional value.
    Absent,
    /// A record and its field table.
    Record(Vec<Field<'a>>),
    /// A value with its own schema, which may override its compilation.
    Nested(&'a dyn Schema),
    /// A repeated field; each element is compiled with the field's rule.
    List(Vec<Value<'a>>),
    /// A value producing its own final token.
    Provider(Arc<dyn ValueProvider>),
}

impl Value<'_> {
    /// A short name of the shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Absent => "absent value",
            Value::Record(_) => "record",
            Value::Nested(_) => "nested value",
            Value::List(_) => "list",
            Value::Provider(_) => "value provider",
        }
    }
}

impl<'a> Value<'a> {
    /// An optional nested value.
    pub fn optional<T: Schema>(value: Option<&'a T>) -> Self {
        match value {
            Some(v) => Value::Nested(v),
            None => Value::Absent,
        }
    }

    /// A repeated field of nested values.
    pub fn nested_list<T: Schema>(items: &'a [T]) -> Self {
        Value::List(items.iter().map(|i| Value::Nested(i as &dyn Schema)).collect())
    }

    /// A repeated field of providers.
    pub fn providers<T: ValueProvider + Clone + 'static>(items: &[T]) -> Self {
        Value::List(
            items
                .iter()
                .map(|i| Value::Provider(Arc::new(i.clone())))
                .collect(),
        )
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Provider(p) => f.debug_tuple("Provider").field(p).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&String> for Value<'_> {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&[String]> for Value<'_> {
    fn from(items: &[String]) -> Self {
        Value::List(items.iter().map(Value::from).collect())
    }
}

impl From<&Vec<String>> for Value<'_> {
    fn from(items: &Vec<String>) -> Self {
        Value::from(items.as_slice())
    }
}

/// How a field is emitted once it is known to be included.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FlagRule {
    Flag(String),
    Positional,
    Paramless(String),
}

impl FlagRule {
    fn parse(rule: &str) -> Self {
        match rule.split_once(',') {
            Some((_, "arg")) => FlagRule::Positional,
            Some((name, "paramless")) => FlagRule::Paramless(name.to_string()),
            Some((name, _)) => FlagRule::Flag(name.to_string()),
            None => FlagRule::Flag(rule.to_string()),
        }
    }
}

/// Compiles `value` into a fresh tree using the flag rules of `target`.
pub fn compile(value: &dyn Schema, target: &str) -> Result<Args, SchemaError> {
    append_args(Args::new(), value, target)
}

/// Compiles `value` onto the end of `args`, honouring its override hook first.
pub fn append_args(args: Args, value: &dyn Schema, target: &str) -> Result<Args, SchemaError> {
    if let Some(custom) = value.compile_self(&args, target)? {
        return Ok(custom);
    }

    match value.describe() {
        Value::Record(fields) => append_fields(args, &fields, target),
        other => Err(SchemaError::NotARecord { kind: other.kind() }),
    }
}

fn append_fields(mut args: Args, fields: &[Field<'_>], target: &str) -> Result<Args, SchemaError> {
    for field in fields {
        args = append_field(args, field, &field.value, target)?;
    }
    Ok(args)
}

fn append_field(
    mut args: Args,
    field: &Field<'_>,
    value: &Value<'_>,
    target: &str,
) -> Result<Args, SchemaError> {
    // An overriding value owns its contribution, tags included.
    if let Value::Nested(nested) = value {
        if let Some(custom) = nested.compile_self(&args, target)? {
            return Ok(custom);
        }
    }

    if field.tag(FIELD_TAG_KARGO) == Some("") {
        return Ok(args);
    }
    let rule = match field.tag(target) {
        Some("") => return Ok(args),
        Some(rule) => FlagRule::parse(rule),
        None => FlagRule::Flag(field.default_flag()),
    };

    let node: Arg = match value {
        Value::Absent => return Ok(args),
        Value::Nested(nested) => return append_field(args, field, &nested.describe(), target),
        Value::Record(fields) => return append_fields(args, fields, target),
        Value::List(items) => {
            for item in items {
                args = append_field(args, field, item, target).map_err(|e| {
                    SchemaError::Field {
                        field: field.name,
                        source: Box::new(e),
                    }
                })?;
            }
            return Ok(args);
        }
        Value::Provider(provider) => Arg::Provider(Arc::clone(provider)),
        Value::Bool(false) if matches!(rule, FlagRule::Paramless(_)) => return Ok(args),
        Value::Bool(b) => Arg::Literal(b.to_string()),
        Value::Text(s) if s.is_empty() => return Ok(args),
        Value::Text(s) if field.is_reference() => Arg::Deferred(DeferredRef::new(s.as_str())),
        Value::Text(s) => Arg::Literal(s.clone()),
    };

    match rule {
        FlagRule::Positional => {
            args.append(node);
        }
        FlagRule::Paramless(flag) => {
            args.append(format!("--{flag}"));
        }
        FlagRule::Flag(flag) => {
            args.append(format!("--{flag}")).append(node);
        }
    }
    Ok(args)
}
