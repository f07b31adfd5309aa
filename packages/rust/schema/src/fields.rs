//! Structural field specs and the checker that enforces them on parsed JSON.
//!
//! Checking happens on a `serde_json::Value` before typed deserialization so
//! that a failure can name the exact field path (`sections[1].target_length`)
//! instead of surfacing a serde message. Numeric fields are coerced in place.

use serde_json::{Number, Value};

/// Expected shape of a single field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    /// Integer in `1..=u32::MAX`.
    PositiveInteger,
    /// Any finite real number.
    Number,
    StringList,
    /// Array of objects, each checked against the nested specs.
    ObjectList(&'static [FieldSpec]),
}

/// A required field of a structural schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A field that failed its structural or semantic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check `value` against `fields`, coercing numeric fields in place.
///
/// `path` is the location of `value` itself; pass `""` for the document root.
pub fn check_object(value: &mut Value, fields: &[FieldSpec], path: &str) -> Result<(), FieldError> {
    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(FieldError::new(
                display_path(path),
                format!("expected an object, found {}", json_type(other)),
            ));
        }
    };

    for spec in fields {
        let field_path = join_path(path, spec.name);
        let slot = match object.get_mut(spec.name) {
            Some(Value::Null) | None => {
                return Err(FieldError::new(field_path, "missing required field"));
            }
            Some(slot) => slot,
        };
        check_field(slot, spec.kind, &field_path)?;
    }

    Ok(())
}

fn check_field(slot: &mut Value, kind: FieldKind, path: &str) -> Result<(), FieldError> {
    match kind {
        FieldKind::String => {
            if !slot.is_string() {
                return Err(mismatch(path, "a string", slot));
            }
        }
        FieldKind::PositiveInteger => {
            let n = coerce_integer(slot).ok_or_else(|| mismatch(path, "an integer", slot))?;
            if n < 1 || n > i64::from(u32::MAX) {
                return Err(FieldError::new(
                    path,
                    format!("must be a positive integer, found {n}"),
                ));
            }
            *slot = Value::from(n);
        }
        FieldKind::Number => {
            let n = coerce_number(slot).ok_or_else(|| mismatch(path, "a number", slot))?;
            let number = Number::from_f64(n).ok_or_else(|| mismatch(path, "a finite number", slot))?;
            *slot = Value::Number(number);
        }
        FieldKind::StringList => match slot {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        return Err(mismatch(&format!("{path}[{i}]"), "a string", item));
                    }
                }
            }
            other => return Err(mismatch(path, "a list of strings", other)),
        },
        FieldKind::ObjectList(nested) => match slot {
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    check_object(item, nested, &format!("{path}[{i}]"))?;
                }
            }
            other => return Err(mismatch(path, "a list of objects", other)),
        },
    }
    Ok(())
}

/// Integers, integral floats (`600.0`), and integer strings (`"600"`).
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Numbers and numeric strings (`"0.9"`). Non-finite values are rejected.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn mismatch(path: &str, expected: &str, found: &Value) -> FieldError {
    FieldError::new(
        path,
        format!("expected {expected}, found {}", describe(found)),
    )
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {s:?}"),
        Value::Number(n) => format!("number {n}"),
        other => json_type(other).to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}
