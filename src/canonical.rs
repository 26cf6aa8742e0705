//! Canonical JSON.
//!
//! Signer and verifier must derive byte-identical input independently, so
//! every choice here is fixed: keys sorted by UTF-16 code units, no
//! whitespace, ECMAScript number formatting, and every non-ASCII code point
//! escaped as lowercase `\uXXXX`.
//!
//! # References
//!
//! - [ECMAScript Number::toString](https://tc39.es/ecma262/#sec-numeric-types-number-tostring)
//! - [RFC 8259 Section 7](https://datatracker.ietf.org/doc/html/rfc8259#section-7)

use std::{borrow::Cow, collections::BTreeMap, fmt, sync::Arc};

use crate::Error;

/// Conversion into the value used for signing.
///
/// Domain types implement this to control their signed representation
/// without the serializer knowing their concrete type. It is invoked once,
/// before the value is serialized.
pub trait ToCanonical: fmt::Debug + Send + Sync {
    fn to_canonical(&self) -> Cow<'_, Value>;
}

/// JSON-like value tree.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value. Omitted from objects, `null` in arrays.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// A domain object that supplies its own canonical form.
    Custom(Arc<dyn ToCanonical>),
}

impl Value {
    /// Parse JSON text.
    pub fn parse(json: &str) -> Result<Self, Error> {
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(value) => Ok(Self::from(value)),
            Err(e) => {
                log::error!("Failed to parse JSON: {e}");
                Err(Error::InvalidRecord(e.to_string()))
            }
        }
    }

    pub fn custom<T: ToCanonical + 'static>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns `true` if the value is [`Undefined`].
    ///
    /// [`Undefined`]: Value::Undefined
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl ToCanonical for Value {
    fn to_canonical(&self) -> Cow<'_, Value> {
        Cow::Borrowed(self)
    }
}

impl ToCanonical for serde_json::Value {
    fn to_canonical(&self) -> Cow<'_, Value> {
        Cow::Owned(Value::from(self))
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from(&value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::Undefined,
        }
    }
}

/// Serialize a value into its canonical JSON string.
pub fn canonicalize<T: ToCanonical + ?Sized>(value: &T) -> String {
    let mut out: String = String::new();
    write_value(&mut out, &value.to_canonical());
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Undefined | Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, Cow<'_, Value>)> = map
                .iter()
                .map(|(key, value)| (key, value.to_canonical()))
                .filter(|(_, value)| !resolve(value).is_undefined())
                .collect();

            // ECMAScript Array.prototype.sort compares UTF-16 code units
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i != 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, value);
            }
            out.push('}');
        }
        Value::Custom(custom) => write_value(out, &custom.to_canonical()),
    }
}

/// Follows `Custom` values down to a plain value.
fn resolve(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::Custom(custom) => match custom.to_canonical() {
            Cow::Borrowed(inner) => resolve(inner),
            Cow::Owned(inner) => Cow::Owned(resolve(&inner).into_owned()),
        },
        other => Cow::Borrowed(other),
    }
}

/// Quote and escape a string.
///
/// `"` and `\` are backslash escaped, `\b \f \n \r \t` use their short forms,
/// printable ASCII is kept, and everything else becomes lowercase `\uXXXX`
/// (surrogate pairs above U+FFFF).
pub fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units: [u16; 2] = [0; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

/// ECMAScript `Number::toString` for radix 10.
///
/// NaN and infinities have no JSON form and become `null`.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "null".to_string();
    }

    // also covers -0
    if n == 0.0 {
        return "0".to_string();
    }

    let abs: f64 = n.abs();
    if (1e-6..1e21).contains(&abs) {
        // shortest round-trip digits without an exponent
        return format!("{n}");
    }

    let exponential: String = format!("{n:e}");
    match exponential.split_once('e') {
        Some((mantissa, exponent)) if exponent.starts_with('-') => {
            format!("{mantissa}e{exponent}")
        }
        Some((mantissa, exponent)) => format!("{mantissa}e+{exponent}"),
        None => exponential,
    }
}
