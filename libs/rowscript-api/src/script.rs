use std::collections::HashMap;

use crate::value::{self, Value};

/// Engine-neutral value, the only shape the step core ever sees.
///
/// Every engine adapter translates its native object model into this sum
/// type at the evaluation boundary, so engine quirks stay inside the
/// adapter. `Array`/`Map` carry the whole-row and schema bindings;
/// `Opaque` is the escape hatch for natives the core does not model.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// `(mantissa, scale)` — same layout as `Value::BigNumber`.
    Decimal(i128, u8),
    Text(String),
    /// Epoch milliseconds, UTC.
    DateMillis(i64),
    Bytes(Vec<u8>),
    Array(Vec<ScriptValue>),
    Map(Vec<(String, ScriptValue)>),
    /// Engine-native value. `type_name` is the engine's name for it,
    /// `rendered` its textual form — used for last-resort parses and for
    /// error messages naming the unsupported type.
    Opaque { type_name: String, rendered: String },
}

impl ScriptValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    pub fn type_name(&self) -> &str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Decimal(..) => "decimal",
            ScriptValue::Text(_) => "text",
            ScriptValue::DateMillis(_) => "date",
            ScriptValue::Bytes(_) => "bytes",
            ScriptValue::Array(_) => "array",
            ScriptValue::Map(_) => "map",
            ScriptValue::Opaque { type_name, .. } => type_name,
        }
    }

    /// Textual form of the value — string coercion and last-resort parses.
    pub fn render(&self) -> String {
        match self {
            ScriptValue::Null => String::new(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Int(v) => v.to_string(),
            ScriptValue::Float(v) => v.to_string(),
            ScriptValue::Decimal(m, s) => value::format_decimal(*m, *s),
            ScriptValue::Text(s) => s.clone(),
            ScriptValue::DateMillis(ms) => value::format_date(*ms),
            ScriptValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            ScriptValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", parts.join(", "))
            }
            ScriptValue::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.render()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            ScriptValue::Opaque { rendered, .. } => rendered.clone(),
        }
    }

    /// Normal-storage form of a typed row value: fully decoded, never a
    /// compact or lazy encoding.
    pub fn from_value(value: &Value) -> ScriptValue {
        match value {
            Value::String(s) => ScriptValue::Text(s.clone()),
            Value::Integer(v) => ScriptValue::Int(*v),
            Value::Number(v) => ScriptValue::Float(*v),
            Value::BigNumber(m, s) => ScriptValue::Decimal(*m, *s),
            Value::Date(ms) => ScriptValue::DateMillis(*ms),
            Value::Boolean(b) => ScriptValue::Bool(*b),
            Value::Binary(b) => ScriptValue::Bytes(b.clone()),
            Value::Null => ScriptValue::Null,
        }
    }
}

/// Name → value map handed into every evaluation and read back afterwards.
///
/// Explicit state in, mutated state out — the lifecycle manager holds no
/// hidden shared fields beyond this map.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<String, ScriptValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ScriptValue) {
        self.map.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScriptValue)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
