use rowscript_api::error::StepError;
use rowscript_api::script::ScriptValue;
use rowscript_api::value::{self, TypeKind, Value};

/// Convert a script result into the declared output type.
///
/// Stateless. The fallback chains mirror the legacy rules the step is
/// compatible with, including the lossy double to bignumber truncation
/// through i64 that drops the fraction.
pub fn coerce(raw: &ScriptValue, target: TypeKind, field: &str) -> Result<Value, StepError> {
    if target == TypeKind::None {
        return Err(err(field, "no output data type was specified"));
    }
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match target {
        TypeKind::Integer => to_integer(raw, field),
        TypeKind::Number => to_number(raw, field),
        TypeKind::String => Ok(Value::String(raw.render())),
        TypeKind::Date => to_date(raw, field),
        TypeKind::Boolean => to_boolean(raw, field),
        TypeKind::BigNumber => to_bignumber(raw, field),
        TypeKind::Binary => to_binary(raw, field),
        TypeKind::None => unreachable!("handled above"),
    }
}

fn err(field: &str, message: impl Into<String>) -> StepError {
    StepError::Coercion {
        field: field.to_string(),
        message: message.into(),
    }
}

fn to_integer(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        ScriptValue::Int(v) => Ok(Value::Integer(*v)),
        ScriptValue::Float(v) => Ok(Value::Integer(*v as i64)),
        ScriptValue::Text(s) => parse_integer(s.trim())
            .map(Value::Integer)
            .ok_or_else(|| err(field, format!("cannot parse '{}' as an integer", s.trim()))),
        // Last resort: parse the value's textual form.
        other => {
            let text = other.render();
            parse_integer(text.trim()).map(Value::Integer).ok_or_else(|| {
                err(
                    field,
                    format!("cannot convert {} value '{text}' to an integer", other.type_name()),
                )
            })
        }
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    text.parse::<i64>().ok()
}

fn to_number(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        ScriptValue::Float(v) => Ok(Value::Number(*v)),
        ScriptValue::Int(v) => Ok(Value::Number(*v as f64)),
        ScriptValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| err(field, format!("cannot parse '{}' as a number", s.trim()))),
        // Last resort: parse the value's textual form.
        other => {
            let text = other.render();
            text.trim().parse::<f64>().map(Value::Number).map_err(|_| {
                err(
                    field,
                    format!("cannot convert {} value '{text}' to a number", other.type_name()),
                )
            })
        }
    }
}

fn to_date(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        ScriptValue::DateMillis(ms) => Ok(Value::Date(*ms)),
        ScriptValue::Int(v) => Ok(Value::Date(*v)),
        ScriptValue::Float(v) => Ok(Value::Date(v.round() as i64)),
        ScriptValue::Text(s) => {
            // Fixed date pattern first, then a bare epoch-millis number.
            if let Some(ms) = value::parse_date(s) {
                return Ok(Value::Date(ms));
            }
            if let Ok(millis) = s.trim().parse::<f64>() {
                return Ok(Value::Date(millis.round() as i64));
            }
            Err(err(field, "cannot convert a string to a date"))
        }
        other => Err(err(
            field,
            format!("cannot convert {} value to a date", other.type_name()),
        )),
    }
}

fn to_boolean(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        // Passed through unchanged, no coercion attempted.
        ScriptValue::Bool(b) => Ok(Value::Boolean(*b)),
        other => Err(err(
            field,
            format!("expected a boolean, got {}", other.type_name()),
        )),
    }
}

fn to_bignumber(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        ScriptValue::Decimal(m, s) => Ok(Value::BigNumber(*m, *s)),
        ScriptValue::Int(v) => Ok(Value::BigNumber(*v as i128, 0)),
        // Doubles widen through i64 and drop the fraction. Legacy rule.
        ScriptValue::Float(v) => Ok(Value::BigNumber(*v as i64 as i128, 0)),
        ScriptValue::Text(s) => value::parse_decimal(s)
            .map(|(m, scale)| Value::BigNumber(m, scale))
            .ok_or_else(|| err(field, format!("cannot parse '{}' as a decimal", s.trim()))),
        other => Err(err(
            field,
            format!("conversion to bignumber not implemented for {}", other.type_name()),
        )),
    }
}

fn to_binary(raw: &ScriptValue, field: &str) -> Result<Value, StepError> {
    match raw {
        // Passed through unchanged.
        ScriptValue::Bytes(b) => Ok(Value::Binary(b.clone())),
        ScriptValue::Text(s) => Ok(Value::Binary(s.clone().into_bytes())),
        other => Err(err(
            field,
            format!("cannot convert {} value to binary", other.type_name()),
        )),
    }
}
