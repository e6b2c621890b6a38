use std::fmt;

/// Closed set of types an output field can declare.
///
/// `None` is only valid while a field spec is being edited — declaring it on
/// an output field is a configuration error, and coercion to it always fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    String,
    Integer,
    Number,
    BigNumber,
    Date,
    Boolean,
    Binary,
    None,
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Integer => "integer",
            TypeKind::Number => "number",
            TypeKind::BigNumber => "bignumber",
            TypeKind::Date => "date",
            TypeKind::Boolean => "boolean",
            TypeKind::Binary => "binary",
            TypeKind::None => "none",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical typed row cell.
///
/// Strategy by type:
/// - Scalars (Integer, Number, Boolean): eager, cost ~0
/// - `BigNumber` is `(mantissa, scale)` — value = mantissa / 10^scale
/// - `Date` is epoch milliseconds, UTC
/// - String, Binary: owned buffers
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    /// `(mantissa, scale)` — arbitrary-precision decimal.
    BigNumber(i128, u8),
    /// Epoch milliseconds, UTC.
    Date(i64),
    Boolean(bool),
    /// Opaque binary data.
    Binary(Vec<u8>),
    Null,
}

impl Value {
    pub fn kind(&self) -> TypeKind {
        match self {
            Value::String(_) => TypeKind::String,
            Value::Integer(_) => TypeKind::Integer,
            Value::Number(_) => TypeKind::Number,
            Value::BigNumber(..) => TypeKind::BigNumber,
            Value::Date(_) => TypeKind::Date,
            Value::Boolean(_) => TypeKind::Boolean,
            Value::Binary(_) => TypeKind::Binary,
            Value::Null => TypeKind::None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Number(v) => write!(f, "{v}"),
            Value::BigNumber(m, s) => f.write_str(&format_decimal(*m, *s)),
            Value::Date(ms) => f.write_str(&format_date(*ms)),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Null => f.write_str(""),
        }
    }
}

/// Positional array of values. Order matches `RowSchema.fields`.
///
/// Maximally lightweight — values only; names and types live in the schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn width(&self) -> usize {
        self.0.len()
    }
}

/// Text pattern for date values, applied in both directions.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Parse a decimal string into `(mantissa, scale)`.
///
/// Accepts an optional sign, digits, and at most one decimal point.
/// Returns `None` on empty input, foreign characters or i128 overflow.
pub fn parse_decimal(text: &str) -> Option<(i128, u8)> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() > u8::MAX as usize {
        return None;
    }
    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let digit = c.to_digit(10)? as i128;
        mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
    }
    if negative {
        mantissa = -mantissa;
    }
    Some((mantissa, frac_part.len() as u8))
}

/// Render `(mantissa, scale)` as a plain decimal string.
pub fn format_decimal(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let negative = mantissa < 0;
    let digits = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let (int_part, frac_part) = if digits.len() > scale {
        let split = digits.len() - scale;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>scale$}"))
    };
    let sign = if negative { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part}")
}

/// Approximate a `(mantissa, scale)` decimal as f64.
pub fn decimal_to_f64(mantissa: i128, scale: u8) -> f64 {
    mantissa as f64 / 10f64.powi(scale as i32)
}

/// Parse a date string in the fixed [`DATE_FORMAT`] into epoch milliseconds.
pub fn parse_date(text: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Render epoch milliseconds in the fixed [`DATE_FORMAT`].
pub fn format_date(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parse_and_format_round_trip() {
        assert_eq!(parse_decimal("3.999"), Some((3999, 3)));
        assert_eq!(parse_decimal("-12.50"), Some((-1250, 2)));
        assert_eq!(parse_decimal("  42 "), Some((42, 0)));
        assert_eq!(parse_decimal("+0.5"), Some((5, 1)));
        assert_eq!(format_decimal(3999, 3), "3.999");
        assert_eq!(format_decimal(-1250, 2), "-12.50");
        assert_eq!(format_decimal(5, 1), "0.5");
        assert_eq!(format_decimal(42, 0), "42");
    }

    #[test]
    fn decimal_rejects_garbage() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal("."), None);
    }

    #[test]
    fn date_parse_and_format_round_trip() {
        let ms = parse_date("2024/01/15 10:30:00.250").expect("parses");
        assert_eq!(format_date(ms), "2024/01/15 10:30:00.250");
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn value_kind_matches_variant() {
        assert_eq!(Value::Integer(1).kind(), TypeKind::Integer);
        assert_eq!(Value::BigNumber(1, 0).kind(), TypeKind::BigNumber);
        assert!(Value::Null.is_null());
    }
}
