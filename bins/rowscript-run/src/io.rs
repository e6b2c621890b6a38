//! Line-delimited JSON adapters for the CLI host: rows come in on stdin,
//! one JSON object per line, and go out on stdout the same way.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

use rowscript_api::error::StepError;
use rowscript_api::ports::{RowReader, RowWriter, StepEvents};
use rowscript_api::schema::{FieldDescriptor, RowSchema};
use rowscript_api::value::{self, Row, TypeKind, Value};

// ---------- input ----------

pub struct JsonlReader {
    lines: Lines<BufReader<Stdin>>,
    schema: RowSchema,
}

impl JsonlReader {
    pub fn new(schema: RowSchema) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            schema,
        }
    }
}

impl RowReader for JsonlReader {
    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Row>, StepError>> + Send + '_>> {
        Box::pin(async move {
            loop {
                match self.lines.next_line().await? {
                    None => return Ok(None),
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => return parse_row(&line, &self.schema).map(Some),
                }
            }
        })
    }
}

fn parse_row(line: &str, schema: &RowSchema) -> Result<Row, StepError> {
    let parsed: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| StepError::Configuration(format!("malformed input line: {e}")))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| StepError::Configuration("input line is not a JSON object".to_string()))?;

    let mut values = Vec::with_capacity(schema.width());
    for field in &schema.fields {
        values.push(field_from_json(field, object.get(&field.name))?);
    }
    Ok(Row(values))
}

fn field_from_json(
    field: &FieldDescriptor,
    json: Option<&serde_json::Value>,
) -> Result<Value, StepError> {
    let Some(json) = json else {
        return Ok(Value::Null);
    };
    if json.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || StepError::Coercion {
        field: field.name.clone(),
        message: format!("cannot read a {} from {json}", field.kind.name()),
    };
    match field.kind {
        TypeKind::String => Ok(Value::String(match json.as_str() {
            Some(s) => s.to_string(),
            None => json.to_string(),
        })),
        TypeKind::Integer => match json {
            serde_json::Value::Number(n) => n.as_i64().map(Value::Integer).ok_or_else(mismatch),
            serde_json::Value::String(s) => {
                s.trim().parse().map(Value::Integer).map_err(|_| mismatch())
            }
            _ => Err(mismatch()),
        },
        TypeKind::Number => match json {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).ok_or_else(mismatch),
            serde_json::Value::String(s) => {
                s.trim().parse().map(Value::Number).map_err(|_| mismatch())
            }
            _ => Err(mismatch()),
        },
        TypeKind::BigNumber => {
            let text = match json {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return Err(mismatch()),
            };
            value::parse_decimal(&text)
                .map(|(m, s)| Value::BigNumber(m, s))
                .ok_or_else(mismatch)
        }
        TypeKind::Date => match json {
            serde_json::Value::String(s) => {
                value::parse_date(s).map(Value::Date).ok_or_else(mismatch)
            }
            serde_json::Value::Number(n) => n.as_i64().map(Value::Date).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        TypeKind::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        TypeKind::Binary => match json.as_str() {
            Some(s) => Ok(Value::Binary(s.as_bytes().to_vec())),
            None => Err(mismatch()),
        },
        TypeKind::None => Ok(Value::Null),
    }
}

// ---------- output ----------

pub struct JsonlWriter {
    stdout: Stdout,
    schema: Option<RowSchema>,
}

impl JsonlWriter {
    pub fn new() -> Self {
        Self {
            stdout: tokio::io::stdout(),
            schema: None,
        }
    }
}

impl Default for JsonlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RowWriter for JsonlWriter {
    fn schema_resolved(&mut self, schema: &RowSchema) {
        self.schema = Some(schema.clone());
    }

    fn emit(
        &mut self,
        row: Row,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + '_>> {
        Box::pin(async move {
            let json = match &self.schema {
                Some(schema) => {
                    let mut object = serde_json::Map::with_capacity(row.width());
                    for (field, value) in schema.fields.iter().zip(&row.0) {
                        object.insert(field.name.clone(), value_to_json(value));
                    }
                    serde_json::Value::Object(object)
                }
                // Layout not announced yet: fall back to the positional form.
                None => serde_json::Value::Array(row.0.iter().map(value_to_json).collect()),
            };
            let mut line = json.to_string();
            line.push('\n');
            self.stdout.write_all(line.as_bytes()).await?;
            Ok(())
        })
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Integer(v) => serde_json::Value::from(*v),
        Value::Number(v) => serde_json::Value::from(*v),
        Value::BigNumber(m, s) => serde_json::Value::String(value::format_decimal(*m, *s)),
        Value::Date(ms) => serde_json::Value::String(value::format_date(*ms)),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Binary(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::Null => serde_json::Value::Null,
    }
}

// ---------- events ----------

/// Logs step events; failed rows are mirrored onto stderr as JSON lines so
/// shell pipelines can capture them separately from the output stream.
#[derive(Default)]
pub struct ConsoleEvents {
    pub row_errors: u64,
    pub fatals: u64,
}

impl StepEvents for ConsoleEvents {
    fn row_error(&mut self, row: Row, message: &str, code: &'static str) {
        self.row_errors += 1;
        let rendered: Vec<serde_json::Value> = row.0.iter().map(value_to_json).collect();
        tracing::warn!(code, row = %serde_json::Value::Array(rendered), "{message}");
    }

    fn fatal(&mut self, message: &str) {
        self.fatals += 1;
        tracing::error!("{message}");
    }

    fn shutdown_requested(&mut self) {
        tracing::info!("shutdown requested by the script");
    }
}
