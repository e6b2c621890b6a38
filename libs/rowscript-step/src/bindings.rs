use rowscript_api::schema::RowSchema;
use rowscript_api::script::{Bindings, ScriptValue};
use rowscript_api::value::Row;

use crate::config::StepConfig;
use crate::control;

/// Assembles the name → value map handed to the script engine: one-time
/// context on the first row, row state on every row.
///
/// Binding keys are fixed strings. A user field whose name collides with a
/// reserved key silently shadows it — not guarded against, by compatibility.
pub struct BindingBuilder {
    bindings: Bindings,
    used_fields: Vec<usize>,
    row_number: i64,
}

impl Default for BindingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingBuilder {
    pub fn new() -> Self {
        Self {
            bindings: Bindings::new(),
            used_fields: Vec::new(),
            row_number: 0,
        }
    }

    /// One-time setup, before the first evaluation: step identity, script
    /// sources, pipeline context and the control-flow constants.
    pub fn prepare(&mut self, config: &StepConfig, used_fields: Vec<usize>) {
        self.used_fields = used_fields;
        let b = &mut self.bindings;

        b.set("step", ScriptValue::Text(config.step_name.clone()));
        b.set("step_name", ScriptValue::Text(config.step_name.clone()));
        b.set("pipeline_name", ScriptValue::Text(config.pipeline_name.clone()));

        // Every configured script is visible to the others as source text.
        for script in &config.scripts {
            b.set(script.name.clone(), ScriptValue::Text(script.source.clone()));
        }

        b.set("CONTINUE_PIPELINE", ScriptValue::Int(control::CONTINUE_PIPELINE));
        b.set("SKIP_ROW", ScriptValue::Int(control::SKIP_ROW));
        b.set("ABORT_PIPELINE", ScriptValue::Int(control::ABORT_PIPELINE));
        b.set("FAIL_PIPELINE", ScriptValue::Int(control::FAIL_PIPELINE));
    }

    /// Per-row rebinding, the first row included: current row, previous row,
    /// schema, each used field by name, and the row counter.
    pub fn bind_row(&mut self, schema: &RowSchema, row: &Row, last_row: Option<&Row>) {
        let b = &mut self.bindings;

        b.set("row", row_to_script(row));
        b.set(
            "last_row",
            last_row.map(row_to_script).unwrap_or(ScriptValue::Null),
        );
        b.set("row_meta", schema_to_script(schema));

        for &i in &self.used_fields {
            let field = &schema.fields[i];
            // Normal-storage form: fully decoded before the script sees it.
            b.set(field.name.clone(), ScriptValue::from_value(&row.0[i]));
        }

        self.row_number += 1;
        b.set("row_number", ScriptValue::Int(self.row_number));
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    pub fn row_number(&self) -> i64 {
        self.row_number
    }
}

fn row_to_script(row: &Row) -> ScriptValue {
    ScriptValue::Array(row.0.iter().map(ScriptValue::from_value).collect())
}

fn schema_to_script(schema: &RowSchema) -> ScriptValue {
    ScriptValue::Array(
        schema
            .fields
            .iter()
            .map(|f| {
                ScriptValue::Map(vec![
                    ("name".to_string(), ScriptValue::Text(f.name.clone())),
                    ("type".to_string(), ScriptValue::Text(f.kind.name().to_string())),
                    ("length".to_string(), ScriptValue::Int(f.length as i64)),
                    ("precision".to_string(), ScriptValue::Int(f.precision as i64)),
                ])
            })
            .collect(),
    )
}
