use rowscript_api::error::StepError;
use rowscript_api::schema::{FieldDescriptor, RowSchema};
use rowscript_api::script::{Bindings, ScriptValue};
use rowscript_api::value::Row;

use crate::coerce::coerce;
use crate::config::OutputFieldSpec;

/// Merges coerced field values into the outgoing row.
///
/// Replace indices and the output width are computed once, before the first
/// row; per-row assembly is purely mechanical after that.
#[derive(Debug)]
pub struct OutputAssembler {
    specs: Vec<OutputFieldSpec>,
    /// Row position to overwrite per spec; `None` means append.
    replace_index: Vec<Option<usize>>,
    input_width: usize,
    output_width: usize,
}

impl OutputAssembler {
    /// Resolve replace targets and extend the upstream schema with the
    /// declared output fields. An unresolved replace target is fatal.
    pub fn prepare(
        specs: &[OutputFieldSpec],
        input_schema: &RowSchema,
    ) -> Result<(Self, RowSchema), StepError> {
        let mut output_schema = input_schema.clone();
        let mut replace_index = Vec::with_capacity(specs.len());

        for spec in specs {
            let descriptor = FieldDescriptor {
                name: spec.output_name().to_string(),
                kind: spec.kind,
                length: spec.length,
                precision: spec.precision,
            };
            if spec.replace {
                // Locate by binding name first, then by the rename alias.
                let index = input_schema
                    .index_of(&spec.binding)
                    .or_else(|| {
                        spec.rename
                            .as_deref()
                            .filter(|r| !r.is_empty())
                            .and_then(|r| input_schema.index_of(r))
                    })
                    .ok_or_else(|| {
                        StepError::Configuration(format!(
                            "field to replace '{}' not found in the input schema",
                            spec.binding
                        ))
                    })?;
                output_schema.fields[index] = descriptor;
                replace_index.push(Some(index));
            } else {
                output_schema.fields.push(descriptor);
                replace_index.push(None);
            }
        }

        let assembler = Self {
            specs: specs.to_vec(),
            replace_index,
            input_width: input_schema.width(),
            output_width: output_schema.width(),
        };
        Ok((assembler, output_schema))
    }

    /// Copy the input row, coerce each declared field and place it — in the
    /// replace slot or at the append cursor seeded at the upstream width.
    pub fn assemble(
        &self,
        row: &Row,
        bindings: &Bindings,
        script_result: &ScriptValue,
    ) -> Result<Row, StepError> {
        let mut out = row.0.clone();
        out.resize(self.output_width, rowscript_api::value::Value::Null);

        let mut cursor = self.input_width;
        for (spec, replace) in self.specs.iter().zip(&self.replace_index) {
            let raw = if spec.script_result {
                script_result
            } else {
                bindings.get(&spec.binding).unwrap_or(&ScriptValue::Null)
            };
            let typed = coerce(raw, spec.kind, spec.output_name())?;
            match replace {
                Some(index) => out[*index] = typed,
                None => {
                    out[cursor] = typed;
                    cursor += 1;
                }
            }
        }
        Ok(Row(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowscript_api::value::{TypeKind, Value};

    fn spec(binding: &str, kind: TypeKind) -> OutputFieldSpec {
        OutputFieldSpec {
            binding: binding.to_string(),
            rename: None,
            kind,
            length: -1,
            precision: -1,
            replace: false,
            script_result: false,
        }
    }

    fn input_schema() -> RowSchema {
        RowSchema::new(vec![
            FieldDescriptor::new("a", TypeKind::Integer),
            FieldDescriptor::new("b", TypeKind::String),
        ])
    }

    #[test]
    fn appended_fields_follow_declaration_order() {
        let specs = vec![spec("x", TypeKind::Integer), spec("y", TypeKind::String)];
        let (assembler, schema) = OutputAssembler::prepare(&specs, &input_schema()).unwrap();
        assert_eq!(schema.index_of("x"), Some(2));
        assert_eq!(schema.index_of("y"), Some(3));

        let mut bindings = Bindings::new();
        bindings.set("x", ScriptValue::Int(10));
        bindings.set("y", ScriptValue::Text("hi".into()));
        let row = Row(vec![Value::Integer(1), Value::String("val".into())]);
        let out = assembler
            .assemble(&row, &bindings, &ScriptValue::Null)
            .unwrap();
        assert_eq!(
            out.0,
            vec![
                Value::Integer(1),
                Value::String("val".into()),
                Value::Integer(10),
                Value::String("hi".into()),
            ]
        );
    }

    #[test]
    fn replace_overwrites_in_place() {
        let mut replacing = spec("b", TypeKind::Integer);
        replacing.replace = true;
        let (assembler, schema) = OutputAssembler::prepare(&[replacing], &input_schema()).unwrap();
        assert_eq!(schema.width(), 2);
        assert_eq!(schema.fields[1].kind, TypeKind::Integer);

        let mut bindings = Bindings::new();
        bindings.set("b", ScriptValue::Int(99));
        let row = Row(vec![Value::Integer(1), Value::String("old".into())]);
        let out = assembler
            .assemble(&row, &bindings, &ScriptValue::Null)
            .unwrap();
        assert_eq!(out.0, vec![Value::Integer(1), Value::Integer(99)]);
    }

    #[test]
    fn replace_falls_back_to_rename_alias() {
        let mut replacing = spec("computed", TypeKind::String);
        replacing.replace = true;
        replacing.rename = Some("b".into());
        let (assembler, schema) = OutputAssembler::prepare(&[replacing], &input_schema()).unwrap();
        assert_eq!(schema.fields[1].name, "b");

        let mut bindings = Bindings::new();
        bindings.set("computed", ScriptValue::Text("new".into()));
        let row = Row(vec![Value::Integer(1), Value::String("old".into())]);
        let out = assembler
            .assemble(&row, &bindings, &ScriptValue::Null)
            .unwrap();
        assert_eq!(out.0[1], Value::String("new".into()));
    }

    #[test]
    fn unresolved_replace_target_is_a_configuration_error() {
        let mut replacing = spec("missing", TypeKind::String);
        replacing.replace = true;
        replacing.rename = Some("also_missing".into());
        let err = OutputAssembler::prepare(&[replacing], &input_schema()).expect_err("must fail");
        assert_eq!(err.code(), "CFG-001");
    }

    #[test]
    fn script_result_field_reads_the_top_level_result() {
        let mut result_spec = spec("whatever", TypeKind::Number);
        result_spec.script_result = true;
        let (assembler, _) = OutputAssembler::prepare(&[result_spec], &input_schema()).unwrap();
        let row = Row(vec![Value::Integer(1), Value::Null]);
        let out = assembler
            .assemble(&row, &Bindings::new(), &ScriptValue::Int(5))
            .unwrap();
        assert_eq!(out.0[2], Value::Number(5.0));
    }

    #[test]
    fn unbound_field_assembles_as_null() {
        let specs = vec![spec("ghost", TypeKind::String)];
        let (assembler, _) = OutputAssembler::prepare(&specs, &input_schema()).unwrap();
        let row = Row(vec![Value::Integer(1), Value::Null]);
        let out = assembler
            .assemble(&row, &Bindings::new(), &ScriptValue::Null)
            .unwrap();
        assert_eq!(out.0[2], Value::Null);
    }
}
