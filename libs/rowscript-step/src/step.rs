use rowscript_api::engine::{CompiledId, ScriptEngine};
use rowscript_api::error::StepError;
use rowscript_api::schema::RowSchema;
use rowscript_api::script::ScriptValue;
use rowscript_api::value::Row;

use crate::bindings::BindingBuilder;
use crate::config::{ScriptPurpose, StepConfig};
use crate::control::{RowSignal, StatusCheck};
use crate::output::OutputAssembler;
use crate::registry::EngineRegistry;
use crate::used_fields::used_fields;

/// Lifecycle state of a step instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// No row seen yet.
    Uninitialized,
    /// First row: one-time setup in progress.
    Compiling,
    /// Per-row processing.
    Steady,
    /// Upstream exhausted, end script running.
    Draining,
    Terminated,
}

/// What became of one input row.
#[derive(Debug, PartialEq)]
pub enum RowOutcome {
    Emitted(Row),
    Skipped,
    /// Script requested a clean stop; no error is flagged.
    Abort,
    /// Script signalled a pipeline error.
    Failed,
}

/// Drives the start/transform/end script lifecycle for one step instance.
///
/// Exclusively owns the engine handle, the compiled transform script and the
/// binding map for its whole lifetime. Strictly single-threaded; a pipeline
/// runs independent copies with nothing shared but the engine registry.
pub struct ScriptTransform {
    config: StepConfig,
    engine: Box<dyn ScriptEngine>,
    state: ExecutionState,
    transform_source: String,
    compiled_transform: Option<CompiledId>,
    builder: BindingBuilder,
    assembler: Option<OutputAssembler>,
    output_schema: Option<RowSchema>,
    status: StatusCheck,
    last_row: Option<Row>,
}

impl ScriptTransform {
    /// Validate the configuration and obtain an engine for the configured
    /// language (unknown names fall back to the registry default).
    pub fn new(config: StepConfig, registry: &EngineRegistry) -> Result<Self, StepError> {
        config.validate()?;
        let engine = registry.engine(&config.language)?;
        let transform_source = config
            .script(ScriptPurpose::Transform)
            .map(|s| s.source.clone())
            .ok_or_else(|| StepError::Configuration("no transform script".to_string()))?;

        Ok(Self {
            config,
            engine,
            state: ExecutionState::Uninitialized,
            transform_source,
            compiled_transform: None,
            builder: BindingBuilder::new(),
            assembler: None,
            output_schema: None,
            status: StatusCheck::new(),
            last_row: None,
        })
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Output schema, known after the first row.
    pub fn output_schema(&self) -> Option<&RowSchema> {
        self.output_schema.as_ref()
    }

    /// True once setup succeeded — errors from here on are row-scoped
    /// candidates for error routing.
    pub fn routes_row_errors(&self) -> bool {
        self.state == ExecutionState::Steady && self.config.error_routing
    }

    /// One-time setup: output geometry, used-field detection, one-time
    /// bindings, start script, transform pre-compilation. Any failure here
    /// is fatal and never retried.
    fn prepare_first_row(&mut self, schema: &RowSchema) -> Result<(), StepError> {
        self.state = ExecutionState::Compiling;

        let (assembler, output_schema) = OutputAssembler::prepare(&self.config.fields, schema)?;
        self.assembler = Some(assembler);
        self.output_schema = Some(output_schema);

        let used = used_fields(&self.transform_source, schema);
        tracing::debug!(
            step = %self.config.step_name,
            used_fields = used.len(),
            "using values from the input stream"
        );
        self.builder.prepare(&self.config, used);

        // Start script runs against the shared bindings, so its side effects
        // stay visible to every later evaluation.
        if let Some(start) = self.config.script(ScriptPurpose::Start) {
            let source = start.source.clone();
            tracing::debug!(step = %self.config.step_name, "start script found");
            self.eval_once(&source)
                .map_err(|e| e.with_context("start script"))?;
        }

        self.compiled_transform = self
            .engine
            .compile(&self.transform_source)
            .map_err(StepError::Compilation)?;

        self.state = ExecutionState::Steady;
        Ok(())
    }

    /// Evaluate a one-shot script, pre-compiling first when the engine
    /// supports it, evaluating raw otherwise.
    fn eval_once(&mut self, source: &str) -> Result<ScriptValue, StepError> {
        let compiled = self.engine.compile(source).map_err(StepError::Compilation)?;
        let result = match compiled {
            Some(id) => self.engine.eval_compiled(id, self.builder.bindings_mut()),
            None => self.engine.eval_source(source, self.builder.bindings_mut()),
        };
        result.map_err(StepError::Evaluation)
    }

    /// Process one input row. The caller keeps ownership of the row so it
    /// can be routed to the error port on failure.
    pub fn process_row(&mut self, schema: &RowSchema, row: &Row) -> Result<RowOutcome, StepError> {
        if self.state == ExecutionState::Uninitialized {
            self.prepare_first_row(schema)?;
        }

        let last = self.last_row.take();
        self.builder.bind_row(schema, row, last.as_ref());

        let evaluated = match self.compiled_transform {
            Some(id) => self
                .engine
                .eval_compiled(id, self.builder.bindings_mut()),
            None => self
                .engine
                .eval_source(&self.transform_source, self.builder.bindings_mut()),
        };
        // The previous row is remembered whether or not this one succeeded.
        self.last_row = Some(row.clone());
        let script_result = evaluated.map_err(StepError::Evaluation)?;

        self.status.decide(self.builder.bindings());
        match self.status.signal(self.builder.bindings()) {
            RowSignal::Continue => {
                let assembler = self
                    .assembler
                    .as_ref()
                    .ok_or_else(|| StepError::Engine("assembler not initialized".to_string()))?;
                let out = assembler.assemble(row, self.builder.bindings(), &script_result)?;
                Ok(RowOutcome::Emitted(out))
            }
            RowSignal::Skip => Ok(RowOutcome::Skipped),
            RowSignal::Abort => {
                self.state = ExecutionState::Terminated;
                Ok(RowOutcome::Abort)
            }
            RowSignal::Error => {
                self.state = ExecutionState::Terminated;
                Ok(RowOutcome::Failed)
            }
        }
    }

    /// Upstream exhausted: run the end script, once, if any row was seen.
    /// Rows are never reprocessed, whatever the end script does.
    pub fn finalize_stream(&mut self) -> Result<(), StepError> {
        if self.state == ExecutionState::Uninitialized {
            // No row ever arrived; there is nothing to drain.
            self.state = ExecutionState::Terminated;
            return Ok(());
        }
        self.state = ExecutionState::Draining;
        if let Some(end) = self.config.script(ScriptPurpose::End) {
            let source = end.source.clone();
            tracing::debug!(step = %self.config.step_name, "end script found");
            let result = self
                .engine
                .eval_source(&source, self.builder.bindings_mut());
            if let Err(fault) = result {
                self.state = ExecutionState::Terminated;
                return Err(StepError::Evaluation(fault).with_context("end script"));
            }
        }
        self.state = ExecutionState::Terminated;
        Ok(())
    }

    /// Rows seen so far (the value of the `row_number` binding).
    pub fn rows_seen(&self) -> i64 {
        self.builder.row_number()
    }
}
