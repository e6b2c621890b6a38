use std::fmt;

use crate::error::StepError;
use crate::script::{Bindings, ScriptValue};

/// Handle to a script pre-compiled by an engine.
///
/// Opaque to the core; the engine resolves it to whatever internal
/// representation it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledId(pub usize);

/// Compilation or evaluation failure reported by a script engine, with the
/// source location when the engine provides one.
#[derive(Debug, Clone)]
pub struct ScriptFault {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ScriptFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Diagnostic location suffix, `--> line:column` when known.
    pub fn location(&self) -> String {
        match (self.line, self.column) {
            (Some(line), Some(column)) => format!("--> {line}:{column}"),
            (Some(line), None) => format!("--> {line}"),
            _ => "<unknown>".to_string(),
        }
    }
}

impl fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.message, self.location())
    }
}

/// One live evaluator instance, exclusively owned by a single step instance.
///
/// Evaluation is always against the explicit bindings map: state goes in,
/// mutated bindings plus the script's top-level result come out.
pub trait ScriptEngine: Send {
    /// Ahead-of-time compilation. Engines without support return `Ok(None)`
    /// and the caller falls back to [`ScriptEngine::eval_source`].
    fn compile(&mut self, source: &str) -> Result<Option<CompiledId>, ScriptFault>;

    fn eval_source(
        &mut self,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<ScriptValue, ScriptFault>;

    fn eval_compiled(
        &mut self,
        id: CompiledId,
        bindings: &mut Bindings,
    ) -> Result<ScriptValue, ScriptFault>;
}

/// Factory for one scripting language, registered process-wide.
///
/// Lookup by `language()` first, then `aliases()`, case-insensitively.
pub trait EngineFactory: Send + Sync {
    fn language(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn create(&self) -> Result<Box<dyn ScriptEngine>, StepError>;
}
