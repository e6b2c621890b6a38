use crate::engine::ScriptFault;

/// Error raised by the step core.
///
/// Row-level candidates ([`StepError::Evaluation`], [`StepError::Coercion`])
/// can be routed to the error port when per-row error routing is enabled;
/// everything else is fatal for the stream.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("script compilation failed {}: {}", .0.location(), .0.message)]
    Compilation(ScriptFault),

    #[error("script evaluation failed {}: {}", .0.location(), .0.message)]
    Evaluation(ScriptFault),

    #[error("cannot convert field '{field}': {message}")]
    Coercion { field: String, message: String },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    /// Stable code carried alongside routed row errors, so downstream error
    /// sinks can be implemented generically.
    pub fn code(&self) -> &'static str {
        match self {
            StepError::Configuration(_) => "CFG-001",
            StepError::Compilation(_) => "SCR-002",
            StepError::Evaluation(_) => "SCR-001",
            StepError::Coercion { .. } => "VAL-001",
            StepError::Engine(_) => "ENG-001",
            StepError::Io(_) => "IO-001",
        }
    }

    /// True for errors that abort only the current row when error routing is
    /// enabled for the stage.
    pub fn is_row_level(&self) -> bool {
        matches!(self, StepError::Evaluation(_) | StepError::Coercion { .. })
    }

    /// Add context to the error, preserving the variant.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            StepError::Configuration(msg) => StepError::Configuration(format!("{ctx}: {msg}")),
            StepError::Engine(msg) => StepError::Engine(format!("{ctx}: {msg}")),
            StepError::Compilation(mut fault) => {
                fault.message = format!("{ctx}: {}", fault.message);
                StepError::Compilation(fault)
            }
            StepError::Evaluation(mut fault) => {
                fault.message = format!("{ctx}: {}", fault.message);
                StepError::Evaluation(fault)
            }
            StepError::Coercion { field, message } => StepError::Coercion {
                field,
                message: format!("{ctx}: {message}"),
            },
            other => other,
        }
    }
}
