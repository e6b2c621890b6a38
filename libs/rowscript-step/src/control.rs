use rowscript_api::script::{Bindings, ScriptValue};

/// Binding a script sets to steer per-row control flow.
pub const STATUS_BINDING: &str = "pipeline_status";

/// Integer constants published into the bindings for script authors.
pub const CONTINUE_PIPELINE: i64 = 0;
pub const SKIP_ROW: i64 = 1;
pub const ABORT_PIPELINE: i64 = -1;
pub const FAIL_PIPELINE: i64 = -2;

/// Per-row signal derived from the status binding after evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSignal {
    /// Emit the row and keep going.
    Continue,
    /// Drop the row, keep going.
    Skip,
    /// Stop pulling rows, close the output cleanly.
    Abort,
    /// Stop pulling rows, flag one pipeline error, request shutdown.
    Error,
}

/// Whether the status binding is consulted at all — decided once, on the
/// first successful evaluation, and frozen for the rest of the stream.
#[derive(Debug, Default)]
pub struct StatusCheck {
    decided: bool,
    enabled: bool,
}

impl StatusCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-row probe: a status binding that is absent after the first
    /// evaluation disables checking permanently, even if a later row
    /// defines it.
    pub fn decide(&mut self, bindings: &Bindings) {
        if self.decided {
            return;
        }
        self.decided = true;
        self.enabled = bindings.contains(STATUS_BINDING);
        if self.enabled {
            tracing::debug!(binding = STATUS_BINDING, "status binding found, checking row signal every row");
        } else {
            tracing::debug!(binding = STATUS_BINDING, "no status binding found, signal checking disabled");
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Read the signal for the current row. Non-integer values and
    /// unrecognized integers fold to `Continue` — kept as-is for
    /// compatibility, see the `unknown_integer_folds_to_continue` test.
    pub fn signal(&self, bindings: &Bindings) -> RowSignal {
        if !self.enabled {
            return RowSignal::Continue;
        }
        match bindings.get(STATUS_BINDING) {
            Some(ScriptValue::Int(v)) => match *v {
                SKIP_ROW => RowSignal::Skip,
                ABORT_PIPELINE => RowSignal::Abort,
                FAIL_PIPELINE => RowSignal::Error,
                _ => RowSignal::Continue,
            },
            _ => RowSignal::Continue,
        }
    }
}
