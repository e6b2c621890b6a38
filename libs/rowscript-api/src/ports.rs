use std::future::Future;
use std::pin::Pin;

use crate::error::StepError;
use crate::schema::RowSchema;
use crate::value::Row;

/// Pull-based upstream row supply.
pub trait RowReader: Send {
    /// `Ok(None)` signals end of input.
    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Row>, StepError>> + Send + '_>>;
}

/// Push-based downstream row sink.
pub trait RowWriter: Send {
    /// Announced once, before the first `emit`, when the step has resolved
    /// its output layout.
    fn schema_resolved(&mut self, _schema: &RowSchema) {}

    fn emit(&mut self, row: Row) -> Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + '_>>;
}

/// Error and shutdown signaling toward the owning pipeline.
///
/// Callbacks are synchronous; implementations must not block.
pub trait StepEvents: Send {
    /// One failed row, routed out of the stream. Carries the original row
    /// and a stable error code.
    fn row_error(&mut self, row: Row, message: &str, code: &'static str);

    /// One pipeline-level error flagged against the stream.
    fn fatal(&mut self, message: &str);

    /// Cooperative stop: the step will pull no further rows.
    fn shutdown_requested(&mut self);
}
