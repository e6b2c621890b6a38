use rowscript_api::error::StepError;
use rowscript_api::ports::{RowReader, RowWriter, StepEvents};
use rowscript_api::schema::RowSchema;

use crate::step::{RowOutcome, ScriptTransform};

/// Progress log interval, in rows.
const FEEDBACK_EVERY: u64 = 50_000;

/// Counters for one completed (or aborted) stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: u64,
    pub rows_emitted: u64,
    pub row_errors: u64,
}

/// Hosts one step instance: pulls rows from the reader, runs the transform,
/// pushes results to the writer and routes failures to the events port.
///
/// The loop is async only at the edges; the per-row work is synchronous and
/// CPU-bound. Abort/Error signals are cooperative — the runner stops pulling
/// but never interrupts an in-flight evaluation.
pub struct StepRunner {
    transform: ScriptTransform,
    schema: RowSchema,
    reader: Box<dyn RowReader>,
    writer: Box<dyn RowWriter>,
    events: Box<dyn StepEvents>,
}

impl StepRunner {
    pub fn new(
        transform: ScriptTransform,
        schema: RowSchema,
        reader: Box<dyn RowReader>,
        writer: Box<dyn RowWriter>,
        events: Box<dyn StepEvents>,
    ) -> Self {
        Self {
            transform,
            schema,
            reader,
            writer,
            events,
        }
    }

    /// Drive the stream to completion.
    ///
    /// Handled terminations (clean end, script abort, script-signalled
    /// error) return `Ok` — errors flagged through the events port are not
    /// doubled as an `Err`. `Err` means an unrouted fatal failure.
    pub async fn run(mut self) -> Result<RunSummary, StepError> {
        let mut summary = RunSummary::default();
        let mut schema_announced = false;

        loop {
            let row = match self.reader.next_row().await? {
                Some(row) => row,
                None => break,
            };
            summary.rows_read += 1;
            if summary.rows_read % FEEDBACK_EVERY == 0 {
                tracing::info!(rows = summary.rows_read, "rows processed");
            }

            match self.transform.process_row(&self.schema, &row) {
                Ok(RowOutcome::Emitted(out)) => {
                    if !schema_announced {
                        if let Some(schema) = self.transform.output_schema() {
                            self.writer.schema_resolved(schema);
                        }
                        schema_announced = true;
                    }
                    self.writer.emit(out).await?;
                    summary.rows_emitted += 1;
                }
                Ok(RowOutcome::Skipped) => {}
                Ok(RowOutcome::Abort) => {
                    tracing::info!(row = summary.rows_read, "script requested abort, closing output");
                    self.events.shutdown_requested();
                    return Ok(summary);
                }
                Ok(RowOutcome::Failed) => {
                    let message = "script signalled a pipeline error";
                    tracing::error!(row = summary.rows_read, message);
                    self.events.fatal(message);
                    self.events.shutdown_requested();
                    return Ok(summary);
                }
                Err(e) if e.is_row_level() && self.transform.routes_row_errors() => {
                    summary.row_errors += 1;
                    tracing::warn!(row = summary.rows_read, error = %e, code = e.code(), "row routed to error port");
                    self.events.row_error(row, &e.to_string(), e.code());
                }
                Err(e) => {
                    self.events.fatal(&e.to_string());
                    return Err(e);
                }
            }
        }

        // Upstream exhausted: run the end script if any row was seen.
        if let Err(e) = self.transform.finalize_stream() {
            self.events.fatal(&e.to_string());
            return Err(e);
        }

        tracing::debug!(
            rows_read = summary.rows_read,
            rows_emitted = summary.rows_emitted,
            row_errors = summary.row_errors,
            "stream complete"
        );
        Ok(summary)
    }

    /// Output schema, known once the first row has been processed.
    pub fn output_schema(&self) -> Option<&RowSchema> {
        self.transform.output_schema()
    }
}
