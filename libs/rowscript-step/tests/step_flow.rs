//! End-to-end step lifecycle: reader -> transform -> writer against the
//! embedded rhai engine.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use rowscript_api::error::StepError;
use rowscript_api::ports::{RowReader, RowWriter, StepEvents};
use rowscript_api::schema::RowSchema;
use rowscript_api::value::{Row, Value};
use rowscript_engine_rhai::RhaiEngineFactory;
use rowscript_step::config::StepConfig;
use rowscript_step::registry::EngineRegistry;
use rowscript_step::runner::{RunSummary, StepRunner};
use rowscript_step::step::ScriptTransform;

// ---------- in-memory ports ----------

struct VecReader {
    rows: VecDeque<Row>,
}

impl RowReader for VecReader {
    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Row>, StepError>> + Send + '_>> {
        let next = self.rows.pop_front();
        Box::pin(async move { Ok(next) })
    }
}

#[derive(Default, Clone)]
struct Sink {
    rows: Arc<Mutex<Vec<Row>>>,
    schema: Arc<Mutex<Option<RowSchema>>>,
}

impl Sink {
    fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap().clone()
    }

    fn field_names(&self) -> Vec<String> {
        self.schema
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl RowWriter for Sink {
    fn schema_resolved(&mut self, schema: &RowSchema) {
        *self.schema.lock().unwrap() = Some(schema.clone());
    }

    fn emit(
        &mut self,
        row: Row,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + '_>> {
        self.rows.lock().unwrap().push(row);
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    RowError { code: &'static str },
    Fatal(String),
    Shutdown,
}

#[derive(Default, Clone)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl StepEvents for Recorder {
    fn row_error(&mut self, _row: Row, _message: &str, code: &'static str) {
        self.events.lock().unwrap().push(Event::RowError { code });
    }

    fn fatal(&mut self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Fatal(message.to_string()));
    }

    fn shutdown_requested(&mut self) {
        self.events.lock().unwrap().push(Event::Shutdown);
    }
}

// ---------- harness ----------

fn int_row(values: &[i64]) -> Row {
    Row(values.iter().map(|v| Value::Integer(*v)).collect())
}

async fn run_step(
    config: &str,
    input: Vec<Row>,
) -> (Result<RunSummary, StepError>, Sink, Recorder) {
    let config = StepConfig::parse(config).expect("config parses");
    let schema = RowSchema::new(config.input.clone());

    let registry = EngineRegistry::new("rhai");
    registry.register(Arc::new(RhaiEngineFactory));
    let transform = ScriptTransform::new(config, &registry).expect("step initializes");

    let sink = Sink::default();
    let recorder = Recorder::default();
    let runner = StepRunner::new(
        transform,
        schema,
        Box::new(VecReader { rows: input.into() }),
        Box::new(sink.clone()),
        Box::new(recorder.clone()),
    );
    (runner.run().await, sink, recorder)
}

// ---------- scenarios ----------

#[tokio::test]
async fn unknown_language_falls_back_and_script_result_is_typed() {
    let config = r#"
        language = "groovy"

        [[input]]
        name = "a"
        type = "integer"

        [[input]]
        name = "b"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "a + b"

        [[fields]]
        binding = "sum"
        type = "number"
        script_result = true
    "#;
    let (result, sink, recorder) = run_step(config, vec![int_row(&[2, 3])]).await;

    let summary = result.expect("stream completes");
    assert_eq!(summary.rows_read, 1);
    assert_eq!(summary.rows_emitted, 1);
    assert_eq!(
        sink.rows(),
        vec![Row(vec![
            Value::Integer(2),
            Value::Integer(3),
            Value::Number(5.0),
        ])]
    );
    assert_eq!(sink.field_names(), vec!["a", "b", "sum"]);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn abort_stops_the_stream_after_clean_rows() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = """
        let pipeline_status = if row_number == 3 { ABORT_PIPELINE } else { CONTINUE_PIPELINE };
        id * 2
        """

        [[fields]]
        binding = "doubled"
        type = "integer"
        script_result = true
    "#;
    let input: Vec<Row> = (1..=10).map(|i| int_row(&[i])).collect();
    let (result, sink, recorder) = run_step(config, input).await;

    let summary = result.expect("abort is a handled termination");
    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_emitted, 2);
    assert_eq!(
        sink.rows(),
        vec![
            Row(vec![Value::Integer(1), Value::Integer(2)]),
            Row(vec![Value::Integer(2), Value::Integer(4)]),
        ]
    );
    assert_eq!(recorder.events(), vec![Event::Shutdown]);
}

#[tokio::test]
async fn fail_signal_flags_fatal_before_first_emit() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "let pipeline_status = FAIL_PIPELINE; 1"

        [[fields]]
        binding = "out"
        type = "integer"
        script_result = true
    "#;
    let input: Vec<Row> = (1..=5).map(|i| int_row(&[i])).collect();
    let (result, sink, recorder) = run_step(config, input).await;

    let summary = result.expect("signalled error is a handled termination");
    assert_eq!(summary.rows_read, 1);
    assert_eq!(summary.rows_emitted, 0);
    assert!(sink.rows().is_empty());
    let events = recorder.events();
    assert!(matches!(events[0], Event::Fatal(_)));
    assert_eq!(events[1], Event::Shutdown);
}

#[tokio::test]
async fn skip_drops_rows_silently() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = """
        let pipeline_status = if id % 2 == 1 { SKIP_ROW } else { CONTINUE_PIPELINE };
        id
        """

        [[fields]]
        binding = "copy"
        type = "integer"
        script_result = true
    "#;
    let input: Vec<Row> = (1..=4).map(|i| int_row(&[i])).collect();
    let (result, sink, recorder) = run_step(config, input).await;

    let summary = result.expect("stream completes");
    assert_eq!(summary.rows_read, 4);
    assert_eq!(summary.rows_emitted, 2);
    assert_eq!(
        sink.rows(),
        vec![
            Row(vec![Value::Integer(2), Value::Integer(2)]),
            Row(vec![Value::Integer(4), Value::Integer(4)]),
        ]
    );
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn replace_overwrites_the_upstream_field_in_place() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[input]]
        name = "name"
        type = "string"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "name = name + \"!\";"

        [[fields]]
        binding = "name"
        type = "string"
        replace = true
    "#;
    let input = vec![Row(vec![Value::Integer(1), Value::String("ann".into())])];
    let (result, sink, _recorder) = run_step(config, input).await;

    result.expect("stream completes");
    assert_eq!(
        sink.rows(),
        vec![Row(vec![Value::Integer(1), Value::String("ann!".into())])]
    );
    assert_eq!(sink.field_names(), vec!["id", "name"]);
}

#[tokio::test]
async fn replace_falls_back_to_the_rename_alias() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[input]]
        name = "name"
        type = "string"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "let tag = \"x\";"

        [[fields]]
        binding = "tag"
        rename = "name"
        type = "string"
        replace = true
    "#;
    let input = vec![Row(vec![Value::Integer(1), Value::String("ann".into())])];
    let (result, sink, _recorder) = run_step(config, input).await;

    result.expect("stream completes");
    assert_eq!(
        sink.rows(),
        vec![Row(vec![Value::Integer(1), Value::String("x".into())])]
    );
}

#[tokio::test]
async fn missing_replace_target_fails_before_any_row() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "1"

        [[fields]]
        binding = "ghost"
        type = "string"
        replace = true
    "#;
    let (result, sink, recorder) = run_step(config, vec![int_row(&[1])]).await;

    let err = result.expect_err("unknown replace target");
    assert_eq!(err.code(), "CFG-001");
    assert!(sink.rows().is_empty());
    assert!(matches!(recorder.events()[0], Event::Fatal(_)));
}

#[tokio::test]
async fn start_script_state_persists_across_rows() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "startup"
        purpose = "start"
        source = "let counter = 0;"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "counter += 1;"

        [[fields]]
        binding = "counter"
        type = "integer"
    "#;
    let input: Vec<Row> = (1..=3).map(|i| int_row(&[10 + i])).collect();
    let (result, sink, _recorder) = run_step(config, input).await;

    result.expect("stream completes");
    let counters: Vec<Value> = sink.rows().iter().map(|r| r.0[1].clone()).collect();
    assert_eq!(
        counters,
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}

#[tokio::test]
async fn end_script_failure_surfaces_after_all_rows() {
    let config = r#"
        [[input]]
        name = "id"
        type = "integer"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "1"

        [[scripts]]
        name = "shutdown"
        purpose = "end"
        source = "throw \"cleanup failed\";"

        [[fields]]
        binding = "out"
        type = "integer"
        script_result = true
    "#;
    let input: Vec<Row> = (1..=2).map(|i| int_row(&[i])).collect();
    let (result, sink, recorder) = run_step(config, input).await;

    let err = result.expect_err("end script fails");
    assert_eq!(err.code(), "SCR-001");
    assert_eq!(sink.rows().len(), 2);
    match recorder.events().last() {
        Some(Event::Fatal(message)) => assert!(message.contains("cleanup failed")),
        other => panic!("expected a fatal event, got {other:?}"),
    }
}

#[tokio::test]
async fn end_script_is_skipped_when_no_row_arrived() {
    let config = r#"
        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "1"

        [[scripts]]
        name = "shutdown"
        purpose = "end"
        source = "throw \"never runs\";"

        [[fields]]
        binding = "out"
        type = "integer"
        script_result = true
    "#;
    let (result, sink, recorder) = run_step(config, Vec::new()).await;

    let summary = result.expect("empty stream completes");
    assert_eq!(summary.rows_read, 0);
    assert!(sink.rows().is_empty());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn row_errors_route_to_the_error_port_when_enabled() {
    let config = r#"
        error_routing = true

        [[input]]
        name = "s"
        type = "string"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "s"

        [[fields]]
        binding = "n"
        type = "integer"
        script_result = true
    "#;
    let input = vec![
        Row(vec![Value::String("abc".into())]),
        Row(vec![Value::String("5".into())]),
    ];
    let (result, sink, recorder) = run_step(config, input).await;

    let summary = result.expect("routed rows keep the stream alive");
    assert_eq!(summary.rows_read, 2);
    assert_eq!(summary.rows_emitted, 1);
    assert_eq!(summary.row_errors, 1);
    assert_eq!(
        sink.rows(),
        vec![Row(vec![Value::String("5".into()), Value::Integer(5)])]
    );
    assert_eq!(recorder.events(), vec![Event::RowError { code: "VAL-001" }]);
}

#[tokio::test]
async fn row_errors_are_fatal_when_routing_is_disabled() {
    let config = r#"
        [[input]]
        name = "s"
        type = "string"

        [[scripts]]
        name = "transform"
        purpose = "transform"
        source = "s"

        [[fields]]
        binding = "n"
        type = "integer"
        script_result = true
    "#;
    let input = vec![Row(vec![Value::String("abc".into())])];
    let (result, sink, recorder) = run_step(config, input).await;

    let err = result.expect_err("unrouted row error fails the stream");
    assert_eq!(err.code(), "VAL-001");
    assert!(sink.rows().is_empty());
    assert!(matches!(recorder.events()[0], Event::Fatal(_)));
}
