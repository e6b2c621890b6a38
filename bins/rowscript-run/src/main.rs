mod io;

use std::sync::Arc;

use clap::Parser;

use rowscript_api::schema::RowSchema;
use rowscript_step::registry;
use rowscript_step::runner::StepRunner;
use rowscript_step::step::ScriptTransform;

#[derive(Parser)]
#[command(
    name = "rowscript-run",
    about = "Run a scripted row transform over JSON lines"
)]
struct Cli {
    /// Path to TOML step configuration file.
    #[arg(long, default_value = "step.toml", env = "ROWSCRIPT_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    registry::global().register(Arc::new(rowscript_engine_rhai::RhaiEngineFactory));

    tracing::info!(config = %cli.config, "loading step configuration");
    let config = match rowscript_step::config::StepConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "failed to load configuration");
            std::process::exit(1);
        }
    };

    let schema = RowSchema::new(config.input.clone());
    if schema.width() == 0 {
        tracing::warn!("no [[input]] fields declared, upstream values will not be bound");
    }

    let transform = match ScriptTransform::new(config, registry::global()) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "failed to initialize step");
            std::process::exit(1);
        }
    };

    let reader = io::JsonlReader::new(schema.clone());
    let runner = StepRunner::new(
        transform,
        schema,
        Box::new(reader),
        Box::new(io::JsonlWriter::new()),
        Box::new(io::ConsoleEvents::default()),
    );

    match runner.run().await {
        Ok(summary) => {
            tracing::info!(
                rows_read = summary.rows_read,
                rows_emitted = summary.rows_emitted,
                row_errors = summary.row_errors,
                "done"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "stream failed");
            std::process::exit(1);
        }
    }
}
