//! stemsplit entry point

use clap::Parser;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use stemsplit::config::{Cli, Settings};
use stemsplit::delivery::{S3Store, StorageBackend};
use stemsplit::pipeline::Handler;
use stemsplit::StemsplitError;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Build settings from CLI
    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Fatal error: failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !stemsplit::separation::ONNX_AVAILABLE {
        warn!("Built without the 'onnx' feature: separation requests will fail. Rebuild with --features onnx");
    }

    let storage = runtime.block_on(connect_storage(&settings, runtime.handle().clone()));
    let handler = Arc::new(Handler::from_settings(settings, storage));

    match &cli.event {
        Some(path) => run_local(&handler, path),
        None => match runtime.block_on(serve(handler)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Fatal error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(cli: &Cli) {
    let filter = cli.log_level().to_string().to_lowercase();

    // CloudWatch does not render ANSI colours
    let in_lambda = std::env::var_os("AWS_LAMBDA_FUNCTION_NAME").is_some();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_ansi(!in_lambda)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve remote delivery; a missing setup is reported per request, not at startup
async fn connect_storage(settings: &Settings, handle: Handle) -> StorageBackend {
    let Some(bucket) = settings.bucket.as_deref() else {
        debug!("No bucket configured, remote delivery disabled");
        return StorageBackend::Unavailable("No bucket configured".to_string());
    };

    match S3Store::connect(Some(bucket), handle).await {
        Ok(store) => StorageBackend::Configured(Arc::new(store)),
        Err(e) => {
            warn!("Remote delivery unavailable: {}", e);
            let reason = match e {
                StemsplitError::StorageConfig(reason) => reason,
                other => other.to_string(),
            };
            StorageBackend::Unavailable(reason)
        }
    }
}

/// Process one request file and print the response
fn run_local(handler: &Handler, path: &Path) -> ExitCode {
    let event = match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()))
    {
        Ok(event) => event,
        Err(e) => {
            eprintln!(
                "Error: cannot read request {}: {}\n\n  Tip: The file must contain a JSON object, e.g.\n    {{\"audio_base64\": \"...\", \"stems\": 2}}",
                path.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let response = handler.handle(&event);
    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: failed to serialize response: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Run as a serverless function until the runtime shuts down
async fn serve(handler: Arc<Handler>) -> Result<(), lambda_runtime::Error> {
    info!("Waiting for invocations");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move {
            debug!("Invocation {}", event.context.request_id);
            let payload = event.payload;

            // The pipeline is synchronous and blocks on uploads
            let response = tokio::task::spawn_blocking(move || handler.handle(&payload)).await?;
            Ok::<Value, lambda_runtime::Error>(response.to_json())
        }
    }))
    .await
}
