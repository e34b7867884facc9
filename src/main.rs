use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use plate_overlay::config::{AppConfig, ConcurrencyMode};
use plate_overlay::runner;

/// Overlay a logo on the license plates of a batch of vehicle images.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Env file to load instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Override CONCURRENCY_MODE
    #[arg(long, value_enum)]
    mode: Option<ConcurrencyMode>,

    /// Override MAX_CONCURRENCY
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Print the run's metrics in Prometheus text format when done
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();

    let config = match &args.env_file {
        Some(path) => AppConfig::from_env_file(path),
        None => AppConfig::from_env(),
    };
    let config = match config.and_then(|c| c.with_overrides(args.mode, args.max_concurrency)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let prometheus_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    metrics::describe_counter!(
        "plate_overlay_tasks_succeeded_total",
        "Images processed and saved"
    );
    metrics::describe_counter!(
        "plate_overlay_tasks_failed_total",
        "Images that failed at any stage"
    );
    metrics::describe_counter!(
        "plate_overlay_poll_attempts_total",
        "Status queries issued to the processing API"
    );
    metrics::describe_histogram!(
        "plate_overlay_task_seconds",
        "Time to process one image end to end"
    );

    tracing::info!(
        mode = %config.concurrency_mode,
        max_concurrency = config.max_concurrency,
        "Starting plate-overlay"
    );

    let outcome = runner::run(&config).await;

    if let Some(handle) = &prometheus_handle {
        let rendered = handle.render();
        tracing::debug!(metrics = %rendered, "Run metrics");
        if args.print_metrics {
            print!("{rendered}");
        }
    }

    match outcome {
        Ok(result) => {
            println!(
                "Done: {} succeeded, {} failed ({} total)",
                result.succeeded,
                result.failed,
                result.total()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
