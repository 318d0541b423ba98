//! Pipeline assembly and the main run loop

use std::sync::Arc;

use anyhow::{Context, Result};
use sluice_config::Config;
use sluice_metrics::{MetricsReporter, MetricsService};
use sluice_pipeline::{Pipeline, PipelineRegistry, Source, Stage};
use sluice_sinks::{StdoutConfig, StdoutSink};
use sluice_sources::LineSource;
use sluice_transform::JsonParser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Cli;

/// Run `stdin → [parse] → stdout` until input ends or a shutdown signal
pub async fn run(config: Config, cli: &Cli) -> Result<()> {
    let metrics = Arc::new(MetricsService::new());
    let registry = Arc::new(PipelineRegistry::new(metrics.clone()));
    let cancel = CancellationToken::new();

    let source = Arc::new(LineSource::stdin("stdin"));
    let pipeline = build_pipeline(&config, cli, &metrics, source.clone())?;
    registry
        .register(pipeline.clone())
        .context("failed to register pipeline")?;

    let reporter_task = config.metrics.enabled.then(|| {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.clone());
        tokio::spawn(reporter.run(cancel.clone()))
    });

    #[cfg(unix)]
    spawn_clear_errors_handler(registry.clone(), cancel.clone());

    registry.finalize();
    info!(pipeline = %pipeline.id(), depths = pipeline.depths(), "sluice running");

    tokio::select! {
        _ = wait_for_shutdown() => info!("shutdown signal received, stopping pipelines..."),
        _ = source.exhausted() => info!("input exhausted, stopping pipelines..."),
    }

    registry.stop().await;
    cancel.cancel();
    if let Some(task) = reporter_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "metrics reporter panicked");
    }

    if let Some(record) = pipeline.error() {
        warn!(pipeline = %pipeline.id(), error = %record.error, "pipeline stopped in error");
    }
    Ok(())
}

fn build_pipeline(
    config: &Config,
    cli: &Cli,
    metrics: &Arc<MetricsService>,
    source: Arc<LineSource>,
) -> Result<Arc<Pipeline>> {
    let mut pipeline_config = config.pipeline(&cli.pipeline);
    if cli.keep_going {
        pipeline_config.stop_on_errors = false;
    }

    let pipeline = Pipeline::builder(cli.pipeline.as_str())
        .config(pipeline_config)
        .metrics_service(metrics.clone())
        .build()
        .context("failed to create pipeline")?;

    let mut stages = Vec::new();
    if !cli.raw {
        stages.push(Stage::processor(JsonParser::new("parse")));
    }
    let stdout = if cli.pretty {
        StdoutConfig::pretty()
    } else {
        StdoutConfig::default()
    };
    stages.push(Stage::sink(StdoutSink::with_config("stdout", stdout)));

    pipeline
        .build([source as Arc<dyn Source>], stages)
        .context("failed to build pipeline")?;
    Ok(pipeline)
}

/// SIGUSR1 clears pipeline errors so stopped pipelines resume
#[cfg(unix)]
fn spawn_clear_errors_handler(registry: Arc<PipelineRegistry>, cancel: CancellationToken) {
    let mut sig = match signal::unix::signal(signal::unix::SignalKind::user_defined1()) {
        Ok(sig) => sig,
        Err(e) => {
            error!(error = %e, "failed to install SIGUSR1 handler");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = sig.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let cleared = registry.clear_errors();
                    info!(cleared, "SIGUSR1: pipeline errors cleared");
                }
            }
        }
    });
    info!("SIGUSR1 handler installed for error reset");
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
