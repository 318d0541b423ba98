//! Periodic metrics flush
//!
//! Runs as an async task: on every tick it flushes the [`MetricsService`]
//! (hooks, rate computation, resets) and logs the formatted result.

use crate::{HumanFormatter, JsonFormatter, MetricsFormatter, MetricsService};
use sluice_config::{MetricsConfig, MetricsFormat};
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metrics flush loop
pub struct MetricsReporter {
    config: MetricsConfig,
    service: Arc<MetricsService>,
    formatter: Box<dyn MetricsFormatter>,
}

impl MetricsReporter {
    pub fn new(service: Arc<MetricsService>, config: MetricsConfig) -> Self {
        let formatter: Box<dyn MetricsFormatter> = match config.format {
            MetricsFormat::Human => Box::new(HumanFormatter::new()),
            MetricsFormat::Json => Box::new(JsonFormatter::new()),
        };
        Self {
            config,
            service,
            formatter,
        }
    }

    /// Run until cancellation
    pub async fn run(self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            format = ?self.config.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Flush once and log every line
    pub fn report(&self) -> usize {
        let snapshots = self.service.flush();
        let lines = self.formatter.format(&snapshots);
        for line in &lines {
            info!("{}", line);
        }
        lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;
    use std::time::Duration;

    #[test]
    fn test_report_flushes_service() {
        let service = Arc::new(MetricsService::new());
        let counter = service.create_counter("c", Tags::new(), &["n"], true).unwrap();
        counter.add("n", 3.0);

        let reporter = MetricsReporter::new(service, MetricsConfig::default());
        assert_eq!(reporter.report(), 1);
        assert_eq!(counter.get("n"), 0.0);
    }

    #[tokio::test]
    async fn test_run_disabled() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };

        let reporter = MetricsReporter::new(Arc::new(MetricsService::new()), config);
        // Returns immediately when disabled
        reporter.run(CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn test_run_cancellation() {
        let config = MetricsConfig {
            enabled: true,
            interval: Duration::from_millis(10),
            format: MetricsFormat::Json,
        };

        let service = Arc::new(MetricsService::new());
        let counter = service.create_counter("c", Tags::new(), &["n"], true).unwrap();
        counter.add("n", 1.0);

        let reporter = MetricsReporter::new(service, config);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        reporter.run(cancel).await;
        assert_eq!(counter.get("n"), 0.0);
    }
}
