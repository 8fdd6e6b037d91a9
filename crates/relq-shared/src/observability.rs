//! Observability features: logging and metrics

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LoggingConfig, MetricsConfig, ObservabilityConfig};

/// Global observability system
static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Observability system for centralized logging and metrics
#[derive(Debug)]
pub struct ObservabilitySystem {
    metrics_enabled: bool,
}

impl ObservabilitySystem {
    /// Initialize the observability system. Fails when called twice.
    ///
    /// With metrics enabled this must run inside a Tokio runtime; the
    /// Prometheus exporter serves its HTTP listener from it.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        if OBSERVABILITY.get().is_some() {
            anyhow::bail!("Observability system already initialized");
        }

        Self::init_logging(&config.logging)?;

        if config.metrics.enabled {
            Self::init_metrics(&config.metrics)?;
        }

        OBSERVABILITY
            .set(Self {
                metrics_enabled: config.metrics.enabled,
            })
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    /// Initialize structured logging
    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let level = match config.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        let env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let registry = tracing_subscriber::registry().with(env_filter);

        match config.format.to_lowercase().as_str() {
            "json" => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(json_layer).try_init()?;
            }
            _ => {
                let pretty_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(pretty_layer).try_init()?;
            }
        }

        Ok(())
    }

    /// Install the Prometheus recorder with its scrape endpoint
    fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
        let bind_addr: SocketAddr = config.bind_address.parse()?;

        PrometheusBuilder::new()
            .with_http_listener(bind_addr)
            .install()?;

        info!("Prometheus metrics initialized on {}", bind_addr);
        Ok(())
    }

    /// Get the global observability system
    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }
}

/// Histogram of record query durations, labelled by `kind`. Failed queries
/// land here through their dropped [`PerfTimer`].
pub const QUERY_DURATION: &str = "relq_record_query_duration_seconds";

/// Query building and execution metrics
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a relation built from a query definition
    pub fn relation_built(joins: usize, steps: usize) {
        counter!("relq_relations_built_total").increment(1);
        histogram!("relq_relation_joins").record(joins as f64);
        histogram!("relq_relation_steps").record(steps as f64);
    }

    /// Record rows fetched through an executor
    pub fn rows_fetched(rows: usize, duration: Duration) {
        counter!("relq_record_queries_total", "kind" => "rows").increment(1);
        counter!("relq_records_fetched_total").increment(rows as u64);
        histogram!(QUERY_DURATION, "kind" => "rows")
            .record(duration.as_secs_f64());
    }

    /// Record a count query
    pub fn count_fetched(duration: Duration) {
        counter!("relq_record_queries_total", "kind" => "count").increment(1);
        histogram!(QUERY_DURATION, "kind" => "count")
            .record(duration.as_secs_f64());
    }

    /// Record a failed query
    pub fn query_failed(kind: &str) {
        counter!("relq_record_queries_failed_total", "kind" => kind.to_string()).increment(1);
    }

    /// Record tables loaded by a schema reflector
    pub fn tables_reflected(count: usize, duration: Duration) {
        counter!("relq_tables_reflected_total").increment(count as u64);
        histogram!("relq_reflection_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Records the elapsed time into a histogram when dropped, unless
/// [`PerfTimer::finish`] handed the duration to the caller first.
pub struct PerfTimer {
    start: Instant,
    metric_name: String,
    labels: Vec<(String, String)>,
    armed: bool,
}

impl PerfTimer {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            metric_name: metric_name.into(),
            labels: Vec::new(),
            armed: true,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration without recording it; the
    /// caller records it.
    pub fn finish(mut self) -> Duration {
        self.disarm()
    }

    fn disarm(&mut self) -> Duration {
        self.armed = false;
        self.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if self.armed && !std::thread::panicking() {
            histogram!(self.metric_name.clone(), &self.labels).record(self.elapsed().as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_timer() {
        let timer = PerfTimer::new("test_metric").with_label("test_label", "test_value");

        assert_eq!(timer.metric_name, "test_metric");
        assert_eq!(timer.labels.len(), 1);

        let elapsed = timer.finish();
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_finished_timer_does_not_record_on_drop() {
        let mut timer = PerfTimer::new("test_metric");
        assert!(timer.armed);
        timer.disarm();
        assert!(!timer.armed);
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        QueryMetrics::relation_built(2, 3);
        QueryMetrics::rows_fetched(10, Duration::from_millis(5));
        QueryMetrics::count_fetched(Duration::from_millis(1));
        QueryMetrics::query_failed("rows");
        QueryMetrics::tables_reflected(4, Duration::from_millis(8));
    }

    #[test]
    fn test_init_once() {
        let config = crate::config::RelqConfig::default().observability;
        assert!(ObservabilitySystem::init(&config).is_ok());
        assert!(ObservabilitySystem::get().is_some());
        assert!(ObservabilitySystem::init(&config).is_err());
    }
}
