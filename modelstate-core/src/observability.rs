/*!
Observability for checkpointing and model export.

- Structured JSON logging through `tracing-subscriber`
- Prometheus metrics behind the `metrics` feature
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

#[cfg(feature = "metrics")]
use crate::export::ExportSummary;
use crate::{PersistError, Result};

/// Directive applied on top of `RUST_LOG` by [`init_observability`].
pub const DEFAULT_LOG_DIRECTIVE: &str = "modelstate_core=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<ModelStateMetrics>> = OnceLock::new();

/// Prometheus metrics for checkpoint and export operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct ModelStateMetrics {
    pub checkpoints_saved_total: Counter,
    pub checkpoints_loaded_total: Counter,
    pub state_size_bytes: Histogram,
    pub checkpoint_compressed_bytes: Histogram,
    pub export_documents_total: Counter,
    pub export_encoded_bytes_total: Counter,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| PersistError::validation(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| PersistError::validation(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, name: &str, help: &str) -> Result<Histogram> {
    let buckets = prometheus::exponential_buckets(256.0, 4.0, 10)
        .map_err(|e| PersistError::validation(format!("Invalid buckets for {name}: {e}")))?;
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| PersistError::validation(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| PersistError::validation(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl ModelStateMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            checkpoints_saved_total: counter(
                &registry,
                "modelstate_checkpoints_saved_total",
                "Total checkpoints saved",
            )?,
            checkpoints_loaded_total: counter(
                &registry,
                "modelstate_checkpoints_loaded_total",
                "Total checkpoints loaded and verified",
            )?,
            state_size_bytes: histogram(
                &registry,
                "modelstate_state_size_bytes",
                "Size of serialized state documents in bytes",
            )?,
            checkpoint_compressed_bytes: histogram(
                &registry,
                "modelstate_checkpoint_compressed_bytes",
                "Size of stored checkpoint containers in bytes",
            )?,
            export_documents_total: counter(
                &registry,
                "modelstate_export_documents_total",
                "Total compressed definition documents emitted",
            )?,
            export_encoded_bytes_total: counter(
                &registry,
                "modelstate_export_encoded_bytes_total",
                "Total base64 bytes emitted by model exports",
            )?,
            registry,
        })
    }

    /// Global metrics instance, `None` if the metrics could not be registered
    pub fn global() -> Option<&'static ModelStateMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!("Metrics disabled: {e}");
                    None
                }
            })
            .as_ref()
    }

    pub fn record_checkpoint_saved(&self, state_bytes: usize, compressed_bytes: usize) {
        self.checkpoints_saved_total.inc();
        self.state_size_bytes.observe(state_bytes as f64);
        self.checkpoint_compressed_bytes.observe(compressed_bytes as f64);
    }

    pub fn record_checkpoint_loaded(&self) {
        self.checkpoints_loaded_total.inc();
    }

    pub fn record_export(&self, summary: &ExportSummary) {
        self.export_documents_total.inc_by(summary.documents as f64);
        self.export_encoded_bytes_total
            .inc_by(summary.encoded_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PersistError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| PersistError::validation(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Initialize JSON logging for a process embedding the library
///
/// `RUST_LOG` is honoured; `extra_directive` (e.g. `"modelstate_core=debug"`)
/// is added on top of [`DEFAULT_LOG_DIRECTIVE`]. Fails if a global
/// subscriber is already installed.
pub fn init_observability(extra_directive: Option<&str>) -> Result<()> {
    #[cfg(feature = "metrics")]
    ModelStateMetrics::global();

    let mut filter = EnvFilter::from_default_env().add_directive(parse_directive(DEFAULT_LOG_DIRECTIVE)?);
    if let Some(directive) = extra_directive {
        filter = filter.add_directive(parse_directive(directive)?);
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(false);

    let subscriber = TracingRegistry::default().with(filter).with(fmt_layer);
    set_global_default(subscriber).map_err(|e| {
        PersistError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("modelstate observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(None)
}

fn parse_directive(directive: &str) -> Result<tracing_subscriber::filter::Directive> {
    directive
        .parse()
        .map_err(|e| PersistError::validation(format!("Invalid log directive '{directive}': {e}")))
}
