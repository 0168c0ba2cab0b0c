use async_trait::async_trait;
use common::model::RetrievalMetrics;
use tokio::sync::Mutex;
use tracing::debug;

/// Fire-and-forget metrics emission: a logging/metrics backend being down
/// must never fail (or even slow down) the retrieval it is describing.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, metrics: RetrievalMetrics);
}

/// Logs each event and keeps them in memory for the `metrics://{strategy}`
/// resource to read back. Good enough as the default sink; production
/// deployments can swap in a real metrics backend behind `MetricsSink`.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    events: Mutex<Vec<RetrievalMetrics>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<RetrievalMetrics> {
        self.events.lock().await.clone()
    }

    pub async fn for_strategy(&self, strategy: &str) -> Vec<RetrievalMetrics> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|m| m.strategy == strategy)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn emit(&self, metrics: RetrievalMetrics) {
        debug!(
            strategy = %metrics.strategy,
            num_results = metrics.num_results,
            latency_ms = metrics.latency_ms,
            cache_hit = metrics.cache_hit,
            "retrieval metrics"
        );
        self.events.lock().await.push(metrics);
    }
}
