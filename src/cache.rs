use crate::error::PipelineError;
use crate::models::Config;
use crate::pipeline::{Pipeline, PipelineOutput};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Memoizes pipeline output for a fixed time-to-live.
///
/// Upstream data changes rarely, so a dashboard refresh inside the TTL reuses
/// the last output instead of refetching.
pub struct CachedPipeline {
    pipeline: Pipeline,
    ttl: Duration,
    cached: Option<(Instant, Arc<PipelineOutput>)>,
}

impl CachedPipeline {
    pub fn new(pipeline: Pipeline, ttl: Duration) -> Self {
        Self {
            pipeline,
            ttl,
            cached: None,
        }
    }

    /// TTL from `cache_ttl_secs`.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self::new(pipeline, Duration::from_secs(config.cache_ttl_secs)))
    }

    pub async fn output(&mut self) -> Result<Arc<PipelineOutput>, PipelineError> {
        if let Some((computed_at, output)) = &self.cached {
            if computed_at.elapsed() < self.ttl {
                tracing::debug!(age_secs = computed_at.elapsed().as_secs(), "serving cached pipeline output");
                return Ok(Arc::clone(output));
            }
        }

        tracing::info!("refreshing pipeline output");
        let output = Arc::new(self.pipeline.run().await?);
        self.cached = Some((Instant::now(), Arc::clone(&output)));
        Ok(output)
    }

    /// Drop the cached output so the next call reruns the pipeline.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
