use crate::domain::model::ServiceEndpoint;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait ConfigProvider: Send + Sync {
    fn registry_url(&self) -> &str;
    fn max_in_flight(&self) -> usize;
    fn request_timeout(&self) -> Duration;
    fn view_threshold(&self) -> usize;
}

/// Where the registry directory gets its service catalog from: the
/// well-known HTTP registry, or a local catalog file.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<Vec<ServiceEndpoint>>;
}

/// Receives progress and status updates from a pipeline invocation.
/// Implementations must tolerate calls from multiple tasks.
pub trait ProgressSink: Send + Sync {
    fn status(&self, message: &str);
    fn progress(&self, fraction: f64);
}

/// Default sink that routes progress through tracing.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn status(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn progress(&self, fraction: f64) {
        tracing::debug!("progress: {:.0}%", fraction * 100.0);
    }
}
