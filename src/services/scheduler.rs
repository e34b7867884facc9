//! Batch scheduling
//!
//! Runs one processing task per location, either strictly one after another
//! or with a bounded number in flight. All tasks are futures driven by the
//! calling task, so result counters are only ever touched from one place.

use futures::stream::{self, StreamExt};

use crate::config::ConcurrencyMode;
use crate::models::batch::BatchResult;

/// Something that can process a single image location.
#[allow(async_fn_in_trait)]
pub trait ProcessImage {
    /// Returns `true` when the image was processed and saved.
    async fn process(&self, location: &str) -> bool;
}

pub struct BatchScheduler {
    mode: ConcurrencyMode,
    max_concurrency: usize,
}

impl BatchScheduler {
    pub fn new(mode: ConcurrencyMode, max_concurrency: usize) -> Self {
        Self {
            mode,
            max_concurrency,
        }
    }

    /// Number of tasks allowed in flight for `total` locations.
    pub fn effective_concurrency(&self, total: usize) -> usize {
        match self.mode {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::Concurrent => self.max_concurrency.clamp(1, total.max(1)),
        }
    }

    pub async fn run<P: ProcessImage>(&self, processor: &P, locations: &[String]) -> BatchResult {
        let mut result = BatchResult::default();
        if locations.is_empty() {
            tracing::warn!("No images to process");
            return result;
        }

        let limit = self.effective_concurrency(locations.len());
        tracing::info!(
            mode = %self.mode,
            total = locations.len(),
            concurrency = limit,
            "Starting batch"
        );

        match self.mode {
            ConcurrencyMode::Sequential => {
                for (index, location) in locations.iter().enumerate() {
                    tracing::info!(
                        "Image {}/{}: {}",
                        index + 1,
                        locations.len(),
                        location
                    );
                    result.record(processor.process(location).await);
                }
            }
            ConcurrencyMode::Concurrent => {
                let mut in_flight = stream::iter(locations)
                    .map(|location| processor.process(location))
                    .buffer_unordered(limit);

                while let Some(success) = in_flight.next().await {
                    result.record(success);
                    tracing::info!(
                        completed = result.total(),
                        total = locations.len(),
                        succeeded = result.succeeded,
                        failed = result.failed,
                        "Progress"
                    );
                }
            }
        }

        result
    }
}
