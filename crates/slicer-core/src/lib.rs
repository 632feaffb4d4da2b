//! Pricing registry, admission layer, subprocess runner, and the ingestion →
//! conversion → slicing → pricing pipeline for the print slicing service.
//!
//! This crate has no HTTP awareness: [`SlicerCore`] is constructed once at
//! startup and handed to the HTTP layer, which drives [`slicing::run_slice_job`]
//! per request after running admission checks of its own.

pub mod admission;
pub mod error_log;
pub mod estimator;
pub mod orchestrator;
pub mod parsing;
pub mod pipeline;
pub mod pricing;
pub mod runner;
pub mod slicing;

pub use admission::{client_key, RateLimitDecision, RateLimiter, SliceQueue, SliceQueuePermit};
pub use error_log::{ErrorLog, ErrorLogEntry};
pub use pricing::PricingRegistry;
pub use runner::{CommandOutput, RunnerError, SubprocessRunner};
pub use slicing::{SliceJobInput, SliceResponse};

use slicer_config::SlicerConfig;
use slicer_types::SlicerResult;
use std::sync::Arc;
use std::time::Duration;

/// Everything the HTTP layer needs to run the service, assembled once at
/// startup from validated configuration.
pub struct SlicerCore {
    pub config: SlicerConfig,
    pub pricing: Arc<PricingRegistry>,
    pub rate_limiter: RateLimiter,
    pub queue: SliceQueue,
    pub runner: SubprocessRunner,
    pub error_log: Arc<ErrorLog>,
}

impl SlicerCore {
    /// Build the shared service state: load the pricing registry from disk,
    /// size the admission layer from configuration, and spawn the rate
    /// limiter's background bucket-cleanup task.
    pub async fn bootstrap(config: SlicerConfig) -> SlicerResult<Arc<Self>> {
        let pricing = PricingRegistry::load(&config.paths.pricing_file_path).await?;

        let rate_limiter = RateLimiter::new(
            Duration::from_millis(config.slice_rate_limit_window_ms),
            config.slice_rate_limit_max_requests,
        );
        rate_limiter.spawn_cleanup();

        let queue = SliceQueue::new(
            config.max_concurrent_slices,
            config.max_slice_queue_length,
            Duration::from_millis(config.max_slice_queue_wait_ms),
        );

        let runner = SubprocessRunner::new(
            config.debug_command_logs,
            Duration::from_secs(config.paths.subprocess_timeout_seconds),
        );

        let error_log = Arc::new(ErrorLog::new(
            &config.paths.error_log_path,
            config.paths.error_log_retention_days,
        ));

        Ok(Arc::new(Self {
            config,
            pricing,
            rate_limiter,
            queue,
            runner,
            error_log,
        }))
    }

    /// Run one slice job through the full pipeline. Admission (rate limit,
    /// queue) is the caller's responsibility; by the time this is called the
    /// request already holds a [`SliceQueuePermit`].
    pub async fn run_slice_job(&self, input: SliceJobInput) -> SlicerResult<SliceResponse> {
        let request_path = format!("/slice/{}", input.tech.as_str());
        let result = slicing::run_slice_job(input, &self.pricing, &self.runner, &self.config).await;
        if let Err(err) = &result {
            self.error_log.record(err, Some(&request_path)).await;
        }
        result
    }
}
