//! Scan admission: the hub-check and scan queues plus the concurrency gate.

use api_types::Image;
use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::error::Result;
use crate::domain::scan::ImageScanRegistry;
use crate::domain::scan::RetryPolicy;
use crate::domain::scan::ScanStatus;

pub mod queue_manager;

pub use queue_manager::QueueManager;
pub use queue_manager::QueueType;

pub const DEFAULT_CONCURRENT_SCAN_LIMIT: usize = 7;

/// Scheduling parameters of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Maximum number of images in `ScanRunning` or `HubScanRunning`
    pub concurrent_scan_limit: usize,
    /// Route new images through the hub-check queue before scanning
    pub hub_check_enabled: bool,
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            concurrent_scan_limit: DEFAULT_CONCURRENT_SCAN_LIMIT,
            hub_check_enabled: true,
            retry_policy: RetryPolicy::unlimited(),
        }
    }
}

/// What happened to an image after its scan failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeued,
    Quarantined,
}

/// FIFO admission scheduler.
///
/// Holds only transient copies of images in its queues. Status lives in the
/// [`ImageScanRegistry`], which every method takes explicitly so that a queue
/// push or pop only happens after the matching status transition succeeded.
#[derive(Debug)]
pub struct ScanScheduler {
    queues: QueueManager,
    config: SchedulingConfig,
}

impl ScanScheduler {
    pub fn new(config: SchedulingConfig) -> Self {
        Self {
            queues: QueueManager::new(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub fn queues(&self) -> &QueueManager {
        &self.queues
    }

    /// Number of images counted against the concurrency limit
    pub fn active_scan_count(&self, registry: &ImageScanRegistry) -> usize {
        registry.count_in(&ScanStatus::IN_FLIGHT)
    }

    /// Put a freshly registered image into the first stage of the pipeline.
    pub(crate) fn admit(&mut self, registry: &mut ImageScanRegistry, image: &Image) -> Result<()> {
        if self.config.hub_check_enabled {
            self.enqueue_for_hub_check(registry, image)
        } else {
            self.push_scan(
                registry,
                image,
                "enqueue_for_scan",
                &[ScanStatus::Unscanned],
            )
        }
    }

    pub(crate) fn enqueue_for_hub_check(
        &mut self,
        registry: &mut ImageScanRegistry,
        image: &Image,
    ) -> Result<()> {
        let info = registry.transition(
            &image.sha,
            "enqueue_for_hub_check",
            &[ScanStatus::Unscanned, ScanStatus::Error],
            ScanStatus::HubCheckQueued,
        )?;
        let queued = info.image.clone();
        self.queues.push(QueueType::HubCheck, queued);
        Ok(())
    }

    /// Pop the head of the hub-check queue and mark it `CheckingHub`.
    pub(crate) fn dequeue_for_hub_check(
        &mut self,
        registry: &mut ImageScanRegistry,
    ) -> Result<Option<Image>> {
        let Some(head) = self.queues.front(QueueType::HubCheck) else {
            debug!("Hub check queue empty");
            return Ok(None);
        };
        registry.transition(
            &head.sha,
            "dequeue_for_hub_check",
            &[ScanStatus::HubCheckQueued],
            ScanStatus::CheckingHub,
        )?;
        Ok(self.queues.pop(QueueType::HubCheck))
    }

    pub(crate) fn enqueue_for_scan(
        &mut self,
        registry: &mut ImageScanRegistry,
        image: &Image,
    ) -> Result<()> {
        self.push_scan(
            registry,
            image,
            "enqueue_for_scan",
            &[ScanStatus::CheckingHub, ScanStatus::Error],
        )
    }

    fn push_scan(
        &mut self,
        registry: &mut ImageScanRegistry,
        image: &Image,
        operation: &'static str,
        expected: &[ScanStatus],
    ) -> Result<()> {
        let info = registry.transition(&image.sha, operation, expected, ScanStatus::ScanQueued)?;
        let queued = info.image.clone();
        self.queues.push(QueueType::Scan, queued);
        Ok(())
    }

    /// Pop the head of the scan queue if the concurrency limit allows it.
    ///
    /// Returns `Ok(None)` when the queue is empty or the limit is reached.
    pub(crate) fn dequeue_for_scan(
        &mut self,
        registry: &mut ImageScanRegistry,
        now: DateTime<Utc>,
    ) -> Result<Option<Image>> {
        let active = self.active_scan_count(registry);
        if active >= self.config.concurrent_scan_limit {
            info!(
                active = active,
                limit = self.config.concurrent_scan_limit,
                "Max concurrent scan count reached, can't start a new scan"
            );
            return Ok(None);
        }

        let Some(head) = self.queues.front(QueueType::Scan) else {
            debug!("Scan queue empty, can't start a new scan");
            return Ok(None);
        };
        let info = registry.transition(
            &head.sha,
            "dequeue_for_scan",
            &[ScanStatus::ScanQueued],
            ScanStatus::ScanRunning,
        )?;
        info.scan_attempts += 1;
        info.in_flight_since = Some(now);
        Ok(self.queues.pop(QueueType::Scan))
    }

    /// Send an image that just entered `Error` back to the scan queue, unless
    /// the retry policy says it has been attempted often enough.
    pub(crate) fn retry_after_failure(
        &mut self,
        registry: &mut ImageScanRegistry,
        image: &Image,
    ) -> Result<RetryDecision> {
        let info = registry.expect_status(&image.sha, "retry_scan", &[ScanStatus::Error])?;
        if !self.config.retry_policy.allows_retry(info.scan_attempts) {
            warn!(
                image = %info.image,
                attempts = info.scan_attempts,
                "Scan attempts exhausted, leaving image in error"
            );
            return Ok(RetryDecision::Quarantined);
        }
        self.enqueue_for_scan(registry, image)?;
        Ok(RetryDecision::Requeued)
    }
}
