//! The scan model: pods, image scan records and the admission scheduler.
//!
//! [`Model`] is not synchronized. Every mutation is expected to go through a
//! single owner, the [`ModelCoordinator`](super::coordinator::ModelCoordinator),
//! so each operation below is atomic with respect to the others.

use std::collections::HashSet;

use api_types::HubCheckOutcome;
use api_types::Image;
use api_types::Pod;
use api_types::PodScanResults;
use api_types::ScanResults;
use chrono::TimeDelta;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::error::Result;
use super::pod_management::aggregate_pod;
use super::pod_management::PodRegistry;
use super::scan::ImageScanInfo;
use super::scan::ImageScanRegistry;
use super::scan::ScanStatus;
use super::scheduler::ScanScheduler;
use super::scheduler::SchedulingConfig;
use super::status::ModelSnapshot;
use super::traits::SystemClock;
use super::traits::TimeSource;

pub struct Model {
    pods: PodRegistry,
    images: ImageScanRegistry,
    scheduler: ScanScheduler,
    clock: Box<dyn TimeSource>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("pods", &self.pods)
            .field("images", &self.images)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn new(config: SchedulingConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    pub fn with_clock(config: SchedulingConfig, clock: impl TimeSource + 'static) -> Self {
        Self {
            pods: PodRegistry::new(),
            images: ImageScanRegistry::new(),
            scheduler: ScanScheduler::new(config),
            clock: Box::new(clock),
        }
    }

    pub fn pods(&self) -> &PodRegistry {
        &self.pods
    }

    pub fn images(&self) -> &ImageScanRegistry {
        &self.images
    }

    pub fn scheduler(&self) -> &ScanScheduler {
        &self.scheduler
    }

    pub fn image_info(&self, sha: &str) -> Option<&ImageScanInfo> {
        self.images.get(sha)
    }

    /// Insert or replace a pod and register every image it runs.
    pub fn add_pod(&mut self, pod: Pod) {
        debug!(pod = %pod.qualified_name(), uid = %pod.uid, "Adding pod");
        for container in &pod.containers {
            self.register_image(container.image.clone());
        }
        self.pods.insert(pod);
    }

    /// Same as [`Model::add_pod`]: an update replaces the whole snapshot.
    pub fn update_pod(&mut self, pod: Pod) {
        self.add_pod(pod);
    }

    /// Remove a pod. Its images stay registered.
    ///
    /// Returns whether the pod was present.
    pub fn delete_pod(&mut self, qualified_name: &str) -> bool {
        let removed = self.pods.remove(qualified_name).is_some();
        if !removed {
            debug!(pod = qualified_name, "Delete for unknown pod ignored");
        }
        removed
    }

    /// Replace the pod set: add or replace every given pod, then drop the
    /// registered pods that are not in it.
    pub fn set_all_pods(&mut self, pods: Vec<Pod>) {
        let keep: HashSet<String> = pods.iter().map(Pod::qualified_name).collect();
        for pod in pods {
            self.add_pod(pod);
        }
        let removed = self.pods.retain_only(&keep);
        info!(
            pod_count = self.pods.len(),
            removed = removed.len(),
            "Pod set resynchronized"
        );
    }

    /// Register an image on first sight and admit it into the pipeline.
    ///
    /// Returns true if the image was not known before.
    pub fn register_image(&mut self, image: Image) -> bool {
        if !self.images.insert_unscanned(&image) {
            return false;
        }
        if let Err(e) = self.scheduler.admit(&mut self.images, &image) {
            error!(image = %image, error = %e, "Failed to admit newly registered image");
        }
        true
    }

    /// Next image waiting for a hub lookup, now marked `CheckingHub`.
    pub fn next_hub_check_image(&mut self) -> Result<Option<Image>> {
        self.scheduler.dequeue_for_hub_check(&mut self.images)
    }

    /// Next image to scan, now marked `ScanRunning`, if capacity allows.
    pub fn next_scan_image(&mut self) -> Result<Option<Image>> {
        let now = self.clock.now();
        self.scheduler.dequeue_for_scan(&mut self.images, now)
    }

    /// Apply the outcome of a hub lookup for an image in `CheckingHub`.
    pub fn report_hub_check(&mut self, image: &Image, outcome: HubCheckOutcome) -> Result<()> {
        self.images
            .expect_status(&image.sha, "report_hub_check", &[ScanStatus::CheckingHub])?;
        match outcome {
            HubCheckOutcome::Found(results) => {
                let info = self.images.transition(
                    &image.sha,
                    "report_hub_check",
                    &[ScanStatus::CheckingHub],
                    ScanStatus::Complete,
                )?;
                info.results = Some(results);
                info!(image = %image, "Existing analysis found, skipping scan");
                Ok(())
            }
            HubCheckOutcome::NotFound => self.scheduler.enqueue_for_scan(&mut self.images, image),
            HubCheckOutcome::Failed(reason) => {
                warn!(image = %image, reason = %reason, "Hub check failed, queueing scan");
                self.scheduler.enqueue_for_scan(&mut self.images, image)
            }
        }
    }

    /// Report the end of a scan-client run: `Some(err)` on failure.
    pub fn report_scan_finished(&mut self, image: &Image, err: Option<String>) -> Result<()> {
        match err {
            Some(err) => self.report_scan_error(image, &err),
            None => {
                self.images.transition(
                    &image.sha,
                    "report_scan_client_finished",
                    &[ScanStatus::ScanRunning],
                    ScanStatus::HubScanRunning,
                )?;
                Ok(())
            }
        }
    }

    fn report_scan_error(&mut self, image: &Image, err: &str) -> Result<()> {
        self.images.transition(
            &image.sha,
            "report_scan_error",
            &[ScanStatus::ScanRunning],
            ScanStatus::Error,
        )?;
        warn!(image = %image, error = err, "Scan client failed");
        self.scheduler.retry_after_failure(&mut self.images, image)?;
        Ok(())
    }

    /// Attach analysis results to an image in `HubScanRunning`.
    pub fn report_analysis_complete(&mut self, image: &Image, results: ScanResults) -> Result<()> {
        let info = self.images.transition(
            &image.sha,
            "report_analysis_complete",
            &[ScanStatus::HubScanRunning],
            ScanStatus::Complete,
        )?;
        info.results = Some(results);
        Ok(())
    }

    /// Aggregated findings of one pod.
    pub fn scan_results(&self, qualified_name: &str) -> Result<PodScanResults> {
        self.pods.aggregate(qualified_name, &self.images)
    }

    /// Aggregated findings of every pod, sorted by qualified name.
    pub fn all_scan_results(&self) -> Vec<PodScanResults> {
        let mut results: Vec<_> = self
            .pods
            .iter()
            .map(|pod| aggregate_pod(pod, &self.images))
            .collect();
        results.sort_by_cached_key(|r| api_types::qualified_name(&r.namespace, &r.name));
        results
    }

    /// Images whose scan client finished and whose analysis is pending.
    pub fn images_awaiting_analysis(&self) -> Vec<Image> {
        self.images.images_in(ScanStatus::HubScanRunning)
    }

    /// Fail and requeue every in-flight image that has been running for at
    /// least `timeout`. Returns the reclaimed images.
    pub fn reclaim_stale_scans(&mut self, timeout: TimeDelta) -> Result<Vec<Image>> {
        let now = self.clock.now();
        let stale: Vec<Image> = self
            .images
            .iter()
            .filter(|info| info.status.is_in_flight())
            .filter(|info| {
                info.in_flight_since
                    .and_then(|since| since.checked_add_signed(timeout))
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|info| info.image.clone())
            .collect();

        for image in &stale {
            self.images.transition(
                &image.sha,
                "reclaim_stale_scan",
                &ScanStatus::IN_FLIGHT,
                ScanStatus::Error,
            )?;
            warn!(image = %image, timeout_secs = timeout.num_seconds(), "Reclaiming stale in-flight scan");
            self.scheduler.retry_after_failure(&mut self.images, image)?;
        }
        Ok(stale)
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::capture(&self.pods, &self.images, &self.scheduler)
    }
}

#[cfg(test)]
mod tests {
    use api_types::Container;
    use chrono::Utc;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::error::ModelError;
    use crate::domain::scan::RetryPolicy;
    use crate::domain::scheduler::QueueType;
    use crate::domain::traits::mock::ManualClock;

    fn image(sha: &str) -> Image {
        Image::new(sha, format!("registry.local/{sha}:1.0"))
    }

    fn pod(namespace: &str, name: &str, shas: &[&str]) -> Pod {
        Pod {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: String::new(),
            containers: shas
                .iter()
                .enumerate()
                .map(|(i, sha)| Container {
                    name: format!("container-{i}"),
                    image: image(sha),
                })
                .collect(),
        }
    }

    fn results(violations: u32, vulnerabilities: u32, status: &str) -> ScanResults {
        ScanResults {
            policy_violation_count: violations,
            vulnerability_count: vulnerabilities,
            overall_status: status.to_string(),
        }
    }

    fn status(model: &Model, sha: &str) -> ScanStatus {
        model.image_info(sha).expect("image registered").status
    }

    /// Drive an image from registration to `Complete` with the given results.
    fn complete(model: &mut Model, sha: &str, scan_results: ScanResults) {
        let img = model.next_hub_check_image().unwrap().expect("hub check image");
        assert_eq!(img.sha.as_str(), sha);
        model
            .report_hub_check(&img, HubCheckOutcome::NotFound)
            .unwrap();
        let img = model.next_scan_image().unwrap().expect("scan image");
        assert_eq!(img.sha.as_str(), sha);
        model.report_scan_finished(&img, None).unwrap();
        model.report_analysis_complete(&img, scan_results).unwrap();
    }

    /// Every image appears at most once across both queues, and only while
    /// its status says it is queued.
    fn assert_queue_invariant(model: &Model) {
        let queues = model.scheduler().queues();
        let mut seen = HashSet::new();
        for queue in [QueueType::HubCheck, QueueType::Scan] {
            for img in queues.images(queue) {
                assert!(seen.insert(img.sha.clone()), "{} queued twice", img.sha);
                let expected = match queue {
                    QueueType::HubCheck => ScanStatus::HubCheckQueued,
                    QueueType::Scan => ScanStatus::ScanQueued,
                };
                assert_eq!(status(model, &img.sha), expected);
            }
        }
        for info in model.images().iter() {
            let queued = matches!(
                info.status,
                ScanStatus::HubCheckQueued | ScanStatus::ScanQueued
            );
            assert_eq!(queued, seen.contains(&info.image.sha));
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let mut model = Model::new(SchedulingConfig::default());

        assert!(model.register_image(image("a")));
        assert!(!model.register_image(Image::new("a", "another/name:2")));

        assert_eq!(model.images().len(), 1);
        assert_eq!(status(&model, "a"), ScanStatus::HubCheckQueued);
        assert_eq!(model.scheduler().queues().len(QueueType::HubCheck), 1);
        assert_queue_invariant(&model);
    }

    #[test]
    fn hub_check_queue_is_fifo() {
        let mut model = Model::new(SchedulingConfig::default());
        for sha in ["r1", "r2", "r3"] {
            model.register_image(image(sha));
        }

        let order: Vec<String> = std::iter::from_fn(|| model.next_hub_check_image().unwrap())
            .map(|img| img.sha)
            .collect();

        assert_eq!(order, ["r1", "r2", "r3"].map(String::from).to_vec());
        assert_eq!(status(&model, "r2"), ScanStatus::CheckingHub);
    }

    #[test]
    fn admission_respects_capacity() {
        for limit in 0..4usize {
            let mut model = Model::new(SchedulingConfig {
                concurrent_scan_limit: limit,
                hub_check_enabled: false,
                ..Default::default()
            });
            for i in 0..6 {
                model.register_image(image(&format!("img-{i}")));
            }

            let mut started = 0;
            while model.next_scan_image().unwrap().is_some() {
                started += 1;
                assert!(model.scheduler().active_scan_count(model.images()) <= limit);
            }

            assert_eq!(started, limit);
            assert_eq!(
                model.scheduler().queues().len(QueueType::Scan),
                6 - limit,
                "queue keeps the rest while at capacity"
            );
            assert_queue_invariant(&model);
        }
    }

    #[test]
    fn hub_scan_running_still_counts_against_capacity() {
        let mut model = Model::new(SchedulingConfig {
            concurrent_scan_limit: 1,
            hub_check_enabled: false,
            ..Default::default()
        });
        model.register_image(image("a"));
        model.register_image(image("b"));

        let a = model.next_scan_image().unwrap().unwrap();
        model.report_scan_finished(&a, None).unwrap();
        assert_eq!(status(&model, "a"), ScanStatus::HubScanRunning);
        assert_eq!(model.next_scan_image().unwrap(), None);

        model
            .report_analysis_complete(&a, results(0, 0, "NOT_IN_VIOLATION"))
            .unwrap();
        assert_eq!(model.next_scan_image().unwrap(), Some(image("b")));
    }

    #[test]
    fn pod_deletion_does_not_evict_images() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "solo", &["x"]));
        let before = model.image_info("x").cloned();

        assert!(model.delete_pod("ns/solo"));
        assert!(!model.delete_pod("ns/solo"), "second delete is a no-op");

        assert_eq!(model.image_info("x").cloned(), before);
        assert_queue_invariant(&model);
    }

    #[test]
    fn scan_error_retries_indefinitely() {
        let mut model = Model::new(SchedulingConfig::default());
        model.register_image(image("a"));
        let img = model.next_hub_check_image().unwrap().unwrap();
        model.report_hub_check(&img, HubCheckOutcome::NotFound).unwrap();

        for attempt in 1..=5 {
            let img = model.next_scan_image().unwrap().expect("requeued image");
            model
                .report_scan_finished(&img, Some(format!("pull failed #{attempt}")))
                .unwrap();
            assert_eq!(status(&model, "a"), ScanStatus::ScanQueued);
            assert_eq!(model.image_info("a").unwrap().scan_attempts, attempt);
            assert_queue_invariant(&model);
        }
    }

    #[test]
    fn scan_error_quarantines_after_max_attempts() {
        let mut model = Model::new(SchedulingConfig {
            hub_check_enabled: false,
            retry_policy: RetryPolicy::with_max_attempts(2),
            ..Default::default()
        });
        model.register_image(image("a"));

        for _ in 0..2 {
            let img = model.next_scan_image().unwrap().unwrap();
            model
                .report_scan_finished(&img, Some("boom".to_string()))
                .unwrap();
        }

        assert_eq!(status(&model, "a"), ScanStatus::Error);
        assert_eq!(model.next_scan_image().unwrap(), None);
        assert_queue_invariant(&model);
    }

    #[test]
    fn aggregate_results_for_pod() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "p", &["a", "b"]));
        complete(&mut model, "a", results(2, 5, "IN_VIOLATION"));
        complete(&mut model, "b", results(0, 1, "NOT_IN_VIOLATION"));

        let aggregate = model.scan_results("ns/p").unwrap();

        assert_eq!(
            aggregate,
            PodScanResults {
                namespace: "ns".to_string(),
                name: "p".to_string(),
                policy_violations: 2,
                vulnerabilities: 6,
                overall_status: "IN_VIOLATION".to_string(),
            }
        );
    }

    #[test]
    fn aggregate_overall_status_is_last_write_wins() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "p", &["a", "b"]));
        complete(&mut model, "a", results(1, 0, "IN_VIOLATION"));
        complete(&mut model, "b", results(0, 0, "IN_VIOLATION_OVERRIDDEN"));

        let aggregate = model.scan_results("ns/p").unwrap();
        assert_eq!(aggregate.overall_status.as_str(), "IN_VIOLATION_OVERRIDDEN");
    }

    #[test]
    fn aggregate_for_unknown_pod_is_not_found() {
        let model = Model::new(SchedulingConfig::default());
        assert_eq!(
            model.scan_results("ns/nonexistent").unwrap_err(),
            ModelError::PodNotFound {
                qualified_name: "ns/nonexistent".to_string()
            }
        );
    }

    #[test]
    fn bulk_resync_replaces_pod_set() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "a", &["only-in-a"]));
        model.add_pod(pod("ns", "b", &["shared"]));
        let b_before = model.pods().get("ns/b").cloned();

        model.set_all_pods(vec![pod("ns", "b", &["shared"]), pod("ns", "c", &["new"])]);

        let mut names: Vec<_> = model.pods().iter().map(Pod::qualified_name).collect();
        names.sort();
        assert_eq!(names, ["ns/b", "ns/c"].map(String::from).to_vec());
        assert_eq!(model.pods().get("ns/b").cloned(), b_before);
        assert!(model.image_info("only-in-a").is_some());
        assert!(model.image_info("new").is_some());
        assert_eq!(model.images().len(), 3);
    }

    #[test]
    fn invalid_transition_leaves_state_untouched() {
        let mut model = Model::new(SchedulingConfig::default());
        model.register_image(image("a"));

        let err = model
            .report_analysis_complete(&image("a"), results(1, 1, "IN_VIOLATION"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(status(&model, "a"), ScanStatus::HubCheckQueued);
        assert!(model.image_info("a").unwrap().results.is_none());

        let err = model
            .report_scan_finished(&image("unknown"), None)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::ImageNotFound {
                sha: "unknown".to_string()
            }
        );
        assert_queue_invariant(&model);
    }

    #[test]
    fn hub_check_found_completes_without_scan() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "p", &["a"]));
        let img = model.next_hub_check_image().unwrap().unwrap();

        model
            .report_hub_check(&img, HubCheckOutcome::Found(results(3, 7, "IN_VIOLATION")))
            .unwrap();

        assert_eq!(status(&model, "a"), ScanStatus::Complete);
        assert_eq!(model.next_scan_image().unwrap(), None);
        assert_eq!(model.scan_results("ns/p").unwrap().vulnerabilities, 7);
    }

    #[test]
    fn hub_check_failure_queues_scan() {
        let mut model = Model::new(SchedulingConfig::default());
        model.register_image(image("a"));
        let img = model.next_hub_check_image().unwrap().unwrap();

        model
            .report_hub_check(&img, HubCheckOutcome::Failed("timeout".to_string()))
            .unwrap();

        assert_eq!(status(&model, "a"), ScanStatus::ScanQueued);
        assert_queue_invariant(&model);
    }

    #[test]
    fn images_awaiting_analysis_lists_hub_scans() {
        let mut model = Model::new(SchedulingConfig {
            hub_check_enabled: false,
            ..Default::default()
        });
        model.register_image(image("a"));
        model.register_image(image("b"));
        let a = model.next_scan_image().unwrap().unwrap();
        model.next_scan_image().unwrap().unwrap();
        model.report_scan_finished(&a, None).unwrap();

        assert_eq!(model.images_awaiting_analysis(), vec![image("a")]);
    }

    /// Every hub-check outcome is rejected for an image outside `CheckingHub`.
    fn assert_hub_check_rejected(model: &mut Model, sha: &str, actual: ScanStatus) {
        for outcome in [
            HubCheckOutcome::NotFound,
            HubCheckOutcome::Failed("lookup failed".to_string()),
            HubCheckOutcome::Found(results(1, 1, "IN_VIOLATION")),
        ] {
            let before = model.image_info(sha).cloned();

            let err = model.report_hub_check(&image(sha), outcome).unwrap_err();

            assert_eq!(
                err,
                ModelError::InvalidTransition {
                    sha: sha.to_string(),
                    operation: "report_hub_check",
                    expected: vec![ScanStatus::CheckingHub],
                    actual,
                }
            );
            assert_eq!(model.image_info(sha).cloned(), before);
        }
        assert_queue_invariant(model);
    }

    #[test]
    fn hub_check_report_requires_checking_hub() {
        let mut model = Model::new(SchedulingConfig {
            hub_check_enabled: false,
            retry_policy: RetryPolicy::with_max_attempts(1),
            ..Default::default()
        });
        model.register_image(image("quarantined"));
        let img = model.next_scan_image().unwrap().unwrap();
        model
            .report_scan_finished(&img, Some("boom".to_string()))
            .unwrap();
        model.register_image(image("queued"));

        assert_hub_check_rejected(&mut model, "quarantined", ScanStatus::Error);
        assert_hub_check_rejected(&mut model, "queued", ScanStatus::ScanQueued);

        let mut model = Model::new(SchedulingConfig::default());
        model.register_image(image("waiting"));
        assert_hub_check_rejected(&mut model, "waiting", ScanStatus::HubCheckQueued);
    }

    #[test]
    fn huge_scan_timeout_never_reclaims() {
        let clock = ManualClock::new(Utc::now());
        let mut model = Model::with_clock(
            SchedulingConfig {
                hub_check_enabled: false,
                ..Default::default()
            },
            clock.clone(),
        );
        model.register_image(image("a"));
        model.next_scan_image().unwrap().unwrap();
        clock.advance(TimeDelta::days(365));

        let reclaimed = model
            .reclaim_stale_scans(TimeDelta::seconds(10_000_000_000_000))
            .unwrap();

        assert!(reclaimed.is_empty());
        assert_eq!(status(&model, "a"), ScanStatus::ScanRunning);
    }

    #[test]
    fn stale_scans_are_reclaimed() {
        let clock = ManualClock::new(Utc::now());
        let mut model = Model::with_clock(
            SchedulingConfig {
                concurrent_scan_limit: 1,
                hub_check_enabled: false,
                ..Default::default()
            },
            clock.clone(),
        );
        model.register_image(image("a"));
        model.register_image(image("b"));
        model.next_scan_image().unwrap().unwrap();

        clock.advance(TimeDelta::seconds(30));
        assert!(model
            .reclaim_stale_scans(TimeDelta::seconds(60))
            .unwrap()
            .is_empty());

        clock.advance(TimeDelta::seconds(30));
        let reclaimed = model.reclaim_stale_scans(TimeDelta::seconds(60)).unwrap();

        assert_eq!(reclaimed, vec![image("a")]);
        assert_eq!(status(&model, "a"), ScanStatus::ScanQueued);
        assert_eq!(model.next_scan_image().unwrap(), Some(image("b")));
        assert_queue_invariant(&model);
    }

    #[test]
    fn snapshot_projects_counts() {
        let mut model = Model::new(SchedulingConfig::default());
        model.add_pod(pod("ns", "p1", &["a", "b"]));
        model.add_pod(pod("ns", "p2", &["a"]));
        model.register_image(image("orphan"));
        model.next_hub_check_image().unwrap();

        let snapshot = model.snapshot();

        assert_eq!(snapshot.pod_count, 2);
        assert_eq!(snapshot.image_count, 3);
        assert_eq!(snapshot.status_counts[&ScanStatus::CheckingHub], 1);
        assert_eq!(snapshot.status_counts[&ScanStatus::HubCheckQueued], 2);
        assert_eq!(snapshot.status_counts[&ScanStatus::Complete], 0);
        assert_eq!(snapshot.hub_check_queue_len, 2);
        assert_eq!(snapshot.containers_per_pod.get(&2), Some(&1));
        assert_eq!(snapshot.containers_per_pod.get(&1), Some(&1));
        assert_eq!(snapshot.references_per_image.get(&2), Some(&1));
        assert_eq!(snapshot.references_per_image.get(&1), Some(&1));
        assert_eq!(snapshot.unreferenced_image_count, 1);
    }
}
