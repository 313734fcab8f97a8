//! Read-only status projection of the model, used for metrics and `/status`.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;

use super::pod_management::PodRegistry;
use super::scan::ImageScanRegistry;
use super::scan::ScanStatus;
use super::scheduler::QueueType;
use super::scheduler::ScanScheduler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    /// Number of images in each status, every status present
    pub status_counts: BTreeMap<ScanStatus, usize>,
    pub pod_count: usize,
    pub image_count: usize,
    pub active_scan_count: usize,
    pub concurrent_scan_limit: usize,
    pub hub_check_queue_len: usize,
    pub scan_queue_len: usize,
    /// containers in a pod -> number of pods
    pub containers_per_pod: BTreeMap<usize, usize>,
    /// container references to an image -> number of images
    pub references_per_image: BTreeMap<usize, usize>,
    /// Registered images no current pod refers to
    pub unreferenced_image_count: usize,
}

impl ModelSnapshot {
    pub(crate) fn capture(
        pods: &PodRegistry,
        images: &ImageScanRegistry,
        scheduler: &ScanScheduler,
    ) -> Self {
        let mut status_counts: BTreeMap<ScanStatus, usize> =
            ScanStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for info in images.iter() {
            *status_counts.entry(info.status).or_default() += 1;
        }

        let mut containers_per_pod = BTreeMap::new();
        let mut references: HashMap<&str, usize> = HashMap::new();
        for pod in pods.iter() {
            *containers_per_pod.entry(pod.containers.len()).or_default() += 1;
            for container in &pod.containers {
                *references.entry(container.image.sha.as_str()).or_default() += 1;
            }
        }

        let mut references_per_image = BTreeMap::new();
        for count in references.values() {
            *references_per_image.entry(*count).or_default() += 1;
        }
        let unreferenced_image_count = images
            .iter()
            .filter(|info| !references.contains_key(info.image.sha.as_str()))
            .count();

        Self {
            status_counts,
            pod_count: pods.len(),
            image_count: images.len(),
            active_scan_count: scheduler.active_scan_count(images),
            concurrent_scan_limit: scheduler.config().concurrent_scan_limit,
            hub_check_queue_len: scheduler.queues().len(QueueType::HubCheck),
            scan_queue_len: scheduler.queues().len(QueueType::Scan),
            containers_per_pod,
            references_per_image,
            unreferenced_image_count,
        }
    }
}
