//! Pod registry keyed by qualified name, with on-demand result aggregation

use std::collections::HashMap;
use std::collections::HashSet;

use api_types::Pod;
use api_types::PodScanResults;
use api_types::NOT_IN_VIOLATION;

use crate::domain::error::ModelError;
use crate::domain::error::Result;
use crate::domain::scan::ImageScanRegistry;
use crate::domain::scan::ScanStatus;

/// Pod snapshots keyed by `<namespace>/<name>`.
///
/// An update is a full replacement of the previous snapshot. Removing a pod
/// never touches image records.
#[derive(Debug, Default)]
pub struct PodRegistry {
    pods: HashMap<String, Pod>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pod, returning the snapshot it replaced.
    pub fn insert(&mut self, pod: Pod) -> Option<Pod> {
        self.pods.insert(pod.qualified_name(), pod)
    }

    pub fn remove(&mut self, qualified_name: &str) -> Option<Pod> {
        self.pods.remove(qualified_name)
    }

    /// Drop every pod whose qualified name is not in `keep`.
    ///
    /// Returns the removed names.
    pub fn retain_only(&mut self, keep: &HashSet<String>) -> Vec<String> {
        let removed: Vec<String> = self
            .pods
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in &removed {
            self.pods.remove(name);
        }
        removed
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Pod> {
        self.pods.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.pods.contains_key(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pod> {
        self.pods.values()
    }

    /// Aggregate the completed scan results of a pod's images.
    ///
    /// # Errors
    ///
    /// - [`ModelError::PodNotFound`] if no pod is registered under the name
    pub fn aggregate(
        &self,
        qualified_name: &str,
        images: &ImageScanRegistry,
    ) -> Result<PodScanResults> {
        let pod = self
            .pods
            .get(qualified_name)
            .ok_or_else(|| ModelError::PodNotFound {
                qualified_name: qualified_name.to_string(),
            })?;
        Ok(aggregate_pod(pod, images))
    }
}

/// Sum findings over the pod's containers.
///
/// Images that are not `Complete` contribute nothing. The overall status is
/// the last non-`NOT_IN_VIOLATION` status seen in container order.
pub fn aggregate_pod(pod: &Pod, images: &ImageScanRegistry) -> PodScanResults {
    let mut aggregate = PodScanResults {
        namespace: pod.namespace.clone(),
        name: pod.name.clone(),
        policy_violations: 0,
        vulnerabilities: 0,
        overall_status: String::new(),
    };

    for container in &pod.containers {
        let Some(info) = images.get(&container.image.sha) else {
            continue;
        };
        if info.status != ScanStatus::Complete {
            continue;
        }
        let Some(results) = &info.results else {
            continue;
        };
        aggregate.policy_violations += results.policy_violation_count;
        aggregate.vulnerabilities += results.vulnerability_count;
        // TODO: rank overall statuses by severity instead of last-write-wins
        if results.overall_status != NOT_IN_VIOLATION {
            aggregate.overall_status = results.overall_status.clone();
        }
    }

    aggregate
}
