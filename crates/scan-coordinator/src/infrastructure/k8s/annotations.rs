use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use api_types::PodScanResults;
use serde_json::json;
use serde_json::Value;

/// Domain prefix for scan result annotations.
const SCAN_COORDINATOR_DOMAIN: &str = "scan-coordinator.io";

/// Scan annotations for one pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PodAnnotations {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

impl PodAnnotations {
    pub fn qualified_name(&self) -> String {
        api_types::qualified_name(&self.namespace, &self.name)
    }
}

/// Annotations describing a pod's aggregated scan results.
pub(crate) fn scan_annotations(results: &PodScanResults) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            format!("{SCAN_COORDINATOR_DOMAIN}/policy-violations"),
            results.policy_violations.to_string(),
        ),
        (
            format!("{SCAN_COORDINATOR_DOMAIN}/vulnerabilities"),
            results.vulnerabilities.to_string(),
        ),
        (
            format!("{SCAN_COORDINATOR_DOMAIN}/overall-status"),
            results.overall_status.clone(),
        ),
    ])
}

/// JSON merge patch body that sets `annotations` and leaves every other
/// annotation of the pod alone.
pub(crate) fn annotation_patch(annotations: &BTreeMap<String, String>) -> Value {
    json!({
        "metadata": {
            "annotations": annotations,
        }
    })
}

/// Remembers what was last written to each pod so unchanged pods are not
/// patched again.
#[derive(Debug, Default)]
pub(crate) struct AnnotationTracker {
    written: HashMap<String, BTreeMap<String, String>>,
}

impl AnnotationTracker {
    /// Pods whose annotations differ from the last successful write.
    /// Forgets pods that are no longer in `results`.
    pub fn pending(&mut self, results: &[PodScanResults]) -> Vec<PodAnnotations> {
        let current: HashSet<String> = results
            .iter()
            .map(|r| api_types::qualified_name(&r.namespace, &r.name))
            .collect();
        self.written.retain(|name, _| current.contains(name));

        results
            .iter()
            .filter_map(|r| {
                let annotations = scan_annotations(r);
                let name = api_types::qualified_name(&r.namespace, &r.name);
                (self.written.get(&name) != Some(&annotations)).then(|| PodAnnotations {
                    namespace: r.namespace.clone(),
                    name: r.name.clone(),
                    annotations,
                })
            })
            .collect()
    }

    pub fn mark_written(&mut self, pod: PodAnnotations) {
        self.written.insert(pod.qualified_name(), pod.annotations);
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn results(name: &str, vulnerabilities: u32, status: &str) -> PodScanResults {
        PodScanResults {
            namespace: "default".to_string(),
            name: name.to_string(),
            policy_violations: 2,
            vulnerabilities,
            overall_status: status.to_string(),
        }
    }

    #[test]
    fn scan_results_map_to_prefixed_annotations() {
        let annotations = scan_annotations(&results("web", 7, "IN_VIOLATION"));

        assert_eq!(
            annotations,
            BTreeMap::from([
                (
                    "scan-coordinator.io/overall-status".to_string(),
                    "IN_VIOLATION".to_string()
                ),
                (
                    "scan-coordinator.io/policy-violations".to_string(),
                    "2".to_string()
                ),
                (
                    "scan-coordinator.io/vulnerabilities".to_string(),
                    "7".to_string()
                ),
            ])
        );
    }

    #[test]
    fn patch_nests_annotations_under_metadata() {
        let patch = annotation_patch(&scan_annotations(&results("web", 0, "NOT_IN_VIOLATION")));

        assert_eq!(
            patch,
            json!({
                "metadata": {
                    "annotations": {
                        "scan-coordinator.io/policy-violations": "2",
                        "scan-coordinator.io/vulnerabilities": "0",
                        "scan-coordinator.io/overall-status": "NOT_IN_VIOLATION",
                    }
                }
            })
        );
    }

    #[test]
    fn only_changed_pods_are_pending() {
        let mut tracker = AnnotationTracker::default();
        let first = vec![results("a", 0, "UNKNOWN"), results("b", 0, "UNKNOWN")];

        let pending = tracker.pending(&first);
        assert_eq!(pending.len(), 2);
        tracker.mark_written(pending[0].clone());
        // "b" failed to write and stays pending
        let pending = tracker.pending(&first);
        assert_eq!(
            pending.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["b"]
        );
        tracker.mark_written(pending[0].clone());
        assert_eq!(tracker.pending(&first), Vec::<PodAnnotations>::new());

        let changed = vec![results("a", 3, "IN_VIOLATION"), results("b", 0, "UNKNOWN")];
        let pending = tracker.pending(&changed);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].qualified_name(), "default/a".to_string());
        assert_eq!(
            pending[0].annotations["scan-coordinator.io/vulnerabilities"].as_str(),
            "3"
        );
    }

    #[test]
    fn deleted_pods_are_forgotten() {
        let mut tracker = AnnotationTracker::default();
        for pod in tracker.pending(&[results("a", 0, "UNKNOWN")]) {
            tracker.mark_written(pod);
        }

        assert_eq!(tracker.pending(&[]), Vec::<PodAnnotations>::new());
        // a pod recreated under the same name is annotated again
        assert_eq!(tracker.pending(&[results("a", 0, "UNKNOWN")]).len(), 1);
    }
}
