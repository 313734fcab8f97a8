//! Shared API type definitions
//!
//! This crate contains the wire types exchanged between the scan coordinator,
//! the cluster watcher, scan workers and the analysis-backend poller: pods,
//! containers, content-addressed images, scan results and the request and
//! response bodies of the REST API.

use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

/// Overall status reported for an image without policy violations.
pub const NOT_IN_VIOLATION: &str = "NOT_IN_VIOLATION";

/// A content-addressed container image reference.
///
/// Two images with the same `sha` are the same image, whatever their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Content digest, e.g. `sha256:...`
    pub sha: String,
    /// Human readable repository name and tag
    pub name: String,
}

impl Image {
    pub fn new(sha: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            name: name.into(),
        }
    }

    pub fn human_readable_name(&self) -> String {
        format!("{}@{}", self.name, self.sha)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.sha == other.sha
    }
}

impl Eq for Image {}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sha.hash(state);
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.human_readable_name())
    }
}

/// A container and the image it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: Image,
}

/// Snapshot of a pod as reported by the cluster watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
    /// Pod UID, informational only
    #[serde(default)]
    pub uid: String,
    /// Containers in declaration order
    pub containers: Vec<Container>,
}

impl Pod {
    /// Registry key of the pod, `<namespace>/<name>`.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.namespace, &self.name)
    }
}

pub fn qualified_name(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Findings of a completed analysis for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub policy_violation_count: u32,
    pub vulnerability_count: u32,
    pub overall_status: String,
}

/// Aggregated findings of a pod's images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodScanResults {
    pub namespace: String,
    pub name: String,
    pub policy_violations: u32,
    pub vulnerabilities: u32,
    pub overall_status: String,
}

/// Outcome of looking an image up in the analysis backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum HubCheckOutcome {
    /// The backend already has completed results for the image
    Found(ScanResults),
    /// Nothing known about the image yet
    NotFound,
    /// The lookup failed or was ambiguous
    Failed(String),
}

/// Body of `DELETE /pod`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePod {
    pub qualified_name: String,
}

/// Body of `PUT /allpods`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllPods {
    pub pods: Vec<Pod>,
}

/// Response of the image dequeue endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextImage {
    /// `None` when no image is available right now
    pub image: Option<Image>,
}

/// Body of `POST /hubcheckresult`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubCheckResult {
    pub image: Image,
    pub outcome: HubCheckOutcome,
}

/// Body of `POST /finishedscan`, reported by a scan worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedScanClientJob {
    pub image: Image,
    /// Scan client error, `None` on success
    pub err: Option<String>,
}

/// Body of `POST /analysiscomplete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisComplete {
    pub image: Image,
    pub results: ScanResults,
}

/// Response of `GET /scanresults`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllScanResults {
    pub pods: Vec<PodScanResults>,
}

/// Response of `GET /awaitinganalysis`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesAwaitingAnalysis {
    /// Images whose scan client finished, analysis still pending
    pub images: Vec<Image>,
}
