//! Kubernetes integration module.
//!
//! Watches cluster pods and turns them into model pods, and writes scan
//! results back onto them:
//! - [`PodWatcher`]: watch stream plus periodic full-list resync
//! - [`PodAnnotator`]: periodic annotation writeback
//! - [`pod_info`]: translation of k8s pods into model pods
//! - [`PodUpdate`]: events sent to the update processor

pub mod annotations;
pub mod pod_annotator;
pub mod pod_info;
pub mod pod_watcher;
pub mod types;

pub use pod_annotator::PodAnnotator;
pub use pod_watcher::PodWatcher;
pub use types::KubernetesError;
pub use types::PodUpdate;
