//! Pod management: the pod registry and per-pod result aggregation

pub mod registry;

pub use registry::aggregate_pod;
pub use registry::PodRegistry;
