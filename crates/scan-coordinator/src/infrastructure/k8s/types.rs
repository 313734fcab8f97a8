use core::error::Error;

use api_types::Pod;

/// Pod changes observed in the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum PodUpdate {
    /// A pod was created or changed; carries its full snapshot
    Applied { pod: Pod },
    /// A pod was deleted or is terminating
    Deleted { qualified_name: String },
    /// The complete current pod set, from a watch restart or a resync
    Resync { pods: Vec<Pod> },
}

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[display("Failed to list pods: {message}")]
    ListFailed { message: String },
    #[display("Failed to patch pod: {message}")]
    PatchFailed { message: String },
}

impl Error for KubernetesError {}
