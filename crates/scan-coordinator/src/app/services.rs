use std::sync::Arc;

use crate::domain::ModelHandle;
use crate::infrastructure::k8s::PodAnnotator;
use crate::infrastructure::k8s::PodWatcher;
use crate::infrastructure::metrics::HttpRequestCounters;

/// Application dependencies shared by the background tasks
pub struct ApplicationServices {
    pub model: ModelHandle,
    /// Shared by the API middleware and the metrics task
    pub request_counters: Arc<HttpRequestCounters>,
    /// Present only when Kubernetes monitoring is enabled
    pub pod_watcher: Option<Arc<PodWatcher>>,
    /// Present only when Kubernetes monitoring and annotations are enabled
    pub pod_annotator: Option<Arc<PodAnnotator>>,
}
