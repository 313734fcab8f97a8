use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::DaemonArgs;
use crate::domain::scheduler::SchedulingConfig;
use crate::domain::Model;
use crate::domain::ModelCoordinator;
use crate::infrastructure::k8s::PodAnnotator;
use crate::infrastructure::k8s::PodWatcher;
use crate::infrastructure::metrics::HttpRequestCounters;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Build the model coordinator and the optional cluster watcher.
    pub fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let scheduling = SchedulingConfig::from(&self.daemon_args);
        tracing::info!(
            concurrent_scan_limit = scheduling.concurrent_scan_limit,
            hub_check_enabled = scheduling.hub_check_enabled,
            max_scan_attempts = ?scheduling.retry_policy.max_attempts,
            "Scheduling configuration"
        );
        let (coordinator, model) = ModelCoordinator::new(Model::new(scheduling));

        let pod_watcher = self.daemon_args.enable_k8s.then(|| {
            Arc::new(PodWatcher::new(
                self.daemon_args.kubeconfig.clone(),
                self.daemon_args.k8s_namespace.clone(),
                self.daemon_args.resync_interval(),
            ))
        });

        let pod_annotator = (self.daemon_args.enable_k8s && self.daemon_args.enable_annotations)
            .then(|| {
                Arc::new(PodAnnotator::new(
                    self.daemon_args.kubeconfig.clone(),
                    self.daemon_args.annotation_interval(),
                ))
            });

        let services = ApplicationServices {
            model,
            request_counters: Arc::new(HttpRequestCounters::new()),
            pod_watcher,
            pod_annotator,
        };
        Ok(Application::new(services, coordinator, self.daemon_args))
    }
}
