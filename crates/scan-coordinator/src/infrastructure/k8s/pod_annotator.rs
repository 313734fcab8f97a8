use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::ModelHandle;
use crate::infrastructure::k8s::annotations::annotation_patch;
use crate::infrastructure::k8s::annotations::AnnotationTracker;
use crate::infrastructure::k8s::annotations::PodAnnotations;
use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::kube_client;

/// Writes each pod's aggregated scan results back onto the pod as
/// annotations, every `interval`.
pub struct PodAnnotator {
    kubeconfig: Option<PathBuf>,
    interval: Duration,
}

impl PodAnnotator {
    pub(crate) fn new(kubeconfig: Option<PathBuf>, interval: Duration) -> Self {
        Self {
            kubeconfig,
            interval,
        }
    }

    /// Annotate pods until cancelled. Failed patches are retried on the
    /// next tick.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ConnectionFailed`] if no client can be built
    #[tracing::instrument(skip_all, fields(interval_secs = self.interval.as_secs()))]
    pub(crate) async fn run(
        &self,
        model: ModelHandle,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting pod annotator");
        let client = kube_client::init_kube_client(self.kubeconfig.clone()).await?;
        let mut tracker = AnnotationTracker::default();

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Pod annotator shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let results = match model.all_scan_results().await {
                        Ok(results) => results,
                        Err(e) => {
                            warn!("Failed to read scan results: {e:?}");
                            continue;
                        }
                    };
                    for pod in tracker.pending(&results) {
                        match patch_pod(&client, &pod).await {
                            Ok(()) => {
                                debug!(pod = %pod.qualified_name(), "Pod annotated");
                                tracker.mark_written(pod);
                            }
                            Err(report) => warn!("{report:?}"),
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

async fn patch_pod(client: &Client, pod: &PodAnnotations) -> Result<(), Report<KubernetesError>> {
    let api: Api<KubePod> = Api::namespaced(client.clone(), &pod.namespace);
    let patch = annotation_patch(&pod.annotations);
    api.patch(&pod.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| {
            Report::new(KubernetesError::PatchFailed {
                message: format!("Failed to annotate pod {}: {e}", pod.qualified_name()),
            })
        })?;
    Ok(())
}
