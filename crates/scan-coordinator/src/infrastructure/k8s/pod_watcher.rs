use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::api::ListParams;
use kube::runtime::watcher;
use kube::Api;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::infrastructure::k8s::pod_info::kube_qualified_name;
use crate::infrastructure::k8s::pod_info::pod_from_kube;
use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::k8s::types::PodUpdate;
use crate::infrastructure::kube_client;

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Watches cluster pods and reports their container images.
///
/// Besides the watch stream, the full pod list is re-read every
/// `resync_interval` so that missed events are eventually repaired.
pub struct PodWatcher {
    namespace: Option<String>,
    kubeconfig: Option<PathBuf>,
    resync_interval: Duration,
}

impl PodWatcher {
    pub(crate) fn new(
        kubeconfig: Option<PathBuf>,
        namespace: Option<String>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            namespace,
            kubeconfig,
            resync_interval,
        }
    }

    /// Watch pods until cancelled.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ConnectionFailed`] if no client can be built
    #[tracing::instrument(skip(self, update_sender, cancellation_token), fields(namespace = ?self.namespace))]
    pub(crate) async fn run(
        &self,
        update_sender: mpsc::Sender<PodUpdate>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting pod watcher");
        let client = kube_client::init_kube_client(self.kubeconfig.clone()).await?;
        let api: Api<KubePod> = match &self.namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };

        let mut resync = tokio::time::interval_at(
            Instant::now() + self.resync_interval,
            self.resync_interval,
        );
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stream = watcher(api.clone(), watcher::Config::default()).boxed();

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Pod watcher shutdown requested");
                    break;
                }
                _ = resync.tick() => {
                    if let Err(e) = self.resync(&api, &update_sender).await {
                        error!("Pod resync failed: {e:?}");
                    }
                }
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            if let Some(update) = update_for_event(event) {
                                send_update(&update_sender, update).await;
                            }
                        }
                        Some(Err(e)) => {
                            let report = Report::new(KubernetesError::WatchFailed {
                                message: format!("Watch stream error: {e}"),
                            });
                            error!("Pod watch failed: {report:?}");
                            if !wait_or_cancelled(&cancellation_token, WATCH_RETRY_DELAY).await {
                                info!("Pod watcher shutdown requested");
                                break;
                            }
                        }
                        None => {
                            warn!("Pod watch stream ended unexpectedly, restarting...");
                            stream = watcher(api.clone(), watcher::Config::default()).boxed();
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// List every pod and report the full set.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ListFailed`] if the list call fails
    async fn resync(
        &self,
        api: &Api<KubePod>,
        update_sender: &mpsc::Sender<PodUpdate>,
    ) -> Result<(), Report<KubernetesError>> {
        let list = api.list(&ListParams::default()).await.map_err(|e| {
            Report::new(KubernetesError::ListFailed {
                message: format!("Kubernetes API error: {e}"),
            })
        })?;
        let pods = live_pods(list.items.iter());
        debug!(pod_count = pods.len(), "Resyncing pods");
        send_update(update_sender, PodUpdate::Resync { pods }).await;
        Ok(())
    }
}

/// Sleep for `delay`. Returns false if cancelled first.
async fn wait_or_cancelled(cancellation_token: &CancellationToken, delay: Duration) -> bool {
    select! {
        _ = cancellation_token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn send_update(update_sender: &mpsc::Sender<PodUpdate>, update: PodUpdate) {
    if let Err(e) = update_sender.send(update).await {
        warn!("Failed to send pod update: {e}");
    }
}

fn live_pods<'a>(pods: impl Iterator<Item = &'a KubePod>) -> Vec<api_types::Pod> {
    pods.filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .filter_map(pod_from_kube)
        .collect()
}

/// Map a watch event onto a model update.
///
/// A pod carrying a deletion timestamp is treated as deleted.
pub(crate) fn update_for_event(event: watcher::Event<KubePod>) -> Option<PodUpdate> {
    match event {
        watcher::Event::Applied(pod) if pod.metadata.deletion_timestamp.is_some() => {
            kube_qualified_name(&pod).map(|qualified_name| PodUpdate::Deleted { qualified_name })
        }
        watcher::Event::Applied(pod) => pod_from_kube(&pod).map(|pod| PodUpdate::Applied { pod }),
        watcher::Event::Deleted(pod) => {
            kube_qualified_name(&pod).map(|qualified_name| PodUpdate::Deleted { qualified_name })
        }
        watcher::Event::Restarted(pods) => Some(PodUpdate::Resync {
            pods: live_pods(pods.iter()),
        }),
    }
}
