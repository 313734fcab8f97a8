use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use chrono::TimeDelta;
use error_stack::Report;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::app::core::Application;
use crate::domain::CoordinatorError;
use crate::domain::ModelHandle;
use crate::infrastructure::k8s::PodUpdate;
use crate::infrastructure::metrics;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, app: &mut Application) -> Result<()> {
        let coordinator = app
            .take_coordinator()
            .ok_or_else(|| anyhow!("model coordinator already started"))?;
        let token = self.cancellation_token.clone();
        self.tasks.push(tokio::spawn(async move {
            tracing::info!("Starting model coordinator task");
            coordinator.run(token).await;
            tracing::info!("Model coordinator task completed");
        }));

        let cli = app.daemon_args().clone();

        if cli.enable_metrics {
            let metrics_task = self.spawn_metrics_task(app);
            self.tasks.push(metrics_task);
        }

        if let Some(timeout) = cli.scan_timeout() {
            let timeout = TimeDelta::from_std(timeout).context("scan timeout out of range")?;
            let sweep_task = self.spawn_stale_scan_sweep_task(app, timeout, cli.sweep_interval());
            self.tasks.push(sweep_task);
        }

        if cli.enable_k8s {
            let (k8s_update_sender, k8s_update_receiver) = mpsc::channel::<PodUpdate>(32);

            let k8s_task = self.spawn_k8s_watcher_task(app, k8s_update_sender)?;
            self.tasks.push(k8s_task);

            let k8s_processor_task =
                self.spawn_k8s_processor_task(k8s_update_receiver, app.services().model.clone());
            self.tasks.push(k8s_processor_task);

            if cli.enable_annotations {
                let annotator_task = self.spawn_pod_annotator_task(app)?;
                self.tasks.push(annotator_task);
            }
        }

        let api_server_task = self.spawn_api_server_task(app);
        self.tasks.push(api_server_task);

        Ok(())
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::signal;
                use tokio::signal::unix::SignalKind;
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                self.cancellation_token.cancel();
                self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                self.cancellation_token.cancel();
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }

        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_metrics_task(&self, app: &Application) -> JoinHandle<()> {
        let cli = app.daemon_args();
        let model = app.services().model.clone();
        let request_counters = app.services().request_counters.clone();
        let format = cli.metrics_format;
        let interval = cli.metrics_interval();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting metrics collection task");
            metrics::run_metrics(model, request_counters, format, interval, token).await;
            tracing::info!("Metrics collection task completed");
        })
    }

    fn spawn_stale_scan_sweep_task(
        &self,
        app: &Application,
        timeout: TimeDelta,
        interval: Duration,
    ) -> JoinHandle<()> {
        let model = app.services().model.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!(
                timeout_secs = timeout.num_seconds(),
                "Starting stale scan sweep task"
            );
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match model.reclaim_stale_scans(timeout).await {
                            Ok(reclaimed) if !reclaimed.is_empty() => {
                                tracing::warn!(count = reclaimed.len(), "Reclaimed stale scans");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Stale scan sweep failed: {e:?}"),
                        }
                    }
                    _ = token.cancelled() => {
                        tracing::info!("Stale scan sweep task cancelled");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_k8s_watcher_task(
        &self,
        app: &Application,
        k8s_update_sender: mpsc::Sender<PodUpdate>,
    ) -> Result<JoinHandle<()>> {
        let token = self.cancellation_token.clone();
        let pod_watcher = app
            .services()
            .pod_watcher
            .clone()
            .context("Kubernetes monitoring enabled without a pod watcher")?;
        Ok(tokio::spawn(async move {
            tracing::info!("Starting Kubernetes pod watcher task");
            if let Err(e) = pod_watcher.run(k8s_update_sender, token).await {
                tracing::error!("Kubernetes pod watcher failed: {e:?}");
            } else {
                tracing::info!("Kubernetes pod watcher completed");
            }
        }))
    }

    fn spawn_pod_annotator_task(&self, app: &Application) -> Result<JoinHandle<()>> {
        let model = app.services().model.clone();
        let token = self.cancellation_token.clone();
        let pod_annotator = app
            .services()
            .pod_annotator
            .clone()
            .context("Pod annotations enabled without a pod annotator")?;
        Ok(tokio::spawn(async move {
            tracing::info!("Starting pod annotator task");
            if let Err(e) = pod_annotator.run(model, token).await {
                tracing::error!("Pod annotator failed: {e:?}");
            } else {
                tracing::info!("Pod annotator completed");
            }
        }))
    }

    fn spawn_api_server_task(&self, app: &Application) -> JoinHandle<()> {
        let model = app.services().model.clone();
        let request_counters = app.services().request_counters.clone();
        let listen_addr = app.daemon_args().listen_addr.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let api_server = ApiServer::new(model, request_counters, listen_addr);
            if let Err(e) = api_server.run(token).await {
                tracing::error!("API server failed: {e:?}");
            } else {
                tracing::info!("API server completed");
            }
        })
    }

    fn spawn_k8s_processor_task(
        &self,
        mut k8s_update_receiver: mpsc::Receiver<PodUpdate>,
        model: ModelHandle,
    ) -> JoinHandle<()> {
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting Kubernetes update processor task");
            loop {
                tokio::select! {
                    update = k8s_update_receiver.recv() => {
                        match update {
                            Some(update) => {
                                if let Err(e) = apply_pod_update(&model, update).await {
                                    tracing::error!("Failed to apply pod update: {e:?}");
                                }
                            }
                            None => {
                                tracing::info!("Kubernetes update receiver closed");
                                break;
                            }
                        }
                    }
                    _ = token.cancelled() => {
                        tracing::info!("Kubernetes update processor task cancelled");
                        break;
                    }
                }
            }
        })
    }
}

/// Forward one cluster observation to the model.
pub(crate) async fn apply_pod_update(
    model: &ModelHandle,
    update: PodUpdate,
) -> Result<(), Report<CoordinatorError>> {
    match update {
        PodUpdate::Applied { pod } => {
            tracing::debug!(pod = %pod.qualified_name(), containers = pod.containers.len(), "Pod applied");
            model.update_pod(pod).await
        }
        PodUpdate::Deleted { qualified_name } => {
            tracing::info!(pod = %qualified_name, "Pod deleted");
            model.delete_pod(qualified_name).await.map(|_| ())
        }
        PodUpdate::Resync { pods } => {
            tracing::debug!(pod_count = pods.len(), "Pod resync");
            model.set_all_pods(pods).await
        }
    }
}

#[cfg(test)]
mod tests {
    use api_types::Container;
    use api_types::Image;
    use api_types::Pod;

    use super::*;
    use crate::domain::scheduler::SchedulingConfig;
    use crate::domain::Model;
    use crate::domain::ModelCoordinator;

    fn pod(name: &str) -> Pod {
        Pod {
            name: name.to_string(),
            namespace: "default".to_string(),
            uid: String::new(),
            containers: vec![Container {
                name: "app".to_string(),
                image: Image::new(format!("sha256:{name}"), "nginx"),
            }],
        }
    }

    #[test_log::test(tokio::test)]
    async fn pod_updates_reach_the_model() {
        let (coordinator, model) = ModelCoordinator::new(Model::new(SchedulingConfig::default()));
        let token = CancellationToken::new();
        tokio::spawn(coordinator.run(token.clone()));

        apply_pod_update(&model, PodUpdate::Applied { pod: pod("a") })
            .await
            .unwrap();
        apply_pod_update(&model, PodUpdate::Applied { pod: pod("b") })
            .await
            .unwrap();
        apply_pod_update(
            &model,
            PodUpdate::Deleted {
                qualified_name: "default/a".to_string(),
            },
        )
        .await
        .unwrap();
        apply_pod_update(
            &model,
            PodUpdate::Resync {
                pods: vec![pod("b"), pod("c")],
            },
        )
        .await
        .unwrap();

        let snapshot = model.snapshot().await.unwrap();
        assert_eq!(snapshot.pod_count, 2);
        assert_eq!(snapshot.image_count, 3, "deleted pod keeps its image");
        let names: Vec<_> = model
            .all_scan_results()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        token.cancel();
    }
}
