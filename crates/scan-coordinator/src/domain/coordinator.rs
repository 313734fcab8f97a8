//! Single-writer actor around the [`Model`].
//!
//! Every caller (REST handlers, the pod watcher, the periodic tasks) talks to
//! the model through a cloneable [`ModelHandle`]. Commands are applied one at
//! a time in arrival order by [`ModelCoordinator::run`].

use api_types::HubCheckOutcome;
use api_types::Image;
use api_types::Pod;
use api_types::PodScanResults;
use api_types::ScanResults;
use chrono::TimeDelta;
use core::error::Error;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::error::ModelError;
use super::model::Model;
use super::status::ModelSnapshot;

const DEFAULT_COMMAND_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<T>;
type ModelReply<T> = Reply<Result<T, ModelError>>;

#[derive(Debug, derive_more::Display)]
pub enum CoordinatorError {
    #[display("Model coordinator is not running")]
    Unavailable,
    #[display("Model coordinator dropped the reply")]
    ReplyDropped,
    #[display("Model rejected the operation: {_0}")]
    Rejected(ModelError),
}

impl Error for CoordinatorError {}

#[derive(Debug)]
pub enum ModelCommand {
    AddPod {
        pod: Pod,
        reply: Reply<()>,
    },
    UpdatePod {
        pod: Pod,
        reply: Reply<()>,
    },
    DeletePod {
        qualified_name: String,
        reply: Reply<bool>,
    },
    SetAllPods {
        pods: Vec<Pod>,
        reply: Reply<()>,
    },
    RegisterImage {
        image: Image,
        reply: Reply<bool>,
    },
    NextHubCheckImage {
        reply: ModelReply<Option<Image>>,
    },
    NextScanImage {
        reply: ModelReply<Option<Image>>,
    },
    ReportHubCheck {
        image: Image,
        outcome: HubCheckOutcome,
        reply: ModelReply<()>,
    },
    ReportScanFinished {
        image: Image,
        err: Option<String>,
        reply: ModelReply<()>,
    },
    ReportAnalysisComplete {
        image: Image,
        results: ScanResults,
        reply: ModelReply<()>,
    },
    ScanResults {
        qualified_name: String,
        reply: ModelReply<PodScanResults>,
    },
    AllScanResults {
        reply: Reply<Vec<PodScanResults>>,
    },
    ImagesAwaitingAnalysis {
        reply: Reply<Vec<Image>>,
    },
    ReclaimStaleScans {
        timeout: TimeDelta,
        reply: ModelReply<Vec<Image>>,
    },
    Snapshot {
        reply: Reply<ModelSnapshot>,
    },
}

/// Owns the model and applies commands serially.
pub struct ModelCoordinator {
    model: Model,
    receiver: mpsc::Receiver<ModelCommand>,
}

impl ModelCoordinator {
    pub fn new(model: Model) -> (Self, ModelHandle) {
        Self::with_capacity(model, DEFAULT_COMMAND_CAPACITY)
    }

    pub fn with_capacity(model: Model, capacity: usize) -> (Self, ModelHandle) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { model, receiver }, ModelHandle { sender })
    }

    /// Process commands until cancelled or until every handle is dropped.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            tracing::info!("All model handles dropped, stopping coordinator");
                            break;
                        }
                    }
                }
                _ = cancellation_token.cancelled() => {
                    tracing::info!("Model coordinator cancelled");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, command: ModelCommand) {
        match command {
            ModelCommand::AddPod { pod, reply } => {
                self.model.add_pod(pod);
                let _ = reply.send(());
            }
            ModelCommand::UpdatePod { pod, reply } => {
                self.model.update_pod(pod);
                let _ = reply.send(());
            }
            ModelCommand::DeletePod {
                qualified_name,
                reply,
            } => {
                let _ = reply.send(self.model.delete_pod(&qualified_name));
            }
            ModelCommand::SetAllPods { pods, reply } => {
                self.model.set_all_pods(pods);
                let _ = reply.send(());
            }
            ModelCommand::RegisterImage { image, reply } => {
                let _ = reply.send(self.model.register_image(image));
            }
            ModelCommand::NextHubCheckImage { reply } => {
                let result = self.model.next_hub_check_image();
                let _ = reply.send(log_rejection("next_hub_check_image", result));
            }
            ModelCommand::NextScanImage { reply } => {
                let result = self.model.next_scan_image();
                let _ = reply.send(log_rejection("next_scan_image", result));
            }
            ModelCommand::ReportHubCheck {
                image,
                outcome,
                reply,
            } => {
                let result = self.model.report_hub_check(&image, outcome);
                let _ = reply.send(log_rejection("report_hub_check", result));
            }
            ModelCommand::ReportScanFinished { image, err, reply } => {
                let result = self.model.report_scan_finished(&image, err);
                let _ = reply.send(log_rejection("report_scan_finished", result));
            }
            ModelCommand::ReportAnalysisComplete {
                image,
                results,
                reply,
            } => {
                let result = self.model.report_analysis_complete(&image, results);
                let _ = reply.send(log_rejection("report_analysis_complete", result));
            }
            ModelCommand::ScanResults {
                qualified_name,
                reply,
            } => {
                let _ = reply.send(self.model.scan_results(&qualified_name));
            }
            ModelCommand::AllScanResults { reply } => {
                let _ = reply.send(self.model.all_scan_results());
            }
            ModelCommand::ImagesAwaitingAnalysis { reply } => {
                let _ = reply.send(self.model.images_awaiting_analysis());
            }
            ModelCommand::ReclaimStaleScans { timeout, reply } => {
                let result = self.model.reclaim_stale_scans(timeout);
                let _ = reply.send(log_rejection("reclaim_stale_scans", result));
            }
            ModelCommand::Snapshot { reply } => {
                let _ = reply.send(self.model.snapshot());
            }
        }
    }
}

/// Fatal-class errors are caller bugs; the model is unchanged and keeps serving.
fn log_rejection<T>(operation: &str, result: Result<T, ModelError>) -> Result<T, ModelError> {
    if let Err(e) = &result {
        if e.is_fatal() {
            tracing::error!(operation, error = %e, "Rejected invalid model operation");
        }
    }
    result
}

/// Cloneable front-end of the [`ModelCoordinator`].
#[derive(Debug, Clone)]
pub struct ModelHandle {
    sender: mpsc::Sender<ModelCommand>,
}

impl ModelHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> ModelCommand,
    ) -> Result<T, Report<CoordinatorError>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| Report::new(CoordinatorError::Unavailable))?;
        response
            .await
            .change_context(CoordinatorError::ReplyDropped)
    }

    async fn request_model<T>(
        &self,
        operation: &'static str,
        command: impl FnOnce(ModelReply<T>) -> ModelCommand,
    ) -> Result<T, Report<CoordinatorError>> {
        self.request(command).await?.map_err(|e| {
            Report::new(CoordinatorError::Rejected(e))
                .attach_printable(format!("operation: {operation}"))
        })
    }

    pub async fn add_pod(&self, pod: Pod) -> Result<(), Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::AddPod { pod, reply })
            .await
    }

    pub async fn update_pod(&self, pod: Pod) -> Result<(), Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::UpdatePod { pod, reply })
            .await
    }

    pub async fn delete_pod(
        &self,
        qualified_name: impl Into<String>,
    ) -> Result<bool, Report<CoordinatorError>> {
        let qualified_name = qualified_name.into();
        self.request(|reply| ModelCommand::DeletePod {
            qualified_name,
            reply,
        })
        .await
    }

    pub async fn set_all_pods(&self, pods: Vec<Pod>) -> Result<(), Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::SetAllPods { pods, reply })
            .await
    }

    pub async fn register_image(&self, image: Image) -> Result<bool, Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::RegisterImage { image, reply })
            .await
    }

    pub async fn next_hub_check_image(&self) -> Result<Option<Image>, Report<CoordinatorError>> {
        self.request_model("next_hub_check_image", |reply| {
            ModelCommand::NextHubCheckImage { reply }
        })
        .await
    }

    pub async fn next_scan_image(&self) -> Result<Option<Image>, Report<CoordinatorError>> {
        self.request_model("next_scan_image", |reply| ModelCommand::NextScanImage {
            reply,
        })
        .await
    }

    pub async fn report_hub_check(
        &self,
        image: Image,
        outcome: HubCheckOutcome,
    ) -> Result<(), Report<CoordinatorError>> {
        self.request_model("report_hub_check", |reply| ModelCommand::ReportHubCheck {
            image,
            outcome,
            reply,
        })
        .await
    }

    pub async fn report_scan_finished(
        &self,
        image: Image,
        err: Option<String>,
    ) -> Result<(), Report<CoordinatorError>> {
        self.request_model("report_scan_finished", |reply| {
            ModelCommand::ReportScanFinished { image, err, reply }
        })
        .await
    }

    pub async fn report_analysis_complete(
        &self,
        image: Image,
        results: ScanResults,
    ) -> Result<(), Report<CoordinatorError>> {
        self.request_model("report_analysis_complete", |reply| {
            ModelCommand::ReportAnalysisComplete {
                image,
                results,
                reply,
            }
        })
        .await
    }

    pub async fn scan_results(
        &self,
        qualified_name: impl Into<String>,
    ) -> Result<PodScanResults, Report<CoordinatorError>> {
        let qualified_name = qualified_name.into();
        self.request_model("scan_results", |reply| ModelCommand::ScanResults {
            qualified_name,
            reply,
        })
        .await
    }

    pub async fn all_scan_results(&self) -> Result<Vec<PodScanResults>, Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::AllScanResults { reply })
            .await
    }

    pub async fn images_awaiting_analysis(&self) -> Result<Vec<Image>, Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::ImagesAwaitingAnalysis { reply })
            .await
    }

    pub async fn reclaim_stale_scans(
        &self,
        timeout: TimeDelta,
    ) -> Result<Vec<Image>, Report<CoordinatorError>> {
        self.request_model("reclaim_stale_scans", |reply| {
            ModelCommand::ReclaimStaleScans { timeout, reply }
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<ModelSnapshot, Report<CoordinatorError>> {
        self.request(|reply| ModelCommand::Snapshot { reply }).await
    }
}
