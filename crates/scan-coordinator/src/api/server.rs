use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::put;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers;
use super::request_metrics::RequestMetrics;
use crate::domain::ModelHandle;
use crate::infrastructure::metrics::HttpRequestCounters;

/// Build the REST routes over a model handle. Every request is counted in
/// `request_counters`.
pub fn routes(model: ModelHandle, request_counters: Arc<HttpRequestCounters>) -> impl Endpoint {
    Route::new()
        .at(
            "/pod",
            post(handlers::add_pod)
                .put(handlers::update_pod)
                .delete(handlers::delete_pod),
        )
        .at("/allpods", put(handlers::set_all_pods))
        .at("/image", post(handlers::register_image))
        .at("/nexthubcheckimage", post(handlers::next_hub_check_image))
        .at("/nextimage", post(handlers::next_scan_image))
        .at("/hubcheckresult", post(handlers::hub_check_result))
        .at("/finishedscan", post(handlers::finished_scan))
        .at("/analysiscomplete", post(handlers::analysis_complete))
        .at("/scanresults", get(handlers::all_scan_results))
        .at(
            "/scanresults/:namespace/:name",
            get(handlers::pod_scan_results),
        )
        .at("/awaitinganalysis", get(handlers::images_awaiting_analysis))
        .at("/status", get(handlers::status))
        .data(model)
        .with(RequestMetrics::new(request_counters))
        .with(Tracing)
}

/// HTTP API server for pod reporters, scan workers and result readers
pub struct ApiServer {
    model: ModelHandle,
    request_counters: Arc<HttpRequestCounters>,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(
        model: ModelHandle,
        request_counters: Arc<HttpRequestCounters>,
        listen_addr: String,
    ) -> Self {
        Self {
            model,
            request_counters,
            listen_addr,
        }
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to start or bind to the address
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP API server on {}", self.listen_addr);

        let app = routes(self.model, self.request_counters);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("API server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("API server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = cancellation_token.cancelled() => {
                info!("API server shutdown requested");
                Ok(())
            }
        }
    }
}
