use api_types::AllPods;
use api_types::AllScanResults;
use api_types::AnalysisComplete;
use api_types::DeletePod;
use api_types::FinishedScanClientJob;
use api_types::HubCheckResult;
use api_types::Image;
use api_types::ImagesAwaitingAnalysis;
use api_types::NextImage;
use api_types::Pod;
use api_types::PodScanResults;
use poem::handler;
use poem::web::Data;
use poem::web::Json;
use poem::web::Path;
use tracing::info;

use super::errors::ApiError;
use crate::domain::ModelHandle;
use crate::domain::ModelSnapshot;

#[handler]
pub async fn add_pod(Json(pod): Json<Pod>, model: Data<&ModelHandle>) -> poem::Result<()> {
    info!(pod = %pod.qualified_name(), "Add pod");
    model.add_pod(pod).await.map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn update_pod(Json(pod): Json<Pod>, model: Data<&ModelHandle>) -> poem::Result<()> {
    info!(pod = %pod.qualified_name(), "Update pod");
    model.update_pod(pod).await.map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn delete_pod(
    Json(request): Json<DeletePod>,
    model: Data<&ModelHandle>,
) -> poem::Result<()> {
    info!(pod = %request.qualified_name, "Delete pod");
    model
        .delete_pod(request.qualified_name)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn set_all_pods(
    Json(request): Json<AllPods>,
    model: Data<&ModelHandle>,
) -> poem::Result<()> {
    info!(pod_count = request.pods.len(), "Replace all pods");
    model
        .set_all_pods(request.pods)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn register_image(Json(image): Json<Image>, model: Data<&ModelHandle>) -> poem::Result<()> {
    let new = model
        .register_image(image.clone())
        .await
        .map_err(ApiError::from)?;
    info!(image = %image, new, "Register image");
    Ok(())
}

#[handler]
pub async fn next_hub_check_image(model: Data<&ModelHandle>) -> poem::Result<Json<NextImage>> {
    let image = model.next_hub_check_image().await.map_err(ApiError::from)?;
    Ok(Json(NextImage { image }))
}

#[handler]
pub async fn next_scan_image(model: Data<&ModelHandle>) -> poem::Result<Json<NextImage>> {
    let image = model.next_scan_image().await.map_err(ApiError::from)?;
    Ok(Json(NextImage { image }))
}

#[handler]
pub async fn hub_check_result(
    Json(request): Json<HubCheckResult>,
    model: Data<&ModelHandle>,
) -> poem::Result<()> {
    model
        .report_hub_check(request.image, request.outcome)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn finished_scan(
    Json(request): Json<FinishedScanClientJob>,
    model: Data<&ModelHandle>,
) -> poem::Result<()> {
    model
        .report_scan_finished(request.image, request.err)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn analysis_complete(
    Json(request): Json<AnalysisComplete>,
    model: Data<&ModelHandle>,
) -> poem::Result<()> {
    model
        .report_analysis_complete(request.image, request.results)
        .await
        .map_err(ApiError::from)?;
    Ok(())
}

#[handler]
pub async fn all_scan_results(model: Data<&ModelHandle>) -> poem::Result<Json<AllScanResults>> {
    let pods = model.all_scan_results().await.map_err(ApiError::from)?;
    Ok(Json(AllScanResults { pods }))
}

#[handler]
pub async fn pod_scan_results(
    Path((namespace, name)): Path<(String, String)>,
    model: Data<&ModelHandle>,
) -> poem::Result<Json<PodScanResults>> {
    let results = model
        .scan_results(api_types::qualified_name(&namespace, &name))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(results))
}

#[handler]
pub async fn images_awaiting_analysis(
    model: Data<&ModelHandle>,
) -> poem::Result<Json<ImagesAwaitingAnalysis>> {
    let images = model
        .images_awaiting_analysis()
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ImagesAwaitingAnalysis { images }))
}

#[handler]
pub async fn status(model: Data<&ModelHandle>) -> poem::Result<Json<ModelSnapshot>> {
    let snapshot = model.snapshot().await.map_err(ApiError::from)?;
    Ok(Json(snapshot))
}
