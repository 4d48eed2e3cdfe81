//! Video info route.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tracing::debug;

use crate::Error;
use crate::api::error::ApiResult;
use crate::api::models::VideoInfoResponse;
use crate::api::server::AppState;
use crate::source::is_valid_video_id;

pub fn router() -> Router<AppState> {
    Router::new().route("/info/{id}", get(get_info))
}

/// Title, thumbnail, duration and the downloadable qualities of a video.
async fn get_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoInfoResponse>> {
    if !is_valid_video_id(&id) {
        return Err(Error::not_found("Video", id).into());
    }

    let metadata = state.retriever.get_basic_info(&id).await?;
    let catalog = state.catalog.build(&metadata);
    debug!(
        video_id = %id,
        video_options = catalog.video_options.len(),
        "Built quality catalog"
    );

    Ok(Json(VideoInfoResponse::new(metadata, catalog)))
}
