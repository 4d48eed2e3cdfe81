//! Download routes: muxed MP4 and transcoded MP3.

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::pipeline::deliver;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub quality: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadAudioQuery {
    pub bitrate: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download/{id}", get(download))
        .route("/downloadAudio/{id}", get(download_audio))
}

/// `attachment` disposition with a timestamped file name.
fn attachment(ext: &str) -> HeaderValue {
    let name = format!(
        "attachment; filename=\"{}-ytgrab.{}\"",
        chrono::Utc::now().timestamp_millis(),
        ext
    );
    HeaderValue::from_str(&name).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Mux the requested video quality with the best audio and stream the MP4.
///
/// The temp file lives exactly as long as the response body.
async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let plan = state
        .selector
        .select_video(&id, query.quality.as_deref())
        .await?;

    let video = state.opener.open_stream(&plan.video).await?;
    let audio = state.opener.open_stream(&plan.audio).await?;

    let cancel = state.shutdown.child_token();
    let combined = state
        .combiner
        .combine(video, audio, plan.audio_policy(), &cancel)
        .await?;

    let delivery = deliver(combined).await?;
    info!(
        video_id = %id,
        format = %plan.video.format_id,
        size = delivery.content_length,
        "Streaming combined video"
    );

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_LENGTH, HeaderValue::from(delivery.content_length)),
            (header::CONTENT_DISPOSITION, attachment("mp4")),
        ],
        Body::from_stream(delivery.stream),
    )
        .into_response())
}

/// Transcode the best audio stream to MP3 at the requested bitrate.
async fn download_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadAudioQuery>,
) -> ApiResult<Response> {
    let plan = state
        .selector
        .select_audio(&id, query.bitrate.as_deref())
        .await?;

    let source = state.opener.open_stream(&plan.audio).await?;
    let stream = state.transcoder.transcode(source, plan.bitrate_kbps)?;
    info!(
        video_id = %id,
        bitrate_kbps = plan.bitrate_kbps,
        "Streaming transcoded audio"
    );

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
            (header::CONTENT_DISPOSITION, attachment("mp3")),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
