//! Router tests driven through `tower::ServiceExt::oneshot`.
//!
//! The retriever and stream opener are in-memory fakes; ffmpeg is replaced
//! by the scripts in `common`.

#![cfg(unix)]

mod common;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use tower::ServiceExt;

use common::{entries, muxers, payload, source};
use ytgrab::api::{ApiServer, ApiServerConfig, AppState};
use ytgrab::config::AppConfig;
use ytgrab::source::{ByteStream, FormatInfo, MetadataRetriever, StreamOpener, VideoMetadata};
use ytgrab::{Error, Result};

const ORIGIN: &str = "http://172.17.0.157";

struct FakeRetriever {
    videos: HashMap<String, VideoMetadata>,
}

#[async_trait]
impl MetadataRetriever for FakeRetriever {
    async fn get_basic_info(&self, id: &str) -> Result<VideoMetadata> {
        self.get_info(id).await
    }

    async fn get_info(&self, id: &str) -> Result<VideoMetadata> {
        self.videos
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Video", id))
    }
}

/// Serves a fixed payload per format id.
struct FakeOpener {
    payloads: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl StreamOpener for FakeOpener {
    async fn open_stream(&self, format: &FormatInfo) -> Result<ByteStream> {
        let data = self
            .payloads
            .get(&format.format_id)
            .ok_or_else(|| Error::not_found("Format", &format.format_id))?;
        Ok(source(data, 4096))
    }
}

fn video_format(id: &str, size: u64) -> FormatInfo {
    FormatInfo {
        format_id: id.to_string(),
        ext: "mp4".to_string(),
        vcodec: Some("avc1.4d401f".to_string()),
        content_length: Some(size),
        url: format!("https://media.example/{}", id),
        ..Default::default()
    }
}

fn audio_format(id: &str, abr: f64) -> FormatInfo {
    FormatInfo {
        format_id: id.to_string(),
        ext: "m4a".to_string(),
        acodec: Some("mp4a.40.2".to_string()),
        audio_bitrate_kbps: Some(abr),
        url: format!("https://media.example/{}", id),
        ..Default::default()
    }
}

fn metadata(id: &str, duration: u64) -> VideoMetadata {
    VideoMetadata {
        id: id.to_string(),
        title: format!("Video {}", id),
        thumbnail_url: Some(format!("https://img.example/{}/maxres.jpg", id)),
        duration_seconds: duration,
        video_formats: vec![
            video_format("18", 1_048_576),
            video_format("299", 9_000_000),
            video_format("136", 5_242_880),
        ],
        audio_formats: vec![audio_format("139", 48.0), audio_format("140", 129.5)],
    }
}

struct TestApp {
    router: Router,
    scratch: tempfile::TempDir,
    video: Vec<u8>,
    audio: Vec<u8>,
}

fn app(muxer: &Path) -> TestApp {
    let scratch = tempfile::tempdir().unwrap();
    let video = payload(40_000, 11);
    let audio = payload(6_000, 12);

    let retriever = FakeRetriever {
        videos: HashMap::from([
            ("vid".to_string(), metadata("vid", 600)),
            ("long".to_string(), metadata("long", 601)),
        ]),
    };
    let opener = FakeOpener {
        payloads: HashMap::from([
            ("136".to_string(), video.clone()),
            ("18".to_string(), video.clone()),
            ("140".to_string(), audio.clone()),
        ]),
    };

    let config = AppConfig {
        ffmpeg_path: muxer.to_string_lossy().into_owned(),
        scratch_dir: scratch.path().to_path_buf(),
        allowed_origin: ORIGIN.to_string(),
        ..Default::default()
    };
    let state = AppState::new(&config, Arc::new(retriever), Arc::new(opener))
        .with_muxer_version(Some("ffmpeg version 0.0-test".to_string()));
    let router = ApiServer::new(ApiServerConfig::from(&config), state)
        .build_router()
        .unwrap();

    TestApp {
        router,
        scratch,
        video,
        audio,
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(router: &Router, uri: &str) -> Response {
    send(router, Method::GET, uri).await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );
}

mod info_tests {
    use super::*;

    #[tokio::test]
    async fn test_info_lists_qualities() {
        let app = app(&muxers().concat);
        let response = get(&app.router, "/info/vid").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);

        let json = body_json(response).await;
        assert_eq!(json["title"], "Video vid");
        assert_eq!(json["thumbnail"], "https://img.example/vid/maxres.jpg");
        assert_eq!(json["duraction"], "600");

        let itags: Vec<u64> = json["mp4Qualities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["itag"].as_u64().unwrap())
            .collect();
        assert_eq!(itags, vec![136, 18]);
        assert_eq!(json["mp4Qualities"][0]["quality"], "720p");
        assert_eq!(json["mp4Qualities"][0]["fileSize"], 5.0);

        let mp3 = json["mp3Qualities"].as_array().unwrap();
        assert_eq!(mp3.len(), 5);
        assert_eq!(mp3[0]["itag"], 320);
        assert_eq!(mp3[0]["estimatedSizeBytes"], 600 * 320 * 125);
    }

    #[tokio::test]
    async fn test_unknown_video_is_404() {
        let app = app(&muxers().concat);
        let response = get(&app.router, "/info/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_cors(&response);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let app = app(&muxers().concat);
        let response = send(&app.router, Method::OPTIONS, "/download/vid").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(&muxers().concat);
        let response = get(&app.router, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["muxer"], "ffmpeg version 0.0-test");
    }
}

mod download_tests {
    use super::*;

    async fn expect_error(router: &Router, uri: &str, status: StatusCode, code: &str) {
        let response = get(router, uri).await;
        assert_eq!(response.status(), status, "{}", uri);
        assert_cors(&response);
        assert_eq!(body_json(response).await["code"], code, "{}", uri);
    }

    #[tokio::test]
    async fn test_download_validation() {
        let app = app(&muxers().concat);
        let router = &app.router;

        expect_error(router, "/download/vid", StatusCode::BAD_REQUEST, "MISSING_PARAMETER").await;
        expect_error(router, "/download/vid?quality=22", StatusCode::BAD_REQUEST, "UNSUPPORTED_QUALITY").await;
        expect_error(router, "/download/missing?quality=136", StatusCode::NOT_FOUND, "NOT_FOUND").await;
        expect_error(router, "/download/vid?quality=137", StatusCode::NOT_FOUND, "NOT_FOUND").await;
        expect_error(router, "/download/long?quality=136", StatusCode::PAYLOAD_TOO_LARGE, "TOO_LONG").await;

        expect_error(router, "/downloadAudio/vid", StatusCode::BAD_REQUEST, "MISSING_PARAMETER").await;
        expect_error(router, "/downloadAudio/vid?bitrate=96", StatusCode::BAD_REQUEST, "UNSUPPORTED_BITRATE").await;
        expect_error(router, "/downloadAudio/long?bitrate=128", StatusCode::PAYLOAD_TOO_LARGE, "TOO_LONG").await;

        assert!(entries(app.scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_streams_combined_file() {
        let app = app(&muxers().concat);
        let response = get(&app.router, "/download/vid?quality=136").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
        let expected_len = app.video.len() + app.audio.len();
        assert_eq!(headers[header::CONTENT_LENGTH], expected_len.to_string().as_str());
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\""));
        assert!(disposition.ends_with("-ytgrab.mp4\""));

        // The file stays on disk while the body is pending.
        assert_eq!(entries(app.scratch.path()).len(), 1);

        let body = body_bytes(response).await;
        assert_eq!(body.len(), expected_len);
        assert_eq!(&body[..app.video.len()], &app.video[..]);
        assert!(entries(app.scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_body_removes_file() {
        let app = app(&muxers().concat);
        let response = get(&app.router, "/download/vid?quality=18").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(entries(app.scratch.path()).len(), 1);

        drop(response);
        assert!(entries(app.scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_combine_failure_is_500() {
        let app = app(&muxers().failing);
        let response = get(&app.router, "/download/vid?quality=136").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&response);

        let json = body_json(response).await;
        assert_eq!(json["code"], "COMBINE_FAILED");
        assert_eq!(json["details"]["exitCode"], 3);
        assert!(entries(app.scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_audio_streams_encoder_output() {
        let app = app(&muxers().passthrough);
        let response = get(&app.router, "/downloadAudio/vid?bitrate=192").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .ends_with("-ytgrab.mp3\"")
        );

        assert_eq!(body_bytes(response).await, app.audio);
        // Nothing touches disk on the audio path.
        assert!(entries(app.scratch.path()).is_empty());
    }
}
