//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, MakeSpan, OnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::api::middleware::{CorsPolicy, cors};
use crate::api::routes;
use crate::catalog::{CatalogBuilder, CatalogConfig};
use crate::config::AppConfig;
use crate::error::Result;
use crate::pipeline::{AudioTranscoder, CombineConfig, ScratchDir, StreamCombiner, StreamSelector};
use crate::source::{MetadataRetriever, StreamOpener};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// The single origin allowed by CORS
    pub allowed_origin: String,
}

impl From<&AppConfig> for ApiServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            allowed_origin: config.allowed_origin.clone(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub retriever: Arc<dyn MetadataRetriever>,
    pub opener: Arc<dyn StreamOpener>,
    pub catalog: Arc<CatalogBuilder>,
    pub selector: Arc<StreamSelector>,
    pub combiner: Arc<StreamCombiner>,
    pub transcoder: Arc<AudioTranscoder>,
    /// Detected muxer version, reported by `/health`
    pub muxer_version: Option<String>,
    /// Cancelled on shutdown; in-flight combine jobs derive from it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the pipeline around the given collaborators.
    pub fn new(
        config: &AppConfig,
        retriever: Arc<dyn MetadataRetriever>,
        opener: Arc<dyn StreamOpener>,
    ) -> Self {
        let catalog_config = CatalogConfig::default();
        let combiner = StreamCombiner::new(
            CombineConfig {
                ffmpeg_path: config.ffmpeg_path.clone(),
                timeout: config.combine_timeout,
            },
            ScratchDir::new(&config.scratch_dir),
        );

        Self {
            start_time: Instant::now(),
            selector: Arc::new(StreamSelector::new(
                retriever.clone(),
                catalog_config.clone(),
                config.max_duration_secs,
            )),
            catalog: Arc::new(CatalogBuilder::new(catalog_config)),
            combiner: Arc::new(combiner),
            transcoder: Arc::new(AudioTranscoder::new(config.ffmpeg_path.clone())),
            retriever,
            opener,
            muxer_version: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_muxer_version(mut self, version: Option<String>) -> Self {
        self.muxer_version = version;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

/// Request span; `/health` requests are not traced.
fn request_span(request: &Request) -> Span {
    if request.uri().path().starts_with("/health") {
        Span::none()
    } else {
        DefaultMakeSpan::new().level(Level::INFO).make_span(request)
    }
}

fn log_response(response: &Response, latency: Duration, span: &Span) {
    if !span.is_disabled() {
        DefaultOnResponse::new()
            .level(Level::INFO)
            .on_response(response, latency, span);
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Token that stops the server and cancels in-flight jobs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Result<Router> {
        let policy = CorsPolicy::new(&self.config.allowed_origin)?;

        let router = routes::create_router(self.state.clone())
            .layer(axum::middleware::from_fn_with_state(policy, cors))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(request_span)
                    .on_response(log_response),
            );
        Ok(router)
    }

    /// Serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::Error::config(format!("Invalid address: {}", e)))?;

        let router = self.build_router()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }
}
