use std::sync::Arc;

use tracing::{info, warn};

use ytgrab::api::{ApiServer, ApiServerConfig, AppState};
use ytgrab::config::AppConfig;
use ytgrab::logging::init_logging;
use ytgrab::pipeline::ScratchDir;
use ytgrab::source::{HttpStreamOpener, YtDlpRetriever};
use ytgrab::utils::http_client::build_http_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    let (logging, _log_guard) = init_logging(&config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        scratch_dir = %config.scratch_dir.display(),
        "Starting ytgrab"
    );

    let scratch = ScratchDir::new(&config.scratch_dir);
    scratch.ensure().await?;
    scratch.cleanup_stale()?;

    let client = build_http_client(config.proxy_url.as_deref())?;
    let retriever = Arc::new(
        YtDlpRetriever::new(config.ytdlp_path.clone()).with_timeout(config.metadata_timeout),
    );
    let opener = Arc::new(HttpStreamOpener::new(client).with_chunk_size(config.http_chunk_size));

    let state = AppState::new(&config, retriever, opener);
    let muxer_version = state.combiner.detect_muxer_version().await;
    match &muxer_version {
        Some(version) => info!(muxer = %version, "Detected muxer"),
        None => warn!(path = %config.ffmpeg_path, "ffmpeg not found; downloads will fail"),
    }
    let state = state.with_muxer_version(muxer_version);

    let server = ApiServer::new(ApiServerConfig::from(&config), state);
    let shutdown = server.cancel_token();
    logging.start_retention_cleanup(shutdown.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;

    info!("ytgrab stopped");
    Ok(())
}
