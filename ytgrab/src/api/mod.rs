//! HTTP surface: video info, MP4/MP3 downloads and health.

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
