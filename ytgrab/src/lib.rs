//! ytgrab library crate.
//!
//! Turns a video id and a requested quality into one downloadable media
//! file: the catalog describes what can be downloaded, the pipeline
//! validates a request, muxes the elementary streams and delivers the
//! result.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod source;
pub mod utils;

pub use error::{Error, Result};
