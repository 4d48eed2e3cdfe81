//! API middleware.

pub mod cors;

pub use cors::{CorsPolicy, cors};
