//! Fixed-origin CORS headers.
//!
//! Every response, errors included, carries the same three headers.
//! Preflight `OPTIONS` requests are answered here without reaching a route.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

const ALLOWED_METHODS: &str = "GET, POST";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// CORS policy for a single allowed origin.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin: HeaderValue,
}

impl CorsPolicy {
    /// `origin` must be a bare origin (`scheme://host[:port]`); browsers
    /// compare the header byte for byte, so a path or trailing slash would
    /// never match.
    pub fn new(origin: &str) -> crate::Result<Self> {
        let invalid = |reason: String| {
            crate::Error::config(format!("Invalid CORS origin '{}': {}", origin, reason))
        };

        let parsed = url::Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
        let serialized = parsed.origin().ascii_serialization();
        if serialized != origin {
            return Err(invalid(format!("expected '{}'", serialized)));
        }

        let origin = HeaderValue::from_str(origin).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { origin })
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
    }
}

/// Middleware function applying [`CorsPolicy`].
pub async fn cors(State(policy): State<CorsPolicy>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    policy.apply(&mut response);
    response
}
