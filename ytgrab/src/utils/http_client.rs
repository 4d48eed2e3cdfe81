use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

use crate::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const POOL_MAX_IDLE_PER_HOST: usize = 8;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Apply an optional explicit proxy to a `reqwest::ClientBuilder`.
///
/// - `Some(url)` => route everything through `url`
/// - `None` => keep reqwest's default (system/env proxy settings)
///
/// An unparsable URL disables proxying instead of failing startup.
pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy_url: Option<&str>,
) -> reqwest::ClientBuilder {
    let Some(url) = proxy_url else {
        return builder;
    };

    match reqwest::Proxy::all(url) {
        Ok(proxy) => builder.proxy(proxy),
        Err(error) => {
            warn!(proxy_url = %url, error = %error, "Invalid proxy URL; disabling proxy");
            builder.no_proxy()
        }
    }
}

/// Build the shared client used to fetch media streams.
///
/// No overall request timeout is set: a media body legitimately takes
/// minutes. Combine jobs carry their own deadline.
pub fn build_http_client(proxy_url: Option<&str>) -> Result<reqwest::Client> {
    install_rustls_provider();

    let builder = reqwest::Client::builder()
        .user_agent(concat!("ytgrab/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST);

    Ok(apply_proxy(builder, proxy_url).build()?)
}
