//! Stream opener that downloads a format URL over HTTP.
//!
//! Media hosts throttle long single responses, so when the content length is
//! known the body is fetched as a sequence of `Range` requests and stitched
//! back into one stream.

use std::io;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use tracing::{debug, warn};

use super::{ByteStream, FormatInfo, StreamOpener};
use crate::Result;
use crate::config::DEFAULT_HTTP_CHUNK_SIZE;

/// Inclusive byte ranges covering `total` bytes in `chunk_size` pieces.
pub fn range_bounds(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    (0..total)
        .step_by(chunk_size as usize)
        .map(|start| (start, (start + chunk_size).min(total) - 1))
        .collect()
}

fn header_map(headers: &std::collections::HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %key, "Skipping invalid source header"),
        }
    }
    map
}

/// A later range must come back as 206; a full body would be appended to
/// the bytes already sent.
fn partial_content(
    response: reqwest::Response,
    (start, end): (u64, u64),
) -> io::Result<reqwest::Response> {
    if response.status() == StatusCode::PARTIAL_CONTENT {
        Ok(response)
    } else {
        Err(io::Error::other(format!(
            "range {}-{} answered with {} instead of 206",
            start,
            end,
            response.status()
        )))
    }
}

/// HTTP-backed [`StreamOpener`].
pub struct HttpStreamOpener {
    client: reqwest::Client,
    chunk_size: u64,
}

impl HttpStreamOpener {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_HTTP_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn ranged_request(
        client: &reqwest::Client,
        url: &str,
        headers: &HeaderMap,
        (start, end): (u64, u64),
    ) -> reqwest::RequestBuilder {
        client
            .get(url)
            .headers(headers.clone())
            .header(RANGE, format!("bytes={}-{}", start, end))
    }
}

#[async_trait]
impl StreamOpener for HttpStreamOpener {
    async fn open_stream(&self, format: &FormatInfo) -> Result<ByteStream> {
        let headers = header_map(&format.http_headers);

        let Some(total) = format.content_length.filter(|len| *len > 0) else {
            debug!(format_id = %format.format_id, "Opening unranged stream");
            let response = self
                .client
                .get(&format.url)
                .headers(headers)
                .send()
                .await?
                .error_for_status()?;
            return Ok(response.bytes_stream().map_err(io::Error::other).boxed());
        };

        let ranges = range_bounds(total, self.chunk_size);
        debug!(
            format_id = %format.format_id,
            total_bytes = total,
            chunks = ranges.len(),
            "Opening ranged stream"
        );

        // The first request is made eagerly so that an unreachable source
        // fails before the muxer is started.
        let first = Self::ranged_request(&self.client, &format.url, &headers, ranges[0])
            .send()
            .await?
            .error_for_status()?;

        if first.status() != StatusCode::PARTIAL_CONTENT {
            debug!(format_id = %format.format_id, "Source ignored Range; streaming full body");
            return Ok(first.bytes_stream().map_err(io::Error::other).boxed());
        }

        let client = self.client.clone();
        let url = format.url.clone();
        let rest = stream::iter(ranges.into_iter().skip(1)).then(move |range| {
            let request = Self::ranged_request(&client, &url, &headers, range);
            async move {
                let response = request
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(io::Error::other)?;
                partial_content(response, range)
            }
        });

        Ok(stream::once(async move { Ok::<_, io::Error>(first) })
            .chain(rest)
            .map_ok(|response| response.bytes_stream().map_err(io::Error::other))
            .try_flatten()
            .boxed())
    }
}
