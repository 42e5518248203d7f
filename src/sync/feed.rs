//! Remote hosts-format feed.
//!
//! The feed is read line by line straight off the HTTP body so a round can
//! stop as soon as its batch is full, without buffering the whole file.
//!
//! # Format
//!
//! ```text
//! # Comment line
//! 0.0.0.0 0.0.0.0
//! 0.0.0.0 ads.example.com
//! 0.0.0.0 tracker.example.com # inline comment
//! ```
//!
//! Only lines starting with the null-route marker count. The
//! marker-to-marker line is a placeholder and does not count either.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::Client;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;

use crate::error::FeedError;

/// Address the feed uses to mark a domain as blocked.
pub const NULL_ROUTE: &str = "0.0.0.0";

/// Placeholder line present at the top of most hosts feeds.
const PLACEHOLDER_LINE: &str = "0.0.0.0 0.0.0.0";

/// User-Agent header value for HTTP requests.
pub const USER_AGENT: &str = concat!("netmonitor/", env!("CARGO_PKG_VERSION"));

/// Whether `line` is a blocking entry that advances the feed offset.
#[must_use]
pub fn is_valid_line(line: &str) -> bool {
    line.starts_with(NULL_ROUTE) && line != PLACEHOLDER_LINE
}

/// Extract the domain from a blocking line: the second whitespace token.
///
/// Returns `None` when the token is missing or is the marker itself.
#[must_use]
pub fn extract_domain(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    parts.next()?;
    let domain = parts.next()?;
    (domain != NULL_ROUTE).then_some(domain)
}

/// HTTP client for the blacklist feed.
pub struct FeedClient {
    client: Client,
}

impl FeedClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(FeedError::ClientBuild)?;

        Ok(Self { client })
    }

    /// Start downloading `url` and return a line reader over the body.
    ///
    /// # Errors
    ///
    /// Returns a [`FeedError`] if:
    /// - The HTTP request fails ([`FeedError::Network`])
    /// - The server returns a non-success status ([`FeedError::HttpStatus`])
    /// - The request times out ([`FeedError::Timeout`])
    ///
    /// Failures while reading the body surface from [`FeedLines::next_line`].
    pub async fn open(&self, url: &str) -> Result<FeedLines, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| map_request_error(url, err))?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(FeedLines {
            url: url.to_string(),
            reader: Box::pin(StreamReader::new(body)),
            line: Vec::new(),
        })
    }
}

fn map_request_error(url: &str, err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout {
            url: url.to_string(),
        }
    } else {
        FeedError::Network {
            url: url.to_string(),
            source: err,
        }
    }
}

fn map_read_error(url: &str, err: io::Error) -> FeedError {
    let timed_out = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout);

    if timed_out {
        FeedError::Timeout {
            url: url.to_string(),
        }
    } else {
        FeedError::Read {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Incremental line reader over a feed response body.
pub struct FeedLines {
    url: String,
    reader: Pin<Box<dyn AsyncBufRead + Send>>,
    line: Vec<u8>,
}

impl FeedLines {
    /// Next line without its terminator, or `None` at end of feed.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub async fn next_line(&mut self) -> Result<Option<String>, FeedError> {
        self.line.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .await
            .map_err(|err| map_read_error(&self.url, err))?;

        Ok((read > 0).then(|| decode_line(&self.line)))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
