//! HTTP fetcher for source descriptors.
//!
//! One call to [`Fetcher::fetch`] performs exactly one request and never
//! retries; falling through to other sources is the pipeline's job. The raw
//! response is classified without interpreting its domain meaning beyond
//! the shape-declared "no such station" signal.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;

use crate::sources::SourceDescriptor;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("brownclaw-ingest/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a request never produced a classifiable HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum TransportCause {
    /// The configured timeout elapsed.
    Timeout,
    /// The connection could not be established.
    Connect(String),
    /// Malformed framing, redirect loops, or any other request failure.
    Protocol(String),
    /// The status line arrived but reading the body failed.
    Body(String),
}

impl TransportCause {
    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportCause::Timeout
        } else if err.is_connect() {
            TransportCause::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportCause::Body(err.to_string())
        } else {
            TransportCause::Protocol(err.to_string())
        }
    }
}

impl std::fmt::Display for TransportCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCause::Timeout => write!(f, "timeout"),
            TransportCause::Connect(msg) => write!(f, "connect: {}", msg),
            TransportCause::Protocol(msg) => write!(f, "protocol: {}", msg),
            TransportCause::Body(msg) => write!(f, "body: {}", msg),
        }
    }
}

/// Classified result of a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 2xx with a body that holds data.
    Success {
        body: Vec<u8>,
        content_type: Option<String>,
    },
    /// 404, or a 2xx body that says the station does not exist here.
    NotFound,
    /// Any other non-2xx status.
    Rejected(u16),
    TransportError(TransportCause),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Raw response classification
// ---------------------------------------------------------------------------

/// An HTTP response as received, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse<'d> {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub descriptor: &'d SourceDescriptor,
}

impl RawResponse<'_> {
    /// Status-and-shape classification. Consumes the response.
    pub fn classify(self) -> FetchOutcome {
        match self.status {
            200..=299 => {
                if self.body.iter().all(u8::is_ascii_whitespace)
                    || self.descriptor.shape.signals_no_station(&self.body)
                {
                    FetchOutcome::NotFound
                } else {
                    FetchOutcome::Success {
                        body: self.body,
                        content_type: self.content_type,
                    }
                }
            }
            404 => FetchOutcome::NotFound,
            status => FetchOutcome::Rejected(status),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// Executes one descriptor for one station.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, descriptor: &SourceDescriptor, station_id: &str) -> FetchOutcome;
}

/// Settings injected into [`HttpFetcher`] at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Blocking reqwest-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// One GET with the given `Accept` header. Any status is returned as-is.
    pub fn get(&self, url: &str, accept: &str) -> Result<HttpResponse, TransportCause> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .map_err(|e| TransportCause::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().map_err(|e| {
            if e.is_timeout() {
                TransportCause::Timeout
            } else {
                TransportCause::Body(e.to_string())
            }
        })?;

        Ok(HttpResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, descriptor: &SourceDescriptor, station_id: &str) -> FetchOutcome {
        let url = descriptor.render_url(station_id);

        match self.get(&url, descriptor.shape.accept_header()) {
            Ok(response) => RawResponse {
                status: response.status,
                content_type: response.content_type,
                body: response.body,
                descriptor,
            }
            .classify(),
            Err(cause) => FetchOutcome::TransportError(cause),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
