//! Transport contract consumed by every Command.
//!
//! A [`Transport`] performs one request/response exchange, honours the four
//! exchange parameters carried by [`ExchangeOptions`] and reports byte-level
//! progress through a synchronous callback. [`HttpTransport`] is the default
//! implementation on top of `reqwest`.

pub mod error;
pub mod http;
#[cfg(test)]
pub mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

pub use error::TransportError;
pub use http::HttpTransport;

/// HTTP verbs used by the command catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
            Method::Put => write!(f, "PUT"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Which half of an exchange a progress packet or timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// One progress packet: its direction, its size in bytes and the running
/// completion percentage of each direction (0.0 to 100.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub direction: Direction,
    pub packet_size: usize,
    pub send_percent: f64,
    pub receive_percent: f64,
}

/// Percentage of `done` over `total`, clamped to 100. An empty transfer is
/// complete by definition.
pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0)
}

/// Timeouts and buffer sizes applied to a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    pub send_buffer_size: usize,
    pub receive_buffer_size: usize,
}

impl ExchangeOptions {
    pub fn new(
        send_timeout: Duration,
        receive_timeout: Duration,
        send_buffer_size: usize,
        receive_buffer_size: usize,
    ) -> Self {
        Self {
            send_timeout,
            receive_timeout,
            send_buffer_size: send_buffer_size.max(1),
            receive_buffer_size: receive_buffer_size.max(1),
        }
    }

    /// Same timeout and buffer size in both directions, the way a server
    /// handle configures its exchanges.
    pub fn symmetric(timeout: Duration, buffer_size: usize) -> Self {
        Self::new(timeout, timeout, buffer_size, buffer_size)
    }
}

/// An outgoing request, fully built by a Command.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            content_type: None,
            body: None,
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: Bytes) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body);
        self
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}

/// The typed response handed back by a transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request/response exchange with progress reporting.
///
/// Implementations call `progress` synchronously on the task that awaits
/// `exchange`, never from another task.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        request: Request,
        options: &ExchangeOptions,
        progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<Response, TransportError>;
}
