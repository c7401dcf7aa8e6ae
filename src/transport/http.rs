use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderName};
use reqwest::{Body, Client};
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    Direction, ExchangeOptions, Progress, Request, Response, Transport, TransportError, percent,
};
use crate::logger::{DiagnosticLog, LogLevel};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport over HTTP using `reqwest`.
///
/// Request bodies are streamed in `send_buffer_size` chunks so the send side
/// can report progress; the send phase (up to the response headers) is bounded
/// by `send_timeout`, and every body chunk read must arrive within
/// `receive_timeout`.
pub struct HttpTransport {
    client: Client,
    network_log: Option<Arc<DiagnosticLog>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client (useful for testing).
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            network_log: None,
        }
    }

    /// Mirror every exchange into the network diagnostic log.
    pub fn with_network_log(mut self, log: Arc<DiagnosticLog>) -> Self {
        self.network_log = Some(log);
        self
    }

    fn log(&self, message: impl FnOnce() -> String) {
        if let Some(log) = &self.network_log {
            log.write(LogLevel::Debug, &message());
        }
    }

    async fn perform(
        &self,
        request: Request,
        options: &ExchangeOptions,
        progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<Response, TransportError> {
        let send_total = request.body_len() as u64;
        let mut builder = self.client.request(request.method.into(), request.url);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_str());
        }

        // Chunks report their size as hyper pulls them off the body stream.
        let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
        match request.body {
            Some(body) => {
                let chunks = split(body, options.send_buffer_size);
                let body_stream = stream::iter(chunks.into_iter().map(move |chunk| {
                    let _ = tx.send(chunk.len());
                    Ok::<Bytes, std::io::Error>(chunk)
                }));
                builder = builder
                    .header(CONTENT_LENGTH, send_total)
                    .body(Body::wrap_stream(body_stream));
            }
            None => drop(tx),
        }

        let send = builder.send();
        tokio::pin!(send);
        let deadline = tokio::time::sleep(options.send_timeout);
        tokio::pin!(deadline);

        let mut sent: u64 = 0;
        let mut response = loop {
            tokio::select! {
                result = &mut send => break result?,
                Some(size) = rx.recv() => report_sent(progress, &mut sent, size, send_total),
                () = &mut deadline => return Err(TransportError::Timeout(Direction::Send)),
            }
        };
        while let Ok(size) = rx.try_recv() {
            report_sent(progress, &mut sent, size, send_total);
        }

        let status = response.status().as_u16();
        let content_type = header_string(&response, CONTENT_TYPE);
        let etag = header_string(&response, ETAG);
        let receive_total = response.content_length();

        let mut body = BytesMut::new();
        let mut received: u64 = 0;
        loop {
            let chunk = match tokio::time::timeout(options.receive_timeout, response.chunk()).await
            {
                Err(_) => return Err(TransportError::Timeout(Direction::Receive)),
                Ok(chunk) => chunk?,
            };
            let Some(chunk) = chunk else { break };
            for packet in chunk.chunks(options.receive_buffer_size) {
                received += packet.len() as u64;
                progress(Progress {
                    direction: Direction::Receive,
                    packet_size: packet.len(),
                    send_percent: 100.0,
                    receive_percent: receive_total.map_or(0.0, |total| percent(received, total)),
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Response {
            status,
            content_type,
            etag,
            body: body.freeze(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(
        &self,
        request: Request,
        options: &ExchangeOptions,
        progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<Response, TransportError> {
        let method = request.method;
        let url = request.url.to_string();
        debug!(%method, %url, bytes = request.body_len(), "exchange started");
        self.log(|| format!("{method} {url} ({} bytes)", request.body_len()));

        let result = self.perform(request, options, progress).await;
        match &result {
            Ok(response) => self.log(|| {
                format!(
                    "{method} {url} -> {} ({} bytes)",
                    response.status,
                    response.body.len()
                )
            }),
            Err(err) => self.log(|| format!("{method} {url} failed: {err}")),
        }
        result
    }
}

fn report_sent(
    progress: &mut (dyn FnMut(Progress) + Send),
    sent: &mut u64,
    size: usize,
    total: u64,
) {
    *sent += size as u64;
    progress(Progress {
        direction: Direction::Send,
        packet_size: size,
        send_percent: percent(*sent, total),
        receive_percent: 0.0,
    });
}

fn split(body: Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    (0..body.len())
        .step_by(chunk_size)
        .map(|start| body.slice(start..(start + chunk_size).min(body.len())))
        .collect()
}

fn header_string(response: &reqwest::Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
