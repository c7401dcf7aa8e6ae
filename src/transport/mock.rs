//! Scripted in-memory transport for pipeline tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    Direction, ExchangeOptions, Method, Progress, Request, Response, Transport, TransportError,
    percent,
};

/// What the scripted server does for a matching path.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply {
        status: u16,
        content_type: &'static str,
        body: Bytes,
    },
    Fail(String),
    Timeout(Direction),
    Delay(Duration, Box<Scripted>),
}

impl Scripted {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Scripted::Reply {
            status,
            content_type: "application/json",
            body: Bytes::from(body.into()),
        }
    }

    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Scripted::Reply {
            status: 200,
            content_type: "application/octet-stream",
            body: body.into(),
        }
    }
}

type Hook = Box<dyn Fn(&Request) + Send + Sync>;

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<(String, Scripted)>,
    requests: Mutex<Vec<(Method, String)>>,
    hook: Option<Hook>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL path equals `path`.
    pub fn route(mut self, path: &str, scripted: Scripted) -> Self {
        self.routes.push((path.to_string(), scripted));
        self
    }

    /// Run `hook` on every request before it is answered.
    pub fn on_request(mut self, hook: impl Fn(&Request) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Paths requested so far, in order.
    pub fn requested_paths(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(
        &self,
        request: Request,
        options: &ExchangeOptions,
        progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<Response, TransportError> {
        let path = request.url.path().to_string();
        self.requests.lock().push((request.method, path.clone()));
        if let Some(hook) = &self.hook {
            hook(&request);
        }

        if let Some(body) = &request.body {
            let total = body.len() as u64;
            let mut sent = 0u64;
            for packet in body.chunks(options.send_buffer_size) {
                sent += packet.len() as u64;
                progress(Progress {
                    direction: Direction::Send,
                    packet_size: packet.len(),
                    send_percent: percent(sent, total),
                    receive_percent: 0.0,
                });
            }
        }

        let mut scripted = self
            .routes
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| Scripted::json(404, r#"{"error":"not_found","reason":"missing"}"#));

        loop {
            match scripted {
                Scripted::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    scripted = *inner;
                }
                Scripted::Fail(message) => return Err(TransportError::Other(message)),
                Scripted::Timeout(direction) => return Err(TransportError::Timeout(direction)),
                Scripted::Reply {
                    status,
                    content_type,
                    body,
                } => {
                    let total = body.len() as u64;
                    let mut received = 0u64;
                    for packet in body.chunks(options.receive_buffer_size) {
                        received += packet.len() as u64;
                        progress(Progress {
                            direction: Direction::Receive,
                            packet_size: packet.len(),
                            send_percent: 100.0,
                            receive_percent: percent(received, total),
                        });
                    }
                    return Ok(Response {
                        status,
                        content_type: Some(content_type.to_string()),
                        etag: None,
                        body,
                    });
                }
            }
        }
    }
}
