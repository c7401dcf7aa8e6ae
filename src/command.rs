//! One request/response exchange.
//!
//! A [`Command`] is bound to a method, a target locator, an optional request
//! payload and a reply type that knows how to decode itself. Executing a
//! command consumes it: one command is one exchange.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::events::{EventKind, FailureCause, Observer, SubscriberError, notify};
use crate::transport::{
    ExchangeOptions, Method, Progress, Request, Response, Transport, TransportError,
};
use crate::wire::{self, WireError};

/// Per-command reply decoding hook.
pub trait Reply: Sized + Send {
    fn from_response(response: Response) -> Result<Self, WireError>;
}

/// Error body returned by both servers on non-2xx replies.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerError {
    pub error: String,
    #[serde(default)]
    pub reason: String,
}

pub struct Command<R> {
    method: Method,
    target: Url,
    content_type: Option<String>,
    payload: Option<Bytes>,
    transport: Arc<dyn Transport>,
    _reply: PhantomData<fn() -> R>,
}

impl<R: Reply> Command<R> {
    pub fn new(transport: Arc<dyn Transport>, method: Method, target: Url) -> Self {
        Self {
            method,
            target,
            content_type: None,
            payload: None,
            transport,
            _reply: PhantomData,
        }
    }

    pub fn with_payload(mut self, content_type: impl Into<String>, payload: Bytes) -> Self {
        self.content_type = Some(content_type.into());
        self.payload = Some(payload);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Perform the exchange on the calling task.
    ///
    /// Network outcomes are reported only through `observer`: exactly one of
    /// Complete, Error or Timeout fires, after any number of Progress events.
    /// The returned error is reserved for subscriber failures, which are
    /// logged and propagated.
    pub async fn execute(
        self,
        options: &ExchangeOptions,
        observer: &mut dyn Observer<R>,
    ) -> Result<(), SubscriberError> {
        let Command {
            method,
            target,
            content_type,
            payload,
            transport,
            ..
        } = self;

        let mut request = Request::new(method, target.clone());
        request.content_type = content_type;
        request.body = payload;

        let mut progress_failure: Option<SubscriberError> = None;
        let result = {
            let mut on_progress = |progress: Progress| {
                if progress_failure.is_some() {
                    return;
                }
                if let Err(err) = notify(EventKind::Progress, observer.on_progress(&progress)) {
                    progress_failure = Some(err);
                }
            };
            transport.exchange(request, options, &mut on_progress).await
        };
        if let Some(err) = progress_failure {
            return Err(err);
        }

        match result {
            Ok(response) if response.is_success() => match R::from_response(response) {
                Ok(reply) => {
                    debug!(%method, %target, "exchange complete");
                    notify(EventKind::Complete, observer.on_complete(&reply))
                }
                Err(err) => {
                    let message = format!("failed to decode the reply to {method} {target}");
                    warn!(error = %err, "{message}");
                    notify(
                        EventKind::Error,
                        observer.on_error(&message, &FailureCause::Decode(err)),
                    )
                }
            },
            Ok(response) => {
                let cause = status_cause(&response);
                let message = format!("{method} {target} failed with status {}", response.status);
                warn!(%cause, "{message}");
                notify(EventKind::Error, observer.on_error(&message, &cause))
            }
            Err(TransportError::Timeout(direction)) => {
                warn!(%method, %target, %direction, "exchange timed out");
                notify(EventKind::Timeout, observer.on_timeout())
            }
            Err(err) => {
                let message = format!("{method} {target} failed: {err}");
                warn!("{message}");
                notify(
                    EventKind::Error,
                    observer.on_error(&message, &FailureCause::Transport(err)),
                )
            }
        }
    }
}

fn status_cause(response: &Response) -> FailureCause {
    let (error, reason) = match wire::decode::<ServerError>(&response.body) {
        Ok(body) => (body.error, body.reason),
        Err(_) => (
            "unknown".to_string(),
            String::from_utf8_lossy(&response.body).into_owned(),
        ),
    };
    FailureCause::Status {
        status: response.status,
        error,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::{Recorder, Seen};
    use crate::events::{HandlerResult, Subscribers};
    use crate::transport::Direction;
    use crate::transport::mock::{Scripted, ScriptedTransport};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Echo {
        value: u32,
    }

    impl Reply for Echo {
        fn from_response(response: Response) -> Result<Self, WireError> {
            wire::decode(&response.body)
        }
    }

    fn options() -> ExchangeOptions {
        ExchangeOptions::symmetric(Duration::from_secs(5), 4)
    }

    fn command(transport: ScriptedTransport) -> Command<Echo> {
        let url = Url::parse("http://storage.test/db/echo").unwrap();
        Command::new(transport.into_arc(), Method::Get, url)
    }

    #[tokio::test]
    async fn complete_fires_once_after_progress() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::json(200, r#"{"value":42}"#));
        let mut recorder = Recorder::default();
        command(transport).execute(&options(), &mut recorder).await.unwrap();

        assert_eq!(recorder.completes(), 1);
        assert_eq!(recorder.errors(), 0);
        assert_eq!(recorder.timeouts(), 0);
        assert_eq!(recorder.progress_bytes(), r#"{"value":42}"#.len());
        assert_eq!(recorder.seen.last(), Some(&Seen::Complete(Echo { value: 42 })));
    }

    #[tokio::test]
    async fn transport_failure_becomes_error_event() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::Fail("connection reset".into()));
        let mut recorder = Recorder::<Echo>::default();
        command(transport).execute(&options(), &mut recorder).await.unwrap();

        assert_eq!(recorder.errors(), 1);
        assert_eq!(recorder.completes(), 0);
        assert_eq!(recorder.timeouts(), 0);
    }

    #[tokio::test]
    async fn timeout_excludes_error_and_complete() {
        let transport = ScriptedTransport::new()
            .route("/db/echo", Scripted::Timeout(Direction::Receive));
        let mut recorder = Recorder::<Echo>::default();
        command(transport).execute(&options(), &mut recorder).await.unwrap();

        assert_eq!(recorder.seen, vec![Seen::Timeout]);
    }

    #[tokio::test]
    async fn error_status_carries_server_reason() {
        let transport = ScriptedTransport::new().route(
            "/db/echo",
            Scripted::json(409, r#"{"error":"conflict","reason":"Document update conflict."}"#),
        );
        let mut subs: Subscribers<Echo> = Subscribers::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        subs.subscribe_error(move |message, cause| {
            sink.lock().push((message.to_string(), cause.to_string()));
            Ok(())
        });
        command(transport).execute(&options(), &mut subs).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("failed with status 409"));
        assert_eq!(
            seen[0].1,
            "server returned status 409: conflict (Document update conflict.)"
        );
    }

    #[tokio::test]
    async fn undecodable_reply_becomes_error_event() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::json(200, r#"{"other":true}"#));
        let mut recorder = Recorder::<Echo>::default();
        command(transport).execute(&options(), &mut recorder).await.unwrap();

        assert_eq!(recorder.errors(), 1);
        assert_eq!(recorder.completes(), 0);
    }

    struct FailingComplete;

    impl Observer<Echo> for FailingComplete {
        fn on_complete(&mut self, _reply: &Echo) -> HandlerResult {
            anyhow::bail!("requestor rejected the reply")
        }
        fn on_error(&mut self, _m: &str, _c: &FailureCause) -> HandlerResult {
            Ok(())
        }
        fn on_timeout(&mut self) -> HandlerResult {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_subscriber_is_propagated() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::json(200, r#"{"value":1}"#));
        let err = command(transport)
            .execute(&options(), &mut FailingComplete)
            .await
            .unwrap_err();
        assert_eq!(err.event, EventKind::Complete);
    }

    #[tokio::test]
    async fn failing_progress_subscriber_suppresses_outcome() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::json(200, r#"{"value":1}"#));
        let mut subs: Subscribers<Echo> = Subscribers::new();
        let completes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = completes.clone();
        subs.subscribe_progress(|_| anyhow::bail!("progress bar closed"))
            .subscribe_complete(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            });

        let err = command(transport).execute(&options(), &mut subs).await.unwrap_err();
        assert_eq!(err.event, EventKind::Progress);
        assert_eq!(completes.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn payload_is_streamed_with_send_progress() {
        let transport =
            ScriptedTransport::new().route("/db/echo", Scripted::json(201, r#"{"value":7}"#));
        let url = Url::parse("http://storage.test/db/echo").unwrap();
        let command: Command<Echo> = Command::new(transport.into_arc(), Method::Put, url)
            .with_payload("text/plain", Bytes::from_static(b"0123456789"));
        let mut recorder = Recorder::default();
        command.execute(&options(), &mut recorder).await.unwrap();

        let sent: usize = recorder
            .seen
            .iter()
            .filter_map(|s| match s {
                Seen::Progress(p) if p.direction == Direction::Send => Some(p.packet_size),
                _ => None,
            })
            .sum();
        assert_eq!(sent, 10);
        assert_eq!(recorder.completes(), 1);
    }
}
