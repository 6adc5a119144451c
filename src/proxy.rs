//! Reverse Proxy Forwarder
//!
//! Relays one request to one upstream and streams the answer back. Bodies are never
//! buffered: the inbound body stream feeds the upstream request and the upstream
//! response stream feeds the outbound body, chunk by chunk.
//!
//! The upstream timeout is an idle timeout. It only runs while the gateway is waiting on the
//! upstream, so a client that uploads slowly never makes a healthy upstream look unavailable.

use std::{
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    BoxError,
    body::{Body, HttpBody},
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::Response,
};
use reqwest::{Client, Url};
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};

use crate::{auth::Claims, error::GatewayError, routes::RouteDescriptor};

/// Headers meaningful only for a single transport hop; never relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwarder
///
/// Wraps the single HTTP client shared by all requests. Cloning is cheap: the
/// connection pool lives behind the client's own `Arc`.
#[derive(Clone, Debug)]
pub struct Forwarder {
    client: Client,
    timeout: Duration,
}

impl Forwarder {
    /// Builds the shared client. Redirects are relayed to the caller, not followed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    /// forward
    ///
    /// Sends `request` to `target` and relays status, headers and body unchanged.
    ///
    /// Only connectivity problems become errors: connection refused, DNS, TLS, or an
    /// upstream that stays idle for longer than the timeout all collapse to
    /// `UpstreamUnavailable`. An upstream that answers with its own 4xx/5xx is a successful
    /// forward.
    ///
    /// Until the response head arrives, the idle clock restarts whenever an upload chunk is
    /// relayed and is suspended while the inbound body is waiting on the client. After the
    /// head, each response chunk must follow the previous one within the timeout, or the
    /// relayed body ends with an error. Dropping the returned future (client disconnect)
    /// aborts the upstream call.
    pub async fn forward(
        &self,
        route: &RouteDescriptor,
        target: Url,
        request: Request,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if route.strip_authorization {
            headers.remove(header::AUTHORIZATION);
        }
        if headers.contains_key(header::ORIGIN) {
            let upstream_origin = HeaderValue::from_str(&target.origin().ascii_serialization())
                .map_err(|e| GatewayError::internal(format!("invalid upstream origin: {e}")))?;
            headers.insert(header::ORIGIN, upstream_origin);
        }

        let subject = parts.extensions.get::<Claims>().map(|claims| claims.id.to_string());
        tracing::debug!(
            method = %parts.method,
            upstream = %target,
            subject = subject.as_deref().unwrap_or("-"),
            "forwarding request"
        );

        let mut upstream_request = self
            .client
            .request(parts.method, target.clone())
            .headers(headers);
        let activity = Arc::new(UploadActivity::new());
        // Bodyless requests stay bodyless; anything else streams through.
        if body.size_hint().exact() != Some(0) {
            let upload = TrackedUpload {
                inner: body.into_data_stream(),
                activity: Arc::clone(&activity),
            };
            upstream_request = upstream_request.body(reqwest::Body::wrap_stream(upload));
        }

        let send = upstream_request.send();
        tokio::pin!(send);

        let upstream_response = loop {
            let deadline = activity.idle_deadline(self.timeout);
            tokio::select! {
                result = &mut send => match result {
                    Ok(response) => break response,
                    Err(e) => {
                        tracing::warn!(upstream = %target, error = %e, "upstream request failed");
                        return Err(GatewayError::UpstreamUnavailable);
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if activity.idle_deadline(self.timeout) <= Instant::now() {
                        tracing::warn!(
                            upstream = %target,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "upstream did not respond in time"
                        );
                        return Err(GatewayError::UpstreamUnavailable);
                    }
                }
            }
        };

        relay_response(upstream_response, self.timeout)
    }
}

fn relay_response(upstream: reqwest::Response, idle: Duration) -> Result<Response, GatewayError> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let source = upstream.url().clone();
    let body = upstream
        .bytes_stream()
        .timeout(idle)
        .map(move |chunk| -> Result<_, BoxError> {
            match chunk {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(e)) => {
                    tracing::warn!(upstream = %source, error = %e, "upstream body failed");
                    Err(e.into())
                }
                Err(elapsed) => {
                    tracing::warn!(
                        upstream = %source,
                        timeout_ms = idle.as_millis() as u64,
                        "upstream body stalled"
                    );
                    Err(elapsed.into())
                }
            }
        });

    let mut response = Response::builder()
        .status(status)
        .body(Body::from_stream(body))
        .map_err(|e| GatewayError::internal(format!("failed to build relayed response: {e}")))?;
    *response.headers_mut() = headers;

    Ok(response)
}

/// UploadActivity
///
/// Shared between the forward loop and the request body stream: when a chunk last moved,
/// and whether the body is currently waiting for the client to send more.
struct UploadActivity {
    last: Mutex<Instant>,
    awaiting_client: AtomicBool,
}

impl UploadActivity {
    fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
            awaiting_client: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// When the upstream counts as idle. Pushed forward for as long as the client is the
    /// side holding things up.
    fn idle_deadline(&self, idle: Duration) -> Instant {
        if self.awaiting_client.load(Ordering::Acquire) {
            return Instant::now() + idle;
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) + idle
    }
}

/// Request body stream that reports progress to `UploadActivity`.
struct TrackedUpload<S> {
    inner: S,
    activity: Arc<UploadActivity>,
}

impl<S: Stream + Unpin> Stream for TrackedUpload<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Pending => self.activity.awaiting_client.store(true, Ordering::Release),
            Poll::Ready(_) => {
                self.activity.awaiting_client.store(false, Ordering::Release);
                self.activity.touch();
            }
        }
        polled
    }
}

/// Removes the fixed hop-by-hop set plus anything the `Connection` header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
