//! Webhook sink: POSTs the serialized signal as `text/plain`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use super::SignalSink;
use crate::error::DispatchError;

/// Delivers signals to a fixed HTTP endpoint.
pub struct WebhookDispatcher {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            timeout,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SignalSink for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, payload: &str) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout)
                } else {
                    DispatchError::Transport(e.without_url().to_string())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), response = %body, "Webhook accepted signal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;

    use super::*;

    type Captured = Arc<Mutex<Vec<(Option<String>, String)>>>;

    async fn record(
        State(captured): State<Captured>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        captured.lock().unwrap().push((content_type, body));
        StatusCode::OK
    }

    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::BAD_REQUEST, "invalid license")
    }

    async fn stall() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    /// Start a stub webhook on a random port.
    async fn start_stub() -> (SocketAddr, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/webhook/", post(record))
            .route("/reject", post(reject))
            .route("/stall", post(stall))
            .with_state(Arc::clone(&captured));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (addr, captured)
    }

    #[tokio::test]
    async fn posts_plain_text_body() {
        let (addr, captured) = start_stub().await;
        let sink = WebhookDispatcher::new(
            format!("http://{addr}/webhook/"),
            Duration::from_secs(5),
        );

        sink.deliver("key,long,BTCUSD,risk=1,tp=50000")
            .await
            .unwrap();

        let seen = captured.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("text/plain"));
        assert_eq!(seen[0].1, "key,long,BTCUSD,risk=1,tp=50000");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (addr, _) = start_stub().await;
        let sink = WebhookDispatcher::new(format!("http://{addr}/reject"), Duration::from_secs(5));

        match sink.deliver("payload").await {
            Err(DispatchError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid license");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = WebhookDispatcher::new(format!("http://{addr}/webhook/"), Duration::from_secs(5));
        let err = sink.deliver("payload").await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let (addr, _) = start_stub().await;
        let sink = WebhookDispatcher::new(
            format!("http://{addr}/stall"),
            Duration::from_millis(100),
        );
        let err = sink.deliver("payload").await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)), "got {err:?}");
    }
}
