//! Signal dispatch: hands a completed signal to its sink and turns the
//! outcome into feedback for the user.

pub mod webhook;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::DispatchError;
use crate::session::CompletedSignal;

pub use webhook::WebhookDispatcher;

/// Reply shown when a signal could not be delivered.
pub const DISPATCH_FAILED_MESSAGE: &str = "Failed to send trading signal. Please try again later.";

/// Destination for serialized signals. One attempt per call, no retries.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Deliver one serialized signal.
    async fn deliver(&self, payload: &str) -> Result<(), DispatchError>;
}

/// Result of a single dispatch attempt.
#[derive(Debug)]
pub enum DispatchOutcome {
    Sent { summary: String },
    Failed { error: DispatchError },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Sent { summary } => summary.clone(),
            Self::Failed { .. } => DISPATCH_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Serialize `signal` and deliver it once. The signal is consumed either way.
pub async fn dispatch(sink: &dyn SignalSink, signal: CompletedSignal) -> DispatchOutcome {
    let payload = signal.to_payload();
    match sink.deliver(&payload).await {
        Ok(()) => {
            info!(
                sink = sink.name(),
                side = %signal.trade_side,
                symbol = %signal.symbol,
                "Trading signal delivered"
            );
            DispatchOutcome::Sent {
                summary: signal.summary(),
            }
        }
        Err(e) => {
            error!(
                sink = sink.name(),
                symbol = %signal.symbol,
                error = %e,
                "Failed to deliver trading signal"
            );
            DispatchOutcome::Failed { error: e }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::session::{SignalDraft, SignalField};

    struct StubSink {
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SignalSink for StubSink {
        fn name(&self) -> &str {
            "stub"
        }

        async fn deliver(&self, payload: &str) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(payload.to_string());
            if self.fail {
                Err(DispatchError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn signal() -> CompletedSignal {
        let mut draft = SignalDraft::new();
        draft.record(SignalField::Credential, "key").unwrap();
        draft.record(SignalField::TradeSide, "short").unwrap();
        draft.record(SignalField::Symbol, "ETHUSD").unwrap();
        draft.record(SignalField::Risk, "2").unwrap();
        draft.complete().unwrap()
    }

    #[tokio::test]
    async fn success_reports_summary() {
        let sink = StubSink {
            fail: false,
            seen: Mutex::new(Vec::new()),
        };
        let outcome = dispatch(&sink, signal()).await;
        assert!(outcome.is_sent());
        assert!(outcome.user_message().contains("Open short position for ETHUSD"));
        assert_eq!(*sink.seen.lock().unwrap(), vec!["key,short,ETHUSD,risk=2"]);
    }

    #[tokio::test]
    async fn failure_reports_generic_message_after_one_attempt() {
        let sink = StubSink {
            fail: true,
            seen: Mutex::new(Vec::new()),
        };
        let outcome = dispatch(&sink, signal()).await;
        assert!(!outcome.is_sent());
        assert_eq!(outcome.user_message(), DISPATCH_FAILED_MESSAGE);
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }
}
