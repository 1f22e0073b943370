//! Event loop: pulls events off a channel and feeds them to the controller.
//!
//! Each user gets a worker task with its own queue, so a user's events are
//! handled in arrival order while different users proceed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::controller::Controller;
use crate::channels::{Channel, IncomingEvent};
use crate::error::Result;

/// Run until the channel's stream ends or Ctrl+C is received.
pub async fn run(channel: Arc<dyn Channel>, controller: Arc<Controller>) -> Result<()> {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down..."),
            Err(e) => {
                warn!("Cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    run_until(channel, controller, ctrl_c).await
}

/// Run until the channel's stream ends or `shutdown` completes. Events
/// already queued are finished before returning.
pub async fn run_until(
    channel: Arc<dyn Channel>,
    controller: Arc<Controller>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut events = channel.start().await?;
    let mut queues = UserQueues::new(Arc::clone(&channel), controller, WORKER_IDLE_TIMEOUT);
    let mut reap = tokio::time::interval(WORKER_IDLE_TIMEOUT);
    tokio::pin!(shutdown);

    info!(channel = channel.name(), "Signal relay ready and listening");

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    info!("Channel stream ended, shutting down...");
                    break;
                }
            },
            _ = reap.tick() => {
                queues.reap_idle();
                continue;
            }
        };
        queues.push(event);
    }

    queues.close().await;
    channel.shutdown().await?;
    Ok(())
}

/// Handle one event and send the reply, if any, back on its channel.
pub async fn handle_event(channel: &dyn Channel, controller: &Controller, event: &IncomingEvent) {
    let Some(reply) = controller.handle(event).await else {
        return;
    };
    if let Err(e) = channel.respond(event, reply).await {
        warn!(user_id = %event.user_id, channel = channel.name(), "Failed to send reply: {e}");
    }
}

/// How long a user's worker waits for another event before exiting.
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

struct Worker {
    tx: mpsc::UnboundedSender<IncomingEvent>,
    handle: JoinHandle<()>,
}

/// One queue and worker per user. Workers exit once their queue has been
/// idle for `idle_timeout`; the next event for that user starts a new one.
struct UserQueues {
    channel: Arc<dyn Channel>,
    controller: Arc<Controller>,
    idle_timeout: Duration,
    workers: HashMap<String, Worker>,
}

impl UserQueues {
    fn new(channel: Arc<dyn Channel>, controller: Arc<Controller>, idle_timeout: Duration) -> Self {
        Self {
            channel,
            controller,
            idle_timeout,
            workers: HashMap::new(),
        }
    }

    fn push(&mut self, event: IncomingEvent) {
        let event = match self.workers.get(&event.user_id) {
            Some(worker) => match worker.tx.send(event) {
                Ok(()) => return,
                // The worker went idle and closed its queue.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let user_id = event.user_id.clone();
        let previous = self.workers.remove(&user_id).map(|w| w.handle);
        let worker = self.spawn_worker(&user_id, previous);
        if let Err(mpsc::error::SendError(event)) = worker.tx.send(event) {
            warn!(user_id = %event.user_id, "Worker gone; dropping event");
        }
        self.workers.insert(user_id, worker);
    }

    /// Start a worker. It waits for `previous` (the user's last worker, which
    /// may still be draining) so the user's events stay in order.
    fn spawn_worker(&self, user_id: &str, previous: Option<JoinHandle<()>>) -> Worker {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingEvent>();
        let channel = Arc::clone(&self.channel);
        let controller = Arc::clone(&self.controller);
        let idle_timeout = self.idle_timeout;
        let user_id = user_id.to_string();
        debug!(user_id = %user_id, "Starting user worker");

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(user_id = %user_id, "User worker panicked: {e}");
                }
            }
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(event)) => handle_event(channel.as_ref(), &controller, &event).await,
                    Ok(None) => break,
                    Err(_) => {
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            handle_event(channel.as_ref(), &controller, &event).await;
                        }
                        debug!(user_id = %user_id, "User worker idle; exiting");
                        break;
                    }
                }
            }
        });
        Worker { tx, handle }
    }

    /// Forget workers that have exited after going idle.
    fn reap_idle(&mut self) {
        self.workers
            .retain(|_, w| !(w.tx.is_closed() && w.handle.is_finished()));
    }

    /// Stop accepting events and wait for every queue to drain.
    async fn close(self) {
        let handles: Vec<JoinHandle<()>> = self.workers.into_values().map(|w| w.handle).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("User worker panicked: {e}");
            }
        }
    }
}
