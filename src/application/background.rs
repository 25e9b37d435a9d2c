use crate::error::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

enum Message {
    Run {
        name: &'static str,
        job: BoxFuture<'static, Result<()>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Bounded queue for fire-and-forget side effects (health and failure
/// bookkeeping, notifications, statistics).
///
/// Submitting never waits: when the queue is full the job is dropped with a
/// warning. Jobs run one at a time on a single worker; their errors and
/// panics are logged and go no further.
#[derive(Clone)]
pub struct BackgroundQueue {
    tx: mpsc::Sender<Message>,
}

impl BackgroundQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx));
        (Self { tx }, handle)
    }

    pub fn submit<F>(&self, name: &'static str, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let message = Message::Run {
            name,
            job: job.boxed(),
        };
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(job = name, "Background queue full, job dropped");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(job = name, "Background queue closed, job dropped");
            }
        }
    }

    /// Waits until every job submitted before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Run { name, job } => match AssertUnwindSafe(job).catch_unwind().await {
                Ok(Ok(())) => debug!(job = name, "Background job finished"),
                Ok(Err(e)) => warn!(job = name, error = %e, "Background job failed"),
                Err(_) => error!(job = name, "Background job panicked"),
            },
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Background queue worker stopped");
}
