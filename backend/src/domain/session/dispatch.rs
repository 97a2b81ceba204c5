//! Fixed pool of session-owning workers fed over bounded channels.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{SessionContext, SessionReply, SessionRequest};
use crate::domain::TraceId;
use crate::domain::ports::SessionOwner;

/// Pool tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on one delivery, queueing included.
    pub timeout: Duration,
    /// Pending requests each worker queue holds.
    pub queue_depth: usize,
    /// Host name stamped into issued cookies.
    pub hostname: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            queue_depth: 64,
            hostname: "acs".to_owned(),
        }
    }
}

/// Why a request never got a worker reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The pool was built without workers.
    #[error("session worker pool is empty")]
    NoWorkers,
    /// The worker index does not exist.
    #[error("no session worker {0}")]
    UnknownWorker(usize),
    /// The worker did not answer in time.
    #[error("session worker did not reply within {0:?}")]
    Timeout(Duration),
    /// The worker stopped before answering.
    #[error("session worker stopped")]
    Closed,
}

struct Envelope {
    trace_id: Option<TraceId>,
    request: SessionRequest,
    reply: oneshot::Sender<SessionReply>,
}

/// Handle to the running worker pool.
pub struct SessionDispatcher {
    workers: Vec<mpsc::Sender<Envelope>>,
    next: AtomicUsize,
    timeout: Duration,
}

impl SessionDispatcher {
    /// Start one worker task per owner.
    ///
    /// Workers stop when `shutdown` fires or the dispatcher is dropped.
    ///
    /// # Errors
    /// Returns [`DispatchError::NoWorkers`] when `owners` is empty.
    pub fn spawn(
        owners: Vec<Box<dyn SessionOwner>>,
        config: &DispatchConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, DispatchError> {
        if owners.is_empty() {
            return Err(DispatchError::NoWorkers);
        }
        let workers = owners
            .into_iter()
            .enumerate()
            .map(|(worker_index, owner)| {
                let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
                let context = SessionContext {
                    worker_index,
                    hostname: config.hostname.clone(),
                };
                tokio::spawn(run_worker(owner, context, receiver, shutdown.clone()));
                sender
            })
            .collect::<Vec<_>>();
        let offset = rand::random::<usize>() % workers.len();
        Ok(Self {
            workers,
            next: AtomicUsize::new(offset),
            timeout: config.timeout,
        })
    }

    /// Number of workers.
    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Round-robin choice for a newly accepted exchange.
    pub fn next_worker(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Deliver `request` to `worker_index` and wait for its reply.
    ///
    /// A timed-out delivery is not withdrawn; the worker may still process it.
    ///
    /// # Errors
    /// Returns [`DispatchError`] when no reply arrives.
    pub async fn dispatch(
        &self,
        worker_index: usize,
        request: SessionRequest,
    ) -> Result<SessionReply, DispatchError> {
        let sender = self
            .workers
            .get(worker_index)
            .ok_or(DispatchError::UnknownWorker(worker_index))?;
        let (reply, answer) = oneshot::channel();
        let delivery = async {
            sender
                .send(Envelope {
                    trace_id: TraceId::current(),
                    request,
                    reply,
                })
                .await
                .map_err(|_closed| DispatchError::Closed)?;
            answer.await.map_err(|_dropped| DispatchError::Closed)
        };
        tokio::time::timeout(self.timeout, delivery)
            .await
            .map_err(|_elapsed| DispatchError::Timeout(self.timeout))?
    }
}

async fn run_worker(
    mut owner: Box<dyn SessionOwner>,
    context: SessionContext,
    mut requests: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
) {
    debug!(worker = context.worker_index, "session worker started");
    loop {
        let envelope = tokio::select! {
            () = shutdown.cancelled() => break,
            envelope = requests.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };
        let handled = owner.handle(&context, envelope.request);
        let reply = match envelope.trace_id {
            Some(trace_id) => TraceId::scope(trace_id, handled).await,
            None => handled.await,
        };
        if envelope.reply.send(reply).is_err() {
            warn!(worker = context.worker_index, "reply dropped; router gave up waiting");
        }
    }
    debug!(worker = context.worker_index, "session worker stopped");
}
