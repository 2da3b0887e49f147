use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Created,
    Ready,
    Disposed,
}

#[derive(Debug)]
struct QueuedAction<A> {
    action: A,
    attempts: u32,
}

#[derive(Debug)]
struct QueueInner<A> {
    state: QueueState,
    pending: VecDeque<QueuedAction<A>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub processed: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// FIFO of actions recorded while offline, replayed by `drain`.
///
/// The queue is owned by whoever creates it. It must be initialized before
/// use and rejects every call once disposed.
#[derive(Debug)]
pub struct ActionQueue<A> {
    inner: Mutex<QueueInner<A>>,
    max_attempts: u32,
}

impl<A> Default for ActionQueue<A> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl<A> ActionQueue<A> {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                state: QueueState::Created,
                pending: VecDeque::new(),
            }),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn init(&self) -> AppResult<()> {
        let mut inner = self.lock()?;
        match inner.state {
            QueueState::Disposed => Err(AppError::conflict("action queue has been disposed")),
            QueueState::Ready => Ok(()),
            QueueState::Created => {
                inner.state = QueueState::Ready;
                debug!(target: "app::schedule", "action queue initialized");
                Ok(())
            }
        }
    }

    pub fn enqueue(&self, action: A) -> AppResult<usize> {
        let mut inner = self.lock()?;
        ensure_ready(inner.state)?;
        inner.pending.push_back(QueuedAction {
            action,
            attempts: 0,
        });
        Ok(inner.pending.len())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.pending.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `handler` once over every queued action in FIFO order. Failed
    /// actions go back to the end of the queue until they reach the attempt
    /// limit, after which they are dropped.
    pub fn drain<F>(&self, mut handler: F) -> AppResult<DrainReport>
    where
        F: FnMut(&A) -> AppResult<()>,
    {
        let batch: Vec<QueuedAction<A>> = {
            let mut inner = self.lock()?;
            ensure_ready(inner.state)?;
            inner.pending.drain(..).collect()
        };

        let mut report = DrainReport::default();
        let mut retry = Vec::new();
        for mut queued in batch {
            queued.attempts += 1;
            match handler(&queued.action) {
                Ok(()) => report.processed += 1,
                Err(err) if queued.attempts < self.max_attempts => {
                    debug!(target: "app::schedule", attempts = queued.attempts, error = %err, "queued action failed, retrying later");
                    report.requeued += 1;
                    retry.push(queued);
                }
                Err(err) => {
                    warn!(target: "app::schedule", attempts = queued.attempts, error = %err, "queued action dropped");
                    report.dropped += 1;
                }
            }
        }

        let mut inner = self.lock()?;
        // Actions enqueued by the handler stay behind the retried ones.
        let added: Vec<QueuedAction<A>> = inner.pending.drain(..).collect();
        inner.pending.extend(retry);
        inner.pending.extend(added);

        info!(
            target: "app::schedule",
            processed = report.processed,
            requeued = report.requeued,
            dropped = report.dropped,
            "action queue drained"
        );
        Ok(report)
    }

    /// Hands back whatever was not processed and closes the queue.
    pub fn dispose(&self) -> AppResult<Vec<A>> {
        let mut inner = self.lock()?;
        if inner.state == QueueState::Disposed {
            return Err(AppError::conflict("action queue has been disposed"));
        }
        inner.state = QueueState::Disposed;
        let remaining: Vec<A> = inner.pending.drain(..).map(|queued| queued.action).collect();
        debug!(target: "app::schedule", remaining = remaining.len(), "action queue disposed");
        Ok(remaining)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, QueueInner<A>>> {
        self.inner
            .lock()
            .map_err(|_| AppError::other("action queue lock poisoned"))
    }
}

fn ensure_ready(state: QueueState) -> AppResult<()> {
    match state {
        QueueState::Ready => Ok(()),
        QueueState::Created => Err(AppError::validation("action queue is not initialized")),
        QueueState::Disposed => Err(AppError::conflict("action queue has been disposed")),
    }
}
