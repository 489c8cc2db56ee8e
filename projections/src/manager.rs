//! `ProjectionManager`: tails the event log and keeps one projection current.
//!
//! # Overview
//!
//! The manager coordinates the lifecycle of a single [`Projection`]:
//! - Loads its checkpoint to resume from the right position (§4.6)
//! - Tails [`EventStore::get_all`] from that position
//! - Dispatches each event to the projection, advancing the checkpoint only
//!   after a successful `handle` (§4.7)
//! - Retries a failing event up to a bounded budget, then records it to the
//!   dead letter queue (if configured) for operator visibility — but never
//!   advances the checkpoint past it, so the same event is retried on every
//!   subsequent pass until it's fixed and reprocessed or manually resolved
//! - Backs off and re-polls when it catches up to the head of the log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ Event Store │ (Postgres, in-memory, ...)
//! └──────┬──────┘
//!        │ get_all(from_position)
//!        ▼
//! ┌──────────────────┐      ┌──────────────┐
//! │ ProjectionManager │ ───▶ │  Projection  │
//! └─────────┬──────────┘     └──────────────┘
//!           │
//!           ▼
//! ┌──────────────────┐
//! │ CheckpointStore   │
//! └──────────────────┘
//! ```
//!
//! # At-Least-Once Delivery
//!
//! The checkpoint advances only after `handle` returns `Ok`. If the process
//! crashes between handling an event and saving the checkpoint, that event is
//! redelivered on restart — projections must be idempotent (§4.7, §8).
//!
//! # Example
//!
//! ```ignore
//! use eventflow_projections::ProjectionManager;
//!
//! let manager = ProjectionManager::new(my_projection, event_store, checkpoint_store);
//! tokio::spawn({
//!     let manager = manager.clone();
//!     async move { manager.start().await }
//! });
//!
//! // Elsewhere:
//! manager.stop();
//! let status = manager.status();
//! println!("processed {} events", status.events_processed);
//! ```

use chrono::{DateTime, Utc};
use eventflow_core::checkpoint::CheckpointStore;
use eventflow_core::event_store::EventStore;
use eventflow_core::position::GlobalPosition;
use eventflow_core::projection::{Projection, ProjectionError};
use eventflow_postgres::DeadLetterQueue;
use futures::StreamExt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle state of a [`ProjectionManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed but `start()` has not been called yet.
    Idle,
    /// Actively tailing the event log.
    Running,
    /// Stopped via `stop()`; can be restarted with `start()`.
    Stopped,
    /// `rebuild()` is clearing the projection's state.
    Rebuilding,
    /// The run loop exited because of an unrecoverable error.
    Failed(String),
}

/// A snapshot of a projection's progress, returned by [`ProjectionManager::status`].
#[derive(Clone, Debug)]
pub struct ManagerStatus {
    /// Current lifecycle state.
    pub state: ManagerState,
    /// The last global position successfully processed (checkpointed).
    pub last_processed_position: GlobalPosition,
    /// When the last event was processed, if any.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Total events successfully applied since this manager started.
    pub events_processed: u64,
    /// Total events that exhausted their retry budget and were dead-lettered.
    pub error_count: u64,
}

impl Default for ManagerStatus {
    fn default() -> Self {
        Self {
            state: ManagerState::Idle,
            last_processed_position: GlobalPosition::START,
            last_processed_at: None,
            events_processed: 0,
            error_count: 0,
        }
    }
}

/// How many times to retry a failing event before dead-lettering it.
const MAX_RETRIES: u32 = 3;

/// How long to sleep after catching up to the head of the log before polling again.
const CATCH_UP_BACKOFF: Duration = Duration::from_millis(250);

/// Tails the event log for a single [`Projection`], maintaining its checkpoint.
pub struct ProjectionManager<P: Projection> {
    projection: Arc<P>,
    event_store: Arc<dyn EventStore>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    dead_letter_queue: Option<Arc<DeadLetterQueue>>,
    status: Arc<RwLock<ManagerStatus>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: Projection> Clone for ProjectionManager<P> {
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
            event_store: Arc::clone(&self.event_store),
            checkpoint_store: Arc::clone(&self.checkpoint_store),
            dead_letter_queue: self.dead_letter_queue.clone(),
            status: Arc::clone(&self.status),
            shutdown_tx: self.shutdown_tx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        }
    }
}

impl<P: Projection> ProjectionManager<P> {
    /// Create a new manager for `projection`, reading from `event_store` and
    /// checkpointing through `checkpoint_store`.
    #[must_use]
    pub fn new(projection: P, event_store: Arc<dyn EventStore>, checkpoint_store: Arc<dyn CheckpointStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            projection: Arc::new(projection),
            event_store,
            checkpoint_store,
            dead_letter_queue: None,
            status: Arc::new(RwLock::new(ManagerStatus::default())),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Route events that exhaust their retry budget to `dlq` instead of
    /// blocking the projection forever.
    #[must_use]
    pub fn with_dead_letter_queue(mut self, dlq: Arc<DeadLetterQueue>) -> Self {
        self.dead_letter_queue = Some(dlq);
        self
    }

    /// Current status snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal status lock is poisoned, which only happens if
    /// a prior call panicked while holding it.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn status(&self) -> ManagerStatus {
        self.status.read().expect("status lock poisoned").clone()
    }

    /// Signal the run loop to stop. `start()` returns once the current batch
    /// finishes; the checkpoint reflects the last successfully handled event.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Drop the projection's read-model state and reset its checkpoint to
    /// [`GlobalPosition::START`], so the next `start()` replays from the
    /// beginning of the log.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if clearing the read model or checkpoint fails.
    pub async fn rebuild(&self) -> Result<(), ProjectionError> {
        self.set_state(ManagerState::Rebuilding);
        let name = self.projection.name();
        tracing::info!(projection = name, "rebuilding projection");

        self.projection.reset().await?;
        self.checkpoint_store
            .delete(name)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        {
            let mut status = self.status.write().expect("status lock poisoned");
            *status = ManagerStatus::default();
        }

        // Re-arm the shutdown signal so a manager that was stopped before the
        // rebuild can be `start()`-ed again without constructing a new instance.
        let _ = self.shutdown_tx.send(false);

        tracing::info!(projection = name, "projection rebuilt, ready to replay from the start");
        Ok(())
    }

    /// Tail the event log, applying events to the projection until `stop()`
    /// is called.
    ///
    /// Resumes from the projection's last checkpoint (§4.6). When the log is
    /// caught up, polls again after [`CATCH_UP_BACKOFF`] rather than busy-looping.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the checkpoint cannot be loaded, or if
    /// the event store itself fails (as opposed to an individual handler
    /// failure, which is retried and then dead-lettered, never propagated).
    pub async fn start(&self) -> Result<(), ProjectionError> {
        let name = self.projection.name();
        let mut position = self
            .checkpoint_store
            .get(name)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        tracing::info!(projection = name, from_position = %position, "starting projection manager");
        self.set_state(ManagerState::Running);

        while !*self.shutdown_rx.borrow() {
            let mut stream = self.event_store.get_all(position.next());
            let mut advanced = false;

            while let Some(item) = stream.next().await {
                if *self.shutdown_rx.borrow() {
                    break;
                }

                let stored = item.map_err(|e| {
                    let message = e.to_string();
                    self.set_state(ManagerState::Failed(message.clone()));
                    ProjectionError::Storage(message)
                })?;

                // A failing event is never checkpointed past, even once it's been
                // dead-lettered (§4.7): stop this pass here so the next re-open
                // resumes at the same position and retries it.
                if self.process_with_retries(&stored).await.is_err() {
                    break;
                }

                position = stored.position;
                self.checkpoint_store
                    .save(name, position)
                    .await
                    .map_err(|e| ProjectionError::Storage(e.to_string()))?;
                advanced = true;
            }

            if !advanced && !*self.shutdown_rx.borrow() {
                tokio::time::sleep(CATCH_UP_BACKOFF).await;
            }
        }

        self.set_state(ManagerState::Stopped);
        tracing::info!(projection = name, "projection manager stopped");
        Ok(())
    }

    /// Apply one event, retrying transient handler failures before giving up.
    ///
    /// Returns `Ok(())` only when the projection itself handled the event
    /// successfully. Exhausting the retry budget is always an `Err`, whether
    /// or not a dead letter queue is configured: recording an event in the
    /// DLQ is an observability aid, not a substitute for handling it, and
    /// does not change the at-least-once contract (§4.7) — the checkpoint
    /// must never advance past a failing event.
    async fn process_with_retries(&self, stored: &eventflow_core::event_store::StoredEvent) -> Result<(), ProjectionError> {
        let name = self.projection.name();
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.projection.handle(stored).await {
                Ok(()) => {
                    self.record_success(stored.position);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        projection = name,
                        attempt,
                        event_type = %stored.event.event_type,
                        error = %e,
                        "projection handler failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let message = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        self.record_failure(&message);

        if let Some(dlq) = &self.dead_letter_queue {
            if let Err(e) = dlq.record_failure(name, &stored.event, &message).await {
                tracing::error!(projection = name, error = %e, "failed to record dead letter");
            }
        } else {
            tracing::error!(
                projection = name,
                event_type = %stored.event.event_type,
                error = message,
                "event exhausted retry budget with no dead letter queue configured"
            );
        }

        Err(ProjectionError::EventProcessing(message))
    }

    fn set_state(&self, state: ManagerState) {
        self.status.write().expect("status lock poisoned").state = state;
    }

    fn record_success(&self, position: GlobalPosition) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.events_processed += 1;
        status.last_processed_position = position;
        status.last_processed_at = Some(Utc::now());
        metrics::counter!("projection.events_processed.total", "projection" => self.projection.name().to_string())
            .increment(1);
    }

    fn record_failure(&self, message: &str) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.error_count += 1;
        metrics::counter!("projection.errors.total", "projection" => self.projection.name().to_string()).increment(1);
        tracing::error!(projection = self.projection.name(), error = message, "event dead-lettered after retries");
    }
}
