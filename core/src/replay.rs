//! Replay: one-shot and resumable iteration over stored events, used to
//! rebuild projections and to seed operational tooling (§4.7, §10.6).
//!
//! This module does not run continuously — [`crate::projection`]'s runner
//! (in the `eventflow-projections` crate) owns the long-lived tail-and-retry
//! loop. Replay is the bounded "catch up from here to the current tail"
//! primitive that loop is built on, and is also useful standalone for
//! rebuilding a single projection on demand.

use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::position::GlobalPosition;
use crate::projection::{Projection, ProjectionError};
use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use thiserror::Error;

/// Errors from a replay run.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Failed to read events from the store.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The projection rejected an event and `stop_on_error` was set.
    #[error("stopped on error after {processed} events at position {position}: {source}")]
    StoppedOnError {
        /// Events successfully handled before the failure.
        processed: u64,
        /// The global position of the event that failed.
        position: GlobalPosition,
        /// The underlying projection error.
        source: ProjectionError,
    },
}

/// Tuning knobs for a replay run.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// How many events to pull from the store per fetch/progress tick.
    pub batch_size: usize,

    /// Abort the whole run on the first handler error instead of counting it
    /// and continuing. Rebuilds typically want `true`; best-effort backfills
    /// typically want `false`.
    pub stop_on_error: bool,

    /// Handle events within a batch concurrently rather than strictly in
    /// position order. Only safe when the projection's writes commute (e.g.
    /// independent per-aggregate read rows); never set this for a projection
    /// that depends on cross-event ordering.
    pub parallel: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            stop_on_error: true,
            parallel: false,
        }
    }
}

/// A snapshot of replay progress, reported after every batch.
#[derive(Debug, Clone)]
pub struct ReplayProgress {
    /// Events successfully handled so far.
    pub processed: u64,

    /// Total events expected, if known up front (e.g. a bounded `replay_aggregate`
    /// call). `None` when tailing an open-ended stream.
    pub total: Option<u64>,

    /// When this replay run started.
    pub started_at: DateTime<Utc>,
}

impl ReplayProgress {
    fn new() -> Self {
        Self {
            processed: 0,
            total: None,
            started_at: Utc::now(),
        }
    }

    /// Fraction complete in `[0.0, 1.0]`, or `None` if `total` is unknown.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.processed as f64 / total as f64).min(1.0)
            }
        })
    }
}

/// Fetch an aggregate's history, optionally truncated to `to_version`.
///
/// # Errors
///
/// Returns [`ReplayError::EventStore`] on backend failure.
pub async fn replay_aggregate(
    event_store: &dyn EventStore,
    aggregate_id: AggregateId,
    to_version: Option<Version>,
) -> Result<Vec<StoredEvent>, ReplayError> {
    let events = event_store.get_events(aggregate_id, Version::new(0)).await?;
    Ok(match to_version {
        Some(max) => events.into_iter().take_while(|e| e.version <= max).collect(),
        None => events,
    })
}

/// Drive `handler` over every event from `from_position` to the current tail.
///
/// # Errors
///
/// Returns [`ReplayError::EventStore`] on backend failure, or
/// [`ReplayError::StoppedOnError`] if `options.stop_on_error` is set and the
/// handler rejects an event.
pub async fn replay_all(
    event_store: &dyn EventStore,
    handler: &dyn Projection,
    from_position: GlobalPosition,
    options: ReplayOptions,
) -> Result<ReplayProgress, ReplayError> {
    let mut progress = ReplayProgress::new();
    let mut stream = event_store.get_all(from_position);
    let mut batch = Vec::with_capacity(options.batch_size.max(1));

    loop {
        batch.clear();
        for _ in 0..options.batch_size.max(1) {
            match stream.next().await {
                Some(item) => batch.push(item?),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        process_batch(handler, &batch, &options, &mut progress).await?;
        tracing::debug!(processed = progress.processed, "replay batch complete");
    }

    Ok(progress)
}

/// Drive `handler` over every event of `event_type` at or after `from_timestamp`.
///
/// # Errors
///
/// Returns [`ReplayError::EventStore`] on backend failure, or
/// [`ReplayError::StoppedOnError`] if `options.stop_on_error` is set and the
/// handler rejects an event.
pub async fn replay_by_type(
    event_store: &dyn EventStore,
    event_type: &str,
    handler: &dyn Projection,
    from_timestamp: DateTime<Utc>,
    options: ReplayOptions,
) -> Result<ReplayProgress, ReplayError> {
    let events = event_store.get_events_by_type(event_type, from_timestamp).await?;
    let mut progress = ReplayProgress::new();
    progress.total = Some(events.len() as u64);

    for chunk in events.chunks(options.batch_size.max(1)) {
        process_batch(handler, chunk, &options, &mut progress).await?;
    }
    Ok(progress)
}

/// Like [`replay_all`], but invokes `on_progress` after each batch so callers
/// can surface a progress bar or periodic log line (§10.6).
///
/// # Errors
///
/// Same as [`replay_all`].
pub async fn replay_with_progress<F>(
    event_store: &dyn EventStore,
    handler: &dyn Projection,
    from_position: GlobalPosition,
    options: ReplayOptions,
    mut on_progress: F,
) -> Result<ReplayProgress, ReplayError>
where
    F: FnMut(&ReplayProgress),
{
    let mut progress = ReplayProgress::new();
    let mut stream = event_store.get_all(from_position);
    let mut batch = Vec::with_capacity(options.batch_size.max(1));

    loop {
        batch.clear();
        for _ in 0..options.batch_size.max(1) {
            match stream.next().await {
                Some(item) => batch.push(item?),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        process_batch(handler, &batch, &options, &mut progress).await?;
        on_progress(&progress);
    }

    Ok(progress)
}

async fn process_batch(
    handler: &dyn Projection,
    batch: &[StoredEvent],
    options: &ReplayOptions,
    progress: &mut ReplayProgress,
) -> Result<(), ReplayError> {
    if options.parallel {
        let results = futures::future::join_all(batch.iter().map(|event| handler.handle(event))).await;
        for (event, result) in batch.iter().zip(results) {
            handle_outcome(event, result, options, progress)?;
        }
    } else {
        for event in batch {
            let result = handler.handle(event).await;
            handle_outcome(event, result, options, progress)?;
        }
    }
    Ok(())
}

fn handle_outcome(
    event: &StoredEvent,
    result: Result<(), ProjectionError>,
    options: &ReplayOptions,
    progress: &mut ReplayProgress,
) -> Result<(), ReplayError> {
    match result {
        Ok(()) => {
            progress.processed += 1;
            Ok(())
        }
        Err(source) => {
            metrics::counter!("projection.errors.total").increment(1);
            if options.stop_on_error {
                Err(ReplayError::StoppedOnError {
                    processed: progress.processed,
                    position: event.position,
                    source,
                })
            } else {
                tracing::warn!(position = event.position.value(), %source, "replay continuing past handler error");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_with_known_total() {
        let progress = ReplayProgress {
            processed: 25,
            total: Some(100),
            started_at: Utc::now(),
        };
        assert!((progress.fraction().unwrap() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn fraction_unknown_total() {
        let progress = ReplayProgress {
            processed: 25,
            total: None,
            started_at: Utc::now(),
        };
        assert!(progress.fraction().is_none());
    }

    #[test]
    fn fraction_caps_at_one() {
        let progress = ReplayProgress {
            processed: 150,
            total: Some(100),
            started_at: Utc::now(),
        };
        assert!((progress.fraction().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_options_stop_on_error() {
        let options = ReplayOptions::default();
        assert!(options.stop_on_error);
        assert!(!options.parallel);
        assert_eq!(options.batch_size, 500);
    }
}
