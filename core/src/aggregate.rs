//! Aggregate base: tracks identity, version, and uncommitted events, and
//! exposes the replay entry point used by the repository (§4.4).
//!
//! Aggregates are NOT thread-safe; callers must serialize mutation of a
//! single instance at the command-handling layer, never inside the aggregate
//! itself (§5, §9).

use crate::event::{Event, EventMetadata, SerializedEvent};
use crate::event_store::StoredEvent;
use crate::stream::{AggregateId, Version};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while mutating or replaying an aggregate.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// The domain applier rejected an event. The uncommitted buffer and
    /// version are left exactly as they were before the call — raising
    /// events is all-or-nothing, never partially applied.
    #[error("failed to apply event {event_type}: {message}")]
    ApplyFailed {
        /// The event type the applier was asked to handle.
        event_type: String,
        /// The applier's error message.
        message: String,
    },

    /// Failed to serialize the domain event payload before raising it.
    #[error("failed to serialize event: {0}")]
    SerializationFailed(String),
}

/// Domain-supplied function mapping `(state, event) -> state`.
///
/// Called during both `raise` (command execution) and `load_from_history`
/// (replay). Implementations pattern-match on [`SerializedEvent::event_type`]
/// and mutate `state` in place; unknown event types are ignored for forward
/// compatibility (§4.4).
pub trait Applier<S>: Send + Sync {
    /// Apply one event to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::ApplyFailed`] if the event is recognized but
    /// cannot be legally applied (e.g. it violates a domain invariant).
    /// Unrecognized event types should return `Ok(())` rather than erroring.
    fn apply(&self, state: &mut S, event: &SerializedEvent) -> Result<(), AggregateError>;
}

impl<S, F> Applier<S> for F
where
    F: Fn(&mut S, &SerializedEvent) -> Result<(), AggregateError> + Send + Sync,
{
    fn apply(&self, state: &mut S, event: &SerializedEvent) -> Result<(), AggregateError> {
        self(state, event)
    }
}

/// An aggregate: domain state `S` plus the event-sourcing bookkeeping needed
/// to save and reload it through a [`crate::repository::Repository`].
///
/// `S` is the domain's own private state representation; `A` is the applier
/// that knows how to fold events into it. The repository's factory produces
/// one of these per load, wiring state and applier together without any
/// inheritance or downcasting (§9).
pub struct Aggregate<S, A: Applier<S>> {
    id: AggregateId,
    version: Version,
    state: S,
    uncommitted: Vec<SerializedEvent>,
    applier: A,
}

impl<S, A: Applier<S>> Aggregate<S, A> {
    /// Create a fresh aggregate at version 0 with no uncommitted events.
    #[must_use]
    pub const fn new(id: AggregateId, state: S, applier: A) -> Self {
        Self {
            id,
            version: Version::INITIAL,
            state,
            uncommitted: Vec::new(),
            applier,
        }
    }

    /// The aggregate's identity.
    #[must_use]
    pub const fn id(&self) -> &AggregateId {
        &self.id
    }

    /// The aggregate's current version (count of events ever applied).
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Read-only access to the domain state.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Events raised since the last commit, oldest first.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[SerializedEvent] {
        &self.uncommitted
    }

    /// Raise a new domain event: serialize it, apply it to `state`, append it
    /// to the uncommitted buffer, and advance `version`.
    ///
    /// If the applier rejects the event, the mutation is aborted: neither the
    /// buffer nor the version advances, and the error is returned to the
    /// caller instead of panicking (§9 — a deliberate correction of the
    /// source's "panic on apply failure" behavior).
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::SerializationFailed`] if the event cannot be
    /// serialized, or [`AggregateError::ApplyFailed`] if the applier rejects it.
    pub fn raise<E: Event + Serialize>(
        &mut self,
        event: &E,
        metadata: EventMetadata,
    ) -> Result<(), AggregateError> {
        let serialized = SerializedEvent::from_event(event, self.id.clone(), Utc::now(), metadata)
            .map_err(|e| AggregateError::SerializationFailed(e.to_string()))?;

        self.applier.apply(&mut self.state, &serialized)?;

        self.uncommitted.push(serialized);
        self.version = self.version.next();
        Ok(())
    }

    /// Apply a batch of previously-stored events in order, advancing
    /// `version` to each event's stream version. The uncommitted buffer is
    /// left untouched — this is the replay path, not the raise path.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::ApplyFailed`] if any event is rejected by
    /// the applier. On error, events already applied before the failing one
    /// remain applied (history is a fact; a rejection here indicates a
    /// corrupted log or an applier/schema mismatch, not a recoverable retry).
    pub fn load_from_history<I>(&mut self, events: I) -> Result<(), AggregateError>
    where
        I: IntoIterator<Item = StoredEvent>,
    {
        for stored in events {
            self.applier.apply(&mut self.state, &stored.event)?;
            self.version = stored.version;
        }
        Ok(())
    }

    /// Clear the uncommitted buffer after a successful save.
    pub fn mark_committed(&mut self) {
        self.uncommitted.clear();
    }

    /// Force the version to a specific value, used by the repository when
    /// seeding an aggregate from a snapshot (§4.5).
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Consume the aggregate, returning its domain state.
    #[must_use]
    pub fn into_state(self) -> S {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum AccountEvent {
        Opened { owner: String },
        Deposited { amount: i64 },
        Withdrawn { amount: i64 },
    }

    impl Event for AccountEvent {
        fn event_type(&self) -> &'static str {
            match self {
                AccountEvent::Opened { .. } => "Account.Opened.v1",
                AccountEvent::Deposited { .. } => "Account.Deposited.v1",
                AccountEvent::Withdrawn { .. } => "Account.Withdrawn.v1",
            }
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct AccountState {
        owner: String,
        balance: i64,
        active: bool,
    }

    fn account_applier(state: &mut AccountState, event: &SerializedEvent) -> Result<(), AggregateError> {
        match event.event_type.as_str() {
            "Account.Opened.v1" => {
                let payload: AccountEvent = event
                    .deserialize_payload()
                    .map_err(|e| AggregateError::SerializationFailed(e.to_string()))?;
                if let AccountEvent::Opened { owner } = payload {
                    state.owner = owner;
                    state.active = true;
                }
            }
            "Account.Deposited.v1" => {
                let payload: AccountEvent = event
                    .deserialize_payload()
                    .map_err(|e| AggregateError::SerializationFailed(e.to_string()))?;
                if let AccountEvent::Deposited { amount } = payload {
                    state.balance += amount;
                }
            }
            "Account.Withdrawn.v1" => {
                let payload: AccountEvent = event
                    .deserialize_payload()
                    .map_err(|e| AggregateError::SerializationFailed(e.to_string()))?;
                if let AccountEvent::Withdrawn { amount } = payload {
                    if amount > state.balance {
                        return Err(AggregateError::ApplyFailed {
                            event_type: event.event_type.clone(),
                            message: "insufficient funds".to_string(),
                        });
                    }
                    state.balance -= amount;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn new_account(id: &str) -> Aggregate<AccountState, fn(&mut AccountState, &SerializedEvent) -> Result<(), AggregateError>> {
        Aggregate::new(AggregateId::new(id), AccountState::default(), account_applier)
    }

    #[test]
    fn raise_applies_event_and_advances_version() {
        let mut account = new_account("A1");
        account
            .raise(
                &AccountEvent::Opened {
                    owner: "x".to_string(),
                },
                EventMetadata::new("corr-1"),
            )
            .unwrap();

        assert_eq!(account.version(), Version::new(1));
        assert!(account.state().active);
        assert_eq!(account.uncommitted_events().len(), 1);
    }

    #[test]
    fn scenario_a_bank_account_single_stream() {
        let mut account = new_account("A1");
        account
            .raise(
                &AccountEvent::Opened {
                    owner: "x".to_string(),
                },
                EventMetadata::new("corr-1"),
            )
            .unwrap();
        account
            .raise(&AccountEvent::Deposited { amount: 100 }, EventMetadata::new("corr-1"))
            .unwrap();
        account
            .raise(&AccountEvent::Deposited { amount: 50 }, EventMetadata::new("corr-1"))
            .unwrap();
        account
            .raise(&AccountEvent::Withdrawn { amount: 30 }, EventMetadata::new("corr-1"))
            .unwrap();

        assert_eq!(account.version(), Version::new(4));
        assert_eq!(account.state().balance, 120);
        assert!(account.state().active);
    }

    #[test]
    fn raise_failure_does_not_advance_buffer_or_version() {
        let mut account = new_account("A1");
        account
            .raise(
                &AccountEvent::Opened {
                    owner: "x".to_string(),
                },
                EventMetadata::new("corr-1"),
            )
            .unwrap();

        let result = account.raise(&AccountEvent::Withdrawn { amount: 1_000 }, EventMetadata::new("corr-1"));
        assert!(result.is_err());
        assert_eq!(account.version(), Version::new(1));
        assert_eq!(account.uncommitted_events().len(), 1);
        assert_eq!(account.state().balance, 0);
    }

    #[test]
    fn mark_committed_clears_buffer_but_not_version() {
        let mut account = new_account("A1");
        account
            .raise(
                &AccountEvent::Opened {
                    owner: "x".to_string(),
                },
                EventMetadata::new("corr-1"),
            )
            .unwrap();
        account.mark_committed();

        assert!(account.uncommitted_events().is_empty());
        assert_eq!(account.version(), Version::new(1));
    }

    #[test]
    fn load_from_history_sets_version_from_stored_events_without_touching_buffer() {
        let mut source = new_account("A1");
        source
            .raise(
                &AccountEvent::Opened {
                    owner: "x".to_string(),
                },
                EventMetadata::new("corr-1"),
            )
            .unwrap();
        source
            .raise(&AccountEvent::Deposited { amount: 100 }, EventMetadata::new("corr-1"))
            .unwrap();

        let history: Vec<StoredEvent> = source
            .uncommitted_events()
            .iter()
            .enumerate()
            .map(|(i, e)| StoredEvent {
                event: e.clone(),
                version: Version::new(i as u64 + 1),
                position: crate::position::GlobalPosition::new(i as u64 + 1),
                aggregate_type: "Account".to_string(),
                created_at: Utc::now(),
            })
            .collect();

        let mut replayed = new_account("A1");
        replayed.load_from_history(history).unwrap();

        assert_eq!(replayed.version(), Version::new(2));
        assert!(replayed.uncommitted_events().is_empty());
        assert_eq!(replayed.state(), source.state());
    }

    #[test]
    fn set_version_overrides_for_snapshot_seeding() {
        let mut account = new_account("A1");
        account.set_version(Version::new(20));
        assert_eq!(account.version(), Version::new(20));
    }
}
