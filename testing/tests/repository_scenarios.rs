//! Scenario tests exercising `Repository` against the in-memory backends:
//! concurrency conflicts, snapshot-accelerated loads, and corrupt-snapshot
//! fallback to full replay.

#![allow(clippy::unwrap_used)]

use eventflow_core::aggregate::{Aggregate, AggregateError};
use eventflow_core::event::{Event, EventMetadata, SerializedEvent};
use eventflow_core::event_store::EventStore;
use eventflow_core::repository::{Repository, RepositoryError};
use eventflow_core::snapshot::{Snapshot, SnapshotStore};
use eventflow_core::snapshot_policy::FrequencyPolicy;
use eventflow_core::stream::{AggregateId, Version};
use eventflow_testing::{InMemoryEventStore, InMemorySnapshotStore};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::sync::Arc;

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

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct AccountState {
    owner: String,
    balance: i64,
    active: bool,
}

fn account_applier(state: &mut AccountState, event: &SerializedEvent) -> Result<(), AggregateError> {
    match event.event_type.as_str() {
        "Account.Opened.v1" => {
            if let AccountEvent::Opened { owner } = event.deserialize_payload().map_err(|e| AggregateError::SerializationFailed(e.to_string()))? {
                state.owner = owner;
                state.active = true;
            }
        }
        "Account.Deposited.v1" => {
            if let AccountEvent::Deposited { amount } = event.deserialize_payload().map_err(|e| AggregateError::SerializationFailed(e.to_string()))? {
                state.balance += amount;
            }
        }
        "Account.Withdrawn.v1" => {
            if let AccountEvent::Withdrawn { amount } = event.deserialize_payload().map_err(|e| AggregateError::SerializationFailed(e.to_string()))? {
                state.balance -= amount;
            }
        }
        _ => {}
    }
    Ok(())
}

type AccountApplier = fn(&mut AccountState, &SerializedEvent) -> Result<(), AggregateError>;
type AccountRepository = Repository<AccountState, AccountApplier>;

fn new_repository(event_store: Arc<dyn EventStore>) -> AccountRepository {
    Repository::new(event_store, "Account", account_applier as AccountApplier)
}

async fn open_and_save(repo: &AccountRepository, id: &str) {
    let mut account = repo.new_empty(AggregateId::new(id));
    account.raise(&AccountEvent::Opened { owner: "x".to_string() }, EventMetadata::new("corr")).unwrap();
    repo.save(&mut account).await.unwrap();
}

#[tokio::test]
async fn scenario_b_concurrency_conflict() {
    let event_store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let repo = new_repository(event_store);
    open_and_save(&repo, "A1").await;

    let mut copy1 = repo.get_by_id(AggregateId::new("A1")).await.unwrap();
    let mut copy2 = repo.get_by_id(AggregateId::new("A1")).await.unwrap();
    assert_eq!(copy1.version(), Version::new(1));

    copy1.raise(&AccountEvent::Deposited { amount: 10 }, EventMetadata::new("corr")).unwrap();
    repo.save(&mut copy1).await.unwrap();

    copy2.raise(&AccountEvent::Withdrawn { amount: 20 }, EventMetadata::new("corr")).unwrap();
    let result = repo.save(&mut copy2).await;

    assert!(matches!(result, Err(RepositoryError::Concurrency { .. })));

    let reloaded = repo.get_by_id(AggregateId::new("A1")).await.unwrap();
    assert_eq!(reloaded.version(), Version::new(2));
    assert_eq!(reloaded.state().balance, 10);
}

#[tokio::test]
async fn scenario_c_snapshot_acceleration() {
    let event_store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let snapshot_store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
    let policy = Arc::new(FrequencyPolicy::new(NonZeroU64::new(10).unwrap()));
    let repo = new_repository(event_store.clone()).with_snapshots(snapshot_store.clone(), policy);

    // Each command raises one event and saves immediately, the usual
    // command-handling cadence, so the policy sees every version in turn
    // rather than only the final one from a single large batch.
    let id = AggregateId::new("A1");
    let mut account = repo.new_empty(id.clone());
    account.raise(&AccountEvent::Opened { owner: "x".to_string() }, EventMetadata::new("corr")).unwrap();
    repo.save(&mut account).await.unwrap();
    for _ in 0..24 {
        account.raise(&AccountEvent::Deposited { amount: 1 }, EventMetadata::new("corr")).unwrap();
        repo.save(&mut account).await.unwrap();
    }
    assert_eq!(account.version(), Version::new(25));

    let snapshot = snapshot_store.get(id.clone()).await.unwrap().expect("snapshot should exist");
    assert_eq!(snapshot.version, Version::new(20));

    let loaded = repo.get_by_id(id).await.unwrap();
    assert_eq!(loaded.version(), Version::new(25));
    assert_eq!(loaded.state().balance, 24);
}

#[tokio::test]
async fn scenario_f_snapshot_corruption_fallback() {
    let event_store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let snapshot_store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
    let repo = new_repository(event_store.clone());

    let id = AggregateId::new("A1");
    let mut account = repo.new_empty(id.clone());
    account.raise(&AccountEvent::Opened { owner: "x".to_string() }, EventMetadata::new("corr")).unwrap();
    account.raise(&AccountEvent::Deposited { amount: 75 }, EventMetadata::new("corr")).unwrap();
    repo.save(&mut account).await.unwrap();

    let corrupt = Snapshot::new(id.clone(), "Account".to_string(), Version::new(2), vec![0xFF, 0xFE, 0xFD], None);
    snapshot_store.save(corrupt).await.unwrap();

    let repo_with_snapshots = new_repository(event_store).with_snapshots(snapshot_store, Arc::new(FrequencyPolicy::new(NonZeroU64::new(10).unwrap())));
    let loaded = repo_with_snapshots.get_by_id(id).await.unwrap();

    assert_eq!(loaded.version(), Version::new(2));
    assert_eq!(loaded.state().balance, 75);
}
