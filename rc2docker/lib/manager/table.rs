use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::models::{ContainerDetails, ContainerKind, ContainerRecord, ContainerState};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const CHANGE_CHANNEL_CAPACITY: usize = 64;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A state change of one container, published by the [`ContainerTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerChange {
    /// The container that changed.
    pub kind: ContainerKind,

    /// Its state before the change.
    pub old_state: ContainerState,

    /// Its state after the change.
    pub new_state: ContainerState,
}

/// The manager's containers, at most one per kind.
///
/// Cloning shares the table. Only the manager mutates it, always by merging so that records stay
/// the same objects across refreshes.
#[derive(Debug, Clone)]
pub struct ContainerTable {
    inner: Arc<TableInner>,
}

#[derive(Debug)]
struct TableInner {
    records: RwLock<Vec<Arc<ContainerRecord>>>,
    changes: broadcast::Sender<ContainerChange>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TableInner {
                records: RwLock::new(Vec::new()),
                changes,
            }),
        }
    }

    /// The current records, ordered by kind.
    pub fn snapshot(&self) -> Vec<Arc<ContainerRecord>> {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The record for `kind`.
    pub fn get(&self, kind: ContainerKind) -> Option<Arc<ContainerRecord>> {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|record| record.kind() == kind)
            .cloned()
    }

    /// Subscribes to container state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ContainerChange> {
        self.inner.changes.subscribe()
    }

    /// Merges a fresh listing into the table. See [`merge_containers`].
    pub(crate) fn merge(&self, fresh: Vec<ContainerRecord>) -> Vec<ContainerChange> {
        let changes = {
            let mut records = self
                .inner
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let (merged, changes) = merge_containers(fresh, &records);
            *records = merged;
            changes
        };

        self.publish(&changes);
        changes
    }

    /// Merges a single record, leaving the other kinds alone.
    pub(crate) fn upsert(&self, record: ContainerRecord) -> Option<ContainerChange> {
        let change = {
            let mut records = self
                .inner
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let kind = record.kind();
            match records.iter().find(|r| r.kind() == kind) {
                Some(existing) => existing.update_from(&record).map(|old_state| ContainerChange {
                    kind,
                    old_state,
                    new_state: existing.state(),
                }),
                None => {
                    let change = inserted_change(&record);
                    records.push(Arc::new(record));
                    records.sort_by_key(|r| r.kind());
                    change
                }
            }
        };

        self.publish(change.as_slice());
        change
    }

    /// Sets the state of the `kind` record.
    pub(crate) fn set_state(
        &self,
        kind: ContainerKind,
        state: ContainerState,
    ) -> Option<ContainerChange> {
        let record = self.get(kind)?;
        let change = record.set_state(state).map(|old_state| ContainerChange {
            kind,
            old_state,
            new_state: state,
        });

        if state == ContainerState::NotAvailable {
            record.set_details(ContainerDetails {
                name: kind.container_name(),
                ..Default::default()
            });
        }

        self.publish(change.as_slice());
        change
    }

    fn publish(&self, changes: &[ContainerChange]) {
        for change in changes {
            tracing::debug!(
                "{} changed from {} to {}",
                change.kind,
                change.old_state,
                change.new_state
            );
            // no subscribers is fine
            let _ = self.inner.changes.send(*change);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ContainerTable {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Merges a fresh listing into the previously known records, by kind.
///
/// - a kind in both keeps the old record object, updated in place with the fresh fields and
///   state, so existing holders and subscribers see the update;
/// - a kind only in `fresh` is inserted;
/// - a kind only in `old` is dropped, after its state is set to `NotAvailable` so subscribers
///   learn it is gone.
///
/// If `fresh` lists a kind twice, the first one wins. Returns the merged records ordered by kind
/// and the state changes the merge caused.
pub fn merge_containers(
    fresh: Vec<ContainerRecord>,
    old: &[Arc<ContainerRecord>],
) -> (Vec<Arc<ContainerRecord>>, Vec<ContainerChange>) {
    let mut merged: Vec<Arc<ContainerRecord>> = Vec::with_capacity(fresh.len());
    let mut changes = Vec::new();

    for record in fresh {
        let kind = record.kind();
        if merged.iter().any(|r| r.kind() == kind) {
            tracing::warn!("duplicate {kind} container {} ignored", record.name());
            continue;
        }

        match old.iter().find(|r| r.kind() == kind) {
            Some(existing) => {
                if let Some(old_state) = existing.update_from(&record) {
                    changes.push(ContainerChange {
                        kind,
                        old_state,
                        new_state: existing.state(),
                    });
                }
                merged.push(Arc::clone(existing));
            }
            None => {
                changes.extend(inserted_change(&record));
                merged.push(Arc::new(record));
            }
        }
    }

    for dropped in old.iter().filter(|r| !merged.iter().any(|m| m.kind() == r.kind())) {
        if let Some(old_state) = dropped.set_state(ContainerState::NotAvailable) {
            changes.push(ContainerChange {
                kind: dropped.kind(),
                old_state,
                new_state: ContainerState::NotAvailable,
            });
        }
    }

    merged.sort_by_key(|r| r.kind());
    (merged, changes)
}

fn inserted_change(record: &ContainerRecord) -> Option<ContainerChange> {
    let state = record.state();
    (state != ContainerState::NotAvailable).then_some(ContainerChange {
        kind: record.kind(),
        old_state: ContainerState::NotAvailable,
        new_state: state,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ContainerKind, id: &str, state: ContainerState) -> ContainerRecord {
        ContainerRecord::new(
            kind,
            ContainerDetails {
                id: id.into(),
                name: kind.container_name(),
                ..Default::default()
            },
            state,
        )
    }

    #[test]
    fn test_merge_preserves_identity() {
        let table = ContainerTable::new();
        table.merge(vec![
            record(ContainerKind::Database, "db1", ContainerState::Exited),
            record(ContainerKind::Compute, "c1", ContainerState::Exited),
        ]);
        let db = table.get(ContainerKind::Database).unwrap();
        let mut db_rx = db.subscribe();

        table.merge(vec![
            record(ContainerKind::Database, "db2", ContainerState::Running),
            record(ContainerKind::AppServer, "a1", ContainerState::Created),
        ]);

        let merged_db = table.get(ContainerKind::Database).unwrap();
        assert!(Arc::ptr_eq(&db, &merged_db));
        assert_eq!(db.state(), ContainerState::Running);
        assert_eq!(db.id(), "db2");
        assert!(db_rx.has_changed().unwrap());

        assert!(table.get(ContainerKind::AppServer).is_some());
        assert!(table.get(ContainerKind::Compute).is_none());
        assert_eq!(
            table
                .snapshot()
                .iter()
                .map(|r| r.kind())
                .collect::<Vec<_>>(),
            vec![ContainerKind::Database, ContainerKind::AppServer]
        );
    }

    #[test]
    fn test_merge_reports_changes() {
        let old = vec![
            Arc::new(record(ContainerKind::Database, "db", ContainerState::Running)),
            Arc::new(record(ContainerKind::Compute, "c", ContainerState::Running)),
        ];
        let (merged, changes) = merge_containers(
            vec![
                record(ContainerKind::Database, "db", ContainerState::Running),
                record(ContainerKind::AppServer, "a", ContainerState::Running),
            ],
            &old,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(old[1].state(), ContainerState::NotAvailable);
        assert_eq!(
            changes,
            vec![
                ContainerChange {
                    kind: ContainerKind::AppServer,
                    old_state: ContainerState::NotAvailable,
                    new_state: ContainerState::Running,
                },
                ContainerChange {
                    kind: ContainerKind::Compute,
                    old_state: ContainerState::Running,
                    new_state: ContainerState::NotAvailable,
                },
            ]
        );
    }

    #[test]
    fn test_merge_ignores_duplicate_kinds() {
        let (merged, _) = merge_containers(
            vec![
                record(ContainerKind::Compute, "first", ContainerState::Running),
                record(ContainerKind::Compute, "second", ContainerState::Exited),
            ],
            &[],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id(), "first");
    }

    #[tokio::test]
    async fn test_table_set_state_publishes() {
        let table = ContainerTable::new();
        table.upsert(record(ContainerKind::Compute, "c", ContainerState::Running));
        let mut changes = table.subscribe();

        assert!(table
            .set_state(ContainerKind::Compute, ContainerState::Running)
            .is_none());
        let change = table
            .set_state(ContainerKind::Compute, ContainerState::NotAvailable)
            .unwrap();
        assert_eq!(change.old_state, ContainerState::Running);
        assert_eq!(changes.recv().await.unwrap(), change);
        assert_eq!(table.get(ContainerKind::Compute).unwrap().id(), "");
        assert!(table
            .set_state(ContainerKind::Database, ContainerState::Running)
            .is_none());
    }
}
