//! In-memory outbox and inbox stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shopfront_core::error::DomainError;
use shopfront_core::repository::{
    InboxRow, InboxStore, OutboxRow, OutboxStore, OutboxTransaction,
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct OutboxState {
    rows: Mutex<Vec<OutboxRow>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_updates: AtomicBool,
    fail_begin: AtomicBool,
}

impl OutboxState {
    fn upsert(&self, row: &OutboxRow) {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
    }

    fn write(&self, row: &OutboxRow) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows
            .iter_mut()
            .find(|existing| existing.id == row.id)
            .ok_or_else(|| DomainError::NotFound(format!("outbox row {}", row.id)))?;
        *existing = row.clone();
        Ok(())
    }
}

/// An outbox store backed by a `Vec`.
///
/// Transactions stage their writes and apply them only on commit, so a
/// dropped transaction leaves the store untouched.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutboxStore {
    state: Arc<OutboxState>,
}

impl InMemoryOutboxStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, rows: impl IntoIterator<Item = OutboxRow>) {
        for row in rows {
            self.state.upsert(&row);
        }
    }

    /// Returns a snapshot of every row in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn rows(&self) -> Vec<OutboxRow> {
        self.state.rows.lock().unwrap().clone()
    }

    /// Returns the row with `id`, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn row(&self, id: Uuid) -> Option<OutboxRow> {
        self.rows().into_iter().find(|row| row.id == id)
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    /// Number of explicitly rolled back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    /// Makes every non-transactional `update` fail.
    pub fn fail_updates(&self) {
        self.state.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Makes every `begin` fail.
    pub fn fail_begin(&self) {
        self.state.fail_begin.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn pending(&self) -> Result<Vec<OutboxRow>, DomainError> {
        let mut pending: Vec<_> = self.rows().into_iter().filter(|row| !row.processed).collect();
        pending.sort_by_key(|row| row.occurred_at_utc);
        Ok(pending)
    }

    async fn pending_count(&self) -> Result<u64, DomainError> {
        Ok(self.rows().iter().filter(|row| !row.processed).count() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>, DomainError> {
        if self.state.fail_begin.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        Ok(Box::new(InMemoryOutboxTransaction {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }

    async fn update(&self, row: &OutboxRow) -> Result<(), DomainError> {
        if self.state.fail_updates.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        self.state.write(row)
    }
}

#[derive(Debug)]
enum Staged {
    Insert(OutboxRow),
    Update(OutboxRow),
}

struct InMemoryOutboxTransaction {
    state: Arc<OutboxState>,
    staged: Vec<Staged>,
}

#[async_trait]
impl OutboxTransaction for InMemoryOutboxTransaction {
    async fn insert(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        self.staged.push(Staged::Insert(row.clone()));
        Ok(())
    }

    async fn update(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        self.staged.push(Staged::Update(row.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        for write in &self.staged {
            match write {
                Staged::Insert(row) => self.state.upsert(row),
                Staged::Update(row) => self.state.write(row)?,
            }
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An inbox store backed by a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInboxStore {
    rows: Arc<Mutex<Vec<InboxRow>>>,
    fail_deletes: Arc<Mutex<Vec<Uuid>>>,
}

impl InMemoryInboxStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, rows: impl IntoIterator<Item = InboxRow>) {
        self.rows.lock().unwrap().extend(rows);
    }

    /// Returns a snapshot of every row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn rows(&self) -> Vec<InboxRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Returns the ids of every row.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.rows().iter().map(|row| row.id).collect()
    }

    /// Makes deleting `id` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_delete_of(&self, id: Uuid) {
        self.fail_deletes.lock().unwrap().push(id);
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn insert(&self, row: &InboxRow) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().unwrap();
        if !rows.iter().any(|existing| existing.id == row.id) {
            rows.push(row.clone());
        }
        Ok(())
    }

    async fn oldest_pending(&self, limit: usize) -> Result<Vec<InboxRow>, DomainError> {
        let mut rows = self.rows();
        rows.sort_by_key(|row| row.timestamp);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        if self.fail_deletes.lock().unwrap().contains(&id) {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        self.rows.lock().unwrap().retain(|row| row.id != id);
        Ok(())
    }
}

/// An inbox store whose every operation fails.
#[derive(Debug)]
pub struct FailingInboxStore;

#[async_trait]
impl InboxStore for FailingInboxStore {
    async fn insert(&self, _row: &InboxRow) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn oldest_pending(&self, _limit: usize) -> Result<Vec<InboxRow>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn delete(&self, _id: Uuid) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
