//! Pending verification codes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// A code issued to one phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEntry {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Keyed by phone number; at most one entry per number.
///
/// Implementations must make `replace` and `remove_if_current` atomic per key
/// so a code can be consumed at most once under concurrent logins.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Store `entry`, returning the entry it superseded.
    async fn replace(&self, phone: &str, entry: VerificationEntry) -> Option<VerificationEntry>;

    async fn get(&self, phone: &str) -> Option<VerificationEntry>;

    /// Delete the entry only if it is still `expected`. Returns whether it was deleted.
    async fn remove_if_current(&self, phone: &str, expected: &VerificationEntry) -> bool;

    /// Drop every entry that expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryVerificationStore {
    entries: DashMap<String, VerificationEntry>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn replace(&self, phone: &str, entry: VerificationEntry) -> Option<VerificationEntry> {
        self.entries.insert(phone.to_string(), entry)
    }

    async fn get(&self, phone: &str) -> Option<VerificationEntry> {
        self.entries.get(phone).map(|entry| entry.value().clone())
    }

    async fn remove_if_current(&self, phone: &str, expected: &VerificationEntry) -> bool {
        self.entries
            .remove_if(phone, |_, current| current == expected)
            .is_some()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}
