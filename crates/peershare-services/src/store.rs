//! Registry store: who shares what, and which control connection belongs to
//! whom.
//!
//! Two independent tables, both `Arc<DashMap>` so every clone handed to a
//! connection task sees the same state. Each mutation holds the per-key entry
//! lock for its whole read-modify-write, so concurrent connections never
//! observe a half-applied union or difference.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use peershare_core::UserIdentity;

/// Identifies one live control connection. Assigned at accept time.
pub type SessionId = u64;

/// Hands out process-unique session ids.
#[derive(Debug, Clone, Default)]
pub struct SessionIdAllocator(Arc<AtomicU64>);

impl SessionIdAllocator {
    pub fn next(&self) -> SessionId {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ── File table ────────────────────────────────────────────────────────────────

/// identity → set of shared file paths.
#[derive(Clone, Default)]
pub struct FileStore {
    files: Arc<DashMap<UserIdentity, HashSet<String>>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered identities, sorted for stable listings.
    pub fn keys(&self) -> Vec<UserIdentity> {
        let mut keys: Vec<_> = self.files.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, user: &UserIdentity) -> bool {
        self.files.contains_key(user)
    }

    /// Every entry with its files, sorted by identity. Each entry is read
    /// under its own lock, so a line never mixes two states of one user.
    pub fn snapshot(&self) -> Vec<(UserIdentity, HashSet<String>)> {
        let mut entries: Vec<_> = self
            .files
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Files shared by `user`; empty for unknown users.
    pub fn get(&self, user: &UserIdentity) -> HashSet<String> {
        self.files
            .get(user)
            .map(|files| files.clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, user: &UserIdentity) -> Option<HashSet<String>> {
        self.files.remove(user).map(|(_, files)| files)
    }

    /// Create the entry if absent, then union in `files`.
    pub fn add_values<I>(&self, user: &UserIdentity, files: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.files.entry(user.clone()).or_default().extend(files);
    }

    /// Set difference. No-op for unknown users; never removes the entry.
    pub fn remove_values<'a, I>(&self, user: &UserIdentity, files: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        if let Some(mut entry) = self.files.get_mut(user) {
            for file in files {
                entry.remove(file);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ── Session table ─────────────────────────────────────────────────────────────

/// Why a session could not be bound to an identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("this session is already registered as {0}")]
    SessionBound(UserIdentity),

    #[error("{0} is already registered from another session")]
    IdentityBound(UserIdentity),
}

/// session → identity, plus the reverse index used to claim an identity for
/// exactly one live session.
#[derive(Clone, Default)]
pub struct SessionTable {
    by_session: Arc<DashMap<SessionId, UserIdentity>>,
    owners: Arc<DashMap<UserIdentity, SessionId>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<SessionId> {
        let mut keys: Vec<_> = self.by_session.iter().map(|e| *e.key()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn get(&self, session: SessionId) -> Option<UserIdentity> {
        self.by_session.get(&session).map(|user| user.clone())
    }

    /// Bind `session` to `user`. Idempotent for an existing identical binding.
    ///
    /// The identity claim goes through `DashMap::entry`, so two sessions racing
    /// for the same identity cannot both succeed.
    pub fn add_values(&self, session: SessionId, user: &UserIdentity) -> Result<(), BindError> {
        if let Some(current) = self.by_session.get(&session) {
            if *current != *user {
                return Err(BindError::SessionBound(current.clone()));
            }
        }
        match self.owners.entry(user.clone()) {
            Entry::Occupied(owner) if *owner.get() != session => {
                Err(BindError::IdentityBound(user.clone()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(session);
                self.by_session.insert(session, user.clone());
                Ok(())
            }
        }
    }

    /// Drop the binding for `session`, returning the identity it held.
    pub fn remove(&self, session: SessionId) -> Option<UserIdentity> {
        self.remove_with(session, |_| {})
    }

    /// Drop the binding for `session`, running `cleanup` while the identity
    /// is still claimed. A `register` of the same identity from another
    /// session cannot land until `cleanup` has finished.
    ///
    /// `cleanup` must not touch this table.
    pub fn remove_with<F>(&self, session: SessionId, cleanup: F) -> Option<UserIdentity>
    where
        F: FnOnce(&UserIdentity),
    {
        let user = self.by_session.get(&session)?.clone();
        if let Entry::Occupied(owner) = self.owners.entry(user.clone()) {
            if *owner.get() == session {
                cleanup(&user);
                owner.remove();
            }
        }
        self.by_session.remove(&session);
        Some(user)
    }

    pub fn len(&self) -> usize {
        self.by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_session.is_empty()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Both tables together. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Registry {
    pub files: FileStore,
    pub sessions: SessionTable,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }
}
