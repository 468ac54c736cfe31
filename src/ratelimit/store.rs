//! In-memory store of per-identity window state.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::window::WindowState;

/// Process-wide mapping from identity key to window state.
///
/// All access goes through this type. Per-key read-modify-write sequences run
/// under the owning shard's lock, so concurrent callers sharing an identity
/// never observe or overwrite each other's intermediate state.
#[derive(Debug, Default)]
pub struct LimiterStore {
    windows: DashMap<String, WindowState>,
}

impl LimiterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the state for `key`.
    pub fn get(&self, key: &str) -> Option<WindowState> {
        self.windows.get(key).map(|state| *state)
    }

    /// Insert or replace the state for `key`.
    pub fn set(&self, key: &str, state: WindowState) {
        self.windows.insert(key.to_string(), state);
    }

    /// Remove the state for `key`, returning it if present.
    pub fn delete(&self, key: &str) -> Option<WindowState> {
        self.windows.remove(key).map(|(_, state)| state)
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<(String, WindowState)> {
        self.windows
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Atomically read and rewrite the slot for `key`.
    ///
    /// `f` receives the current state (or `None`) and may replace it, clear
    /// it, or leave it alone. The key stays locked until `f` returns.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Option<WindowState>) -> R) -> R {
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(*occupied.get());
                let result = f(&mut slot);
                match slot {
                    Some(state) => *occupied.get_mut() = state,
                    None => {
                        occupied.remove();
                    }
                }
                result
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(state) = slot {
                    vacant.insert(state);
                }
                result
            }
        }
    }

    /// Remove `key` only if `predicate` holds for its current state.
    ///
    /// The check and the removal happen under the same lock.
    pub fn remove_if(&self, key: &str, predicate: impl FnOnce(&WindowState) -> bool) -> bool {
        self.windows
            .remove_if(key, |_, state| predicate(state))
            .is_some()
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no identity is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.windows.clear();
    }
}
