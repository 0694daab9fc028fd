//! Tracked symbol set
//!
//! Insertion-ordered set of uppercase symbol identifiers. Membership is
//! case-insensitive; mutation happens only through the scheduler's validated
//! add/remove paths.

use parking_lot::RwLock;

/// Shared, insertion-ordered set of tracked symbols
#[derive(Debug, Default)]
pub struct SymbolSet {
    inner: RwLock<Vec<String>>,
}

impl SymbolSet {
    /// Build from an initial list; entries are uppercased, trimmed and
    /// deduplicated while preserving first-seen order.
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        let set = Self::default();
        for symbol in initial {
            set.add(&symbol);
        }
        set
    }

    /// Normalized form used for storage and comparison
    pub fn normalize(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        let normalized = Self::normalize(symbol);
        self.inner.read().iter().any(|s| *s == normalized)
    }

    /// Append if not already present; returns false for duplicates
    pub fn add(&self, symbol: &str) -> bool {
        let normalized = Self::normalize(symbol);
        if normalized.is_empty() {
            return false;
        }
        let mut inner = self.inner.write();
        if inner.iter().any(|s| *s == normalized) {
            return false;
        }
        inner.push(normalized);
        true
    }

    /// Remove if present; returns false when the symbol was not tracked
    pub fn remove(&self, symbol: &str) -> bool {
        let normalized = Self::normalize(symbol);
        let mut inner = self.inner.write();
        match inner.iter().position(|s| *s == normalized) {
            Some(idx) => {
                inner.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the tracked symbols in insertion order
    pub fn list(&self) -> Vec<String> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
