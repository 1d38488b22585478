//! String interning for entity ids, type names, relation types and attributes.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Interned string handle (4 bytes instead of a heap `String`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Concurrent string <-> id table. Ids are dense and assigned in first-seen
/// order, so replaying [`StringInterner::strings`] reproduces the same ids.
pub struct StringInterner {
    forward: DashMap<String, StrId>,
    reverse: DashMap<StrId, String>,
    next: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    pub fn intern(&self, s: &str) -> StrId {
        if let Some(id) = self.forward.get(s) {
            return *id;
        }
        *self.forward.entry(s.to_string()).or_insert_with(|| {
            let id = StrId(self.next.fetch_add(1, Ordering::SeqCst));
            self.reverse.insert(id, s.to_string());
            id
        })
    }

    /// Existing id for `s`, without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.forward.get(s).map(|id| *id)
    }

    pub fn resolve(&self, id: StrId) -> Option<String> {
        self.reverse.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.next.load(Ordering::SeqCst) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All strings in id order.
    pub fn strings(&self) -> Vec<String> {
        (0..self.next.load(Ordering::SeqCst))
            .filter_map(|i| self.resolve(StrId(i)))
            .collect()
    }

    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let interner = Self::new();
        for s in strings {
            interner.intern(s.as_ref());
        }
        interner
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringInterner")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_dense() {
        let interner = StringInterner::new();
        let a = interner.intern("alice");
        let b = interner.intern("bob");
        assert_eq!(interner.intern("alice"), a);
        assert_eq!((a.raw(), b.raw()), (0, 1));
        assert_eq!(interner.resolve(b).as_deref(), Some("bob"));
        assert_eq!(interner.id_of("carol"), None);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn replaying_strings_reproduces_ids() {
        let interner = StringInterner::new();
        for s in ["x", "y", "x", "z"] {
            interner.intern(s);
        }
        let restored = StringInterner::from_strings(interner.strings());
        for s in ["x", "y", "z"] {
            assert_eq!(restored.id_of(s), interner.id_of(s));
        }
    }
}
