//! Columnar entity storage and indexed edge list.
//!
//! Entities get a dense internal index in insertion order. Every index is a
//! `RoaringBitmap` over those internal indexes, so ascending bitmap iteration
//! is insertion order.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::interner::StrId;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EntityStore {
    /// internal index -> external id
    external: Vec<StrId>,
    /// internal index -> type
    types: Vec<StrId>,
    /// internal index -> (attr name, attr value)
    attrs: Vec<Vec<(StrId, StrId)>>,
    by_external: HashMap<StrId, u32>,
    type_index: HashMap<StrId, RoaringBitmap>,
    /// root id -> member entities
    root_index: HashMap<StrId, RoaringBitmap>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_empty()
    }

    /// Returns `None` when `external` is already stored.
    pub fn add(&mut self, external: StrId, type_id: StrId, attrs: Vec<(StrId, StrId)>) -> Option<u32> {
        if self.by_external.contains_key(&external) {
            return None;
        }
        let index = self.external.len() as u32;
        self.external.push(external);
        self.types.push(type_id);
        self.attrs.push(attrs);
        self.by_external.insert(external, index);
        self.type_index.entry(type_id).or_default().insert(index);
        Some(index)
    }

    pub fn add_to_root(&mut self, root: StrId, index: u32) {
        self.root_index.entry(root).or_default().insert(index);
    }

    pub fn index_of(&self, external: StrId) -> Option<u32> {
        self.by_external.get(&external).copied()
    }

    pub fn external_id(&self, index: u32) -> Option<StrId> {
        self.external.get(index as usize).copied()
    }

    pub fn type_of(&self, index: u32) -> Option<StrId> {
        self.types.get(index as usize).copied()
    }

    pub fn attrs(&self, index: u32) -> &[(StrId, StrId)] {
        self.attrs.get(index as usize).map_or(&[], Vec::as_slice)
    }

    pub fn by_type(&self, type_id: StrId) -> Option<&RoaringBitmap> {
        self.type_index.get(&type_id)
    }

    /// Union of the members of every listed root.
    pub fn in_roots(&self, roots: impl IntoIterator<Item = StrId>) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for root in roots {
            if let Some(members) = self.root_index.get(&root) {
                out |= members;
            }
        }
        out
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub rel_type: StrId,
    pub source: u32,
    pub target: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RelationStore {
    relations: Vec<Relation>,
    /// source -> relation ids, insertion order
    forward: HashMap<u32, Vec<u32>>,
    /// target -> relation ids, insertion order
    backward: HashMap<u32, Vec<u32>>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn add(&mut self, rel: Relation) -> u32 {
        let id = self.relations.len() as u32;
        self.forward.entry(rel.source).or_default().push(id);
        self.backward.entry(rel.target).or_default().push(id);
        self.relations.push(rel);
        id
    }

    pub fn outgoing(&self, source: u32) -> impl Iterator<Item = &Relation> + '_ {
        self.resolve(self.forward.get(&source))
    }

    pub fn incoming(&self, target: u32) -> impl Iterator<Item = &Relation> + '_ {
        self.resolve(self.backward.get(&target))
    }

    fn resolve<'a>(&'a self, ids: Option<&'a Vec<u32>>) -> impl Iterator<Item = &'a Relation> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(|&id| self.relations.get(id as usize))
    }
}
