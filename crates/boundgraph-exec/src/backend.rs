//! The storage interface the executor drives.
//!
//! Implementations own storage, sharding, network access and retries. The
//! executor treats every call as expensive and paginated: it never asks for
//! more than it can afford, never retries, and never writes.
//!
//! Shard accounting comes in two styles. A backend either reports the ids of
//! the shards a call touched (`shards_touched_ids`, counted distinctly across
//! the whole execution) or only a scalar count (`shards_touched`, summed).
//! When `shards_touched_ids` is `Some`, the scalar is ignored.

use anyhow::Result;
use boundgraph_ir::Direction;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Header fields of one entity (`id`, `type`, `name`, attributes...).
pub type EntityHeader = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub entity_ids: Vec<String>,
    pub next_cursor: Option<String>,
    pub shards_touched: u64,
    pub shards_touched_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }

    /// The endpoint that is not `from`. For a self loop that is `from` itself.
    pub fn other_end(&self, from: &str) -> &str {
        if self.source_id == from {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborPage {
    pub edges: Vec<Edge>,
    pub next_cursor: Option<String>,
    pub shards_touched: u64,
    pub shards_touched_ids: Option<Vec<String>>,
}

pub trait GraphBackend {
    fn seed_exists(&self, entity_id: &str) -> Result<bool>;

    /// One page of entities of `entity_type`, at most `limit` ids.
    ///
    /// `scope` is a non-empty list of root ids when the query is anchored.
    fn scan_type(
        &self,
        entity_type: &str,
        scope: Option<&[String]>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScanPage>;

    /// One page of edges incident to `entity_id`, at most `limit` edges.
    fn neighbors(
        &self,
        entity_id: &str,
        relationship_types: Option<&[String]>,
        direction: Direction,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<NeighborPage>;

    /// Headers for a batch of ids. Ids the backend cannot resolve may be omitted.
    fn get_entity_headers(&self, entity_ids: &[String]) -> Result<HashMap<String, EntityHeader>>;
}

macro_rules! forward_backend {
    ($($ptr:ty),*) => {$(
        impl<B: GraphBackend + ?Sized> GraphBackend for $ptr {
            fn seed_exists(&self, entity_id: &str) -> Result<bool> {
                (**self).seed_exists(entity_id)
            }

            fn scan_type(
                &self,
                entity_type: &str,
                scope: Option<&[String]>,
                limit: usize,
                cursor: Option<&str>,
            ) -> Result<ScanPage> {
                (**self).scan_type(entity_type, scope, limit, cursor)
            }

            fn neighbors(
                &self,
                entity_id: &str,
                relationship_types: Option<&[String]>,
                direction: Direction,
                limit: usize,
                cursor: Option<&str>,
            ) -> Result<NeighborPage> {
                (**self).neighbors(entity_id, relationship_types, direction, limit, cursor)
            }

            fn get_entity_headers(
                &self,
                entity_ids: &[String],
            ) -> Result<HashMap<String, EntityHeader>> {
                (**self).get_entity_headers(entity_ids)
            }
        }
    )*};
}

forward_backend!(&B, Box<B>, Arc<B>);
