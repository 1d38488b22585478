//! Boundgraph reference backend.
//!
//! `MemoryGraph` is an in-memory [`GraphBackend`] used to exercise the
//! executor end to end and to embed small graphs:
//!
//! 1. **String interning**: entity ids, types, relation types and attributes
//!    are stored once and referenced by `StrId`.
//! 2. **Bitmap indexes**: type and root membership are `RoaringBitmap`s over
//!    dense internal indexes, so scoped scans are bitmap intersections.
//! 3. **Edge list**: relations with forward/backward adjacency, filtered by
//!    relation type and direction at read time.
//! 4. **Content-addressed shards**: every entity maps to a logical shard via
//!    SHA-256 of its id; pages report the shards they touched.
//! 5. **Call log**: every served call is recorded, so tests can assert on
//!    what the executor actually asked for.
//! 6. **Snapshots**: `to_bytes`/`from_bytes` (magic `BGMG`, version 1,
//!    bincode payload) and `save`/`load`.
//!
//! Cursors are opaque `off:<n>` strings. The call log is not part of a
//! snapshot.

pub mod calls;
pub mod interner;
pub mod shard;
pub mod store;

use anyhow::{anyhow, bail, Context, Result};
use boundgraph_exec::{Direction, Edge, EntityHeader, GraphBackend, NeighborPage, ScanPage};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub use calls::{BackendCall, CallLog};
pub use interner::{StrId, StringInterner};
pub use shard::{shard_index, shard_name, GraphConfig, ShardReporting};
pub use store::{EntityStore, Relation, RelationStore};

const SNAPSHOT_MAGIC: &[u8; 4] = b"BGMG";
const SNAPSHOT_VERSION: u32 = 1;

pub struct MemoryGraph {
    config: GraphConfig,
    interner: StringInterner,
    entities: EntityStore,
    relations: RelationStore,
    calls: CallLog,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::from_parts(
            GraphConfig::default(),
            StringInterner::new(),
            EntityStore::new(),
            RelationStore::new(),
        )
    }

    pub fn with_config(config: GraphConfig) -> Result<Self> {
        if config.shard_count == 0 {
            bail!("shard_count must be >= 1");
        }
        Ok(Self::from_parts(
            config,
            StringInterner::new(),
            EntityStore::new(),
            RelationStore::new(),
        ))
    }

    fn from_parts(
        config: GraphConfig,
        interner: StringInterner,
        entities: EntityStore,
        relations: RelationStore,
    ) -> Self {
        Self {
            config,
            interner,
            entities,
            relations,
            calls: CallLog::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.index_of(entity_id).is_some()
    }

    /// Shard name `entity_id` is assigned to under this graph's configuration.
    pub fn shard_of(&self, entity_id: &str) -> String {
        shard_name(shard_index(entity_id, self.config.shard_count))
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Add an entity. A `name` attribute, when present, shows up in headers
    /// like any other attribute.
    pub fn add_entity<I, K, V>(&mut self, entity_id: &str, entity_type: &str, attrs: I) -> Result<u32>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if entity_id.is_empty() {
            bail!("entity id must be non-empty");
        }
        let external = self.interner.intern(entity_id);
        let type_id = self.interner.intern(entity_type);
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| {
                (
                    self.interner.intern(k.as_ref()),
                    self.interner.intern(v.as_ref()),
                )
            })
            .collect();
        self.entities
            .add(external, type_id, attrs)
            .ok_or_else(|| anyhow!("duplicate entity id `{entity_id}`"))
    }

    /// Register `entity_id` as a member of `root` (the unit scans are scoped by).
    pub fn add_to_root(&mut self, root: &str, entity_id: &str) -> Result<()> {
        let index = self.require(entity_id)?;
        let root = self.interner.intern(root);
        self.entities.add_to_root(root, index);
        Ok(())
    }

    pub fn add_relation(&mut self, source: &str, rel_type: &str, target: &str) -> Result<u32> {
        let source = self.require(source)?;
        let target = self.require(target)?;
        let rel_type = self.interner.intern(rel_type);
        Ok(self.relations.add(Relation {
            rel_type,
            source,
            target,
        }))
    }

    fn index_of(&self, entity_id: &str) -> Option<u32> {
        self.interner
            .id_of(entity_id)
            .and_then(|id| self.entities.index_of(id))
    }

    fn require(&self, entity_id: &str) -> Result<u32> {
        self.index_of(entity_id)
            .ok_or_else(|| anyhow!("unknown entity `{entity_id}`"))
    }

    fn external(&self, index: u32) -> Result<String> {
        self.entities
            .external_id(index)
            .and_then(|id| self.interner.resolve(id))
            .ok_or_else(|| anyhow!("dangling entity index {index}"))
    }

    fn candidates(&self, entity_type: &str, scope: Option<&[String]>) -> RoaringBitmap {
        let Some(by_type) = self
            .interner
            .id_of(entity_type)
            .and_then(|ty| self.entities.by_type(ty))
        else {
            return RoaringBitmap::new();
        };
        match scope.filter(|s| !s.is_empty()) {
            None => by_type.clone(),
            Some(roots) => {
                let members = self
                    .entities
                    .in_roots(roots.iter().filter_map(|r| self.interner.id_of(r)));
                by_type & &members
            }
        }
    }

    fn header(&self, index: u32, entity_id: &str) -> EntityHeader {
        let mut header = EntityHeader::new();
        for &(key, value) in self.entities.attrs(index) {
            if let (Some(k), Some(v)) = (self.interner.resolve(key), self.interner.resolve(value)) {
                header.insert(k, Value::String(v));
            }
        }
        header.insert("id".to_string(), Value::from(entity_id));
        if let Some(ty) = self
            .entities
            .type_of(index)
            .and_then(|t| self.interner.resolve(t))
        {
            header.insert("type".to_string(), Value::String(ty));
        }
        header
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&SnapshotRef {
            config: &self.config,
            strings: self.interner.strings(),
            entities: &self.entities,
            relations: &self.relations,
        })?;

        let mut out = Vec::with_capacity(payload.len() + 8);
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || &bytes[0..4] != SNAPSHOT_MAGIC {
            bail!("not a boundgraph snapshot");
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        if version != SNAPSHOT_VERSION {
            bail!("unsupported snapshot version: {version}");
        }
        let snapshot: Snapshot = bincode::deserialize(&bytes[8..])?;
        let graph = Self::from_parts(
            snapshot.config,
            StringInterner::from_strings(snapshot.strings),
            snapshot.entities,
            snapshot.relations,
        );
        if graph.config.shard_count == 0 {
            bail!("snapshot has shard_count 0");
        }
        Ok(graph)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            bytes = bytes.len(),
            entities = self.entity_count(),
            relations = self.relation_count(),
            "saved graph snapshot"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let graph = Self::from_bytes(&bytes)
            .with_context(|| format!("decoding snapshot {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            entities = graph.entity_count(),
            relations = graph.relation_count(),
            "loaded graph snapshot"
        );
        Ok(graph)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("config", &self.config)
            .field("entities", &self.entity_count())
            .field("relations", &self.relation_count())
            .finish()
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    config: &'a GraphConfig,
    strings: Vec<String>,
    entities: &'a EntityStore,
    relations: &'a RelationStore,
}

#[derive(Deserialize)]
struct Snapshot {
    config: GraphConfig,
    strings: Vec<String>,
    entities: EntityStore,
    relations: RelationStore,
}

// ============================================================================
// Backend
// ============================================================================

fn parse_cursor(cursor: Option<&str>) -> Result<usize> {
    let Some(cursor) = cursor else {
        return Ok(0);
    };
    cursor
        .strip_prefix("off:")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| anyhow!("malformed cursor `{cursor}`"))
}

fn next_cursor(end: usize, total: usize) -> Option<String> {
    (end < total).then(|| format!("off:{end}"))
}

impl GraphBackend for MemoryGraph {
    fn seed_exists(&self, entity_id: &str) -> Result<bool> {
        self.calls.record(BackendCall::SeedProbe {
            entity_id: entity_id.to_string(),
        });
        Ok(self.contains(entity_id))
    }

    fn scan_type(
        &self,
        entity_type: &str,
        scope: Option<&[String]>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScanPage> {
        self.calls.record(BackendCall::Scan {
            entity_type: entity_type.to_string(),
            limit,
            cursor: cursor.map(str::to_string),
        });
        let start = parse_cursor(cursor)?;
        let candidates = self.candidates(entity_type, scope);
        let total = candidates.len() as usize;

        let entity_ids = candidates
            .iter()
            .skip(start)
            .take(limit)
            .map(|index| self.external(index))
            .collect::<Result<Vec<_>>>()?;
        let end = start.saturating_add(entity_ids.len());
        let (shards_touched, shards_touched_ids) =
            shard::report(entity_ids.iter().map(String::as_str), &self.config);

        Ok(ScanPage {
            next_cursor: next_cursor(end, total),
            entity_ids,
            shards_touched,
            shards_touched_ids,
        })
    }

    fn neighbors(
        &self,
        entity_id: &str,
        relationship_types: Option<&[String]>,
        direction: Direction,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<NeighborPage> {
        self.calls.record(BackendCall::Neighbors {
            entity_id: entity_id.to_string(),
            limit,
            cursor: cursor.map(str::to_string),
        });
        let start = parse_cursor(cursor)?;
        let Some(source) = self.index_of(entity_id) else {
            return Ok(NeighborPage::default());
        };

        // An empty filter list behaves like no filter.
        let rel_types: Option<Vec<StrId>> = relationship_types
            .filter(|r| !r.is_empty())
            .map(|names| names.iter().filter_map(|n| self.interner.id_of(n)).collect());
        let wanted =
            |rel: &&Relation| rel_types.as_ref().map_or(true, |t| t.contains(&rel.rel_type));

        let mut all: Vec<&Relation> = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            all.extend(self.relations.outgoing(source).filter(wanted));
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            all.extend(self.relations.incoming(source).filter(wanted));
        }

        let edges = all
            .iter()
            .skip(start)
            .take(limit)
            .map(|rel| -> Result<Edge> {
                Ok(Edge::new(self.external(rel.source)?, self.external(rel.target)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let end = start.saturating_add(edges.len());

        let touched = std::iter::once(entity_id).chain(edges.iter().map(|e| e.other_end(entity_id)));
        let (shards_touched, shards_touched_ids) = shard::report(touched, &self.config);

        Ok(NeighborPage {
            next_cursor: next_cursor(end, all.len()),
            edges,
            shards_touched,
            shards_touched_ids,
        })
    }

    fn get_entity_headers(&self, entity_ids: &[String]) -> Result<HashMap<String, EntityHeader>> {
        self.calls.record(BackendCall::Headers {
            count: entity_ids.len(),
        });
        Ok(entity_ids
            .iter()
            .filter_map(|id| {
                self.index_of(id)
                    .map(|index| (id.clone(), self.header(index, id)))
            })
            .collect())
    }
}
