//! Scripted in-memory backend for executor tests.
//!
//! Cursors are plain offsets and every id lives in the shard named after its
//! first character. The call log records what the executor asked for.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use boundgraph_exec::{Direction, Edge, EntityHeader, GraphBackend, NeighborPage, ScanPage};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Seed(String),
    Scan { limit: usize, cursor: Option<String> },
    Neighbors { source: String, limit: usize },
    Headers(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shards {
    #[default]
    Ids,
    Count,
    None,
}

#[derive(Default)]
pub struct StubGraph {
    nodes: Vec<(String, String)>,
    edges: Vec<(String, String, String)>,
    pub hidden_headers: HashSet<String>,
    pub repeat_scan_cursor: bool,
    pub repeat_neighbor_cursor: bool,
    pub fail_headers: bool,
    pub delay: Option<Duration>,
    pub shards: Shards,
    log: RefCell<Vec<Call>>,
}

impl StubGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: &str, ty: &str) -> Self {
        self.nodes.push((id.to_string(), ty.to_string()));
        self
    }

    pub fn nodes<I, S>(mut self, ty: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.nodes.push((id.as_ref().to_string(), ty.to_string()));
        }
        self
    }

    pub fn edge(mut self, src: &str, rel: &str, dst: &str) -> Self {
        self.edges
            .push((src.to_string(), rel.to_string(), dst.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn scan_limits(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Scan { limit, .. } => Some(limit),
                _ => None,
            })
            .collect()
    }

    pub fn neighbor_limits(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Neighbors { source, limit } => Some((source, limit)),
                _ => None,
            })
            .collect()
    }

    pub fn header_batches(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Headers(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        self.log.borrow_mut().push(call);
    }

    fn type_of(&self, id: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(n, _)| n == id)
            .map(|(_, t)| t.as_str())
    }

    fn shard_report(&self, ids: &[&str]) -> (u64, Option<Vec<String>>) {
        let mut shards: Vec<String> = ids
            .iter()
            .map(|id| format!("shard-{}", id.chars().next().unwrap_or('_')))
            .collect();
        shards.sort();
        shards.dedup();
        match self.shards {
            Shards::Ids => (shards.len() as u64, Some(shards)),
            Shards::Count => (shards.len() as u64, None),
            Shards::None => (0, None),
        }
    }
}

fn offset(cursor: Option<&str>) -> Result<usize> {
    match cursor {
        None => Ok(0),
        Some(c) => c
            .parse::<usize>()
            .map_err(|e| anyhow!("bad cursor {c:?}: {e}")),
    }
}

impl GraphBackend for StubGraph {
    fn seed_exists(&self, entity_id: &str) -> Result<bool> {
        self.record(Call::Seed(entity_id.to_string()));
        Ok(self.type_of(entity_id).is_some())
    }

    fn scan_type(
        &self,
        entity_type: &str,
        _scope: Option<&[String]>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScanPage> {
        self.record(Call::Scan {
            limit,
            cursor: cursor.map(str::to_string),
        });
        let all: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, t)| t == entity_type)
            .map(|(id, _)| id.as_str())
            .collect();

        if self.repeat_scan_cursor {
            let page: Vec<&str> = all.iter().take(limit.min(1)).copied().collect();
            let (count, ids) = self.shard_report(&page);
            return Ok(ScanPage {
                entity_ids: page.iter().map(|s| s.to_string()).collect(),
                next_cursor: Some("again".to_string()),
                shards_touched: count,
                shards_touched_ids: ids,
            });
        }

        let start = offset(cursor)?;
        let page: Vec<&str> = all.iter().skip(start).take(limit).copied().collect();
        let end = start + page.len();
        let (count, ids) = self.shard_report(&page);
        Ok(ScanPage {
            entity_ids: page.iter().map(|s| s.to_string()).collect(),
            next_cursor: (end < all.len()).then(|| end.to_string()),
            shards_touched: count,
            shards_touched_ids: ids,
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
        self.record(Call::Neighbors {
            source: entity_id.to_string(),
            limit,
        });
        let rel_ok = |rel: &str| relationship_types.map_or(true, |rs| rs.iter().any(|r| r == rel));
        let mut all: Vec<Edge> = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            for (s, r, d) in &self.edges {
                if s == entity_id && rel_ok(r.as_str()) {
                    all.push(Edge::new(s.as_str(), d.as_str()));
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            for (s, r, d) in &self.edges {
                if d == entity_id && rel_ok(r.as_str()) {
                    all.push(Edge::new(s.as_str(), d.as_str()));
                }
            }
        }

        if self.repeat_neighbor_cursor {
            let page: Vec<Edge> = all.into_iter().take(limit.min(1)).collect();
            return Ok(NeighborPage {
                edges: page,
                next_cursor: Some("again".to_string()),
                shards_touched: 1,
                shards_touched_ids: None,
            });
        }

        let start = offset(cursor)?;
        let page: Vec<Edge> = all.iter().skip(start).take(limit).cloned().collect();
        let end = start + page.len();
        let touched: Vec<&str> = page.iter().map(|e| e.other_end(entity_id)).collect();
        let (count, ids) = self.shard_report(&touched);
        Ok(NeighborPage {
            next_cursor: (end < all.len()).then(|| end.to_string()),
            edges: page,
            shards_touched: count,
            shards_touched_ids: ids,
        })
    }

    fn get_entity_headers(&self, entity_ids: &[String]) -> Result<HashMap<String, EntityHeader>> {
        self.record(Call::Headers(entity_ids.len()));
        if self.fail_headers {
            return Err(anyhow!("header store unavailable"));
        }
        let mut out = HashMap::new();
        for id in entity_ids {
            if self.hidden_headers.contains(id) {
                continue;
            }
            let Some(ty) = self.type_of(id) else {
                continue;
            };
            let mut header = EntityHeader::new();
            header.insert("id".to_string(), Value::from(id.as_str()));
            header.insert("type".to_string(), Value::from(ty));
            header.insert("name".to_string(), Value::from(format!("N-{id}")));
            out.insert(id.clone(), header);
        }
        Ok(out)
    }
}

/// `n` ids of the form `<prefix>0`, `<prefix>1`, ...
pub fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}
