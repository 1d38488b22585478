//! Record of every backend call a [`MemoryGraph`](crate::MemoryGraph) served.

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    SeedProbe {
        entity_id: String,
    },
    Scan {
        entity_type: String,
        limit: usize,
        cursor: Option<String>,
    },
    Neighbors {
        entity_id: String,
        limit: usize,
        cursor: Option<String>,
    },
    Headers {
        count: usize,
    },
}

#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<BackendCall>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    pub fn snapshot(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Requested limit of every `scan_type` call, in order.
    pub fn scan_limits(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Scan { limit, .. } => Some(*limit),
                _ => None,
            })
            .collect()
    }

    /// `(source id, requested limit)` of every `neighbors` call, in order.
    pub fn neighbor_limits(&self) -> Vec<(String, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Neighbors {
                    entity_id, limit, ..
                } => Some((entity_id.clone(), *limit)),
                _ => None,
            })
            .collect()
    }

    pub fn header_batches(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Headers { count } => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn seed_probes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, BackendCall::SeedProbe { .. }))
            .count()
    }
}
