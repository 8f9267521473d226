use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::container::{IndexSpec, NodeSet, Properties, RelationshipSet, value_key};
use crate::domain::Identifier;
use crate::error::BiographError;
use crate::graph::{GraphStore, WriteStats};

/// Write observed by a [`MemoryGraph`], in call order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphOp {
    CreateIndex { index: String },
    CreateNodes { label: String, records: usize },
    CreateRelationships { rel_type: String, records: usize },
}

#[derive(Debug, Default)]
struct MemoryState {
    indexes: BTreeSet<IndexSpec>,
    nodes: Vec<(Identifier, Properties)>,
    merge_index: HashMap<(Identifier, Identifier, String), usize>,
    relationships: HashMap<(Identifier, usize, usize), Properties>,
    unmatched: usize,
    operations: Vec<GraphOp>,
}

impl MemoryState {
    fn find_node(&self, label: &Identifier, key: &Identifier, value: &str) -> Option<usize> {
        if let Some(index) = self
            .merge_index
            .get(&(label.clone(), key.clone(), value.to_string()))
        {
            return Some(*index);
        }
        self.nodes.iter().position(|(node_label, props)| {
            node_label == label
                && props
                    .get(key.as_str())
                    .map(|candidate| value_key(candidate) == value)
                    .unwrap_or(false)
        })
    }
}

/// In-process graph with the same upsert semantics as the Cypher statements.
///
/// Used for dry runs and as the store in tests.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<MemoryState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, BiographError> {
        self.state
            .lock()
            .map_err(|_| BiographError::GraphRejected("memory graph lock poisoned".to_string()))
    }

    pub fn operations(&self) -> Vec<GraphOp> {
        self.lock()
            .map(|state| state.operations.clone())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.lock().map(|state| state.nodes.len()).unwrap_or(0)
    }

    pub fn nodes_with_label(&self, label: &str) -> usize {
        self.lock()
            .map(|state| {
                state
                    .nodes
                    .iter()
                    .filter(|(node_label, _)| node_label.as_str() == label)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn relationship_count(&self) -> usize {
        self.lock()
            .map(|state| state.relationships.len())
            .unwrap_or(0)
    }

    pub fn index_count(&self) -> usize {
        self.lock().map(|state| state.indexes.len()).unwrap_or(0)
    }

    /// Relationship records skipped because an endpoint node did not exist.
    pub fn unmatched_relationships(&self) -> usize {
        self.lock().map(|state| state.unmatched).unwrap_or(0)
    }

    pub fn node(&self, label: &str, key: &str, value: &str) -> Option<Properties> {
        let label: Identifier = label.parse().ok()?;
        let key: Identifier = key.parse().ok()?;
        let state = self.lock().ok()?;
        let index = state.find_node(&label, &key, value)?;
        Some(state.nodes[index].1.clone())
    }
}

impl GraphStore for MemoryGraph {
    fn create_index(&self, index: &IndexSpec) -> Result<(), BiographError> {
        let mut state = self.lock()?;
        state.indexes.insert(index.clone());
        state.operations.push(GraphOp::CreateIndex {
            index: index.to_string(),
        });
        Ok(())
    }

    fn create_nodes(&self, set: &NodeSet) -> Result<WriteStats, BiographError> {
        let mut state = self.lock()?;
        let mut stats = WriteStats::default();
        for properties in set.nodes() {
            let key = set.key_of(properties).ok_or_else(|| {
                BiographError::GraphRejected(format!(
                    "node without merge key {} in {}",
                    set.merge_key(),
                    set.label()
                ))
            })?;
            let merge = (set.label().clone(), set.merge_key().clone(), key);
            match state.merge_index.get(&merge).copied() {
                Some(index) => {
                    let existing = &mut state.nodes[index].1;
                    for (name, value) in properties {
                        existing.insert(name.clone(), value.clone());
                    }
                }
                None => {
                    state.nodes.push((set.label().clone(), properties.clone()));
                    let index = state.nodes.len() - 1;
                    state.merge_index.insert(merge, index);
                    stats.created += 1;
                }
            }
            stats.records += 1;
        }
        state.operations.push(GraphOp::CreateNodes {
            label: set.label().to_string(),
            records: set.len(),
        });
        Ok(stats)
    }

    fn create_relationships(&self, set: &RelationshipSet) -> Result<WriteStats, BiographError> {
        let mut state = self.lock()?;
        let mut stats = WriteStats::default();
        for record in set.records() {
            stats.records += 1;
            let start = state.find_node(
                &set.start().label,
                &set.start().key,
                &value_key(&record.start),
            );
            let end = state.find_node(&set.end().label, &set.end().key, &value_key(&record.end));
            let (Some(start), Some(end)) = (start, end) else {
                state.unmatched += 1;
                continue;
            };
            let entry = state
                .relationships
                .entry((set.rel_type().clone(), start, end))
                .or_insert_with(|| {
                    stats.created += 1;
                    Properties::new()
                });
            for (name, value) in &record.properties {
                entry.insert(name.clone(), value.clone());
            }
        }
        state.operations.push(GraphOp::CreateRelationships {
            rel_type: set.rel_type().to_string(),
            records: set.len(),
        });
        Ok(stats)
    }
}
