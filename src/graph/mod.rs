pub mod cypher;
pub mod memory;
pub mod neo4j;

use serde::Serialize;

use crate::container::{IndexSpec, NodeSet, RelationshipSet};
use crate::error::BiographError;

pub use memory::{GraphOp, MemoryGraph};
pub use neo4j::Neo4jHttpStore;

/// Counts reported by a graph write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub records: usize,
    pub created: usize,
}

impl std::ops::AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.records += other.records;
        self.created += other.created;
    }
}

/// Target of the bulk load. Every operation must be an idempotent upsert.
pub trait GraphStore: Send + Sync {
    fn create_index(&self, index: &IndexSpec) -> Result<(), BiographError>;
    fn create_nodes(&self, set: &NodeSet) -> Result<WriteStats, BiographError>;
    fn create_relationships(&self, set: &RelationshipSet) -> Result<WriteStats, BiographError>;
}

impl<G: GraphStore + ?Sized> GraphStore for &G {
    fn create_index(&self, index: &IndexSpec) -> Result<(), BiographError> {
        (**self).create_index(index)
    }

    fn create_nodes(&self, set: &NodeSet) -> Result<WriteStats, BiographError> {
        (**self).create_nodes(set)
    }

    fn create_relationships(&self, set: &RelationshipSet) -> Result<WriteStats, BiographError> {
        (**self).create_relationships(set)
    }
}
