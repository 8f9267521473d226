//! Parser output: labelled node-sets and typed relationship-sets.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::domain::Identifier;
use crate::error::BiographError;

pub type Properties = serde_json::Map<String, Value>;

/// Records sharing one node label, merged on `merge_key`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSet {
    label: Identifier,
    merge_key: Identifier,
    nodes: Vec<Properties>,
}

impl NodeSet {
    pub fn new(label: Identifier, merge_key: Identifier) -> Self {
        Self {
            label,
            merge_key,
            nodes: Vec::new(),
        }
    }

    pub fn label(&self) -> &Identifier {
        &self.label
    }

    pub fn merge_key(&self) -> &Identifier {
        &self.merge_key
    }

    pub fn nodes(&self) -> &[Properties] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node; its properties must carry a non-null merge key.
    pub fn add_node(&mut self, properties: Properties) -> Result<(), BiographError> {
        match properties.get(self.merge_key.as_str()) {
            Some(Value::Null) | None => Err(BiographError::MissingMergeKey {
                label: self.label.to_string(),
                key: self.merge_key.to_string(),
            }),
            Some(_) => {
                self.nodes.push(properties);
                Ok(())
            }
        }
    }

    /// Index backing the `MERGE` on this set's merge key.
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            label: self.label.clone(),
            property: self.merge_key.clone(),
        }
    }

    /// Merge-key value of a node rendered as a lookup key.
    pub fn key_of(&self, properties: &Properties) -> Option<String> {
        properties.get(self.merge_key.as_str()).map(value_key)
    }
}

impl fmt::Display for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.label, self.merge_key)
    }
}

/// One side of a relationship: the label to match and the property holding the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub label: Identifier,
    pub key: Identifier,
}

impl Endpoint {
    pub fn new(label: Identifier, key: Identifier) -> Self {
        Self { label, key }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipRecord {
    pub start: Value,
    pub end: Value,
    pub properties: Properties,
}

/// Index needed to merge nodes and match relationship endpoints without a label scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IndexSpec {
    pub label: Identifier,
    pub property: Identifier,
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}({})", self.label, self.property)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipSet {
    rel_type: Identifier,
    start: Endpoint,
    end: Endpoint,
    records: Vec<RelationshipRecord>,
}

impl RelationshipSet {
    pub fn new(rel_type: Identifier, start: Endpoint, end: Endpoint) -> Self {
        Self {
            rel_type,
            start,
            end,
            records: Vec::new(),
        }
    }

    pub fn rel_type(&self) -> &Identifier {
        &self.rel_type
    }

    pub fn start(&self) -> &Endpoint {
        &self.start
    }

    pub fn end(&self) -> &Endpoint {
        &self.end
    }

    pub fn records(&self) -> &[RelationshipRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add_relationship(
        &mut self,
        start: impl Into<Value>,
        end: impl Into<Value>,
        properties: Properties,
    ) {
        self.records.push(RelationshipRecord {
            start: start.into(),
            end: end.into(),
            properties,
        });
    }

    pub fn index_specs(&self) -> [IndexSpec; 2] {
        [
            IndexSpec {
                label: self.start.label.clone(),
                property: self.start.key.clone(),
            },
            IndexSpec {
                label: self.end.label.clone(),
                property: self.end.key.clone(),
            },
        ]
    }
}

impl fmt::Display for RelationshipSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}]->({})",
            self.start.label, self.rel_type, self.end.label
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Container {
    node_sets: Vec<NodeSet>,
    relationship_sets: Vec<RelationshipSet>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_sets(&self) -> &[NodeSet] {
        &self.node_sets
    }

    pub fn relationship_sets(&self) -> &[RelationshipSet] {
        &self.relationship_sets
    }

    /// Returns the node-set for `label`/`merge_key`, creating it on first use.
    pub fn node_set_mut(&mut self, label: &Identifier, merge_key: &Identifier) -> &mut NodeSet {
        let position = self
            .node_sets
            .iter()
            .position(|set| &set.label == label && &set.merge_key == merge_key);
        let index = match position {
            Some(index) => index,
            None => {
                self.node_sets
                    .push(NodeSet::new(label.clone(), merge_key.clone()));
                self.node_sets.len() - 1
            }
        };
        &mut self.node_sets[index]
    }

    pub fn relationship_set_mut(
        &mut self,
        rel_type: &Identifier,
        start: &Endpoint,
        end: &Endpoint,
    ) -> &mut RelationshipSet {
        let position = self.relationship_sets.iter().position(|set| {
            &set.rel_type == rel_type && &set.start == start && &set.end == end
        });
        let index = match position {
            Some(index) => index,
            None => {
                self.relationship_sets.push(RelationshipSet::new(
                    rel_type.clone(),
                    start.clone(),
                    end.clone(),
                ));
                self.relationship_sets.len() - 1
            }
        };
        &mut self.relationship_sets[index]
    }

    pub fn inventory(&self) -> Inventory {
        Inventory {
            node_sets: self
                .node_sets
                .iter()
                .map(|set| SetCount {
                    name: set.label.to_string(),
                    count: set.len(),
                })
                .collect(),
            relationship_sets: self
                .relationship_sets
                .iter()
                .map(|set| SetCount {
                    name: set.to_string(),
                    count: set.len(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub node_sets: Vec<SetCount>,
    pub relationship_sets: Vec<SetCount>,
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self
            .node_sets
            .iter()
            .map(|set| format!("{}={}", set.name, set.count))
            .collect::<Vec<_>>();
        let rels = self
            .relationship_sets
            .iter()
            .map(|set| format!("{}={}", set.name, set.count))
            .collect::<Vec<_>>();
        write!(
            f,
            "nodes [{}] relationships [{}]",
            nodes.join(", "),
            rels.join(", ")
        )
    }
}

/// Canonical lookup key for a merge-key value; strings are used verbatim.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ident(value: &str) -> Identifier {
        value.parse().unwrap()
    }

    #[test]
    fn node_set_is_reused_per_label_and_key() {
        let mut container = Container::new();
        let mut props = Properties::new();
        props.insert("sid".to_string(), json!("1"));
        container
            .node_set_mut(&ident("Gene"), &ident("sid"))
            .add_node(props.clone())
            .unwrap();
        container
            .node_set_mut(&ident("Gene"), &ident("sid"))
            .add_node(props)
            .unwrap();

        assert_eq!(container.node_sets().len(), 1);
        assert_eq!(container.node_sets()[0].len(), 2);
    }

    #[test]
    fn node_without_merge_key_is_rejected() {
        let mut set = NodeSet::new(ident("Gene"), ident("sid"));
        let mut props = Properties::new();
        props.insert("name".to_string(), json!("TP53"));
        let err = set.add_node(props).unwrap_err();
        assert!(matches!(
            err,
            BiographError::MissingMergeKey { ref label, ref key } if label == "Gene" && key == "sid"
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn inventory_names_relationship_endpoints() {
        let mut container = Container::new();
        let start = Endpoint::new(ident("Gene"), ident("sid"));
        let end = Endpoint::new(ident("Protein"), ident("sid"));
        container
            .relationship_set_mut(&ident("MAPS_TO"), &start, &end)
            .add_relationship("g1", "p1", Properties::new());

        let inventory = container.inventory();
        assert_eq!(inventory.relationship_sets[0].name, "(Gene)-[MAPS_TO]->(Protein)");
        assert_eq!(inventory.relationship_sets[0].count, 1);
    }
}
