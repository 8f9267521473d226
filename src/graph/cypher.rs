//! Idempotent Cypher statements for the three load phases.

use serde::Serialize;
use serde_json::{Value, json};

use crate::container::{IndexSpec, NodeSet, Properties, RelationshipRecord, RelationshipSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub statement: String,
    pub parameters: Value,
    #[serde(rename = "includeStats")]
    pub include_stats: bool,
}

pub fn create_index(index: &IndexSpec) -> Statement {
    Statement {
        statement: format!(
            "CREATE INDEX IF NOT EXISTS FOR (n:`{}`) ON (n.`{}`)",
            index.label, index.property
        ),
        parameters: json!({}),
        include_stats: true,
    }
}

/// `MERGE` on the merge key, then overwrite the remaining properties.
pub fn merge_nodes(set: &NodeSet, batch: &[Properties]) -> Statement {
    Statement {
        statement: format!(
            "UNWIND $props AS properties \
             MERGE (n:`{label}` {{`{key}`: properties.`{key}`}}) \
             SET n += properties",
            label = set.label(),
            key = set.merge_key(),
        ),
        parameters: json!({ "props": batch }),
        include_stats: true,
    }
}

/// Matches both endpoints by their id property; rows whose endpoints are absent are skipped.
pub fn merge_relationships(set: &RelationshipSet, batch: &[RelationshipRecord]) -> Statement {
    let rows = batch
        .iter()
        .map(|record| {
            json!({
                "start": record.start,
                "end": record.end,
                "properties": record.properties,
            })
        })
        .collect::<Vec<_>>();
    Statement {
        statement: format!(
            "UNWIND $rels AS rel \
             MATCH (a:`{start_label}` {{`{start_key}`: rel.start}}), \
             (b:`{end_label}` {{`{end_key}`: rel.end}}) \
             MERGE (a)-[r:`{rel_type}`]->(b) \
             SET r += rel.properties",
            start_label = set.start().label,
            start_key = set.start().key,
            end_label = set.end().label,
            end_key = set.end().key,
            rel_type = set.rel_type(),
        ),
        parameters: json!({ "rels": rows }),
        include_stats: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Endpoint;

    #[test]
    fn index_statement_is_idempotent() {
        let index = IndexSpec {
            label: "Gene".parse().unwrap(),
            property: "sid".parse().unwrap(),
        };
        let statement = create_index(&index);
        assert_eq!(
            statement.statement,
            "CREATE INDEX IF NOT EXISTS FOR (n:`Gene`) ON (n.`sid`)"
        );
    }

    #[test]
    fn relationship_statement_matches_endpoints() {
        let mut set = RelationshipSet::new(
            "MAPS_TO".parse().unwrap(),
            Endpoint::new("Gene".parse().unwrap(), "sid".parse().unwrap()),
            Endpoint::new("Protein".parse().unwrap(), "accession".parse().unwrap()),
        );
        set.add_relationship("g1", "p1", Properties::new());

        let statement = merge_relationships(&set, set.records());
        assert!(statement.statement.contains("MATCH (a:`Gene` {`sid`: rel.start})"));
        assert!(statement.statement.contains("(b:`Protein` {`accession`: rel.end})"));
        assert!(statement.statement.contains("MERGE (a)-[r:`MAPS_TO`]->(b)"));
        assert_eq!(statement.parameters["rels"][0]["start"], "g1");
    }
}
