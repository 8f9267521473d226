use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GraphConfig;
use crate::container::{IndexSpec, NodeSet, RelationshipSet};
use crate::error::BiographError;
use crate::graph::cypher::{self, Statement};
use crate::graph::{GraphStore, WriteStats};

/// Neo4j reached through the transactional HTTP endpoint; each batch commits on its own.
#[derive(Clone)]
pub struct Neo4jHttpStore {
    client: Client,
    commit_url: String,
    user: String,
    password: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: &'a [Statement],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    stats: Option<StatementStats>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementStats {
    #[serde(default)]
    nodes_created: usize,
    #[serde(default)]
    relationships_created: usize,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

impl Neo4jHttpStore {
    pub fn new(config: &GraphConfig) -> Result<Self, BiographError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biodatagraph/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BiographError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| BiographError::Http(err.to_string()))?;

        Ok(Self {
            client,
            commit_url: Self::commit_url(&config.url, &config.database),
            user: config.user.clone(),
            password: config.password.clone(),
            batch_size: config.batch_size.max(1),
        })
    }

    pub fn commit_url(base: &str, database: &str) -> String {
        format!("{}/db/{}/tx/commit", base.trim_end_matches('/'), database)
    }

    fn commit(&self, statement: Statement) -> Result<StatementStats, BiographError> {
        let statements = [statement];
        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&CommitRequest {
                statements: &statements,
            })
            .send()
            .map_err(|err| BiographError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Neo4j request failed".to_string());
            return Err(BiographError::HttpStatus {
                url: self.commit_url.clone(),
                status,
                message,
            });
        }
        let body: CommitResponse = response
            .json()
            .map_err(|err| BiographError::Http(err.to_string()))?;
        if let Some(error) = body.errors.first() {
            return Err(BiographError::GraphRejected(format!(
                "{}: {}",
                error.code, error.message
            )));
        }
        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|result| result.stats)
            .unwrap_or_default())
    }
}

impl GraphStore for Neo4jHttpStore {
    fn create_index(&self, index: &IndexSpec) -> Result<(), BiographError> {
        debug!(index = %index, "creating index");
        self.commit(cypher::create_index(index))?;
        Ok(())
    }

    fn create_nodes(&self, set: &NodeSet) -> Result<WriteStats, BiographError> {
        let mut stats = WriteStats::default();
        for batch in set.nodes().chunks(self.batch_size) {
            let result = self.commit(cypher::merge_nodes(set, batch))?;
            stats += WriteStats {
                records: batch.len(),
                created: result.nodes_created,
            };
            debug!(label = %set.label(), records = stats.records, "node batch committed");
        }
        Ok(stats)
    }

    fn create_relationships(&self, set: &RelationshipSet) -> Result<WriteStats, BiographError> {
        let mut stats = WriteStats::default();
        for batch in set.records().chunks(self.batch_size) {
            let result = self.commit(cypher::merge_relationships(set, batch))?;
            stats += WriteStats {
                records: batch.len(),
                created: result.relationships_created,
            };
            debug!(rel_type = %set.rel_type(), records = stats.records, "relationship batch committed");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_url_joins_database() {
        assert_eq!(
            Neo4jHttpStore::commit_url("http://localhost:7474/", "neo4j"),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn response_errors_are_decoded() {
        let body = r#"{"results":[],"errors":[{"code":"Neo.ClientError.Security.Unauthorized","message":"bad credentials"}]}"#;
        let parsed: CommitResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.errors[0].code, "Neo.ClientError.Security.Unauthorized");
    }

    #[test]
    fn response_stats_are_decoded() {
        let body = r#"{"results":[{"columns":[],"data":[],"stats":{"contains_updates":true,"nodes_created":3,"relationships_created":0}}],"errors":[]}"#;
        let parsed: CommitResponse = serde_json::from_str(body).unwrap();
        let stats = parsed.results[0].stats.as_ref().unwrap();
        assert_eq!(stats.nodes_created, 3);
    }
}
