use std::collections::HashMap;

use assert_matches::assert_matches;

use biodatagraph::config::{
    ConfigLoader, FetchPlan, PipelineConfig, RunConfig, RunMode, VersionStrategy,
    default_pipeline,
};
use biodatagraph::error::BiographError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn parse_config_shorthand_and_detailed_files() {
    let config: PipelineConfig = serde_json::from_str(
        r#"{
            "datasources": [
                {
                    "name": "words",
                    "version": { "kind": "fixed", "version": "1" },
                    "files": ["https://example.org/words.txt"]
                },
                {
                    "name": "ensembl",
                    "version": { "kind": "remote", "url": "https://example.org/VERSION", "pattern": "(\\d+)" },
                    "files": [{ "url": "https://example.org/{version}/human.tsv.gz", "taxid": "9606" }],
                    "fetch": "remote_version",
                    "taxids": ["9606"]
                }
            ],
            "parsers": [
                {
                    "name": "words",
                    "datasource": "words",
                    "file": "words.txt",
                    "nodes": [{ "label": "Word", "key": { "name": "value", "column": 0 } }]
                }
            ]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.datasources[0].files[0].taxid, None);
    assert_eq!(
        resolved.datasources[1].files[0]
            .taxid
            .as_ref()
            .map(|taxid| taxid.as_str()),
        Some("9606")
    );
    assert_eq!(resolved.datasources[1].fetch, FetchPlan::RemoteVersion);
    assert_matches!(resolved.datasources[1].version, VersionStrategy::Remote { .. });
    assert_eq!(resolved.parsers[0].layout.delimiter, '\t');
}

#[test]
fn parser_with_unknown_datasource_is_rejected() {
    let mut config = default_pipeline();
    config.parsers[0].datasource = "gtex".to_string();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, BiographError::UnknownDatasource(name) if name == "gtex");
}

#[test]
fn default_catalog_order() {
    let resolved = ConfigLoader::resolve_config(default_pipeline()).unwrap();
    let sources: Vec<&str> = resolved
        .datasources
        .iter()
        .map(|source| source.name.as_str())
        .collect();
    assert_eq!(
        sources,
        vec!["ncbigene", "bigwordlist", "ensembl", "refseq", "uniprot"]
    );
    let parsers: Vec<&str> = resolved
        .parsers
        .iter()
        .map(|parser| parser.name.as_str())
        .collect();
    assert_eq!(parsers, vec!["ncbigene", "bigwordlist"]);
}

#[test]
fn run_config_defaults() {
    let config = RunConfig::from_lookup(lookup(&[("BIODATAGRAPH_ROOT", "/srv/data")])).unwrap();
    assert_eq!(config.root.as_str(), "/srv/data");
    assert_eq!(config.graph.url, "http://localhost:7474");
    assert_eq!(config.graph.user, "neo4j");
    assert_eq!(config.graph.database, "neo4j");
    assert_eq!(config.graph.batch_size, 10_000);
    assert_eq!(config.run_mode, RunMode::Prod);
}

#[test]
fn run_mode_test_from_env() {
    let config = RunConfig::from_lookup(lookup(&[
        ("BIODATAGRAPH_ROOT", "/srv/data"),
        ("RUN_MODE", "test"),
    ]))
    .unwrap();
    assert_eq!(config.run_mode, RunMode::Test);
}

#[test]
fn run_mode_test_ignores_invalid_graph_settings() {
    let env = lookup(&[
        ("RUN_MODE", "test"),
        ("NEO4J_URL", "bolt://localhost:7687"),
    ]);
    assert_eq!(RunMode::from_lookup(&env), RunMode::Test);
    assert!(RunConfig::from_lookup(&env).is_err());
}

#[test]
fn bolt_url_is_rejected() {
    let err = RunConfig::from_lookup(lookup(&[
        ("BIODATAGRAPH_ROOT", "/srv/data"),
        ("NEO4J_URL", "bolt://localhost:7687"),
    ]))
    .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = RunConfig::from_lookup(lookup(&[
        ("BIODATAGRAPH_ROOT", "/srv/data"),
        ("BIODATAGRAPH_BATCH_SIZE", "0"),
    ]))
    .unwrap_err();
    assert_matches!(err, BiographError::InvalidConfig(_));
}

#[test]
fn explicit_missing_config_file_fails() {
    let err = ConfigLoader::resolve(Some("/nonexistent/biodatagraph.json")).unwrap_err();
    assert_matches!(err, BiographError::ConfigRead(_));
}
