use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use biodatagraph::config::{ConfigLoader, PipelineConfig, SourceFile, VersionStrategy};
use biodatagraph::error::BiographError;
use biodatagraph::graph::MemoryGraph;
use biodatagraph::http::Fetcher;
use biodatagraph::pipeline::{Pipeline, ProgressEvent, ProgressSink, RunOptions};
use biodatagraph::sources::{Datasource, FetchRequest, ReleaseDatasource};
use biodatagraph::store::Store;

struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Default)]
struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    text_calls: Mutex<usize>,
    downloads: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    fn body(&self, url: &str) -> Result<&Vec<u8>, BiographError> {
        self.bodies.get(url).ok_or_else(|| BiographError::HttpStatus {
            url: url.to_string(),
            status: 404,
            message: "not found".to_string(),
        })
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn get_text(&self, url: &str) -> Result<String, BiographError> {
        *self.text_calls.lock().unwrap() += 1;
        Ok(String::from_utf8_lossy(self.body(url)?).into_owned())
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, BiographError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let body = self.body(url)?;
        std::fs::write(destination, body).unwrap();
        Ok(body.len() as u64)
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    (temp, Store::new(root))
}

fn file(url: &str, taxid: Option<&str>) -> SourceFile {
    SourceFile {
        url: url.to_string(),
        taxid: taxid.map(|value| value.parse().unwrap()),
    }
}

#[test]
fn remote_version_is_resolved_once_and_fetched() {
    let (_temp, store) = temp_store();
    let fetcher = Arc::new(
        MockFetcher::default()
            .with("https://example.org/VERSION", "113\n")
            .with("https://example.org/release-113/human.tsv", "a\tb\n"),
    );
    let source = ReleaseDatasource::new(
        "ensembl",
        store.clone(),
        VersionStrategy::Remote {
            url: "https://example.org/VERSION".to_string(),
            pattern: r"(\d+)".to_string(),
        },
        vec![file("https://example.org/release-{version}/human.tsv", None)],
        fetcher.clone(),
    )
    .unwrap();

    assert!(!source.has_latest_local_copy().unwrap());
    source.fetch(&FetchRequest::default()).unwrap();
    assert!(source.has_latest_local_copy().unwrap());

    assert_eq!(*fetcher.text_calls.lock().unwrap(), 1);
    assert_eq!(
        fetcher.downloads(),
        vec!["https://example.org/release-113/human.tsv"]
    );
    let latest = store.latest_local("ensembl").unwrap().unwrap();
    assert_eq!(latest.version.as_str(), "113");
    assert_eq!(latest.files, vec!["human.tsv".to_string()]);
}

#[test]
fn taxid_filter_selects_files() {
    let (_temp, store) = temp_store();
    let fetcher = Arc::new(
        MockFetcher::default()
            .with("https://example.org/human.tsv", "h\n")
            .with("https://example.org/mouse.tsv", "m\n")
            .with("https://example.org/README", "r\n"),
    );
    let source = ReleaseDatasource::new(
        "ensembl",
        store,
        VersionStrategy::Fixed {
            version: "113".parse().unwrap(),
        },
        vec![
            file("https://example.org/human.tsv", Some("9606")),
            file("https://example.org/mouse.tsv", Some("10090")),
            file("https://example.org/README", None),
        ],
        fetcher.clone(),
    )
    .unwrap();

    source
        .fetch(&FetchRequest {
            version: None,
            taxids: vec!["9606".parse().unwrap()],
        })
        .unwrap();

    assert_eq!(
        fetcher.downloads(),
        vec!["https://example.org/human.tsv", "https://example.org/README"]
    );
}

#[test]
fn failed_download_leaves_no_local_copy() {
    let (_temp, store) = temp_store();
    let fetcher = Arc::new(MockFetcher::default().with("https://example.org/a.tsv", "a\n"));
    let source = ReleaseDatasource::new(
        "refseq",
        store.clone(),
        VersionStrategy::Fixed {
            version: "225".parse().unwrap(),
        },
        vec![
            file("https://example.org/a.tsv", None),
            file("https://example.org/b.tsv", None),
        ],
        fetcher,
    )
    .unwrap();

    let err = source.fetch(&FetchRequest::default()).unwrap_err();

    assert_matches!(err, BiographError::HttpStatus { status: 404, .. });
    assert!(store.latest_local("refseq").unwrap().is_none());
    assert!(!source.has_latest_local_copy().unwrap());
}

#[test]
fn reserved_datasource_name_is_rejected() {
    let (_temp, store) = temp_store();
    let result = ReleaseDatasource::new(
        "metadata",
        store,
        VersionStrategy::Daily,
        vec![file("https://example.org/a.tsv", None)],
        Arc::new(MockFetcher::default()),
    );
    assert_matches!(result, Err(BiographError::InvalidConfig(_)));
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

const GENE_INFO: &str = "#tax_id\tGeneID\tSymbol\tLocusTag\tSynonyms\n\
9606\t7157\tTP53\t-\tp53|LFS1\n\
9606\t672\tBRCA1\t-\tRNF53\n\
10090\t22059\tTrp53\t-\tp53\n";

fn gene_config() -> PipelineConfig {
    serde_json::from_str(
        r##"{
            "datasources": [
                {
                    "name": "genes",
                    "version": { "kind": "fixed", "version": "1" },
                    "files": ["https://example.org/gene_info.gz"]
                }
            ],
            "parsers": [
                {
                    "name": "genes",
                    "datasource": "genes",
                    "taxid": "9606",
                    "file": "gene_info.gz",
                    "comment": "#",
                    "taxid_column": 0,
                    "nodes": [
                        {
                            "label": "Gene",
                            "key": { "name": "sid", "column": 1 },
                            "properties": [{ "name": "symbol", "column": 2 }]
                        },
                        {
                            "label": "GeneSymbol",
                            "key": { "name": "sid", "column": 4, "split": "|" }
                        }
                    ],
                    "relationships": [
                        {
                            "type": "HAS_SYNONYM",
                            "start": { "label": "Gene", "key": "sid", "column": 1 },
                            "end": { "label": "GeneSymbol", "key": "sid", "column": 4, "split": "|" }
                        }
                    ]
                }
            ]
        }"##,
    )
    .unwrap()
}

#[test]
fn configured_pipeline_downloads_parses_and_loads_once() {
    let (_temp, store) = temp_store();
    let fetcher =
        Arc::new(MockFetcher::default().with("https://example.org/gene_info.gz", gzip(GENE_INFO)));
    let resolved = ConfigLoader::resolve_config(gene_config()).unwrap();
    let graph = MemoryGraph::new();

    let mut pipeline = Pipeline::from_resolved(&resolved, &store, fetcher.clone()).unwrap();
    let report = pipeline
        .run(&graph, RunOptions::default(), &NullSink)
        .unwrap();

    assert_eq!(graph.nodes_with_label("Gene"), 2);
    assert_eq!(graph.nodes_with_label("GeneSymbol"), 3);
    assert_eq!(graph.relationship_count(), 3);
    assert_eq!(graph.unmatched_relationships(), 0);
    let tp53 = graph.node("Gene", "sid", "7157").unwrap();
    assert_eq!(tp53["symbol"], "TP53");
    assert_eq!(report.parsers[0].inventory.node_sets.len(), 2);

    let mut pipeline = Pipeline::from_resolved(&resolved, &store, fetcher.clone()).unwrap();
    pipeline
        .run(&graph, RunOptions::default(), &NullSink)
        .unwrap();

    assert_eq!(fetcher.downloads().len(), 1);
    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.relationship_count(), 3);
}

#[test]
fn parser_without_local_copy_fails_the_run() {
    let (_temp, store) = temp_store();
    let resolved = ConfigLoader::resolve_config(gene_config()).unwrap();
    let graph = MemoryGraph::new();
    let mut pipeline =
        Pipeline::from_resolved(&resolved, &store, Arc::new(MockFetcher::default())).unwrap();

    let err = pipeline
        .run(&graph, RunOptions { skip_refresh: true }, &NullSink)
        .unwrap_err();

    assert_matches!(
        err,
        BiographError::ParseFailed { parser, source }
            if parser == "genes" && matches!(*source, BiographError::NoLocalCopy(_))
    );
    assert!(graph.operations().is_empty());
}
