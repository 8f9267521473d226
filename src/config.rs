use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{Identifier, Taxid, Version};
use crate::error::BiographError;
use crate::tabular::{EndpointMapping, NodeMapping, PropertyColumn, RelationshipMapping, TableLayout};

pub const DEFAULT_CONFIG_FILE: &str = "biodatagraph.json";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Prod,
    Test,
}

impl RunMode {
    /// Anything other than `test` (in any case) runs the pipeline.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("test") {
            RunMode::Test
        } else {
            RunMode::Prod
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `RUN_MODE` alone, so test mode never depends on the rest of the settings.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("RUN_MODE")
            .map(|mode| Self::parse(&mode))
            .unwrap_or(RunMode::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

/// Process-level settings, resolved once and handed to the driver.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root: Utf8PathBuf,
    pub graph: GraphConfig,
    pub run_mode: RunMode,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, BiographError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BiographError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let root = match value("BIODATAGRAPH_ROOT") {
            Some(root) => Utf8PathBuf::from(root),
            None => default_root()?,
        };

        let url = value("NEO4J_URL").unwrap_or_else(|| "http://localhost:7474".to_string());
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BiographError::InvalidConfig(format!(
                "NEO4J_URL must be the http(s) endpoint of the server, got {url}"
            )));
        }

        let batch_size = match value("BIODATAGRAPH_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    BiographError::InvalidConfig(format!("invalid batch size: {raw}"))
                })?,
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            root,
            graph: GraphConfig {
                url,
                user: value("NEO4J_USER").unwrap_or_else(|| "neo4j".to_string()),
                password: value("NEO4J_PASSWORD").unwrap_or_else(|| "test".to_string()),
                database: value("NEO4J_DATABASE").unwrap_or_else(|| "neo4j".to_string()),
                batch_size,
                timeout_secs: 300,
            },
            run_mode: RunMode::from_lookup(&lookup),
        })
    }
}

fn default_root() -> Result<Utf8PathBuf, BiographError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().join("biodatagraph")).ok())
        .ok_or_else(|| BiographError::Filesystem("unable to resolve data directory".to_string()))
}

/// How a datasource decides what its latest remote release is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VersionStrategy {
    Fixed { version: Version },
    /// The current UTC date; for sources that are rebuilt continuously.
    Daily,
    /// First capture group of `pattern` in the text served at `url`.
    Remote { url: String, pattern: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPlan {
    /// Let the datasource pick its current release.
    #[default]
    Latest,
    /// Resolve the latest remote version first and request it explicitly.
    RemoteVersion,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileEntry {
    Shorthand(String),
    Detailed(FileEntryObject),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileEntryObject {
    pub url: String,
    #[serde(default)]
    pub taxid: Option<Taxid>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceEntry {
    pub name: String,
    pub version: VersionStrategy,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub fetch: FetchPlan,
    #[serde(default)]
    pub taxids: Vec<Taxid>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParserEntry {
    pub name: String,
    pub datasource: String,
    #[serde(default)]
    pub taxid: Option<Taxid>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(flatten)]
    pub layout: TableLayout,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datasources: Vec<DatasourceEntry>,
    #[serde(default)]
    pub parsers: Vec<ParserEntry>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub url: String,
    pub taxid: Option<Taxid>,
}

#[derive(Debug, Clone)]
pub struct DatasourceRequest {
    pub name: String,
    pub version: VersionStrategy,
    pub files: Vec<SourceFile>,
    pub fetch: FetchPlan,
    pub taxids: Vec<Taxid>,
}

#[derive(Debug, Clone)]
pub struct ParserRequest {
    pub name: String,
    pub datasource: String,
    pub taxid: Option<Taxid>,
    pub after: Vec<String>,
    pub layout: TableLayout,
}

#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    pub schema_version: u32,
    pub datasources: Vec<DatasourceRequest>,
    pub parsers: Vec<ParserRequest>,
    pub batch_size: Option<usize>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `biodatagraph.json` in the current directory, or falls
    /// back to the built-in catalog when neither is given.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedPipeline, BiographError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(default_pipeline());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BiographError::ConfigRead(config_path.clone()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|err| BiographError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: PipelineConfig) -> Result<ResolvedPipeline, BiographError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let datasources = config
            .datasources
            .into_iter()
            .map(|entry| {
                if entry.files.is_empty() {
                    return Err(BiographError::InvalidConfig(format!(
                        "datasource {} declares no files",
                        entry.name
                    )));
                }
                Ok(DatasourceRequest {
                    name: entry.name,
                    version: entry.version,
                    files: entry
                        .files
                        .into_iter()
                        .map(|file| match file {
                            FileEntry::Shorthand(url) => SourceFile { url, taxid: None },
                            FileEntry::Detailed(obj) => SourceFile {
                                url: obj.url,
                                taxid: obj.taxid,
                            },
                        })
                        .collect(),
                    fetch: entry.fetch,
                    taxids: entry.taxids,
                })
            })
            .collect::<Result<Vec<_>, BiographError>>()?;

        let parsers = config
            .parsers
            .into_iter()
            .map(|entry| {
                if !datasources.iter().any(|source| source.name == entry.datasource) {
                    return Err(BiographError::UnknownDatasource(entry.datasource));
                }
                Ok(ParserRequest {
                    name: entry.name,
                    datasource: entry.datasource,
                    taxid: entry.taxid,
                    after: entry.after,
                    layout: entry.layout,
                })
            })
            .collect::<Result<Vec<_>, BiographError>>()?;

        if config.batch_size == Some(0) {
            return Err(BiographError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }

        Ok(ResolvedPipeline {
            schema_version,
            datasources,
            parsers,
            batch_size: config.batch_size,
        })
    }
}

fn ident(value: &str) -> Identifier {
    value.parse().expect("built-in identifier")
}

fn taxid(value: &str) -> Taxid {
    value.parse().expect("built-in taxid")
}

fn column(name: &str, column: usize) -> PropertyColumn {
    PropertyColumn {
        name: ident(name),
        column,
        split: None,
    }
}

/// The datasets of the covid graph build: gene catalog, word list and the
/// three identifier mapping sources, with parsers for the first two.
pub fn default_pipeline() -> PipelineConfig {
    let human = taxid("9606");
    PipelineConfig {
        schema_version: Some(1),
        datasources: vec![
            DatasourceEntry {
                name: "ncbigene".to_string(),
                version: VersionStrategy::Daily,
                files: vec![FileEntry::Shorthand(
                    "https://ftp.ncbi.nlm.nih.gov/gene/DATA/gene_info.gz".to_string(),
                )],
                fetch: FetchPlan::Latest,
                taxids: Vec::new(),
            },
            DatasourceEntry {
                name: "bigwordlist".to_string(),
                version: VersionStrategy::Fixed {
                    version: "1".parse().expect("built-in version"),
                },
                files: vec![FileEntry::Shorthand(
                    "https://raw.githubusercontent.com/dwyl/english-words/master/words_alpha.txt"
                        .to_string(),
                )],
                fetch: FetchPlan::Latest,
                taxids: Vec::new(),
            },
            DatasourceEntry {
                name: "ensembl".to_string(),
                version: VersionStrategy::Remote {
                    url: "https://ftp.ensembl.org/pub/VERSION".to_string(),
                    pattern: r"(\d+)".to_string(),
                },
                files: vec![
                    FileEntry::Detailed(FileEntryObject {
                        url: "https://ftp.ensembl.org/pub/release-{version}/tsv/homo_sapiens/Homo_sapiens.GRCh38.{version}.uniprot.tsv.gz".to_string(),
                        taxid: Some(human.clone()),
                    }),
                    FileEntry::Detailed(FileEntryObject {
                        url: "https://ftp.ensembl.org/pub/release-{version}/tsv/mus_musculus/Mus_musculus.GRCm39.{version}.uniprot.tsv.gz".to_string(),
                        taxid: Some(taxid("10090")),
                    }),
                ],
                fetch: FetchPlan::RemoteVersion,
                taxids: vec![human.clone()],
            },
            DatasourceEntry {
                name: "refseq".to_string(),
                version: VersionStrategy::Remote {
                    url: "https://ftp.ncbi.nlm.nih.gov/refseq/release/RELEASE_NUMBER".to_string(),
                    pattern: r"(\d+)".to_string(),
                },
                files: vec![FileEntry::Shorthand(
                    "https://ftp.ncbi.nlm.nih.gov/refseq/release/release-catalog/RefSeq-release{version}.catalog.gz".to_string(),
                )],
                fetch: FetchPlan::RemoteVersion,
                taxids: Vec::new(),
            },
            DatasourceEntry {
                name: "uniprot".to_string(),
                version: VersionStrategy::Remote {
                    url: "https://ftp.uniprot.org/pub/databases/uniprot/current_release/relnotes.txt"
                        .to_string(),
                    pattern: r"UniProt Release (\d{4}_\d{2})".to_string(),
                },
                files: vec![FileEntry::Detailed(FileEntryObject {
                    url: "https://ftp.uniprot.org/pub/databases/uniprot/current_release/knowledgebase/idmapping/by_organism/HUMAN_9606_idmapping_selected.tab.gz".to_string(),
                    taxid: Some(human.clone()),
                })],
                fetch: FetchPlan::RemoteVersion,
                taxids: Vec::new(),
            },
        ],
        parsers: vec![
            ParserEntry {
                name: "ncbigene".to_string(),
                datasource: "ncbigene".to_string(),
                taxid: Some(human),
                after: Vec::new(),
                layout: TableLayout {
                    file: "gene_info.gz".to_string(),
                    delimiter: '\t',
                    comment: Some("#".to_string()),
                    header: false,
                    taxid_column: Some(0),
                    nodes: vec![
                        NodeMapping {
                            label: ident("Gene"),
                            key: column("sid", 1),
                            properties: vec![
                                column("taxid", 0),
                                column("symbol", 2),
                                column("chromosome", 6),
                                column("description", 8),
                                column("type_of_gene", 9),
                            ],
                        },
                        NodeMapping {
                            label: ident("GeneSymbol"),
                            key: PropertyColumn {
                                name: ident("sid"),
                                column: 4,
                                split: Some("|".to_string()),
                            },
                            properties: Vec::new(),
                        },
                    ],
                    relationships: vec![RelationshipMapping {
                        rel_type: ident("HAS_SYNONYM"),
                        start: EndpointMapping {
                            label: ident("Gene"),
                            key: ident("sid"),
                            column: 1,
                            split: None,
                        },
                        end: EndpointMapping {
                            label: ident("GeneSymbol"),
                            key: ident("sid"),
                            column: 4,
                            split: Some("|".to_string()),
                        },
                        properties: Vec::new(),
                    }],
                },
            },
            ParserEntry {
                name: "bigwordlist".to_string(),
                datasource: "bigwordlist".to_string(),
                taxid: None,
                after: Vec::new(),
                layout: TableLayout {
                    file: "words_alpha.txt".to_string(),
                    delimiter: '\t',
                    comment: None,
                    header: false,
                    taxid_column: None,
                    nodes: vec![NodeMapping {
                        label: ident("Word"),
                        key: column("value", 0),
                        properties: Vec::new(),
                    }],
                    relationships: Vec::new(),
                },
            },
        ],
        batch_size: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_is_case_insensitive() {
        assert_eq!(RunMode::parse("TEST"), RunMode::Test);
        assert_eq!(RunMode::parse("prod"), RunMode::Prod);
        assert_eq!(RunMode::parse("anything"), RunMode::Prod);
    }

    #[test]
    fn default_pipeline_resolves() {
        let resolved = ConfigLoader::resolve_config(default_pipeline()).unwrap();
        let names = resolved
            .datasources
            .iter()
            .map(|source| source.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["ncbigene", "bigwordlist", "ensembl", "refseq", "uniprot"]
        );
        assert_eq!(resolved.parsers.len(), 2);
    }
}
