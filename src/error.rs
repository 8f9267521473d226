use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::pipeline::LoadPhase;

#[derive(Debug, Error, Diagnostic)]
pub enum BiographError {
    #[error("invalid version identifier: {0}")]
    InvalidVersion(String),

    #[error("invalid taxonomic identifier: {0}")]
    InvalidTaxid(String),

    #[error("invalid graph identifier: {0}")]
    InvalidIdentifier(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error("parser {parser} must run after {dependency}, which is not declared before it")]
    #[diagnostic(help("reorder the parsers so entity parsers come before mapping parsers"))]
    ParserOrder { parser: String, dependency: String },

    #[error("parser {0} is declared more than once")]
    DuplicateParser(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("could not resolve remote version: {0}")]
    VersionResolution(String),

    #[error("no local copy of datasource {0}")]
    NoLocalCopy(String),

    #[error("malformed record in {file} line {line}: {message}")]
    MalformedRecord {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{label} node is missing its merge key {key}")]
    MissingMergeKey { label: String, key: String },

    #[error("graph store rejected the request: {0}")]
    GraphRejected(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("download of datasource {datasource} failed")]
    DownloadFailed {
        datasource: String,
        #[source]
        source: Box<BiographError>,
    },

    #[error("parser {parser} failed")]
    ParseFailed {
        parser: String,
        #[source]
        source: Box<BiographError>,
    },

    #[error("{phase} failed for {set} from parser {parser}")]
    LoadFailed {
        parser: String,
        phase: LoadPhase,
        set: String,
        #[source]
        source: Box<BiographError>,
    },
}

impl BiographError {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BiographError::ConfigRead(_)
                | BiographError::ConfigParse(_)
                | BiographError::InvalidConfig(_)
                | BiographError::UnknownDatasource(_)
                | BiographError::ParserOrder { .. }
                | BiographError::DuplicateParser(_)
                | BiographError::InvalidTaxid(_)
                | BiographError::InvalidVersion(_)
                | BiographError::InvalidIdentifier(_)
        )
    }
}
