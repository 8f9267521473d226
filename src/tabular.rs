//! Column-to-graph mapping for delimited text releases.
//!
//! A [`TableLayout`] says which file of a datasource release to read and how
//! its columns become nodes and relationships. Files ending in `.gz` are
//! decompressed on the fly. Empty cells and `-` are treated as missing.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::container::{Container, Endpoint, Properties};
use crate::domain::Identifier;
use crate::error::BiographError;
use crate::parser::{Parser, RunParams};
use crate::sources::latest_local_dir;
use crate::store::Store;

fn default_delimiter() -> char {
    '\t'
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PropertyColumn {
    pub name: Identifier,
    pub column: usize,
    #[serde(default)]
    pub split: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeMapping {
    pub label: Identifier,
    /// Merge key; with `split` set, one node is produced per value.
    pub key: PropertyColumn,
    #[serde(default)]
    pub properties: Vec<PropertyColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointMapping {
    pub label: Identifier,
    pub key: Identifier,
    pub column: usize,
    #[serde(default)]
    pub split: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelationshipMapping {
    #[serde(rename = "type")]
    pub rel_type: Identifier,
    pub start: EndpointMapping,
    pub end: EndpointMapping,
    #[serde(default)]
    pub properties: Vec<PropertyColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableLayout {
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub taxid_column: Option<usize>,
    #[serde(default)]
    pub nodes: Vec<NodeMapping>,
    #[serde(default)]
    pub relationships: Vec<RelationshipMapping>,
}

pub struct TabularParser {
    name: String,
    datasource: String,
    layout: TableLayout,
}

impl TabularParser {
    pub fn new(name: impl Into<String>, datasource: impl Into<String>, layout: TableLayout) -> Self {
        Self {
            name: name.into(),
            datasource: datasource.into(),
            layout,
        }
    }

    /// Maps every data row of `path` into a container.
    pub fn parse_file(&self, path: &Utf8Path, params: &RunParams) -> Result<Container, BiographError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| BiographError::Filesystem(format!("open {path}: {err}")))?;
        let reader: Box<dyn Read> = if path.as_str().ends_with(".gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        self.parse_reader(BufReader::new(reader), path.as_str(), params)
    }

    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
        source: &str,
        params: &RunParams,
    ) -> Result<Container, BiographError> {
        let layout = &self.layout;
        let mut container = Container::new();
        let mut seen = vec![HashSet::<String>::new(); layout.nodes.len()];
        let mut header_pending = layout.header;
        let mut rows = 0usize;

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|err| BiographError::MalformedRecord {
                file: source.to_string(),
                line: line_no,
                message: err.to_string(),
            })?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(prefix) = layout.comment.as_deref() {
                if line.starts_with(prefix) {
                    continue;
                }
            }
            if header_pending {
                header_pending = false;
                continue;
            }

            let row = Row {
                cells: line.split(layout.delimiter).collect(),
                source,
                line: line_no,
            };

            if let (Some(taxid), Some(column)) = (&params.taxid, layout.taxid_column) {
                if row.cell(column)?.trim() != taxid.as_str() {
                    continue;
                }
            }
            rows += 1;

            for (mapping, seen) in layout.nodes.iter().zip(seen.iter_mut()) {
                for key in row.values(mapping.key.column, mapping.key.split.as_deref())? {
                    if !seen.insert(key.to_string()) {
                        continue;
                    }
                    let mut properties = row.properties(&mapping.properties)?;
                    properties.insert(mapping.key.name.to_string(), Value::from(key));
                    container
                        .node_set_mut(&mapping.label, &mapping.key.name)
                        .add_node(properties)?;
                }
            }

            for mapping in &layout.relationships {
                let starts = row.values(mapping.start.column, mapping.start.split.as_deref())?;
                let ends = row.values(mapping.end.column, mapping.end.split.as_deref())?;
                if starts.is_empty() || ends.is_empty() {
                    continue;
                }
                let properties = row.properties(&mapping.properties)?;
                let set = container.relationship_set_mut(
                    &mapping.rel_type,
                    &Endpoint::new(mapping.start.label.clone(), mapping.start.key.clone()),
                    &Endpoint::new(mapping.end.label.clone(), mapping.end.key.clone()),
                );
                for start in &starts {
                    for end in &ends {
                        set.add_relationship(*start, *end, properties.clone());
                    }
                }
            }
        }

        debug!(parser = %self.name, source, rows, "mapped rows");
        Ok(container)
    }
}

impl Parser for TabularParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, params: &RunParams) -> Result<Container, BiographError> {
        let store = Store::new(params.root.clone());
        let dir = latest_local_dir(&store, &self.datasource)?;
        let path = dir.join(&self.layout.file);
        self.parse_file(&path, params)
    }
}

struct Row<'a> {
    cells: Vec<&'a str>,
    source: &'a str,
    line: usize,
}

impl<'a> Row<'a> {
    fn cell(&self, column: usize) -> Result<&'a str, BiographError> {
        self.cells
            .get(column)
            .copied()
            .ok_or_else(|| BiographError::MalformedRecord {
                file: self.source.to_string(),
                line: self.line,
                message: format!("expected at least {} columns, found {}", column + 1, self.cells.len()),
            })
    }

    fn values(&self, column: usize, split: Option<&str>) -> Result<Vec<&'a str>, BiographError> {
        let cell = self.cell(column)?;
        let parts: Vec<&'a str> = match split {
            Some(separator) if !separator.is_empty() => cell.split(separator).collect(),
            _ => vec![cell],
        };
        Ok(parts
            .into_iter()
            .map(str::trim)
            .filter(|value| is_present(value))
            .collect())
    }

    fn properties(&self, columns: &[PropertyColumn]) -> Result<Properties, BiographError> {
        let mut properties = Properties::new();
        for column in columns {
            let values = self.values(column.column, column.split.as_deref())?;
            let value = match (&column.split, values.as_slice()) {
                (_, []) => continue,
                (Some(_), values) => Value::from(values.to_vec()),
                (None, [single, ..]) => Value::from(*single),
            };
            properties.insert(column.name.to_string(), value);
        }
        Ok(properties)
    }
}

fn is_present(value: &str) -> bool {
    !value.is_empty() && value != "-"
}
