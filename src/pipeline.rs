//! The ingestion driver.
//!
//! One run has three strictly ordered stages:
//!
//! 1. refresh: every datasource whose local copy is not the latest release is fetched;
//! 2. parse: parsers run in declaration order and completed ones enter the ledger;
//! 3. load: indexes for all merge keys and endpoints, then all node-sets, then all
//!    relationship-sets, each pass spanning the whole ledger.
//!
//! Any failure ends the run. Nothing is loaded unless every parser completed,
//! and nothing already written to disk or to the graph is rolled back.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{FetchPlan, ResolvedPipeline};
use crate::container::{Container, IndexSpec, Inventory, NodeSet, RelationshipSet};
use crate::domain::Taxid;
use crate::error::BiographError;
use crate::graph::{GraphStore, WriteStats};
use crate::http::Fetcher;
use crate::parser::{Parser, RunParams};
use crate::sources::{Datasource, FetchRequest, ReleaseDatasource};
use crate::store::Store;
use crate::tabular::TabularParser;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String, elapsed: Option<Duration>) {
    sink.event(ProgressEvent { message, elapsed });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Index,
    Nodes,
    Relationships,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Index => write!(f, "index creation"),
            LoadPhase::Nodes => write!(f, "node creation"),
            LoadPhase::Relationships => write!(f, "relationship creation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    NotRun,
    Running,
    Completed,
    Failed,
}

pub struct DatasourceStep {
    source: Box<dyn Datasource>,
    plan: FetchPlan,
    taxids: Vec<Taxid>,
}

impl DatasourceStep {
    pub fn new(source: impl Datasource + 'static) -> Self {
        Self {
            source: Box::new(source),
            plan: FetchPlan::Latest,
            taxids: Vec::new(),
        }
    }

    pub fn with_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_taxids(mut self, taxids: Vec<Taxid>) -> Self {
        self.taxids = taxids;
        self
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

pub struct ParserStep {
    parser: Box<dyn Parser>,
    taxid: Option<Taxid>,
    after: Vec<String>,
    state: ParserState,
}

impl ParserStep {
    pub fn new(parser: impl Parser + 'static) -> Self {
        Self {
            parser: Box::new(parser),
            taxid: None,
            after: Vec::new(),
            state: ParserState::NotRun,
        }
    }

    pub fn with_taxid(mut self, taxid: Option<Taxid>) -> Self {
        self.taxid = taxid;
        self
    }

    /// Declares parsers whose entities this one links to; they must be listed earlier.
    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        self.parser.name()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }
}

#[derive(Debug)]
pub struct CompletedParser {
    pub name: String,
    pub container: Container,
}

/// Parsers that completed in this run, in execution order.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<CompletedParser>,
}

impl Ledger {
    pub fn entries(&self) -> &[CompletedParser] {
        &self.entries
    }

    fn push(&mut self, name: String, container: Container) {
        self.entries.push(CompletedParser { name, container });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshAction {
    Current,
    Stale,
    Fetched,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRecord {
    pub datasource: String,
    pub action: RefreshAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParserReport {
    pub parser: String,
    pub inventory: Inventory,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLoad {
    pub parser: String,
    pub set: String,
    pub records: usize,
    pub created: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub indexes: usize,
    pub nodes: Vec<SetLoad>,
    pub relationships: Vec<SetLoad>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub refreshed: Vec<RefreshRecord>,
    pub parsers: Vec<ParserReport>,
    pub load: LoadSummary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub skip_refresh: bool,
}

pub struct PipelineBuilder {
    root: Utf8PathBuf,
    datasources: Vec<DatasourceStep>,
    parsers: Vec<ParserStep>,
}

impl PipelineBuilder {
    pub fn datasource(mut self, step: DatasourceStep) -> Self {
        self.datasources.push(step);
        self
    }

    pub fn parser(mut self, step: ParserStep) -> Self {
        self.parsers.push(step);
        self
    }

    /// Rejects duplicate parser names and dependencies that are not declared earlier.
    pub fn build(self) -> Result<Pipeline, BiographError> {
        let mut declared: Vec<&str> = Vec::with_capacity(self.parsers.len());
        for step in &self.parsers {
            let name = step.name();
            if declared.contains(&name) {
                return Err(BiographError::DuplicateParser(name.to_string()));
            }
            if let Some(dependency) = step
                .after
                .iter()
                .find(|dependency| !declared.contains(&dependency.as_str()))
            {
                return Err(BiographError::ParserOrder {
                    parser: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            declared.push(name);
        }

        Ok(Pipeline {
            root: self.root,
            datasources: self.datasources,
            parsers: self.parsers,
        })
    }
}

pub struct Pipeline {
    root: Utf8PathBuf,
    datasources: Vec<DatasourceStep>,
    parsers: Vec<ParserStep>,
}

impl Pipeline {
    pub fn builder(root: Utf8PathBuf) -> PipelineBuilder {
        PipelineBuilder {
            root,
            datasources: Vec::new(),
            parsers: Vec::new(),
        }
    }

    /// Wires configured datasources and tabular parsers over one store and fetcher.
    pub fn from_resolved<F>(
        resolved: &ResolvedPipeline,
        store: &Store,
        fetcher: F,
    ) -> Result<Self, BiographError>
    where
        F: Fetcher + Clone + 'static,
    {
        let mut builder = Self::builder(store.root().to_path_buf());
        for request in &resolved.datasources {
            let source = ReleaseDatasource::from_request(request, store.clone(), fetcher.clone())?;
            builder = builder.datasource(
                DatasourceStep::new(source)
                    .with_plan(request.fetch)
                    .with_taxids(request.taxids.clone()),
            );
        }
        for request in &resolved.parsers {
            let parser = TabularParser::new(
                request.name.clone(),
                request.datasource.clone(),
                request.layout.clone(),
            );
            builder = builder.parser(
                ParserStep::new(parser)
                    .with_taxid(request.taxid.clone())
                    .after(request.after.iter().cloned()),
            );
        }
        builder.build()
    }

    pub fn parser_states(&self) -> Vec<(&str, ParserState)> {
        self.parsers
            .iter()
            .map(|step| (step.name(), step.state()))
            .collect()
    }

    /// Reports which datasources are stale without fetching anything.
    pub fn check(&self, sink: &dyn ProgressSink) -> Result<Vec<RefreshRecord>, BiographError> {
        let mut records = Vec::with_capacity(self.datasources.len());
        for step in &self.datasources {
            let current = is_current(step)?;
            let action = if current {
                RefreshAction::Current
            } else {
                RefreshAction::Stale
            };
            emit(
                sink,
                format!("phase=Check; {} {:?}", step.name(), action),
                None,
            );
            records.push(RefreshRecord {
                datasource: step.name().to_string(),
                action,
            });
        }
        Ok(records)
    }

    /// Fetches every datasource whose local copy is not the latest release.
    pub fn refresh(&self, sink: &dyn ProgressSink) -> Result<Vec<RefreshRecord>, BiographError> {
        let mut records = Vec::with_capacity(self.datasources.len());
        for step in &self.datasources {
            let name = step.name();
            if is_current(step)? {
                info!(datasource = name, "latest release already present");
                emit(sink, format!("phase=Refresh; {name} is current"), None);
                records.push(RefreshRecord {
                    datasource: name.to_string(),
                    action: RefreshAction::Current,
                });
                continue;
            }

            info!(datasource = name, "downloading");
            emit(sink, format!("phase=Refresh; downloading {name}"), None);
            let start = Instant::now();
            let wrap = |source: BiographError| BiographError::DownloadFailed {
                datasource: name.to_string(),
                source: Box::new(source),
            };
            let version = match step.plan {
                FetchPlan::Latest => None,
                FetchPlan::RemoteVersion => {
                    Some(step.source.latest_remote_version().map_err(wrap)?)
                }
            };
            let request = FetchRequest {
                version,
                taxids: step.taxids.clone(),
            };
            step.source.fetch(&request).map_err(wrap)?;
            emit(
                sink,
                format!("phase=Refresh; downloaded {name}"),
                Some(start.elapsed()),
            );
            records.push(RefreshRecord {
                datasource: name.to_string(),
                action: RefreshAction::Fetched,
            });
        }
        Ok(records)
    }

    /// Runs every parser in order; the first failure aborts the run.
    pub fn run_parsers(&mut self, sink: &dyn ProgressSink) -> Result<Ledger, BiographError> {
        for step in &mut self.parsers {
            step.state = ParserState::NotRun;
        }

        let mut ledger = Ledger::default();
        for step in &mut self.parsers {
            let name = step.name().to_string();
            info!(parser = %name, "running parser");
            emit(sink, format!("phase=Parse; running {name}"), None);
            step.state = ParserState::Running;
            let params = RunParams {
                root: self.root.clone(),
                taxid: step.taxid.clone(),
            };
            let start = Instant::now();
            match step.parser.run(&params) {
                Ok(container) => {
                    step.state = ParserState::Completed;
                    let inventory = container.inventory();
                    info!(parser = %name, %inventory, "parser completed");
                    emit(
                        sink,
                        format!("phase=Parse; {name} {inventory}"),
                        Some(start.elapsed()),
                    );
                    ledger.push(name, container);
                }
                Err(err) => {
                    step.state = ParserState::Failed;
                    warn!(parser = %name, error = %err, "parser failed");
                    return Err(BiographError::ParseFailed {
                        parser: name,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(ledger)
    }

    /// Three passes over the whole ledger: indexes, nodes, relationships.
    pub fn load(
        ledger: Ledger,
        graph: &dyn GraphStore,
        sink: &dyn ProgressSink,
    ) -> Result<LoadSummary, BiographError> {
        let mut summary = LoadSummary::default();

        let start = Instant::now();
        // Each index once, attributed to the first parser that needs it.
        let mut indexes: BTreeMap<IndexSpec, &str> = BTreeMap::new();
        for entry in ledger.entries() {
            let merge_keys = entry.container.node_sets().iter().map(NodeSet::index_spec);
            let endpoints = entry
                .container
                .relationship_sets()
                .iter()
                .flat_map(RelationshipSet::index_specs);
            for index in merge_keys.chain(endpoints) {
                indexes.entry(index).or_insert(entry.name.as_str());
            }
        }
        for (index, parser) in &indexes {
            graph
                .create_index(index)
                .map_err(|err| load_error(parser, LoadPhase::Index, index, err))?;
            summary.indexes += 1;
        }
        info!(indexes = summary.indexes, "indexes ensured");
        emit(
            sink,
            format!("phase=Load; {} indexes ensured", summary.indexes),
            Some(start.elapsed()),
        );

        let start = Instant::now();
        for entry in ledger.entries() {
            for set in entry.container.node_sets() {
                let stats = graph
                    .create_nodes(set)
                    .map_err(|err| load_error(&entry.name, LoadPhase::Nodes, set.label(), err))?;
                info!(parser = %entry.name, label = %set.label(), records = stats.records, created = stats.created, "nodes merged");
                summary
                    .nodes
                    .push(set_load(&entry.name, set.label(), stats));
            }
        }
        emit(
            sink,
            format!("phase=Load; {} node-sets merged", summary.nodes.len()),
            Some(start.elapsed()),
        );

        let start = Instant::now();
        for entry in ledger.entries() {
            for set in entry.container.relationship_sets() {
                let stats = graph.create_relationships(set).map_err(|err| {
                    load_error(&entry.name, LoadPhase::Relationships, set, err)
                })?;
                info!(parser = %entry.name, set = %set, records = stats.records, created = stats.created, "relationships merged");
                summary.relationships.push(set_load(&entry.name, set, stats));
            }
        }
        emit(
            sink,
            format!(
                "phase=Load; {} relationship-sets merged",
                summary.relationships.len()
            ),
            Some(start.elapsed()),
        );

        Ok(summary)
    }

    pub fn run(
        &mut self,
        graph: &dyn GraphStore,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, BiographError> {
        let refreshed = if options.skip_refresh {
            emit(sink, "phase=Refresh; skipped".to_string(), None);
            Vec::new()
        } else {
            self.refresh(sink)?
        };

        let ledger = self.run_parsers(sink)?;
        let parsers = ledger
            .entries()
            .iter()
            .map(|entry| ParserReport {
                parser: entry.name.clone(),
                inventory: entry.container.inventory(),
            })
            .collect();

        let load = Self::load(ledger, graph, sink)?;

        Ok(RunReport {
            refreshed,
            parsers,
            load,
        })
    }
}

fn is_current(step: &DatasourceStep) -> Result<bool, BiographError> {
    step.source
        .has_latest_local_copy()
        .map_err(|source| BiographError::DownloadFailed {
            datasource: step.name().to_string(),
            source: Box::new(source),
        })
}

fn load_error(
    parser: &str,
    phase: LoadPhase,
    set: &dyn fmt::Display,
    source: BiographError,
) -> BiographError {
    BiographError::LoadFailed {
        parser: parser.to_string(),
        phase,
        set: set.to_string(),
        source: Box::new(source),
    }
}

fn set_load(parser: &str, set: &dyn fmt::Display, stats: WriteStats) -> SetLoad {
    SetLoad {
        parser: parser.to_string(),
        set: set.to_string(),
        records: stats.records,
        created: stats.created,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    struct Named(&'static str);

    impl Parser for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&mut self, _params: &RunParams) -> Result<Container, BiographError> {
            Ok(Container::new())
        }
    }

    #[test]
    fn dependency_must_be_declared_first() {
        let err = Pipeline::builder(Utf8PathBuf::from("/data"))
            .parser(ParserStep::new(Named("uniprot")).after(["ncbigene"]))
            .parser(ParserStep::new(Named("ncbigene")))
            .build()
            .err()
            .unwrap();
        assert_matches!(
            err,
            BiographError::ParserOrder { parser, dependency }
                if parser == "uniprot" && dependency == "ncbigene"
        );
    }

    #[test]
    fn duplicate_parser_is_rejected() {
        let err = Pipeline::builder(Utf8PathBuf::from("/data"))
            .parser(ParserStep::new(Named("ncbigene")))
            .parser(ParserStep::new(Named("ncbigene")))
            .build()
            .err()
            .unwrap();
        assert_matches!(err, BiographError::DuplicateParser(name) if name == "ncbigene");
    }

    #[test]
    fn load_phase_names_read_as_prose() {
        assert_eq!(LoadPhase::Relationships.to_string(), "relationship creation");
    }
}
