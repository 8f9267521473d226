use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{ProgressEvent, ProgressSink, RefreshRecord, RunReport};
use crate::store::Metadata;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub datasources: Vec<RefreshRecord>,
}

#[derive(Debug, Serialize)]
pub struct ListResult {
    pub releases: Vec<Metadata>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable summaries; progress events go to stderr.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_run(result: &RunReport) {
        let green = "\x1b[32m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}biodatagraph summary{reset}");
        for record in &result.refreshed {
            println!("  {} {:?}", record.datasource, record.action);
        }
        for parser in &result.parsers {
            println!("{green}  {} {}{reset}", parser.parser, parser.inventory);
        }
        let nodes: usize = result.load.nodes.iter().map(|set| set.records).sum();
        let relationships: usize = result.load.relationships.iter().map(|set| set.records).sum();
        println!(
            "{cyan}  {} indexes, {nodes} nodes, {relationships} relationships{reset}",
            result.load.indexes
        );
    }

    pub fn print_check(result: &CheckResult) {
        for record in &result.datasources {
            println!("{} {:?}", record.datasource, record.action);
        }
    }

    pub fn print_list(result: &ListResult) {
        if result.releases.is_empty() {
            println!("no local releases");
        }
        for meta in &result.releases {
            println!(
                "{} {} ({} files, {})",
                meta.source,
                meta.version,
                meta.files.len(),
                meta.downloaded_at
            );
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
