use camino::Utf8PathBuf;

use crate::container::Container;
use crate::domain::Taxid;
use crate::error::BiographError;

/// Parameters bound to a parser for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub root: Utf8PathBuf,
    pub taxid: Option<Taxid>,
}

/// Turns the local copy of a datasource into graph-ready records.
pub trait Parser {
    fn name(&self) -> &str;
    fn run(&mut self, params: &RunParams) -> Result<Container, BiographError>;
}

impl<P: Parser + ?Sized> Parser for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&mut self, params: &RunParams) -> Result<Container, BiographError> {
        (**self).run(params)
    }
}
