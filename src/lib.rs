pub mod config;
pub mod container;
pub mod domain;
pub mod error;
pub mod graph;
pub mod http;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod tabular;
