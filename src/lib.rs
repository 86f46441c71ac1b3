//! WordNet dictionary: WNDB ingestion into SQLite plus lemma queries over
//! a library API, an HTTP JSON API and a CLI.

// Declare modules
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod http;
pub mod ingest;
pub mod lines;
pub mod models;
pub mod parse;
pub mod progress;
pub mod query;
pub mod relations;

// Re-export key types for easier use
pub use db::{FlushStats, RowCounts, Store};
pub use error::{Result, WnError};
pub use ingest::{
    DEFAULT_BATCH_SIZE, ImportOptions, ImportSummary, Importer, IndexWordImporter, SynsetImporter,
};
pub use models::{
    AntonymEntry, IndexEntry, LemmaEntry, PartOfSpeech, RelatedEntry, SenseRecord, SynonymEntry,
};
pub use parse::normalize_lemma;
pub use query::QueryService;
pub use relations::RelationType;
