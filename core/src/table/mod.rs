//! CSV game tables and the rules-script validator.

pub mod file;
pub mod reader;
pub mod rules;

use std::io;

pub use file::TableEntry;
pub use rules::RuleViolation;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed CSV in {path}: {message} (line {line})")]
    Malformed {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Cannot serialize {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no header row")]
    MissingHeader { path: String },

    #[error("{path} has no column \"{column}\"; available columns: {available:?}")]
    MissingColumn {
        path: String,
        column: String,
        available: Vec<String>,
    },

    #[error("{path} row {row}: id {id} is not unique")]
    DuplicateId { path: String, row: usize, id: String },

    #[error("Failed to replace {path}: {source}")]
    Backup {
        path: String,
        #[source]
        source: crate::backup::BackupError,
    },
}

pub type TableResult<T> = Result<T, TableError>;
