use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SizeError {
    #[error("download request failed: {0}")]
    FetchHttp(String),

    #[error("download of {url} returned status {status}: {message}")]
    FetchStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("NCBI taxonomy request failed: {0}")]
    TaxonomyHttp(String),

    #[error("NCBI taxonomy returned status {status}: {message}")]
    TaxonomyStatus { status: u16, message: String },

    #[error("failed to parse NCBI taxonomy response: {0}")]
    TaxonomyParse(String),

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("sizes table not found: {0}")]
    #[diagnostic(help("build one with sizemeup-build or point --sizes / SIZEMEUP_SIZES at an existing table"))]
    MissingTable(PathBuf),

    #[error("malformed row at {path}:{line}: expected {expected} columns, found {found}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("missing column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid number '{value}' in column '{column}' of {path}")]
    InvalidNumber {
        path: PathBuf,
        column: String,
        value: String,
    },

    #[error("invalid size source: {0}")]
    InvalidSource(String),

    #[error("invalid chunk size {requested}: must be between 1 and {max}")]
    InvalidChunkSize { requested: usize, max: usize },

    #[error("invalid classification file {path}: {message}")]
    ClassificationFile { path: PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("missing required setting: {0}")]
    #[diagnostic(help("set it in sizemeup.json or pass the matching command-line flag"))]
    MissingSetting(String),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
