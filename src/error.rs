use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CurateError {
    #[error("dataset root is not configured (set dataset_root or pass --dataset-root)")]
    MissingDatasetRoot,

    #[error("sourcedata root is not configured (set sourcedata_root or pass --sourcedata-root)")]
    MissingSourcedataRoot,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(String),

    #[error("archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("scans file does not exist: {0}")]
    ScansMissing(PathBuf),

    #[error("failed to parse scans file {path}: {message}")]
    ScansParse { path: PathBuf, message: String },

    #[error("scans file {path} has no `{column}` column")]
    ScansColumnMissing { path: PathBuf, column: String },

    #[error("scans file has no row for {0}")]
    ScansRowMissing(String),

    #[error("invalid BIDS filename: {0}")]
    InvalidFilename(String),

    #[error("NIfTI error in {path}: {message}")]
    Nifti { path: PathBuf, message: String },

    #[error("failed to parse sidecar {path}: {message}")]
    SidecarParse { path: PathBuf, message: String },

    #[error("sidecar is not a JSON object: {0}")]
    NotAnObject(PathBuf),
}
