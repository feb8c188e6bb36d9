use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GraceError {
    #[error("invalid GRACE version {0:?}: expected \"v\" followed by two digits, e.g. \"v02\" or \"v03\"")]
    InvalidVersion(String),

    #[error("unknown GRACE feature: {0}")]
    UnknownFeature(String),

    #[error("unknown solution set: {0} (expected CSR, GFZ or JPL)")]
    UnknownSolutionSet(String),

    #[error("invalid model / release level: {0:?}")]
    InvalidModel(String),

    #[error("invalid file extension policy: {0:?}")]
    InvalidExtension(String),

    #[error("unrecognized operation: {0}")]
    #[diagnostic(help("use one of: search, fetch, organize, sync"))]
    UnknownOperation(String),

    #[error("missing config file grace-sync.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("{tool} failed (exit code {code:?}): {message}")]
    Transfer {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{tool} timed out after {secs}s")]
    TransferTimeout { tool: String, secs: u64 },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("malformed GRACE file name: {0}")]
    MalformedFilename(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("ingestion handoff failed: {0}")]
    Ingest(String),
}

impl GraceError {
    /// Configuration errors abort the run before any work is done.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GraceError::InvalidVersion(_)
                | GraceError::UnknownFeature(_)
                | GraceError::UnknownSolutionSet(_)
                | GraceError::InvalidModel(_)
                | GraceError::InvalidExtension(_)
                | GraceError::UnknownOperation(_)
                | GraceError::MissingConfig
                | GraceError::ConfigRead(_)
                | GraceError::ConfigParse(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GraceError::TransferTimeout { .. } => true,
            GraceError::Transfer {
                tool,
                code: Some(code),
                ..
            } => match tool.as_str() {
                "curl" => matches!(code, 5 | 6 | 7 | 18 | 28 | 35 | 52 | 55 | 56),
                "wget" => *code == 4,
                _ => false,
            },
            _ => false,
        }
    }
}
