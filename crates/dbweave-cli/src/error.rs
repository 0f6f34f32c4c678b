use std::path::PathBuf;

use dbweave_core::QueryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("manifest rejected:\n  {}", problems.join("\n  "))]
    Rejected { problems: Vec<String> },

    #[error("query endpoint: {0}")]
    Endpoint(#[from] QueryError),

    #[error("runtime: {0}")]
    Runtime(std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status: 2 for a manifest that does not validate, 1 for
    /// everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Manifest { .. } | Self::Rejected { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_manifest_lists_every_problem() {
        let error = CliError::Rejected {
            problems: vec!["a: unknown property".into(), "b: cycle".into()],
        };
        assert_eq!(
            error.to_string(),
            "manifest rejected:\n  a: unknown property\n  b: cycle"
        );
        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            CliError::Endpoint(QueryError::Transport("refused".into())).exit_code(),
            1
        );
    }
}
