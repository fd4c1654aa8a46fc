use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::orchestrator::RemeshStage;

/// Boxed error returned by the export and import collaborators
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can abort a remesh invocation
#[derive(Debug, Error)]
pub enum RemeshError {
    #[error("invalid remesh options: {0}")]
    InvalidOptions(String),

    #[error("unsupported platform '{0}' (expected linux, macos or windows)")]
    UnsupportedPlatform(String),

    #[error("remeshing executable not found or not executable: {}", path.display())]
    MissingExecutable { path: PathBuf },

    #[error("failed to create temporary workspace: {0}")]
    WorkspaceFailed(#[source] std::io::Error),

    #[error("failed to export mesh to {}: {source}", path.display())]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: CollaboratorError,
    },

    #[error("failed to launch {}: {message}", path.display())]
    LaunchFailed { path: PathBuf, message: String },

    #[error("remesher exited with {}", describe_exit(*code))]
    ToolReportedFailure { code: Option<i32> },

    #[error("remesher did not finish within {after:?} and was killed")]
    ToolTimedOut { after: Duration },

    #[error("failed to import remeshed mesh from {}: {source}", path.display())]
    ImportFailed {
        path: PathBuf,
        #[source]
        source: CollaboratorError,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl RemeshError {
    /// Stage of the invocation this error aborts
    pub fn stage(&self) -> RemeshStage {
        match self {
            RemeshError::InvalidOptions(_)
            | RemeshError::WorkspaceFailed(_)
            | RemeshError::ExportFailed { .. } => RemeshStage::Exporting,
            RemeshError::UnsupportedPlatform(_) | RemeshError::MissingExecutable { .. } => {
                RemeshStage::Resolving
            }
            RemeshError::LaunchFailed { .. }
            | RemeshError::ToolReportedFailure { .. }
            | RemeshError::ToolTimedOut { .. } => RemeshStage::Running,
            RemeshError::ImportFailed { .. } => RemeshStage::Importing,
        }
    }
}

/// A temp file that could not be deleted. Logged, never escalated.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: std::io::Error,
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not remove temporary file {}: {}",
            self.path.display(),
            self.error
        )
    }
}
