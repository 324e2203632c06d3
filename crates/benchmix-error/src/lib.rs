//! Workspace-wide error type for the benchmix experiment pipeline.
//!
//! The taxonomy mirrors how failures propagate through a batch run:
//! per-item problems (one file, one benchmark, one branch) are logged and
//! skipped by the caller, while configuration problems abort the whole
//! invocation. Every variant carries enough context (path, token, value)
//! to be actionable from a log line alone.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, BenchmixError>;

/// Error type shared by all benchmix crates.
#[derive(Debug, Error)]
pub enum BenchmixError {
    /// Filesystem operation failed; `path` identifies the target.
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact exists but cannot be decoded (corrupt JSON, wrong shape,
    /// unexpected schema version).
    #[error("malformed artifact {path}: {message}")]
    MalformedArtifact { path: PathBuf, message: String },

    /// Host CPU topology could not be read; callers fall back to a naive
    /// partition instead of failing the run.
    #[error("cpu topology unavailable: {0}")]
    Topology(String),

    /// Project id not present in the registry.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// Branch name not present in the project's branch list.
    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    /// A branch-directory token did not match either the plain-base or the
    /// `{base}_{BUG}_{method}_{line}` shape.
    #[error("invalid branch token {token:?}: {reason}")]
    InvalidBranchToken { token: String, reason: String },

    /// Lookup of an injected method against the common-methods table failed.
    /// This is a caller error: the table and the injection target disagree.
    #[error("method {method} line {line} not present in common-methods table")]
    MethodNotFound { method: String, line: u32 },

    /// Invalid caller-supplied configuration (bad flag value, empty job
    /// list, inconsistent branch set, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invariant violation inside the pipeline itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BenchmixError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Artifact decode failure at `path`.
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Configuration error from a plain message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Internal invariant violation from a plain message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error should abort the whole invocation rather than be
    /// logged and skipped inside a batch loop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownProject(_)
                | Self::UnknownBranch(_)
                | Self::InvalidBranchToken { .. }
                | Self::MethodNotFound { .. }
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_variant_carries_path_in_message() {
        let error = BenchmixError::io(
            "/tmp/results/bench.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let rendered = error.to_string();
        assert!(rendered.contains("/tmp/results/bench.json"), "{rendered}");
    }

    #[test]
    fn configuration_errors_are_fatal_and_artifact_errors_are_not() {
        assert!(BenchmixError::config("bad flag").is_fatal());
        assert!(BenchmixError::UnknownProject("nope".to_owned()).is_fatal());
        assert!(
            !BenchmixError::malformed("/tmp/x.json", "truncated").is_fatal(),
            "malformed artifacts are skipped per item, not fatal"
        );
        assert!(!BenchmixError::Topology("no sysfs".to_owned()).is_fatal());
    }

    #[test]
    fn invalid_branch_token_message_names_the_token() {
        let error = BenchmixError::InvalidBranchToken {
            token: "jmh_HWO_only".to_owned(),
            reason: "expected 1 or 4 underscore-separated fields".to_owned(),
        };
        assert!(error.to_string().contains("jmh_HWO_only"));
    }
}
