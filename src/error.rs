//! Error taxonomy
//!
//! One error type for the whole library. Per-entry filter misses are not
//! errors by default; they are reported through [`crate::filter::Unmatched`].
//!
//! Author: Moroya Sakamoto

use std::path::PathBuf;

use thiserror::Error;

/// Library result alias
pub type Result<T> = std::result::Result<T, CurateError>;

/// Errors produced by parsing, configuration, filtering and optimization.
#[derive(Debug, Error)]
pub enum CurateError {
    /// Malformed move token or PGN structure.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based source line (0 when the input is a bare move sequence).
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A remove sequence did not resolve against the tree it was applied to.
    /// Only raised under [`crate::filter::UnmatchedPolicy::Strict`].
    #[error("filter entry `{sequence}` matched only {matched} of {total} plies")]
    UnresolvedFilterEntry {
        sequence: String,
        matched: usize,
        total: usize,
    },

    /// A game mixes `skip_variations`/`keep_variations` with
    /// `remove_variations`/`add_variations`.
    #[error("game {index}: legacy and current filter styles cannot be combined")]
    ConflictingInstruction { index: usize },

    /// The optimizer's post-hoc check failed. Never recoverable.
    #[error(
        "coverage invariant violated: {} missing, {} unexpected (first: {})",
        missing.len(),
        unexpected.len(),
        missing.first().or(unexpected.first()).map_or("-", String::as_str)
    )]
    CoverageInvariantViolation {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Configuration failed schema or semantic validation.
    #[error("invalid config{}: {message}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Config {
        path: Option<PathBuf>,
        message: String,
    },

    /// A 1-based game index outside the parsed game list.
    #[error("game index {index} out of range (source has {available} games)")]
    GameIndexOutOfRange { index: usize, available: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurateError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            path: None,
            message: message.into(),
        }
    }

    /// True for errors that signal a defect rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::CoverageInvariantViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = CurateError::parse(12, "unexpected `)`");
        assert_eq!(err.to_string(), "parse error at line 12: unexpected `)`");
    }

    #[test]
    fn test_config_error_without_path() {
        let err = CurateError::config("no colors");
        assert_eq!(err.to_string(), "invalid config: no colors");
    }

    #[test]
    fn test_config_error_with_path() {
        let err = CurateError::Config {
            path: Some(PathBuf::from("rep.toml")),
            message: String::from("no colors"),
        };
        assert_eq!(err.to_string(), "invalid config rep.toml: no colors");
    }

    #[test]
    fn test_coverage_violation_is_internal() {
        let err = CurateError::CoverageInvariantViolation {
            missing: vec![String::from("1.e4 c5")],
            unexpected: vec![],
        };
        assert!(err.is_internal());
        assert!(err.to_string().contains("1.e4 c5"));
        assert!(!CurateError::ConflictingInstruction { index: 3 }.is_internal());
    }
}
