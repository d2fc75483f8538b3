//! Error types for the dataset pipeline.
//!
//! Every variant is fatal for the run that produced it. Data-quality
//! filtering (rejected documents, rows with missing values, subjects whose
//! codes are all rare) is never reported through this type; those cases are
//! counted in the stage statistics instead.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline-wide result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The corpus root or one of its documents could not be read.
    #[error("cannot read corpus path {path}: {source}")]
    CorpusRead {
        /// Directory or document that failed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A raw code was shorter than the prefix length of its namespace and the
    /// short-code policy is `reject`.
    #[error(
        "malformed code {code:?} in {table} row {row}: shorter than {prefix_length} characters"
    )]
    MalformedCode {
        /// Table the row came from
        table: String,
        /// 1-based data row number (header excluded)
        row: u64,
        /// Raw code value
        code: String,
        /// Prefix length configured for the namespace
        prefix_length: usize,
    },

    /// Assembly retained no example at all.
    #[error("dataset is empty: {considered} documents considered, none retained")]
    EmptyDataset {
        /// Number of corpus documents examined
        considered: usize,
    },

    /// True and predicted label matrices disagree in shape.
    #[error("shape mismatch: {what} expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which operand was wrong
        what: &'static str,
        /// Expected (examples, labels)
        expected: (usize, usize),
        /// Actual (examples, labels)
        actual: (usize, usize),
    },

    /// A coded-event table could not be read or lacks a required column.
    #[error("coded table {table}: {reason}")]
    CodeTable {
        /// Table path
        table: String,
        /// Detailed reason for failure
        reason: String,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An artifact could not be written or read back.
    #[error("artifact {path}: {reason}")]
    Artifact {
        /// Artifact path
        path: PathBuf,
        /// Detailed reason for failure
        reason: String,
    },

    /// A persisted vocabulary violates the id invariants.
    #[error("vocabulary snapshot is inconsistent: {0}")]
    VocabularyFormat(String),

    /// A prediction or label matrix file is malformed.
    #[error("matrix {path} row {row}: {reason}")]
    Matrix {
        /// Matrix file path
        path: PathBuf,
        /// 1-based row number
        row: usize,
        /// Detailed reason for failure
        reason: String,
    },
}

impl PipelineError {
    pub(crate) fn corpus(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CorpusRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_code_message_names_row() {
        let err = PipelineError::MalformedCode {
            table: "DIAGNOSES_ICD.csv".to_string(),
            row: 17,
            code: "25".to_string(),
            prefix_length: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("DIAGNOSES_ICD.csv"));
        assert!(msg.contains("row 17"));
        assert!(msg.contains("\"25\""));
    }

    #[test]
    fn test_corpus_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PipelineError::corpus("/data/train", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/data/train"));
    }
}
