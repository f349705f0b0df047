//! Pipeline error types
//!
//! Three tiers, matching how far a failure is allowed to travel:
//!
//! - [`ExtractionError`]: structural problems in the path or filename phase.
//!   Caught at the phase boundary; the file is still processed.
//! - [`CoercionError`]: a single field could not be typed. Never propagated
//!   past the record builder, which keeps the raw value under `nonparsed_*`.
//! - [`PipelineError`]: fatal for the current file only.

use thiserror::Error;

/// Structural extraction error (path or filename phase)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Unexpected folder depth: expected {expected} segments, got {actual}")]
    PathDepth { expected: usize, actual: usize },

    #[error("File name '{file_name}' must contain exactly one '.', found {dots}")]
    FileNameDots { file_name: String, dots: usize },

    #[error("No filename extraction rules for suffix '{0}'")]
    UnknownSuffix(String),

    #[error("Unexpected file name segment count: expected {expected}, got {actual}")]
    SegmentCount { expected: usize, actual: usize },
}

impl ExtractionError {
    /// Stable identifier used as the `error_kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::PathDepth { .. } => "path_depth",
            ExtractionError::FileNameDots { .. } => "file_name_dots",
            ExtractionError::UnknownSuffix(_) => "unknown_suffix",
            ExtractionError::SegmentCount { .. } => "segment_count",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    #[error("Unparseable date value: '{0}'")]
    UnparseableDate(String),
}

/// Validation errors for the extraction rule document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("parserVersion must not be empty")]
    MissingParserVersion,

    #[error("{section}: position {position} is out of range 1..={len}")]
    PositionOutOfRange {
        section: String,
        position: u32,
        len: usize,
    },

    #[error("fileNameExtractionSpec: suffix '{0}' must be lowercase and non-empty")]
    InvalidSuffix(String),

    #[error("fileContentExtractionSpec: rule #{index} has an empty {field}")]
    EmptyContentRule { index: usize, field: &'static str },

    #[error("fileContentExtractionSpec: duplicate propertyKey '{0}'")]
    DuplicatePropertyKey(String),

    #[error("Failed to parse extraction spec: {0}")]
    Parse(String),
}

/// File-fatal errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Unknown system code '{0}'")]
    UnknownSystemCode(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Metadata sink error: {0:#}")]
    Sink(anyhow::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
