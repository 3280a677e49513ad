//! Error types for merging variant streams into matrices.

use thiserror::Error;

/// Result type alias for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Exit status values from sysexits.h reported by the command-line tool
pub const EX_USAGE: u8 = 64;
pub const EX_DATAERR: u8 = 65;
pub const EX_NOINPUT: u8 = 66;
pub const EX_IOERR: u8 = 74;

/// Not a sysexits value: 128 + SIGINT, the shell's status for an interrupted command
pub const EX_CANCELLED: u8 = 130;

/// Fatal errors surfaced by the merge.
///
/// Only extraction failures ([`ExtractError`]) are absorbed inside the engine;
/// everything here aborts the merge and carries enough context (source identity,
/// coordinate) to diagnose the failure without re-running.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A source (or the manifest listing them) could not be opened
    #[error("Cannot open '{source_id}': {reason}")]
    SourceUnavailable {
        /// Path or identity of the source
        source_id: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A source yielded data that cannot be read as a record
    #[error("Malformed record in '{source_id}' at line {line} (after {after}): {reason}")]
    MalformedRecord {
        /// Path or identity of the source
        source_id: String,
        /// 1-based line number in the source, 0 when unknown
        line: u64,
        /// Last coordinate successfully read from this source
        after: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A matrix sink failed to write
    #[error("Cannot write matrix '{sink}' at {at}: {error}")]
    SinkWriteFailure {
        /// Display name of the sink
        sink: String,
        /// Coordinate of the row being written, or "header"/"end of output"
        at: String,
        /// The underlying I/O error
        #[source]
        error: std::io::Error,
    },

    /// The merge was interrupted between rows
    #[error("Merge cancelled after {rows} rows")]
    Cancelled {
        /// Rows fully emitted before cancellation
        rows: u64,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },
}

impl MergeError {
    /// Distinct process exit status per error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            MergeError::SourceUnavailable { .. } => EX_NOINPUT,
            MergeError::MalformedRecord { .. } => EX_DATAERR,
            MergeError::SinkWriteFailure { .. } => EX_IOERR,
            MergeError::Cancelled { .. } => EX_CANCELLED,
            MergeError::InvalidParameter { .. } => EX_USAGE,
        }
    }

    pub(crate) fn unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        MergeError::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of a [`crate::RecordReader`] to produce the next record
#[derive(Error, Debug)]
pub enum ReadError {
    /// The underlying stream failed mid-read
    #[error("I/O error at line {line}: {error}")]
    Io {
        line: u64,
        #[source]
        error: std::io::Error,
    },

    /// The line could not be interpreted as a record
    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

impl ReadError {
    pub fn line(&self) -> u64 {
        match self {
            ReadError::Io { line, .. } | ReadError::Malformed { line, .. } => *line,
        }
    }

    /// The description without the line prefix
    pub fn reason(&self) -> String {
        match self {
            ReadError::Io { error, .. } => format!("read failed: {error}"),
            ReadError::Malformed { reason, .. } => reason.clone(),
        }
    }
}

/// Per-cell extraction failure, recovered by the engine as the missing sentinel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The requested subfield is absent, empty or `.`
    #[error("missing '{subfield}' subfield")]
    MissingDepthField { subfield: String },

    /// A count in the subfield is not an unsigned integer
    #[error("invalid depth '{text}' in '{subfield}' subfield")]
    InvalidDepth { subfield: String, text: String },

    /// An alternate count was requested but only a reference count is present
    #[error("'{subfield}' subfield has no alternate count")]
    NoAlternateCount { subfield: String },
}
