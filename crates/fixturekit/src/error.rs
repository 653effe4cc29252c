//! Error types for fixture generation.
//!
//! Every variant is fatal to a run. A pod that fits no node is not an
//! error; it is reported as a [`PlacementMiss`](crate::packer::PlacementMiss)
//! inside the pack outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of fixture errors, used for diagnostics and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input document missing, unreadable or malformed
    Load,
    /// A resource quantity has no numeric magnitude
    Parse,
    /// The hollow-node template is unusable
    Template,
    /// An output file could not be written
    Output,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Load => "Could not load input documents",
            Self::Parse => "Malformed resource quantity",
            Self::Template => "Invalid hollow node template",
            Self::Output => "Could not write output",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Load => "Check that the node and pod paths point at YAML document streams",
            Self::Parse => "Quantities must start with a number, e.g. 4000m or 8192Mi",
            Self::Template => "The template needs spec.containers[0].command with two or more arguments",
            Self::Output => "Check that the output folder exists and is writable",
        }
    }
}

/// Errors that can occur while loading, packing or writing fixtures.
#[derive(Debug, Error)]
pub enum Error {
    /// Input file could not be read or parsed as a YAML stream
    #[error("failed to load {}: {message}", .path.display())]
    Load {
        /// File that failed to load
        path: PathBuf,
        /// Underlying reason
        message: String,
    },

    /// A record lacks a field the engine depends on
    #[error("{record} is missing required field {field}")]
    MissingField {
        /// Record description, e.g. `node worker-1`
        record: String,
        /// Dotted field path
        field: String,
    },

    /// A capacity or request string has no numeric prefix
    #[error("invalid quantity {value:?} at {field} of {record}")]
    Parse {
        /// Record description, e.g. `pod #3 (web-0)`
        record: String,
        /// Dotted field path
        field: String,
        /// Offending raw value
        value: String,
    },

    /// The hollow-node template lacks the structure the transform patches
    #[error("invalid hollow node template: {0}")]
    Template(String),

    /// Output destination not writable
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// File or directory being written
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Load { .. } | Error::MissingField { .. } => ErrorCategory::Load,
            Error::Parse { .. } => ErrorCategory::Parse,
            Error::Template(_) => ErrorCategory::Template,
            Error::Write { .. } | Error::Yaml(_) => ErrorCategory::Output,
        }
    }
}

/// Result type for fixture operations.
pub type Result<T> = std::result::Result<T, Error>;
