//! Failure modes of the per-sample processing
//!
//! Global misconfiguration is reported through `eyre` before any sample is
//! touched. Once the batch is running, each sample reports one of these so
//! that the batch loop can decide whether to skip quietly or loudly.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons why one sample (or one region of it) could not be processed
#[derive(Error, Debug)]
pub enum SampleError {
    /// The input event store does not exist
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The configuration does not fit this sample's contents
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or writing an event store failed
    #[error("event store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event store could not be decoded or encoded
    #[error("event store format error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type of per-sample operations
pub type SampleResult<T> = std::result::Result<T, SampleError>;
