//! Error kinds reported by the core (see spec §7).

use thiserror::Error;

/// Failure modes of the Selective Naive Bayes training core.
///
/// Every public fallible API returns `Result<T, Error>`. The driver
/// (`crate::driver`) treats any worker-returned error as fatal for the whole
/// training run: it marks the run unsuccessful, still finalises logging and
/// releases resources (see spec §7 "Propagation").
#[derive(Debug, Error)]
pub enum Error {
    /// A sparse ingestion block or a calculator allocation would exceed its budget.
    #[error("not enough memory: requested {requested_bytes} bytes, budget is {budget_bytes} bytes ({context})")]
    MemoryExhausted {
        requested_bytes: u64,
        budget_bytes: u64,
        context: &'static str,
    },

    /// A chunk file's size does not match the sum of its per-slice block sizes,
    /// or a read returned fewer bytes than expected.
    #[error("chunk file corrupted: {0}")]
    IoCorruption(String),

    /// A transient I/O failure (short write, OS error) while reading or writing a chunk file.
    #[error("chunk file I/O error: {0}")]
    IoTransient(#[from] std::io::Error),

    /// An internal invariant was violated; this is always a bug in the caller or the core.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Cooperative cancellation: the caller's interruption flag was observed set.
    #[error("interrupted by user")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;
