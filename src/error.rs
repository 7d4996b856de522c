//! Error taxonomy for the root census engine.
//!
//! Benign conditions (a polynomial that is already registered, an extension
//! bound that is already covered) are *not* errors; they are reported through
//! [`crate::store::RegisterOutcome`] and [`crate::store::ExtendOutcome`].

/// Errors surfaced by solving, storage, and aggregation operations.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    /// The polynomial cannot have roots requested for it (e.g. the zero
    /// polynomial), or its coefficient name failed to parse.
    #[error("invalid polynomial {name}: {reason}")]
    InvalidPolynomial { name: String, reason: String },

    /// Query for a polynomial that was never registered. Distinct from a
    /// registered polynomial with zero roots so far.
    #[error("polynomial {name} is not registered")]
    NotRegistered { name: String },

    /// The index metadata disagrees with the persisted record file.
    /// Repaired only by an explicit `rebuild_index`, never silently.
    #[error(
        "index drift for {name}: index records {index_count} roots through \
         prime {index_prime}, record file shows {record_count} roots through \
         prime {record_prime}"
    )]
    IndexDrift {
        name: String,
        index_count: u64,
        index_prime: u64,
        record_count: u64,
        record_prime: u64,
    },

    /// Underlying persistence could not be opened, read, or appended.
    #[error("storage failure while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A record line that should be well-formed is not.
    #[error("corrupt record file for {name} at line {line}: {reason}")]
    Corrupt { name: String, line: u64, reason: String },

    /// The on-disk index document is unreadable.
    #[error("malformed index at {path}: {reason}")]
    MalformedIndex { path: String, reason: String },

    /// Prime search advanced past the representable range. Not practically
    /// reachable, but defined.
    #[error("prime search space exhausted past {after}")]
    PrimeRangeExhausted { after: u64 },
}

impl CensusError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        CensusError::Storage {
            context: context.into(),
            source,
        }
    }
}
