use std::num::ParseIntError;
use thiserror::Error;

/// Errors from validating the inputs to a proof-of-work search.
#[derive(Debug, Error, PartialEq)]
pub enum PowError {
    #[error("prefix length has to be 64 bytes, got {actual}")]
    PrefixLength { actual: usize },

    #[error("difficulty must be a base-10 integer, got {input:?}")]
    InvalidDifficulty {
        input: String,
        #[source]
        source: ParseIntError,
    },
}
