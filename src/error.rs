//! Error types for netreach operations

use std::fmt;

/// Main error type for netreach operations
#[derive(Debug)]
pub enum Error {
    /// Malformed graph input: NaN/negative weight, out-of-range endpoint,
    /// empty node set. Fatal for the handle being constructed.
    InvalidGraph(String),

    /// External node ID unknown to the facade, bad graph index, or
    /// mismatched argument lengths.
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidGraph(msg) => {
                write!(f, "Invalid graph: {msg}")
            }
            Error::InvalidArgument(msg) => {
                write!(f, "Invalid argument: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience result type for netreach operations
pub type Result<T> = std::result::Result<T, Error>;
