//! Error taxonomy for policy construction, generation and strength analysis.

use std::time::Duration;

use crate::policy::CharClass;

/// Result type alias for passforge operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A policy that cannot be constructed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// A length bound is zero.
    #[error("length bounds must be positive")]
    NonPositiveLength,

    /// `min_length` is greater than `max_length`.
    #[error("min_length ({min}) is greater than max_length ({max})")]
    InvertedBounds { min: usize, max: usize },

    /// `max_length` exceeds the supported maximum.
    #[error("max_length ({max}) exceeds the supported maximum of {limit}")]
    LengthTooLarge { max: usize, limit: usize },

    /// No character class is required, so there is nothing to draw from.
    #[error("at least one character class must be required")]
    NoRequiredClass,

    /// Exclusions removed every character of a required class.
    #[error("required {0} class is empty after exclusions")]
    EmptyClass(CharClass),

    /// `max_length` cannot hold one character from each required class.
    #[error("max_length ({max}) is shorter than the {required} required classes")]
    TooShortForClasses { max: usize, required: usize },

    /// `min_strength` is negative or not a number.
    #[error("min_strength must be a non-negative number, got {0}")]
    InvalidStrength(f64),
}

/// The strength oracle failed or produced output that does not fit its contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The oracle could not be reached or refused to score.
    #[error("strength oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle returned data outside its documented shape.
    #[error("strength oracle returned malformed data: {0}")]
    Malformed(String),
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or unsatisfiable policy.
    #[error("invalid policy: {0}")]
    Configuration(#[from] PolicyError),

    /// The retry budget ran out before a candidate was accepted.
    #[error("no acceptable password after {attempts} attempts in {elapsed:?}")]
    GenerationTimeout { attempts: u32, elapsed: Duration },

    /// The strength oracle failed; the candidate is never treated as strong.
    #[error(transparent)]
    OracleUnavailable(#[from] OracleError),

    /// The operating system random source could not seed the keystream.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),
}
