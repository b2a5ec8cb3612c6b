//! Tracing target constants, one per module, for subscriber-side filtering.

/// Policy construction and validation.
pub const TRACING_TARGET_POLICY: &str = "passforge::policy";

/// Candidate construction and the accept/reject loop.
pub const TRACING_TARGET_GENERATOR: &str = "passforge::generator";

/// Strength oracle calls and verdict mapping.
pub const TRACING_TARGET_ORACLE: &str = "passforge::oracle";
