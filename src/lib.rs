pub mod error;
pub mod generator;
pub mod keystream;
pub mod oracle;
pub mod policy;
pub mod tracing_targets;

pub use error::{Error, OracleError, PolicyError, Result};
pub use generator::{Budget, Generated, Generator, GeneratorConfig};
pub use keystream::Keystream;
pub use oracle::{
    Context, Feedback, OracleVerdict, StrengthOracle, StrengthReport, ThreatModel, Zxcvbn,
    analyze_strength,
};
pub use policy::{CharClass, MAX_PASSWORD_LENGTH, Policy, PolicyConfig};
