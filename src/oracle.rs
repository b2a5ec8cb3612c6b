//! Strength oracle boundary.
//!
//! The generator depends only on the [`StrengthOracle`] capability: any
//! estimator that reports a score, a base-10 guess-count logarithm, crack
//! times per threat model and feedback can be substituted. [`Zxcvbn`] is the
//! default implementation over the `zxcvbn` crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zxcvbn::time_estimates::CrackTimeSeconds;

use crate::error::OracleError;
use crate::tracing_targets::TRACING_TARGET_ORACLE as TRACING_TARGET;

/// Caller-supplied strings, keyed by label, that the oracle penalizes
/// passwords for resembling. Only the values reach the oracle.
pub type Context = BTreeMap<String, String>;

/// Multiplier from the oracle's guess-count logarithm to the strength estimate.
pub const DEFAULT_STRENGTH_SCALE: f64 = 10.0;

/// Attack model used for [`StrengthReport::crack_time_estimate`].
pub const CRACK_TIME_MODEL: ThreatModel = ThreatModel::OnlineNoThrottling10PerSecond;

const MAX_SCORE: u8 = 4;

/// Attacker models the oracle reports crack times for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatModel {
    #[serde(rename = "online_throttling_100_per_hour")]
    OnlineThrottling100PerHour,
    #[serde(rename = "online_no_throttling_10_per_second")]
    OnlineNoThrottling10PerSecond,
    #[serde(rename = "offline_slow_hashing_1e4_per_second")]
    OfflineSlowHashing1e4PerSecond,
    #[serde(rename = "offline_fast_hashing_1e10_per_second")]
    OfflineFastHashing1e10PerSecond,
}

/// Human-readable remediation advice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub warning: Option<String>,
    pub suggestions: Vec<String>,
}

/// Raw oracle output, before validation and scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleVerdict {
    /// Score from 0 (weakest) to 4 (strongest).
    pub score: u8,
    pub guesses_log10: f64,
    pub crack_times_seconds: BTreeMap<ThreatModel, f64>,
    pub feedback: Feedback,
}

/// Strength assessment of one password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthReport {
    /// Score from 0 (weakest) to 4 (strongest).
    pub score: u8,
    /// Guess-count logarithm times the configured scale. Not Shannon entropy.
    pub strength_estimate: f64,
    /// Seconds to crack under [`CRACK_TIME_MODEL`].
    pub crack_time_estimate: f64,
    pub feedback: Feedback,
}

/// A password strength estimator.
pub trait StrengthOracle {
    /// Scores `password`, penalizing resemblance to any of `known_strings`.
    fn evaluate(
        &self,
        password: &str,
        known_strings: &[&str],
    ) -> Result<OracleVerdict, OracleError>;
}

impl<O: StrengthOracle + ?Sized> StrengthOracle for &O {
    fn evaluate(
        &self,
        password: &str,
        known_strings: &[&str],
    ) -> Result<OracleVerdict, OracleError> {
        (**self).evaluate(password, known_strings)
    }
}

impl<O: StrengthOracle + ?Sized> StrengthOracle for Box<O> {
    fn evaluate(
        &self,
        password: &str,
        known_strings: &[&str],
    ) -> Result<OracleVerdict, OracleError> {
        (**self).evaluate(password, known_strings)
    }
}

/// Oracle backed by the zxcvbn guess estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zxcvbn;

impl StrengthOracle for Zxcvbn {
    fn evaluate(
        &self,
        password: &str,
        known_strings: &[&str],
    ) -> Result<OracleVerdict, OracleError> {
        let entropy = zxcvbn::zxcvbn(password, known_strings);
        let crack_times = entropy.crack_times();

        let crack_times_seconds = BTreeMap::from([
            (
                ThreatModel::OnlineThrottling100PerHour,
                seconds(crack_times.online_throttling_100_per_hour()),
            ),
            (
                ThreatModel::OnlineNoThrottling10PerSecond,
                seconds(crack_times.online_no_throttling_10_per_second()),
            ),
            (
                ThreatModel::OfflineSlowHashing1e4PerSecond,
                seconds(crack_times.offline_slow_hashing_1e4_per_second()),
            ),
            (
                ThreatModel::OfflineFastHashing1e10PerSecond,
                seconds(crack_times.offline_fast_hashing_1e10_per_second()),
            ),
        ]);

        let feedback = entropy
            .feedback()
            .map(|feedback| Feedback {
                warning: feedback.warning().map(|w| w.to_string()),
                suggestions: feedback
                    .suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .unwrap_or_default();

        Ok(OracleVerdict {
            score: entropy.score().into(),
            guesses_log10: entropy.guesses_log10(),
            crack_times_seconds,
            feedback,
        })
    }
}

fn seconds(crack_time: CrackTimeSeconds) -> f64 {
    match crack_time {
        CrackTimeSeconds::Integer(i) => i as f64,
        CrackTimeSeconds::Float(f) => f,
    }
}

/// Scores `password` with `oracle` and maps the verdict into a [`StrengthReport`].
///
/// Only the values of `context` are handed to the oracle, in key order. A
/// verdict outside the oracle contract is reported as
/// [`OracleError::Malformed`] rather than defaulted.
pub fn analyze_strength<O>(
    oracle: &O,
    password: &str,
    context: Option<&Context>,
    strength_scale: f64,
) -> Result<StrengthReport, OracleError>
where
    O: StrengthOracle + ?Sized,
{
    let known_strings: Vec<&str> = context
        .map(|ctx| ctx.values().map(String::as_str).collect())
        .unwrap_or_default();

    let verdict = oracle.evaluate(password, &known_strings).inspect_err(|e| {
        tracing::warn!(target: TRACING_TARGET, error = %e, "strength oracle failed");
    })?;

    if verdict.score > MAX_SCORE {
        return Err(OracleError::Malformed(format!(
            "score {} outside 0..={}",
            verdict.score, MAX_SCORE
        )));
    }
    if !verdict.guesses_log10.is_finite() || verdict.guesses_log10 < 0.0 {
        return Err(OracleError::Malformed(format!(
            "invalid guesses_log10 {}",
            verdict.guesses_log10
        )));
    }

    let crack_time_estimate = *verdict
        .crack_times_seconds
        .get(&CRACK_TIME_MODEL)
        .ok_or_else(|| {
            OracleError::Malformed(format!("missing crack time for {:?}", CRACK_TIME_MODEL))
        })?;
    if crack_time_estimate.is_nan() || crack_time_estimate < 0.0 {
        return Err(OracleError::Malformed(format!(
            "invalid crack time {}",
            crack_time_estimate
        )));
    }

    let report = StrengthReport {
        score: verdict.score,
        strength_estimate: verdict.guesses_log10 * strength_scale,
        crack_time_estimate,
        feedback: verdict.feedback,
    };

    tracing::debug!(
        target: TRACING_TARGET,
        known_strings = known_strings.len(),
        score = report.score,
        strength_estimate = report.strength_estimate,
        has_warning = report.feedback.warning.is_some(),
        "password strength analyzed"
    );

    Ok(report)
}
