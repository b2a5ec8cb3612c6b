use std::time::{Duration, Instant};

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keystream::Keystream;
use crate::oracle::{self, Context, StrengthOracle, StrengthReport, Zxcvbn};
use crate::policy::Policy;
use crate::tracing_targets::TRACING_TARGET_GENERATOR as TRACING_TARGET;

/// Retry budget for one `generate` call. The first of the two limits to be
/// reached ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Candidates to try before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Wall-clock limit, checked before every attempt after the first.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Multiplier from the oracle's guess-count logarithm to the strength estimate.
    pub strength_scale: f64,
    pub budget: Budget,
}

impl GeneratorConfig {
    pub const STANDARD: Self = Self {
        strength_scale: oracle::DEFAULT_STRENGTH_SCALE,
        budget: Budget {
            max_attempts: 1_000,
            deadline: Some(Duration::from_secs(10)),
        },
    };

    pub const PATIENT: Self = Self {
        strength_scale: oracle::DEFAULT_STRENGTH_SCALE,
        budget: Budget {
            max_attempts: 100_000,
            deadline: Some(Duration::from_secs(120)),
        },
    };

    pub const fn with_budget(self, budget: Budget) -> Self {
        Self { budget, ..self }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// An accepted password together with the report that accepted it.
#[derive(Debug)]
pub struct Generated {
    pub password: Zeroizing<String>,
    pub report: StrengthReport,
    /// Candidates built, including the accepted one.
    pub attempts: u32,
}

/// Builds policy-conformant passwords and keeps the ones the oracle rates
/// at or above the policy's minimum strength.
///
/// `generate` takes `&self` and seeds its own keystream per call, so one
/// generator can be shared between threads when its oracle is `Sync`.
#[derive(Debug, Clone)]
pub struct Generator<O = Zxcvbn> {
    policy: Policy,
    oracle: O,
    config: GeneratorConfig,
}

impl Generator<Zxcvbn> {
    pub fn new(policy: Policy) -> Self {
        Self::with_oracle(policy, Zxcvbn, GeneratorConfig::STANDARD)
    }
}

impl Default for Generator<Zxcvbn> {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl<O: StrengthOracle> Generator<O> {
    pub fn with_oracle(policy: Policy, oracle: O, config: GeneratorConfig) -> Self {
        Self {
            policy,
            oracle,
            config,
        }
    }

    pub fn with_config(self, config: GeneratorConfig) -> Self {
        Self { config, ..self }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates a password from a freshly seeded keystream.
    pub fn generate(&self, context: Option<&Context>) -> Result<Zeroizing<String>> {
        let mut keystream = Keystream::from_entropy()?;
        self.generate_with(&mut keystream, context)
    }

    /// Generates a password drawing from a caller-owned keystream.
    pub fn generate_with(
        &self,
        keystream: &mut Keystream,
        context: Option<&Context>,
    ) -> Result<Zeroizing<String>> {
        self.generate_report(keystream, context)
            .map(|generated| generated.password)
    }

    /// Runs the build, score, accept loop until a candidate passes or the
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// [`Error::GenerationTimeout`] when the budget runs out, and
    /// [`Error::OracleUnavailable`] as soon as the oracle fails on any candidate.
    pub fn generate_report(
        &self,
        keystream: &mut Keystream,
        context: Option<&Context>,
    ) -> Result<Generated> {
        let budget = self.config.budget;
        let max_attempts = budget.max_attempts.max(1);
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            let out_of_time = budget
                .deadline
                .is_some_and(|deadline| attempts > 0 && start.elapsed() >= deadline);

            if attempts >= max_attempts || out_of_time {
                let elapsed = start.elapsed();
                tracing::warn!(
                    target: TRACING_TARGET,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    min_strength = self.policy.min_strength(),
                    "generation budget exhausted"
                );
                return Err(Error::GenerationTimeout { attempts, elapsed });
            }
            attempts += 1;

            let candidate = self.candidate(keystream);
            let report = self.analyze_strength(&candidate, context)?;

            let strong_enough = report.strength_estimate >= self.policy.min_strength();
            if strong_enough && self.meets_requirements(&candidate) {
                tracing::debug!(
                    target: TRACING_TARGET,
                    attempts,
                    length = candidate.len(),
                    score = report.score,
                    strength_estimate = report.strength_estimate,
                    "candidate accepted"
                );
                return Ok(Generated {
                    password: candidate,
                    report,
                    attempts,
                });
            }

            tracing::trace!(
                target: TRACING_TARGET,
                attempt = attempts,
                score = report.score,
                strength_estimate = report.strength_estimate,
                strong_enough,
                "candidate rejected"
            );
        }
    }

    /// Scores `password` with this generator's oracle and strength scale.
    pub fn analyze_strength(
        &self,
        password: &str,
        context: Option<&Context>,
    ) -> Result<StrengthReport> {
        let scale = self.config.strength_scale;
        Ok(oracle::analyze_strength(&self.oracle, password, context, scale)?)
    }

    /// Checks the policy's composition rules directly, without the oracle:
    /// length within bounds, no excluded character, every required class present.
    pub fn meets_requirements(&self, password: &str) -> bool {
        let length = password.chars().count();
        if length < self.policy.min_length() || length > self.policy.max_length() {
            return false;
        }
        if password.chars().any(|ch| self.policy.is_excluded(ch)) {
            return false;
        }

        self.policy
            .required_classes()
            .all(|class| password.chars().any(|ch| class.contains(ch)))
    }

    fn candidate(&self, keystream: &mut Keystream) -> Zeroizing<String> {
        let length =
            keystream.range_inclusive(self.policy.effective_min_length(), self.policy.max_length());

        let mut password_bytes = Zeroizing::new(Vec::with_capacity(length));

        // One from each required class first; the shuffle hides their positions.
        for (_, alphabet) in self.policy.class_alphabets() {
            password_bytes.push(keystream.choose(alphabet));
        }

        let pool = self.policy.pool();
        while password_bytes.len() < length {
            password_bytes.push(keystream.choose(pool));
        }

        keystream.shuffle(password_bytes.as_mut_slice());

        Zeroizing::new(password_bytes.iter().map(|&b| char::from(b)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::OracleError;
    use crate::oracle::{CRACK_TIME_MODEL, Feedback, OracleVerdict};
    use crate::policy::{CharClass, PolicyConfig};

    fn policy(min: usize, max: usize, min_strength: f64) -> Policy {
        Policy::new(PolicyConfig {
            min_length: min,
            max_length: max,
            min_strength,
            ..PolicyConfig::default()
        })
        .unwrap()
    }

    fn seeded(seed: u8) -> Keystream {
        Keystream::from_seed(&[seed; 32])
    }

    fn verdict(guesses_log10: f64) -> OracleVerdict {
        OracleVerdict {
            score: 0,
            guesses_log10,
            crack_times_seconds: BTreeMap::from([(CRACK_TIME_MODEL, 1.0)]),
            feedback: Feedback::default(),
        }
    }

    /// Rates every candidate weak until the `strong_after`-th call.
    struct WarmingOracle {
        calls: Cell<u32>,
        strong_after: u32,
    }

    impl StrengthOracle for WarmingOracle {
        fn evaluate(&self, _: &str, _: &[&str]) -> Result<OracleVerdict, OracleError> {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            Ok(verdict(if calls >= self.strong_after { 10.0 } else { 0.0 }))
        }
    }

    struct DownOracle;

    impl StrengthOracle for DownOracle {
        fn evaluate(&self, _: &str, _: &[&str]) -> Result<OracleVerdict, OracleError> {
            Err(OracleError::Unavailable("connection refused".to_string()))
        }
    }

    fn class_count(password: &str, class: CharClass) -> usize {
        password.chars().filter(|&ch| class.contains(ch)).count()
    }

    #[test]
    fn test_length_and_classes() {
        let generator = Generator::new(policy(8, 24, 0.0));

        for seed in 0..32 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            let length = password.chars().count();

            assert!((8..=24).contains(&length), "length {} out of range", length);
            for class in CharClass::ALL {
                assert!(
                    class_count(&password, class) >= 1,
                    "{:?} missing {} character",
                    *password,
                    class
                );
            }
        }
    }

    #[test]
    fn test_sixteen_char_policy_first_attempt() {
        let generator = Generator::new(policy(16, 16, 0.0)).with_config(
            GeneratorConfig::STANDARD.with_budget(Budget {
                max_attempts: 1,
                deadline: None,
            }),
        );

        let generated = generator.generate_report(&mut seeded(42), None).unwrap();
        let password = &*generated.password;

        assert_eq!(generated.attempts, 1);
        assert_eq!(password.len(), 16);
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c)));
    }

    #[test]
    fn test_accepted_password_clears_min_strength() {
        let generator = Generator::new(policy(12, 16, 50.0));

        for seed in 0..8 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            let report = generator.analyze_strength(&password, None).unwrap();
            assert!(
                report.strength_estimate >= 50.0,
                "{} accepted with estimate {}",
                *password,
                report.strength_estimate
            );
        }
    }

    #[test]
    fn test_excluded_characters_never_appear() {
        let excluded = "0O1lI|`'\"\\{}";
        let generator = Generator::new(
            Policy::new(PolicyConfig {
                min_length: 32,
                max_length: 64,
                min_strength: 0.0,
                excluded_characters: excluded.to_string(),
                ..PolicyConfig::default()
            })
            .unwrap(),
        );

        for seed in 0..16 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            assert!(
                !password.chars().any(|c| excluded.contains(c)),
                "{:?} contains an excluded character",
                *password
            );
        }
    }

    #[test]
    fn test_minimal_length_has_one_of_each_class() {
        let generator = Generator::new(policy(4, 4, 0.0));

        for seed in 0..32 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            assert_eq!(password.len(), 4);
            for class in CharClass::ALL {
                assert_eq!(class_count(&password, class), 1, "{:?}", *password);
            }
        }
    }

    #[test]
    fn test_min_length_below_class_count_is_raised() {
        let generator = Generator::new(policy(1, 5, 0.0));

        for seed in 0..32 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            assert!((4..=5).contains(&password.len()));
        }
    }

    #[test]
    fn test_required_classes_not_positionally_fixed() {
        let generator = Generator::new(policy(4, 4, 0.0));
        let mut first_classes = std::collections::BTreeSet::new();

        for seed in 0..64 {
            let password = generator.generate_with(&mut seeded(seed), None).unwrap();
            let first = password.chars().next().unwrap();
            let class = CharClass::ALL.into_iter().find(|c| c.contains(first)).unwrap();
            first_classes.insert(class);
        }

        assert!(first_classes.len() > 1, "position 0 always {:?}", first_classes);
    }

    #[test]
    fn test_unreachable_strength_times_out() {
        let generator = Generator::new(policy(4, 6, 1000.0)).with_config(
            GeneratorConfig::STANDARD.with_budget(Budget {
                max_attempts: 25,
                deadline: None,
            }),
        );

        let err = generator.generate_with(&mut seeded(1), None).unwrap_err();
        assert!(matches!(err, Error::GenerationTimeout { attempts: 25, .. }), "{:?}", err);
    }

    #[test]
    fn test_deadline_ends_loop() {
        let generator = Generator::new(policy(4, 6, 1000.0)).with_config(
            GeneratorConfig::STANDARD.with_budget(Budget {
                max_attempts: u32::MAX,
                deadline: Some(Duration::from_millis(50)),
            }),
        );

        let err = generator.generate_with(&mut seeded(2), None).unwrap_err();
        match err {
            Error::GenerationTimeout { attempts, elapsed } => {
                assert!(attempts >= 1);
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let oracle = WarmingOracle {
            calls: Cell::new(0),
            strong_after: 1,
        };
        let generator = Generator::with_oracle(
            policy(8, 8, 50.0),
            &oracle,
            GeneratorConfig::STANDARD.with_budget(Budget {
                max_attempts: 0,
                deadline: Some(Duration::ZERO),
            }),
        );

        let generated = generator.generate_report(&mut seeded(3), None).unwrap();
        assert_eq!(generated.attempts, 1);
    }

    #[test]
    fn test_retries_until_oracle_accepts() {
        let oracle = WarmingOracle {
            calls: Cell::new(0),
            strong_after: 7,
        };
        let generator =
            Generator::with_oracle(policy(10, 12, 50.0), &oracle, GeneratorConfig::STANDARD);

        let generated = generator.generate_report(&mut seeded(4), None).unwrap();
        assert_eq!(generated.attempts, 7);
        assert_eq!(oracle.calls.get(), 7);
        assert_eq!(generated.report.strength_estimate, 100.0);
        assert!(generator.meets_requirements(&generated.password));
    }

    #[test]
    fn test_oracle_failure_propagates() {
        let generator =
            Generator::with_oracle(policy(8, 8, 0.0), DownOracle, GeneratorConfig::STANDARD);

        let err = generator.generate_with(&mut seeded(5), None).unwrap_err();
        assert!(matches!(
            err,
            Error::OracleUnavailable(OracleError::Unavailable(_))
        ));
    }

    #[test]
    fn test_seeded_generation_deterministic() {
        let generator = Generator::new(policy(16, 32, 0.0));

        let first = generator.generate_with(&mut seeded(42), None).unwrap();
        let second = generator.generate_with(&mut seeded(42), None).unwrap();
        let other = generator.generate_with(&mut seeded(43), None).unwrap();

        assert_eq!(*first, *second);
        assert_ne!(*first, *other);
    }

    #[test]
    fn test_context_reaches_oracle() {
        let mut context = Context::new();
        context.insert("service".to_string(), "example".to_string());

        let generator = Generator::default();
        let with = generator.analyze_strength("example2024", Some(&context)).unwrap();
        let without = generator.analyze_strength("example2024", None).unwrap();

        assert!(with.strength_estimate <= without.strength_estimate);
    }

    #[test]
    fn test_meets_requirements() {
        let generator = Generator::new(policy(8, 12, 0.0));

        assert!(generator.meets_requirements("aB3$efgh"));
        assert!(!generator.meets_requirements("aB3$efg"), "too short");
        assert!(!generator.meets_requirements("aB3$efghijklm"), "too long");
        assert!(!generator.meets_requirements("ab3$efgh"), "no uppercase");
        assert!(!generator.meets_requirements("aB3xefgh"), "no special");
        assert!(!generator.meets_requirements("aB3$efg`"), "excluded char");
    }

    #[test]
    fn test_default_generation() {
        let generator = Generator::default();
        let password = generator.generate(None).unwrap();

        assert!((16..=32).contains(&password.len()));
        assert!(generator.meets_requirements(&password));
        let report = generator.analyze_strength(&password, None).unwrap();
        assert!(report.strength_estimate >= 70.0);
    }

    #[test]
    fn test_shared_across_threads() {
        let generator = Generator::new(policy(12, 20, 40.0));

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| generator.generate(None).unwrap()))
                .collect();

            for handle in handles {
                let password = handle.join().unwrap();
                assert!(generator.meets_requirements(&password));
            }
        });
    }
}
