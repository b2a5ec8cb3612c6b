//! Password composition policy.
//!
//! A [`Policy`] is validated once at construction and is read-only afterwards,
//! so a single value can be shared by reference across threads. The
//! serializable [`PolicyConfig`] record is the raw, unvalidated form used for
//! loading policies from configuration files.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::tracing_targets::TRACING_TARGET_POLICY as TRACING_TARGET;

/// Upper bound accepted for `max_length`.
pub const MAX_PASSWORD_LENGTH: usize = 4096;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// One of the four character classes a policy can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl CharClass {
    /// All classes, in the order candidates are seeded.
    pub const ALL: [CharClass; 4] = [
        CharClass::Uppercase,
        CharClass::Lowercase,
        CharClass::Digit,
        CharClass::Special,
    ];

    /// The fixed base alphabet of this class, before any exclusions.
    pub const fn base_alphabet(self) -> &'static [u8] {
        match self {
            CharClass::Uppercase => UPPERCASE,
            CharClass::Lowercase => LOWERCASE,
            CharClass::Digit => DIGITS,
            CharClass::Special => SPECIAL,
        }
    }

    /// Whether `ch` belongs to the base alphabet of this class.
    pub fn contains(self, ch: char) -> bool {
        ch.is_ascii() && self.base_alphabet().contains(&(ch as u8))
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CharClass::Uppercase => "uppercase",
            CharClass::Lowercase => "lowercase",
            CharClass::Digit => "digit",
            CharClass::Special => "special",
        };
        f.write_str(name)
    }
}

/// Unvalidated policy record, as read from configuration.
///
/// Missing fields take the values of [`PolicyConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digits: bool,
    pub require_special: bool,
    /// Minimum accepted strength estimate, on the oracle's scaled guess-log range.
    pub min_strength: f64,
    /// Every character of this string is removed from all class alphabets.
    pub excluded_characters: String,
}

impl PolicyConfig {
    fn requires(&self, class: CharClass) -> bool {
        match class {
            CharClass::Uppercase => self.require_uppercase,
            CharClass::Lowercase => self.require_lowercase,
            CharClass::Digit => self.require_digits,
            CharClass::Special => self.require_special,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 16,
            max_length: 32,
            require_uppercase: true,
            require_lowercase: true,
            require_digits: true,
            require_special: true,
            min_strength: 70.0,
            excluded_characters: "\"'\\`".to_string(),
        }
    }
}

/// Validated, immutable password policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicyConfig", into = "PolicyConfig")]
pub struct Policy {
    config: PolicyConfig,
    excluded: BTreeSet<char>,
    classes: Vec<(CharClass, Vec<u8>)>,
    pool: Vec<u8>,
}

impl Policy {
    /// Validates `config` and derives the usable alphabet of each required class.
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        if config.min_length == 0 || config.max_length == 0 {
            return Err(PolicyError::NonPositiveLength);
        }
        if config.min_length > config.max_length {
            return Err(PolicyError::InvertedBounds {
                min: config.min_length,
                max: config.max_length,
            });
        }
        if config.max_length > MAX_PASSWORD_LENGTH {
            return Err(PolicyError::LengthTooLarge {
                max: config.max_length,
                limit: MAX_PASSWORD_LENGTH,
            });
        }
        if config.min_strength.is_nan() || config.min_strength < 0.0 {
            return Err(PolicyError::InvalidStrength(config.min_strength));
        }

        let excluded: BTreeSet<char> = config.excluded_characters.chars().collect();

        let mut classes = Vec::with_capacity(CharClass::ALL.len());
        for class in CharClass::ALL {
            if !config.requires(class) {
                continue;
            }

            let alphabet = usable_alphabet(class, &excluded);
            if alphabet.is_empty() {
                tracing::debug!(
                    target: TRACING_TARGET,
                    class = %class,
                    "required class emptied by exclusions"
                );
                return Err(PolicyError::EmptyClass(class));
            }
            classes.push((class, alphabet));
        }

        if classes.is_empty() {
            return Err(PolicyError::NoRequiredClass);
        }
        if config.max_length < classes.len() {
            return Err(PolicyError::TooShortForClasses {
                max: config.max_length,
                required: classes.len(),
            });
        }

        let pool = union_pool(&classes);

        tracing::debug!(
            target: TRACING_TARGET,
            min_length = config.min_length,
            max_length = config.max_length,
            required_classes = classes.len(),
            pool_size = pool.len(),
            min_strength = config.min_strength,
            "policy constructed"
        );

        Ok(Self {
            config,
            excluded,
            classes,
            pool,
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn min_length(&self) -> usize {
        self.config.min_length
    }

    pub fn max_length(&self) -> usize {
        self.config.max_length
    }

    /// Shortest length a candidate is drawn with: `min_length`, raised to the
    /// number of required classes when it is smaller.
    pub fn effective_min_length(&self) -> usize {
        self.config.min_length.max(self.classes.len())
    }

    pub fn min_strength(&self) -> f64 {
        self.config.min_strength
    }

    pub fn excluded_characters(&self) -> &BTreeSet<char> {
        &self.excluded
    }

    pub fn is_excluded(&self, ch: char) -> bool {
        self.excluded.contains(&ch)
    }

    pub fn requires(&self, class: CharClass) -> bool {
        self.config.requires(class)
    }

    /// Required classes, in seeding order.
    pub fn required_classes(&self) -> impl Iterator<Item = CharClass> + '_ {
        self.classes.iter().map(|(class, _)| *class)
    }

    /// Usable alphabet of a required class; `None` if the class is not required.
    pub fn alphabet(&self, class: CharClass) -> Option<&[u8]> {
        self.classes
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, alphabet)| alphabet.as_slice())
    }

    /// Required classes paired with their usable alphabets.
    pub fn class_alphabets(&self) -> impl Iterator<Item = (CharClass, &[u8])> + '_ {
        self.classes
            .iter()
            .map(|(class, alphabet)| (*class, alphabet.as_slice()))
    }

    /// Union of all required classes' usable alphabets.
    pub fn pool(&self) -> &[u8] {
        &self.pool
    }
}

impl Default for Policy {
    fn default() -> Self {
        let config = PolicyConfig::default();
        let excluded: BTreeSet<char> = config.excluded_characters.chars().collect();
        let classes: Vec<(CharClass, Vec<u8>)> = CharClass::ALL
            .iter()
            .map(|&class| (class, usable_alphabet(class, &excluded)))
            .collect();
        let pool = union_pool(&classes);

        Self {
            config,
            excluded,
            classes,
            pool,
        }
    }
}

impl TryFrom<PolicyConfig> for Policy {
    type Error = PolicyError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

impl From<Policy> for PolicyConfig {
    fn from(policy: Policy) -> Self {
        policy.config
    }
}

fn usable_alphabet(class: CharClass, excluded: &BTreeSet<char>) -> Vec<u8> {
    class
        .base_alphabet()
        .iter()
        .copied()
        .filter(|&b| !excluded.contains(&char::from(b)))
        .collect()
}

fn union_pool(classes: &[(CharClass, Vec<u8>)]) -> Vec<u8> {
    classes
        .iter()
        .flat_map(|(_, alphabet)| alphabet.iter().copied())
        .collect()
}
