//! Validated placement scores and criterion weights.
//!
//! Scores live in 0..=100. Construction outside that range fails with
//! [`ScoreOutOfRange`] rather than clamping — clamping would hide
//! evaluator bugs behind plausible-looking values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value outside the allowed 0..=100 score range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("score {0} outside allowed range 0..=100")]
pub struct ScoreOutOfRange(pub u64);

/// A placement score in 0..=100.
///
/// Serialization round-trips through the raw integer; deserializing an
/// out-of-range value fails the same way construction does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u64", into = "u64")]
pub struct Score(u64);

/// Criterion weights share the score range and validation rules.
pub type Weight = Score;

impl Score {
    pub const MIN: Score = Score(0);
    pub const MAX: Score = Score(100);

    /// Construct a score, failing for values above 100.
    pub fn new(value: u64) -> Result<Self, ScoreOutOfRange> {
        if value > 100 {
            return Err(ScoreOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// The raw score value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Score {
    type Error = ScoreOutOfRange;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u64 {
    fn from(score: Score) -> u64 {
        score.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_range_bounds() {
        assert_eq!(Score::new(0).unwrap(), Score::MIN);
        assert_eq!(Score::new(100).unwrap(), Score::MAX);
        assert_eq!(Score::new(85).unwrap().value(), 85);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(Score::new(101), Err(ScoreOutOfRange(101)));
        assert_eq!(Score::new(u64::MAX), Err(ScoreOutOfRange(u64::MAX)));
    }

    #[test]
    fn deserialize_validates() {
        let ok: Score = serde_json::from_str("92").unwrap();
        assert_eq!(ok.value(), 92);

        let err = serde_json::from_str::<Score>("150");
        assert!(err.is_err());
    }

    #[test]
    fn serializes_as_raw_integer() {
        let json = serde_json::to_string(&Score::new(42).unwrap()).unwrap();
        assert_eq!(json, "42");
    }
}
