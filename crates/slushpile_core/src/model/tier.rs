//! Acquisition score classifier.
//!
//! # Responsibility
//! - Bucket an externally computed acquisition score into a triage tier.
//! - Count tiers over a set of scores for triage summaries.
//!
//! # Invariants
//! - Tier ranges are closed, contiguous and exhaustive over `[0, 100]`.
//! - Out-of-range input is rejected, never clamped.
//! - Fractional scores are rounded half away from zero before bucketing.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lowest accepted acquisition score.
pub const SCORE_MIN: f64 = 0.0;
/// Highest accepted acquisition score.
pub const SCORE_MAX: f64 = 100.0;

/// Discrete triage bucket derived from an acquisition score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Score in `[80, 100]`.
    StrongConsider,
    /// Score in `[60, 79]`.
    Consider,
    /// Score in `[40, 59]`.
    Maybe,
    /// Score in `[0, 39]`.
    Pass,
    /// No score has been supplied yet.
    Unscored,
}

impl Tier {
    /// All tiers in display order, scored tiers first.
    pub const ALL: [Tier; 5] = [
        Tier::StrongConsider,
        Tier::Consider,
        Tier::Maybe,
        Tier::Pass,
        Tier::Unscored,
    ];

    /// Stable snake_case key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongConsider => "strong_consider",
            Self::Consider => "consider",
            Self::Maybe => "maybe",
            Self::Pass => "pass",
            Self::Unscored => "unscored",
        }
    }

    /// Human-readable label. Empty for `Unscored`.
    pub fn label(self) -> &'static str {
        match self {
            Self::StrongConsider => "Strong Consider",
            Self::Consider => "Consider",
            Self::Maybe => "Maybe",
            Self::Pass => "Pass",
            Self::Unscored => "",
        }
    }

    /// Colour hint consumed by presentation layers.
    pub fn color(self) -> Option<&'static str> {
        match self {
            Self::StrongConsider => Some("green"),
            Self::Consider => Some("blue"),
            Self::Maybe => Some("amber"),
            Self::Pass => Some("red"),
            Self::Unscored => None,
        }
    }

    /// Closed integer score range covered by this tier.
    pub fn range(self) -> Option<(u8, u8)> {
        match self {
            Self::StrongConsider => Some((80, 100)),
            Self::Consider => Some((60, 79)),
            Self::Maybe => Some((40, 59)),
            Self::Pass => Some((0, 39)),
            Self::Unscored => None,
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller error for scores outside the accepted domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreError {
    /// Score is NaN, infinite, or outside `[0, 100]`.
    InvalidScore(f64),
}

impl Display for ScoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidScore(value) => {
                write!(f, "invalid acquisition score {value}; expected 0..=100")
            }
        }
    }
}

impl Error for ScoreError {}

/// Validates that a present score lies in `[0, 100]`.
pub fn validate_score(score: f64) -> Result<f64, ScoreError> {
    if score.is_finite() && (SCORE_MIN..=SCORE_MAX).contains(&score) {
        Ok(score)
    } else {
        Err(ScoreError::InvalidScore(score))
    }
}

/// Classifies an optional acquisition score into a tier.
///
/// Absent scores map to `Tier::Unscored`.
pub fn classify(score: Option<f64>) -> Result<Tier, ScoreError> {
    let Some(score) = score else {
        return Ok(Tier::Unscored);
    };
    let rounded = validate_score(score)?.round();

    let tier = if rounded >= 80.0 {
        Tier::StrongConsider
    } else if rounded >= 60.0 {
        Tier::Consider
    } else if rounded >= 40.0 {
        Tier::Maybe
    } else {
        Tier::Pass
    };
    Ok(tier)
}

/// Per-tier counts over a set of manuscripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub strong_consider: u64,
    pub consider: u64,
    pub maybe: u64,
    pub pass: u64,
    pub unscored: u64,
}

impl TierCounts {
    /// Classifies every score and counts the resulting tiers.
    ///
    /// Fails on the first out-of-range score.
    pub fn from_scores<I>(scores: I) -> Result<Self, ScoreError>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut counts = Self::default();
        for score in scores {
            counts.add(classify(score)?);
        }
        Ok(counts)
    }

    /// Increments the counter for one tier.
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::StrongConsider => self.strong_consider += 1,
            Tier::Consider => self.consider += 1,
            Tier::Maybe => self.maybe += 1,
            Tier::Pass => self.pass += 1,
            Tier::Unscored => self.unscored += 1,
        }
    }

    /// Returns the count for one tier.
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::StrongConsider => self.strong_consider,
            Tier::Consider => self.consider,
            Tier::Maybe => self.maybe,
            Tier::Pass => self.pass,
            Tier::Unscored => self.unscored,
        }
    }

    /// Number of manuscripts that carry a score.
    pub fn total_scored(&self) -> u64 {
        self.strong_consider + self.consider + self.maybe + self.pass
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, validate_score, ScoreError, Tier, TierCounts};

    #[test]
    fn boundaries_land_in_expected_tiers() {
        assert_eq!(classify(Some(79.0)).unwrap(), Tier::Consider);
        assert_eq!(classify(Some(80.0)).unwrap(), Tier::StrongConsider);
        assert_eq!(classify(Some(39.0)).unwrap(), Tier::Pass);
        assert_eq!(classify(Some(40.0)).unwrap(), Tier::Maybe);
        assert_eq!(classify(Some(59.0)).unwrap(), Tier::Maybe);
        assert_eq!(classify(Some(60.0)).unwrap(), Tier::Consider);
        assert_eq!(classify(Some(0.0)).unwrap(), Tier::Pass);
        assert_eq!(classify(Some(100.0)).unwrap(), Tier::StrongConsider);
    }

    #[test]
    fn every_integer_score_matches_exactly_one_range() {
        for score in 0u8..=100 {
            let tier = classify(Some(f64::from(score))).unwrap();
            let matching = Tier::ALL
                .iter()
                .filter_map(|candidate| candidate.range())
                .filter(|(low, high)| (*low..=*high).contains(&score))
                .count();
            assert_eq!(matching, 1, "score {score} matched {matching} ranges");

            let (low, high) = tier.range().expect("scored tier has a range");
            assert!((low..=high).contains(&score));
        }
    }

    #[test]
    fn fractional_scores_round_before_bucketing() {
        assert_eq!(classify(Some(79.5)).unwrap(), Tier::StrongConsider);
        assert_eq!(classify(Some(79.49)).unwrap(), Tier::Consider);
        assert_eq!(classify(Some(39.5)).unwrap(), Tier::Maybe);
    }

    #[test]
    fn absent_score_is_unscored() {
        assert_eq!(classify(None).unwrap(), Tier::Unscored);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        assert!(matches!(
            classify(Some(-0.5)),
            Err(ScoreError::InvalidScore(_))
        ));
        assert!(matches!(
            classify(Some(100.01)),
            Err(ScoreError::InvalidScore(_))
        ));
        assert!(validate_score(f64::NAN).is_err());
        assert!(validate_score(f64::INFINITY).is_err());
    }

    #[test]
    fn counts_partition_scores() {
        let counts =
            TierCounts::from_scores([Some(95.0), Some(61.0), Some(10.0), None, Some(80.0)])
                .unwrap();
        assert_eq!(counts.strong_consider, 2);
        assert_eq!(counts.consider, 1);
        assert_eq!(counts.maybe, 0);
        assert_eq!(counts.pass, 1);
        assert_eq!(counts.unscored, 1);
        assert_eq!(counts.total_scored(), 4);
    }
}
