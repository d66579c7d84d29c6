//! Moderation categories and per-category vectors
//!
//! A classifier produces a [`ScoreVector`] (probabilities), a reviewer submits a
//! [`VoteVector`] (0/1 per category), and quorum produces an outcome with the
//! same shape as a vote.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Classification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Insult,
    SevereToxic,
    IdentityHate,
    Threat,
    Nsfw,
}

impl Category {
    /// Every category, in storage/display order
    pub const ALL: [Category; 5] = [
        Category::Insult,
        Category::SevereToxic,
        Category::IdentityHate,
        Category::Threat,
        Category::Nsfw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Insult => "insult",
            Category::SevereToxic => "severe_toxic",
            Category::IdentityHate => "identity_hate",
            Category::Threat => "threat",
            Category::Nsfw => "nsfw",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown category: {}", s)))
    }
}

/// Classifier output: probability per category, each in [0, 1]
pub type ScoreVector = BTreeMap<Category, f64>;

/// Reviewer vote (or finalized outcome): 1 = category applies, 0 = does not
pub type VoteVector = BTreeMap<Category, i64>;

/// Check that every score lies in [0, 1]
pub fn validate_scores(scores: &ScoreVector) -> Result<()> {
    for (category, score) in scores {
        if !score.is_finite() || !(0.0..=1.0).contains(score) {
            return Err(Error::InvalidInput(format!(
                "Score for {} out of range: {}",
                category, score
            )));
        }
    }
    Ok(())
}

/// True when any category exceeds the flag threshold
pub fn is_flagged(scores: &ScoreVector, flag_threshold: f64) -> bool {
    scores.values().any(|score| *score > flag_threshold)
}

/// Votes are booleans; reaction-count style inputs above 1 still mean "yes"
pub fn normalize_votes(votes: &VoteVector) -> VoteVector {
    Category::ALL
        .iter()
        .map(|c| (*c, i64::from(votes.get(c).copied().unwrap_or(0) > 0)))
        .collect()
}
