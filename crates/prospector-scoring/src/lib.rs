//! Prospector Scoring - weighted-rule scoring and classification of leads.
//!
//! Scores are additive: each [`WeightedRule`] or structural [`Signal`]
//! that fires contributes its weight, and the sum is clamped to 0-100.
//! Two named policies exist because they disagree on polarity:
//! job-seeking phrases are a bonus under [`ScoringPolicy::Recruiting`]
//! and a penalty under [`ScoringPolicy::PassiveCandidate`].
//!
//! [`ScoringPolicy::Recruiting`]: prospector_core::ScoringPolicy::Recruiting
//! [`ScoringPolicy::PassiveCandidate`]: prospector_core::ScoringPolicy::PassiveCandidate

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod classify;
pub mod industry;
pub mod rules;
pub mod scorer;

pub use classify::classify;
pub use industry::detect_industries;
pub use rules::{RuleTable, RuleTarget, Signal, WeightedRule};
pub use scorer::{ScoreCard, Scorer, SignalHit, CONTACT_PAGE_BONUS};
