//! Additive lead scoring.

use prospector_core::{LeadClassification, ScoringConfig, ScoringPolicy};
use prospector_extract::{is_personal_email, is_plausible_name, ExtractedContact, ExtractionPattern};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::classify::classify;
use crate::industry::detect_industries;
use crate::rules::{sales_terms, RuleTable, RuleTarget, Signal};

/// Label used for the flat contact-page bonus.
pub const CONTACT_PAGE_BONUS: &str = "contact_page_bonus";

/// One contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalHit {
    /// Rule or signal label
    pub label: String,
    /// Points contributed
    pub weight: i32,
}

/// Result of scoring one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Clamped score (0-100)
    pub score: u8,
    /// Labels of every rule and signal that fired
    pub labels: Vec<String>,
    /// Candidate/company and job-seeker/employed labels
    pub classification: LeadClassification,
    /// Industry tags
    pub industries: Vec<String>,
    /// Individual contributions, in evaluation order
    pub signals: Vec<SignalHit>,
    /// Whether the score reaches the acceptance threshold
    pub accepted: bool,
}

/// Scores pages and contacts under one policy.
#[derive(Debug, Clone)]
pub struct Scorer {
    policy: ScoringPolicy,
    table: RuleTable,
    min_score: u8,
    contact_page_bonus: i32,
}

impl Scorer {
    /// Create a scorer for a policy.
    #[must_use]
    pub fn new(policy: ScoringPolicy, config: &ScoringConfig) -> Self {
        Self {
            policy,
            table: RuleTable::for_policy(policy),
            min_score: config.min_score,
            contact_page_bonus: config.contact_page_bonus,
        }
    }

    /// Policy this scorer applies.
    #[must_use]
    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    /// Acceptance threshold.
    #[must_use]
    pub fn min_score(&self) -> u8 {
        self.min_score
    }

    /// Score page `text` found at `url`, optionally for one extracted contact.
    ///
    /// Text rules run over the contact's context when it has one, so two
    /// contacts on a long page are judged by their own surroundings.
    #[must_use]
    pub fn score(&self, text: &str, url: &str, contact: Option<&ExtractedContact>) -> ScoreCard {
        let scope = contact
            .map(|c| c.context.as_str())
            .filter(|ctx| !ctx.trim().is_empty())
            .unwrap_or(text);

        let mut signals = Vec::new();
        let mut push = |label: &str, weight: i32| {
            if weight != 0 {
                signals.push(SignalHit {
                    label: label.to_string(),
                    weight,
                });
            }
        };

        for rule in &self.table.rules {
            let haystack = match rule.target {
                RuleTarget::Text => scope,
                RuleTarget::Url => url,
            };
            push(rule.label, rule.apply(haystack));
        }

        let industries = detect_industries(scope);
        let counted = industries.len().min(self.table.max_industries);
        for _ in 0..counted {
            push(
                Signal::Industry.as_str(),
                self.table.signal_weight(Signal::Industry),
            );
        }

        if let Some(contact) = contact {
            for signal in contact_signals(contact) {
                push(signal.as_str(), self.table.signal_weight(signal));
            }
            if contact.pattern == ExtractionPattern::FastPathAnchor {
                push(CONTACT_PAGE_BONUS, self.contact_page_bonus);
            }
        }

        let total: i32 = signals.iter().map(|s| s.weight).sum();
        // Clamped into 0..=100 first, so the cast is lossless.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = total.clamp(0, 100) as u8;
        let classification = classify(scope, contact, self.policy);

        trace!(url, score, total, signals = signals.len(), "Scored contact");

        ScoreCard {
            score,
            labels: signals.iter().map(|s| s.label.clone()).collect(),
            classification,
            industries,
            signals,
            accepted: score >= self.min_score,
        }
    }
}

/// Structural signals present on a contact.
fn contact_signals(contact: &ExtractedContact) -> Vec<Signal> {
    let mut out = Vec::new();
    if let Some(email) = &contact.email {
        out.push(if is_personal_email(email) {
            Signal::PersonalEmail
        } else {
            Signal::GenericEmail
        });
    }
    if contact.phone.is_some() && contact.phone_valid {
        out.push(Signal::Phone);
    }
    if contact.whatsapp.is_some() {
        out.push(Signal::WhatsApp);
    }
    if contact.name.as_deref().is_some_and(is_plausible_name) {
        out.push(Signal::PlausibleName);
    }
    if let Some(role) = &contact.role {
        out.push(if sales_terms().is_match(role) {
            Signal::SalesRole
        } else {
            Signal::OtherRole
        });
    }
    if contact.company.is_some() {
        out.push(Signal::Company);
    }
    out
}
