//! Candidate vs. company and job-seeker vs. employed labels.

use prospector_core::{LeadClassification, Party, ScoringPolicy, SearchStatus};
use prospector_extract::ExtractedContact;

use crate::rules::{employed, job_seeking, recruiting};

/// Classify a contact from its surrounding text.
///
/// Recruiting phrases point to a company, job-seeking phrases to a
/// candidate. Employment is only inferred under the passive-candidate
/// policy, where a named person with a role and no job-seeking phrases
/// counts as employed.
#[must_use]
pub fn classify(
    text: &str,
    contact: Option<&ExtractedContact>,
    policy: ScoringPolicy,
) -> LeadClassification {
    let seeking = job_seeking().find_iter(text).count();
    let hiring = recruiting().find_iter(text).count();
    let working = employed().find_iter(text).count();

    let named = contact.is_some_and(|c| c.name.is_some());
    let party = if seeking > 0 && seeking >= hiring {
        Party::Candidate
    } else if hiring > 0 {
        Party::Company
    } else if named {
        Party::Candidate
    } else if contact.is_some_and(|c| c.company.is_some()) {
        Party::Company
    } else {
        Party::Unknown
    };

    let status = if party != Party::Candidate {
        SearchStatus::Unknown
    } else if seeking > 0 {
        SearchStatus::JobSeeker
    } else if working > 0
        || (policy == ScoringPolicy::PassiveCandidate && contact.is_some_and(|c| c.role.is_some()))
    {
        SearchStatus::Employed
    } else {
        SearchStatus::Unknown
    };

    LeadClassification { party, status }
}
