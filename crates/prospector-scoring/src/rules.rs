//! Weighted rule tables.
//!
//! Each policy is a list of pattern rules over page text or URL plus a
//! table of structural contact signals. Tuning a weight never touches
//! scoring code.

use once_cell::sync::Lazy;
use prospector_core::ScoringPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a pattern rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    /// Page text (contact context when available)
    Text,
    /// Page URL
    Url,
}

/// A regex with a weight applied per hit, up to `max_hits` hits.
#[derive(Debug, Clone)]
pub struct WeightedRule {
    /// Label reported in score cards
    pub label: &'static str,
    /// What the pattern runs against
    pub target: RuleTarget,
    /// Pattern that triggers the rule
    pub pattern: Regex,
    /// Points per hit, negative for penalties
    pub weight: i32,
    /// Hits counted at most
    pub max_hits: usize,
}

impl WeightedRule {
    fn new(label: &'static str, target: RuleTarget, pattern: &Regex, weight: i32) -> Self {
        Self {
            label,
            target,
            pattern: pattern.clone(),
            weight,
            max_hits: 1,
        }
    }

    fn per_hit(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }

    /// Points this rule contributes for `haystack`.
    #[must_use]
    pub fn apply(&self, haystack: &str) -> i32 {
        let hits = self.pattern.find_iter(haystack).take(self.max_hits).count();
        // max_hits is small, so the cast can't truncate
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let hits = hits as i32;
        self.weight * hits
    }
}

/// Structural facts about an extracted contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Email that belongs to one person
    PersonalEmail,
    /// Role mailbox such as `info@`
    GenericEmail,
    /// Phone number within plausible bounds
    Phone,
    /// WhatsApp number
    WhatsApp,
    /// Name passed the plausibility check
    PlausibleName,
    /// Sales role title
    SalesRole,
    /// Any other role title
    OtherRole,
    /// Company name found
    Company,
    /// Industry keyword hit, counted per industry
    Industry,
}

impl Signal {
    /// Label reported in score cards.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalEmail => "personal_email",
            Self::GenericEmail => "generic_email",
            Self::Phone => "phone",
            Self::WhatsApp => "whatsapp",
            Self::PlausibleName => "name",
            Self::SalesRole => "sales_role",
            Self::OtherRole => "role",
            Self::Company => "company",
            Self::Industry => "industry",
        }
    }
}

/// Rules and signal weights for one policy.
#[derive(Debug, Clone)]
pub struct RuleTable {
    /// Pattern rules
    pub rules: Vec<WeightedRule>,
    /// Weight per structural signal
    pub signals: Vec<(Signal, i32)>,
    /// Industries counted at most
    pub max_industries: usize,
}

impl RuleTable {
    /// The table for a policy.
    #[must_use]
    pub fn for_policy(policy: ScoringPolicy) -> Self {
        match policy {
            ScoringPolicy::Recruiting => recruiting_table(),
            ScoringPolicy::PassiveCandidate => passive_table(),
        }
    }

    /// Weight of a signal, zero if the table doesn't list it.
    #[must_use]
    pub fn signal_weight(&self, signal: Signal) -> i32 {
        self.signals
            .iter()
            .find(|(s, _)| *s == signal)
            .map_or(0, |(_, w)| *w)
    }

    /// Weight of the first rule with `label`, zero if absent.
    #[must_use]
    pub fn rule_weight(&self, label: &str) -> i32 {
        self.rules
            .iter()
            .find(|r| r.label == label)
            .map_or(0, |r| r.weight)
    }
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid regex"));
    };
}

pattern!(
    SALES_TERMS,
    r"(?i)vertrieb|verkauf|\bsales\b|au(?:ß|ss)endienst|innendienst|key[- ]account|kundenberat|handelsvertret|akquise|neukunden|business development"
);
pattern!(
    JOB_SEEKING,
    r"(?i)stellengesuch|suche\s+(?:eine\s+)?(?:neue\s+)?(?:stelle|anstellung|job|herausforderung|position)|auf jobsuche|open to work|verfügbar ab|wechselwillig|bin auf der suche"
);
pattern!(
    HIRING_URGENCY,
    r"(?i)ab sofort|dringend gesucht|schnellstmöglich|zum nächstmöglichen zeitpunkt|sofort gesucht"
);
pattern!(
    RECRUITING,
    r"(?i)wir suchen|stellenangebot|stellenanzeige|\((?:m/w/d|w/m/d|m/w/x)\)|jetzt bewerben|verstärkung"
);
pattern!(
    LOW_PAY,
    r"(?i)provisionsbasis|reine provision|nur auf provision|100\s?% provision|ohne fixum|minijob|ehrenamtlich"
);
pattern!(
    PYRAMID,
    r"(?i)network[- ]?marketing|strukturvertrieb|passives einkommen|finanzielle freiheit"
);
pattern!(
    EMPLOYED,
    r"(?i)\bseit\s+(?:\d{1,2}\s+jahren|19\d\d|20\d\d)|in festanstellung|aktuell tätig|derzeit tätig|tätig als|verantworte"
);
pattern!(CONTACT_PATH, r"(?i)/(?:kontakt|contact|impressum|imprint)");
pattern!(TEAM_PATH, r"(?i)/(?:team|ueber-uns|uber-uns|about|ansprechpartner)");
pattern!(
    CAREER_PATH,
    r"(?i)/(?:karriere|career|jobs?|stellenangebote)(?:[/.?#]|$)"
);
pattern!(
    LEGAL_PATH,
    r"(?i)/(?:datenschutz|privacy|agb|terms|cookie)"
);

fn shared_url_rules() -> Vec<WeightedRule> {
    vec![
        WeightedRule::new("contact_path", RuleTarget::Url, &CONTACT_PATH, 10),
        WeightedRule::new("team_path", RuleTarget::Url, &TEAM_PATH, 5),
        WeightedRule::new("legal_path", RuleTarget::Url, &LEGAL_PATH, -10),
    ]
}

fn shared_signals() -> Vec<(Signal, i32)> {
    vec![
        (Signal::PersonalEmail, 15),
        (Signal::GenericEmail, 3),
        (Signal::Phone, 20),
        (Signal::WhatsApp, 15),
        (Signal::PlausibleName, 10),
        (Signal::SalesRole, 15),
        (Signal::OtherRole, 5),
        (Signal::Company, 3),
        (Signal::Industry, 3),
    ]
}

fn recruiting_table() -> RuleTable {
    let mut rules = vec![
        WeightedRule::new("sales_keywords", RuleTarget::Text, &SALES_TERMS, 5).per_hit(3),
        WeightedRule::new("job_seeking", RuleTarget::Text, &JOB_SEEKING, 12),
        WeightedRule::new("hiring_urgency", RuleTarget::Text, &HIRING_URGENCY, 8),
        WeightedRule::new("recruiting", RuleTarget::Text, &RECRUITING, 5),
        WeightedRule::new("low_pay", RuleTarget::Text, &LOW_PAY, -15),
        WeightedRule::new("pyramid_scheme", RuleTarget::Text, &PYRAMID, -20),
        WeightedRule::new("career_path", RuleTarget::Url, &CAREER_PATH, -5),
    ];
    rules.extend(shared_url_rules());
    RuleTable {
        rules,
        signals: shared_signals(),
        max_industries: 2,
    }
}

fn passive_table() -> RuleTable {
    let mut rules = vec![
        WeightedRule::new("sales_keywords", RuleTarget::Text, &SALES_TERMS, 5).per_hit(3),
        // Somebody announcing a job search is not a passive candidate.
        WeightedRule::new("job_seeking", RuleTarget::Text, &JOB_SEEKING, -15),
        WeightedRule::new("employed", RuleTarget::Text, &EMPLOYED, 8),
        WeightedRule::new("recruiting", RuleTarget::Text, &RECRUITING, -5),
        WeightedRule::new("low_pay", RuleTarget::Text, &LOW_PAY, -15),
        WeightedRule::new("pyramid_scheme", RuleTarget::Text, &PYRAMID, -20),
        WeightedRule::new("career_path", RuleTarget::Url, &CAREER_PATH, -10),
    ];
    rules.extend(shared_url_rules());
    RuleTable {
        rules,
        signals: shared_signals(),
        max_industries: 2,
    }
}

/// Job-seeking phrases, shared with classification.
pub(crate) fn job_seeking() -> &'static Regex {
    &JOB_SEEKING
}

/// Recruiting phrases, shared with classification.
pub(crate) fn recruiting() -> &'static Regex {
    &RECRUITING
}

/// Employment phrases, shared with classification.
pub(crate) fn employed() -> &'static Regex {
    &EMPLOYED
}

/// Sales vocabulary, shared with role classification.
pub(crate) fn sales_terms() -> &'static Regex {
    &SALES_TERMS
}
