//! Person-name heuristics.
//!
//! Three patterns are tried, strongest first: a salutation or academic
//! title in front of the name (`Herr Thomas Weber`), a context marker or
//! role title (`Ansprechpartner: Anna Schmidt`, `Vertriebsleiter Thomas
//! Weber`), and plain capitalization where the first word is a known
//! first name. Every candidate passes [`is_plausible_name`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::keywords::ROLE_TITLES;

/// One capitalized name word, hyphenated parts allowed.
const WORD: &str = r"\p{Lu}\p{Ll}+(?:-\p{Lu}\p{Ll}+)?";

static TITLE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:Herrn?|Frau|Dr\.|Prof\.)(?:\s+(?:Dr\.|Prof\.|med\.|rer\.\s*nat\.|Dipl\.-\p{{L}}+\.?))*\s+({WORD}(?:[ \t]+{WORD}){{1,3}})"
    ))
    .expect("valid regex")
});

static CONTEXT_MARKER: Lazy<Regex> = Lazy::new(|| {
    let roles = ROLE_TITLES
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?:(?i:ansprechpartner(?:in)?|ansprechperson|kontaktperson|ihr kontakt|vertreten durch|verantwortlich)|(?P<role>{roles}))\s*[:,\-–]?\s*(?:(?:Herrn?|Frau)\s+)?(?P<name>{WORD}(?:[ \t]+{WORD}){{1,3}})"
    ))
    .expect("valid regex")
});

static FIRST_NAME_LED: Lazy<Regex> = Lazy::new(|| {
    let first = FIRST_NAMES.join("|");
    Regex::new(&format!(r"\b(?:{first})[ \t]+{WORD}(?:[ \t]+{WORD})?\b")).expect("valid regex")
});

/// Common first names accepted by the capitalization heuristic.
const FIRST_NAMES: &[&str] = &[
    "Alexander", "Andrea", "Andreas", "Angelika", "Anja", "Anna", "Barbara", "Bernd", "Birgit",
    "Christian", "Christina", "Claudia", "Daniel", "Daniela", "David", "Dennis", "Dieter", "Dirk",
    "Elena", "Emma", "Eva", "Fabian", "Felix", "Florian", "Frank", "Gabriele", "Heike", "Helmut",
    "Ingrid", "Jan", "Jana", "Jens", "Jessica", "Johannes", "Jonas", "Julia", "Jürgen", "Karin",
    "Katharina", "Kerstin", "Klaus", "Laura", "Lena", "Lisa", "Lukas", "Marco", "Maria", "Marie",
    "Markus", "Martin", "Martina", "Matthias", "Max", "Melanie", "Michael", "Michaela", "Monika",
    "Nadine", "Nicole", "Niklas", "Oliver", "Patrick", "Paul", "Peter", "Petra", "Philipp",
    "Ralf", "Sabine", "Sandra", "Sarah", "Sebastian", "Silke", "Simon", "Sophie", "Stefan",
    "Stefanie", "Stephan", "Susanne", "Sven", "Thomas", "Tim", "Tobias", "Torsten", "Ulrich",
    "Ursula", "Uwe", "Werner", "Wolfgang", "Yvonne",
];

/// Capitalized words that are never part of a person's name.
const NAME_BLACKLIST: &[&str] = &[
    "Ansprechpartner", "Ansprechpartnerin", "Anfahrt", "Aktuelles", "Bewerbung", "Datenschutz",
    "Fax", "Firma", "Geschäftsführer", "Geschäftsführung", "Gmbh", "Herr", "Frau", "Impressum",
    "Inhaber", "Karriere", "Kontakt", "Kunden", "Mobil", "Newsletter", "Partner", "Sehr",
    "Geehrte", "Geehrter", "Service", "Startseite", "Straße", "Str", "Team", "Tel", "Telefon",
    "Unser", "Unsere", "Unternehmen", "Vertrieb", "Vielen", "Dank", "Willkommen", "Weitere",
    "Email", "Mail", "Handy", "Web", "Www", "Deutschland", "Mit", "Freundlichen", "Grüßen",
    "Stellenangebote", "Jobs", "Login", "Suche", "Menü", "Home",
];

/// Words dropped from the end of a greedy name match.
const TRAILING_NOISE: &[&str] = &["Tel", "Telefon", "Fax", "Mobil", "Handy", "Email", "Mail", "E-Mail"];

/// Which heuristic produced a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePattern {
    /// Salutation or academic title in front of the name
    TitlePrefix,
    /// Context marker or role title in front of the name
    ContextMarker,
    /// Capitalized words starting with a known first name
    Capitalization,
}

/// A plausible name found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    /// The name as written
    pub name: String,
    /// Byte offset of the name start
    pub start: usize,
    /// Byte offset of the name end
    pub end: usize,
    /// Heuristic that found it
    pub pattern: NamePattern,
    /// Role title directly in front of the name, if any
    pub role: Option<String>,
}

/// Whether `name` looks like a person's name: two to four capitalized
/// words, none of them blacklisted.
#[must_use]
pub fn is_plausible_name(name: &str) -> bool {
    let words: Vec<&str> = name.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) || name.len() > 60 {
        return false;
    }
    words.iter().all(|w| {
        let mut chars = w.chars();
        let capitalized = chars.next().is_some_and(char::is_uppercase)
            && w.chars().skip(1).any(char::is_lowercase);
        let letters = w.chars().all(|c| c.is_alphabetic() || c == '-');
        let blacklisted = NAME_BLACKLIST.iter().any(|b| b.eq_ignore_ascii_case(w));
        capitalized && letters && !blacklisted && w.chars().count() >= 2
    })
}

/// Drop trailing noise words (`Thomas Weber Tel` becomes `Thomas Weber`).
fn trim_noise(text: &str, start: usize) -> (String, usize) {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut begin = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(b) = begin.take() {
                spans.push((b, i));
            }
        } else if begin.is_none() {
            begin = Some(i);
        }
    }
    if let Some(b) = begin {
        spans.push((b, text.len()));
    }
    while spans.last().is_some_and(|&(b, e)| {
        TRAILING_NOISE
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&text[b..e]))
    }) {
        spans.pop();
    }
    let name = spans
        .iter()
        .map(|&(b, e)| &text[b..e])
        .collect::<Vec<_>>()
        .join(" ");
    (name, start + spans.last().map_or(0, |&(_, e)| e))
}

fn push_match(
    out: &mut Vec<NameMatch>,
    raw: &str,
    start: usize,
    pattern: NamePattern,
    role: Option<String>,
) {
    let (name, end) = trim_noise(raw, start);
    if !is_plausible_name(&name) {
        return;
    }
    // Stronger patterns run first; drop weaker overlapping matches.
    if out.iter().any(|m| start < m.end && m.start < end) {
        return;
    }
    out.push(NameMatch {
        name,
        start,
        end,
        pattern,
        role,
    });
}

/// Find plausible names in text, ordered by position.
#[must_use]
pub fn find_names(text: &str) -> Vec<NameMatch> {
    let mut out = Vec::new();

    for caps in TITLE_PREFIX.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_match(&mut out, m.as_str(), m.start(), NamePattern::TitlePrefix, None);
        }
    }

    for caps in CONTEXT_MARKER.captures_iter(text) {
        if let Some(m) = caps.name("name") {
            let role = caps.name("role").map(|r| r.as_str().to_string());
            push_match(&mut out, m.as_str(), m.start(), NamePattern::ContextMarker, role);
        }
    }

    for m in FIRST_NAME_LED.find_iter(text) {
        push_match(&mut out, m.as_str(), m.start(), NamePattern::Capitalization, None);
    }

    out.sort_by_key(|m| m.start);
    out
}
