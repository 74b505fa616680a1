//! Email detection and personal/generic classification.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9][a-z0-9._%+-]{0,63}@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9-]{1,63})*\.[a-z]{2,24}\b")
        .expect("valid regex")
});

/// Local parts that belong to a role mailbox rather than a person.
const GENERIC_LOCAL_PARTS: &[&str] = &[
    "info", "kontakt", "contact", "office", "mail", "email", "service", "support", "hallo",
    "hello", "hi", "team", "vertrieb", "sales", "verkauf", "jobs", "job", "karriere", "career",
    "careers", "bewerbung", "bewerbungen", "personal", "hr", "noreply", "no-reply", "webmaster",
    "admin", "buchhaltung", "zentrale", "post", "anfrage", "anfragen", "datenschutz", "privacy",
    "presse", "marketing", "shop", "bestellung", "rechnung", "empfang",
];

/// Top-level domains that indicate an asset file name, not an address.
const ASSET_SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "css", "js"];

/// An email address found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMatch {
    /// Address, lower-cased
    pub address: String,
    /// Byte offset of the match start
    pub start: usize,
    /// Byte offset of the match end
    pub end: usize,
}

/// Find email addresses in (already de-obfuscated) text.
#[must_use]
pub fn find_emails(text: &str) -> Vec<EmailMatch> {
    EMAIL
        .find_iter(text)
        .filter(|m| {
            let tld = m.as_str().rsplit('.').next().unwrap_or_default().to_lowercase();
            !ASSET_SUFFIXES.contains(&tld.as_str())
        })
        .map(|m| EmailMatch {
            address: m.as_str().trim_end_matches('.').to_lowercase(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Whether an address is generic (`info@`, `vertrieb@`).
#[must_use]
pub fn is_generic_email(address: &str) -> bool {
    let local = address
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let base = local
        .split(['+', '.', '-', '_'])
        .next()
        .unwrap_or_default();
    GENERIC_LOCAL_PARTS.contains(&local.as_str())
        || (GENERIC_LOCAL_PARTS.contains(&base) && !local.contains('.'))
}

/// Whether an address looks like it belongs to one person.
#[must_use]
pub fn is_personal_email(address: &str) -> bool {
    address.contains('@') && !is_generic_email(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_emails() {
        let text = "Schreiben Sie an Thomas.Weber@Firma-Nord.de oder info@firma.de. Logo: logo@2x.png";
        let found: Vec<String> = find_emails(text).into_iter().map(|m| m.address).collect();
        assert_eq!(found, vec!["thomas.weber@firma-nord.de", "info@firma.de"]);
    }

    #[test]
    fn test_generic_vs_personal() {
        assert!(is_generic_email("info@firma.de"));
        assert!(is_generic_email("Vertrieb@firma.de"));
        assert!(is_generic_email("jobs-nord@firma.de"));
        assert!(!is_generic_email("t.weber@firma.de"));
        assert!(!is_generic_email("personal.weber@firma.de"));
        assert!(is_personal_email("anna.schmidt@web.de"));
        assert!(!is_personal_email("not-an-address"));
    }
}
