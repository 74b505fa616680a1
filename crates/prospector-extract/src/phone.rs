//! Phone number detection and normalization.
//!
//! Numbers are normalized to `+<country><subscriber>` with digits only.
//! The normalizer handles the national trunk prefix (`0211`), the
//! bracketed trunk marker (`+49 (0)211`), the `00` international prefix,
//! a stray trunk zero or doubled country code after the prefix
//! (`+490211`, `+4949211`) and extension suffixes (`-12`, `Durchwahl 12`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lower bound on digits (country code included) for a plausible number.
pub const MIN_DIGITS: usize = 8;

/// Upper bound on digits (country code included) for a plausible number.
pub const MAX_DIGITS: usize = 16;

/// Bytes before a candidate searched for bank-detail labels.
const BANK_WINDOW: usize = 48;

/// Candidate numbers: `+cc`, `00cc` or a national trunk `0` followed by
/// digits and the usual separators. Adjacent numbers may land in one
/// candidate; [`split_candidate`] separates them.
static PHONE_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\s?\d{1,3}|\b0)[\d \u{a0}/().\-]{5,40}\d").expect("valid regex")
});

static BANK_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:iban|bic|swift|blz|kto|konto(?:nummer|nr)?|bankverbindung)\b")
        .expect("valid regex")
});

static PHONE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tel|fon|phone|mobil|handy|fax|whats\s?app)").expect("valid regex")
});

static EXTENSION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:ext\.?|durchwahl|dw\.?|app\.?|x)\s*\d{1,5}\s*$").expect("valid regex")
});

static EXTENSION_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\d)\s*-\s*\d{1,4}$").expect("valid regex"));

static DATE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}\.\d{2,4}").expect("valid regex"));

static WHATSAPP_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:wa\.me/|api\.whatsapp\.com/send/?\?phone=|whatsapp://send\?phone=)\+?(\d{8,16})")
        .expect("valid regex")
});

static WHATSAPP_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)whats\s?app\s*(?:nr\.?|nummer)?\s*[:\-]?\s*((?:\+|00|0)[\d \u{a0}/().\-]{6,22}\d)")
        .expect("valid regex")
});

/// A normalized phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    /// `+<digits>` when valid; the raw input otherwise
    pub value: String,
    /// Whether the digit count is within [`MIN_DIGITS`]..=[`MAX_DIGITS`]
    pub valid: bool,
}

/// A phone number found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneMatch {
    /// Matched text
    pub raw: String,
    /// Byte offset of the match start
    pub start: usize,
    /// Byte offset of the match end
    pub end: usize,
    /// Normalized number
    pub number: PhoneNumber,
}

fn strip_extension(raw: &str) -> &str {
    let without_word = match EXTENSION_WORD.find(raw) {
        Some(m) if m.start() > 0 => &raw[..m.start()],
        _ => raw,
    };
    if let Some(caps) = EXTENSION_DASH.captures(without_word) {
        let main = caps.get(1).map_or(without_word, |m| m.as_str());
        if main.chars().filter(char::is_ascii_digit).count() >= 10 {
            return main;
        }
    }
    without_word
}

/// Normalize a phone number to international format.
///
/// `default_country` is the calling code applied to national numbers
/// (e.g. `"49"`). Inputs whose digit count falls outside
/// [`MIN_DIGITS`]..=[`MAX_DIGITS`] are returned unmodified and flagged invalid.
#[must_use]
pub fn normalize_phone(raw: &str, default_country: &str) -> PhoneNumber {
    let invalid = || PhoneNumber {
        value: raw.to_string(),
        valid: false,
    };

    let trimmed = strip_extension(raw.trim()).replace("(0)", "");
    let trimmed = trimmed.trim_start();
    let explicit_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return invalid();
    }

    let mut international = if explicit_plus {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{default_country}{rest}")
    } else if digits.starts_with(default_country) && digits.len() >= 11 {
        digits
    } else {
        format!("{default_country}{digits}")
    };

    if !default_country.is_empty() {
        if let Some(rest) = international.strip_prefix(default_country) {
            if let Some(subscriber) = rest.strip_prefix('0') {
                international = format!("{default_country}{subscriber}");
            } else if let Some(subscriber) = rest.strip_prefix(default_country) {
                // Short remainders are more likely real area codes (`+49 4921...`).
                if subscriber.len() > MIN_DIGITS {
                    international = format!("{default_country}{subscriber}");
                }
            }
        }
    }

    if (MIN_DIGITS..=MAX_DIGITS).contains(&international.len()) {
        PhoneNumber {
            value: format!("+{international}"),
            valid: true,
        }
    } else {
        invalid()
    }
}

/// Whether the candidate continues a digit group, as in the tail of an
/// IBAN (`DE89 3704 0044 ...`).
fn continues_digit_run(text: &str, start: usize) -> bool {
    text[..start]
        .trim_end()
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_digit())
}

/// Whether a bank-detail label precedes the candidate with no phone label
/// in between.
fn in_bank_details(text: &str, start: usize) -> bool {
    let mut from = start.saturating_sub(BANK_WINDOW);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let window = &text[from..start];
    let Some(bank) = BANK_LABEL.find_iter(window).last() else {
        return false;
    };
    !PHONE_LABEL
        .find_iter(window)
        .any(|label| label.start() >= bank.end())
}

/// Byte ranges of the numbers inside one candidate.
///
/// A `/` starts a new number when a trunk `0` follows it. `0211 / 12 34 56`
/// stays whole, `0211 123456 / 0171 1234567` splits in two.
fn piece_bounds(raw: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        if c == '/' && raw[i + 1..].trim_start().trim_start_matches('(').starts_with('0') {
            bounds.push((start, i));
            start = i + 1;
        }
    }
    bounds.push((start, raw.len()));
    bounds
}

fn to_match(text: &str, start: usize, end: usize, default_country: &str) -> Option<PhoneMatch> {
    let slice = &text[start..end];
    let trimmed = slice.trim_start();
    let start = start + (slice.len() - trimmed.len());
    let raw = trimmed.trim_end_matches(['-', '/', ' ', '(', '\u{a0}']);
    let number = normalize_phone(raw, default_country);
    number.valid.then(|| PhoneMatch {
        start,
        end: start + raw.len(),
        raw: raw.to_string(),
        number,
    })
}

/// Split a candidate into its numbers. Falls back to the whole candidate
/// when any piece fails to normalize.
fn split_candidate(
    text: &str,
    start: usize,
    end: usize,
    default_country: &str,
) -> Vec<PhoneMatch> {
    let pieces = piece_bounds(&text[start..end]);
    if pieces.len() > 1 {
        let matches: Vec<PhoneMatch> = pieces
            .iter()
            .filter_map(|&(s, e)| to_match(text, start + s, start + e, default_country))
            .collect();
        if matches.len() == pieces.len() {
            return matches;
        }
    }
    to_match(text, start, end, default_country)
        .into_iter()
        .collect()
}

/// Find phone numbers in text.
///
/// Date-like matches, digit groups inside bank details and matches that
/// don't normalize to a valid number are dropped.
#[must_use]
pub fn find_phones(text: &str, default_country: &str) -> Vec<PhoneMatch> {
    PHONE_CANDIDATE
        .find_iter(text)
        .filter(|m| !DATE_LIKE.is_match(m.as_str()))
        .filter(|m| !continues_digit_run(text, m.start()))
        .filter(|m| !in_bank_details(text, m.start()))
        .flat_map(|m| split_candidate(text, m.start(), m.end(), default_country))
        .collect()
}

/// Find WhatsApp numbers from `wa.me` style links and `WhatsApp:` labels.
#[must_use]
pub fn find_whatsapp(text: &str, default_country: &str) -> Vec<PhoneNumber> {
    let mut numbers: Vec<PhoneNumber> = WHATSAPP_LINK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        // Link numbers are already international.
        .map(|m| normalize_phone(&format!("+{}", m.as_str()), default_country))
        .chain(
            WHATSAPP_LABEL
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| normalize_phone(m.as_str(), default_country)),
        )
        .filter(|n| n.valid)
        .collect();
    let mut seen = std::collections::HashSet::new();
    numbers.retain(|n| seen.insert(n.value.clone()));
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_forms_normalize_identically() {
        for raw in ["0211 123456", "+49 (0)211 123456", "0049211123456"] {
            let n = normalize_phone(raw, "49");
            assert!(n.valid, "{raw}");
            assert_eq!(n.value, "+49211123456", "{raw}");
        }
    }

    #[test]
    fn test_separators_and_typos() {
        assert_eq!(normalize_phone("0211 / 12 34 56", "49").value, "+49211123456");
        assert_eq!(normalize_phone("+490211123456", "49").value, "+49211123456");
        assert_eq!(normalize_phone("+49 49 211 123456", "49").value, "+49211123456");
        assert_eq!(normalize_phone("(0211) 123-456", "49").value, "+49211123456");
        assert_eq!(normalize_phone("+49 4921 123456", "49").value, "+494921123456");
    }

    #[test]
    fn test_extensions_are_stripped() {
        assert_eq!(normalize_phone("0211 123456-12", "49").value, "+49211123456");
        assert_eq!(normalize_phone("0211 123456 Durchwahl 3", "49").value, "+49211123456");
        // Short numbers keep their dash group.
        assert_eq!(normalize_phone("0211-12345", "49").value, "+4921112345");
    }

    #[test]
    fn test_foreign_numbers_keep_their_country() {
        assert_eq!(normalize_phone("+43 1 5123456", "49").value, "+4315123456");
        assert_eq!(normalize_phone("0041 44 123 45 67", "49").value, "+41441234567");
    }

    #[test]
    fn test_implausible_lengths_are_returned_unmodified() {
        let short = normalize_phone("123", "49");
        assert!(!short.valid);
        assert_eq!(short.value, "123");

        let long = normalize_phone("+49 1234 5678 9012 3456 78", "49");
        assert!(!long.valid);
        assert_eq!(long.value, "+49 1234 5678 9012 3456 78");

        assert!(!normalize_phone("Telefon", "49").valid);
    }

    #[test]
    fn test_find_phones_in_text() {
        let text = "Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56, Fax: +49 211 654321.";
        let phones = find_phones(text, "49");
        let values: Vec<&str> = phones.iter().map(|p| p.number.value.as_str()).collect();
        assert_eq!(values, vec!["+49211123456", "+49211654321"]);
        assert_eq!(&text[phones[0].start..phones[0].end], phones[0].raw);
    }

    #[test]
    fn test_find_phones_skips_dates_and_short_codes() {
        let text = "Stand 01.02.2024, PLZ 04109, Preis 0,99 EUR";
        assert!(find_phones(text, "49").is_empty());
    }

    #[test]
    fn test_find_phones_ignores_bank_details() {
        let text = "Vertrieb GmbH, Bankverbindung IBAN: DE89 3704 0044 0532 0130 00";
        assert!(find_phones(text, "49").is_empty());

        let text = "Konto 0123 456 789, BLZ 370 400 44";
        assert!(find_phones(text, "49").is_empty());

        let text = "IBAN: DE89 3704 0044 0532 0130 00, Tel: 0211 123456";
        let phones = find_phones(text, "49");
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].number.value, "+49211123456");
    }

    #[test]
    fn test_find_phones_splits_adjacent_numbers() {
        let text = "Tel 0211 123456 / 0171 1234567";
        let phones = find_phones(text, "49");
        let values: Vec<&str> = phones.iter().map(|p| p.number.value.as_str()).collect();
        assert_eq!(values, vec!["+49211123456", "+491711234567"]);
        assert_eq!(phones[0].raw, "0211 123456");
        assert_eq!(&text[phones[1].start..phones[1].end], "0171 1234567");
    }

    #[test]
    fn test_whatsapp_links_and_labels() {
        let text = r#"<a href="https://wa.me/491701234567">Chat</a> WhatsApp: 0170 1234567 oder 0151 9999999"#;
        let numbers = find_whatsapp(text, "49");
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].value, "+491701234567");
    }
}
