//! Contact extraction from fetched pages.
//!
//! Contact-shaped URLs (`/kontakt`, `/impressum`, `/team`) get a fast path
//! that reads `mailto:`, `tel:` and WhatsApp anchors together with their
//! enclosing block. Everything else, and contact pages where the fast path
//! finds nothing, goes through the heavy path: de-obfuscate, locate emails
//! and phone numbers, keep only those with a relevant keyword nearby,
//! cluster neighbours into one contact and attach the nearest name.

use once_cell::sync::Lazy;
use prospector_core::ExtractConfig;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use crate::deobfuscate::deobfuscate;
use crate::email::find_emails;
use crate::keywords::{
    contains_any, JOB_SEEKER_KEYWORDS, RECRUITING_KEYWORDS, ROLE_TITLES, SALES_KEYWORDS,
};
use crate::name::{find_names, NameMatch, NamePattern};
use crate::phone::{find_phones, find_whatsapp, normalize_phone, PhoneMatch};
use crate::text::{element_text, is_block, looks_like_html};

/// Path fragments that mark contact, imprint and team pages.
const CONTACT_PATH_HINTS: &[&str] = &[
    "kontakt",
    "contact",
    "impressum",
    "imprint",
    "team",
    "ansprechpartner",
    "ueber-uns",
    "uber-uns",
    "about",
];

/// Largest enclosing block read around a fast-path anchor.
const MAX_BLOCK_CHARS: usize = 600;

static ROLE: Lazy<Regex> = Lazy::new(|| {
    let roles = ROLE_TITLES
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{roles})\b")).expect("valid regex")
});

static COMPANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[\p{Lu}\d][\p{L}\d&.\-]*[ \t]+){1,4}(?:GmbH\b(?:[ \t]*&[ \t]*Co\.[ \t]*KG\b)?|AG\b|KG\b|OHG\b|UG\b(?:[ \t]*\(haftungsbeschränkt\))?|e\.K\.|GbR\b|SE\b)",
    )
    .expect("valid regex")
});

static WHATSAPP_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)wa\.me/|api\.whatsapp\.com|whats\s?app").expect("valid regex"));

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("valid selector"))
}

/// Which route produced a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPattern {
    /// Anchor scan on a contact-shaped page
    FastPathAnchor,
    /// Keyword-gated window without a recognised name
    ContextWindow,
    /// Name found after a salutation or title
    TitlePrefix,
    /// Name found after a context marker or role title
    ContextMarker,
    /// Name found by capitalization
    Capitalization,
}

impl ExtractionPattern {
    /// Stable label used for pattern statistics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FastPathAnchor => "fast_path_anchor",
            Self::ContextWindow => "context_window",
            Self::TitlePrefix => "title_prefix",
            Self::ContextMarker => "context_marker",
            Self::Capitalization => "capitalization",
        }
    }
}

impl fmt::Display for ExtractionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NamePattern> for ExtractionPattern {
    fn from(pattern: NamePattern) -> Self {
        match pattern {
            NamePattern::TitlePrefix => Self::TitlePrefix,
            NamePattern::ContextMarker => Self::ContextMarker,
            NamePattern::Capitalization => Self::Capitalization,
        }
    }
}

/// One contact recovered from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContact {
    /// Person name
    pub name: Option<String>,
    /// Email address, lower-cased
    pub email: Option<String>,
    /// Phone number in international format
    pub phone: Option<String>,
    /// Whether the phone passed the digit-count bounds
    pub phone_valid: bool,
    /// WhatsApp number in international format
    pub whatsapp: Option<String>,
    /// Role title near the contact
    pub role: Option<String>,
    /// Company name near the contact
    pub company: Option<String>,
    /// Route that produced the contact
    pub pattern: ExtractionPattern,
    /// Whether the page URL is contact-shaped
    pub from_contact_page: bool,
    /// Text surrounding the contact
    pub context: String,
}

impl ExtractedContact {
    fn empty(pattern: ExtractionPattern, from_contact_page: bool) -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            phone_valid: false,
            whatsapp: None,
            role: None,
            company: None,
            pattern,
            from_contact_page,
            context: String::new(),
        }
    }

    /// Whether at least one way to reach the contact was found.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.email.is_some() || self.phone.is_some() || self.whatsapp.is_some()
    }
}

/// Page text plus the contacts found in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Visible, de-obfuscated page text
    pub text: String,
    /// Contacts in page order
    pub contacts: Vec<ExtractedContact>,
}

/// Whether a URL path looks like a contact, imprint or team page.
#[must_use]
pub fn is_contact_url(url: &str) -> bool {
    let path = Url::parse(url).map_or_else(|_| url.to_lowercase(), |u| u.path().to_lowercase());
    CONTACT_PATH_HINTS.iter().any(|hint| path.contains(hint))
}

/// Largest char boundary at or below `index`.
fn floor_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `index`.
fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Slice of `text` extending `radius` bytes around `start..end`.
fn window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = floor_boundary(text, start.saturating_sub(radius));
    let to = ceil_boundary(text, end.saturating_add(radius));
    &text[from..to]
}

fn is_fax(text: &str, start: usize) -> bool {
    let from = floor_boundary(text, start.saturating_sub(12));
    text[from..floor_boundary(text, start)]
        .to_lowercase()
        .contains("fax")
}

fn find_role(text: &str) -> Option<String> {
    ROLE.find(text).map(|m| m.as_str().to_string())
}

fn find_company(text: &str) -> Option<String> {
    COMPANY.find(text).map(|m| m.as_str().trim().to_string())
}

fn is_relevant(window: &str) -> bool {
    let lower = window.to_lowercase();
    contains_any(&lower, SALES_KEYWORDS)
        || contains_any(&lower, JOB_SEEKER_KEYWORDS)
        || contains_any(&lower, RECRUITING_KEYWORDS)
}

#[derive(Debug, Clone)]
enum AnchorKind {
    Email(String),
    Phone { value: String, valid: bool },
    WhatsApp(String),
}

#[derive(Debug, Clone)]
struct Anchor {
    start: usize,
    end: usize,
    kind: AnchorKind,
}

#[derive(Debug)]
struct Cluster {
    start: usize,
    end: usize,
    anchors: Vec<Anchor>,
}

impl Cluster {
    fn conflicts(&self, anchor: &Anchor) -> bool {
        self.anchors.iter().any(|a| match (&a.kind, &anchor.kind) {
            (AnchorKind::Email(x), AnchorKind::Email(y)) => x != y,
            (AnchorKind::Phone { value: x, .. }, AnchorKind::Phone { value: y, .. }) => x != y,
            _ => false,
        })
    }
}

/// Block of a contact page holding one or more fast-path anchors.
#[derive(Debug, Default)]
struct Block {
    text: String,
    email: Option<String>,
    phone: Option<(String, bool)>,
    whatsapp: Option<String>,
}

/// Extracts contacts from raw page content.
#[derive(Debug, Clone)]
pub struct ContactExtractor {
    country: String,
    radius: usize,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default())
    }
}

impl ContactExtractor {
    /// Create an extractor from configuration.
    #[must_use]
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            country: config.default_country_code.trim_start_matches('+').to_string(),
            radius: config.context_window_chars.max(20),
        }
    }

    /// Extract contacts from HTML or plain text fetched from `url`.
    ///
    /// Malformed or irrelevant input yields an empty list.
    #[must_use]
    pub fn extract(&self, raw: &str, url: &str) -> Vec<ExtractedContact> {
        self.extract_document(raw, url).contacts
    }

    /// Like [`extract`](Self::extract) but also returns the page text the
    /// contacts were read from.
    #[must_use]
    pub fn extract_document(&self, raw: &str, url: &str) -> ExtractedDocument {
        let contact_page = is_contact_url(url);

        if looks_like_html(raw) {
            let document = Html::parse_document(raw);
            let text = deobfuscate(&element_text(document.root_element()));
            if contact_page {
                let contacts = self.fast_path(&document, &text);
                if !contacts.is_empty() {
                    debug!(url, contacts = contacts.len(), path = "fast", "Extracted contacts");
                    return ExtractedDocument { text, contacts };
                }
            }
            let contacts = self.heavy_path(&text, contact_page);
            debug!(url, contacts = contacts.len(), path = "heavy", "Extracted contacts");
            return ExtractedDocument { text, contacts };
        }

        let text = deobfuscate(raw);
        let contacts = self.heavy_path(&text, contact_page);
        debug!(url, contacts = contacts.len(), path = "heavy", "Extracted contacts");
        ExtractedDocument { text, contacts }
    }

    fn fast_path(&self, document: &Html, page_text: &str) -> Vec<ExtractedContact> {
        let mut blocks: Vec<Block> = Vec::new();

        for anchor in document.select(anchor_selector()) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            let lower = href.to_lowercase();

            let mut email = None;
            let mut phone = None;
            let mut whatsapp = None;
            if let Some(rest) = lower.strip_prefix("mailto:") {
                let address = rest.split('?').next().unwrap_or_default();
                email = find_emails(&deobfuscate(address))
                    .into_iter()
                    .next()
                    .map(|m| m.address);
            } else if let Some(rest) = lower
                .strip_prefix("tel:")
                .or_else(|| lower.strip_prefix("callto:"))
            {
                let number = normalize_phone(rest, &self.country);
                phone = Some((number.value, number.valid));
            } else if WHATSAPP_MARKER.is_match(&lower) {
                whatsapp = find_whatsapp(href, &self.country)
                    .into_iter()
                    .next()
                    .map(|n| n.value);
            }
            if email.is_none() && phone.is_none() && whatsapp.is_none() {
                continue;
            }

            let text = enclosing_block_text(anchor);
            let block = match blocks.iter().position(|b| b.text == text) {
                Some(i) => &mut blocks[i],
                None => {
                    blocks.push(Block {
                        text,
                        ..Block::default()
                    });
                    let last = blocks.len() - 1;
                    &mut blocks[last]
                }
            };
            if block.email.is_none() {
                block.email = email;
            }
            if block.phone.is_none() {
                block.phone = phone;
            }
            if block.whatsapp.is_none() {
                block.whatsapp = whatsapp;
            }
        }

        let page_company = find_company(page_text);
        let mut contacts: Vec<ExtractedContact> = blocks
            .into_iter()
            .map(|block| {
                let text = deobfuscate(&block.text);
                let mut contact = ExtractedContact::empty(ExtractionPattern::FastPathAnchor, true);
                contact.email = block
                    .email
                    .or_else(|| find_emails(&text).into_iter().next().map(|m| m.address));
                let phone = block.phone.or_else(|| {
                    self.phones(&text)
                        .into_iter()
                        .next()
                        .map(|p| (p.number.value, p.number.valid))
                });
                if let Some((value, valid)) = phone {
                    contact.phone = Some(value);
                    contact.phone_valid = valid;
                }
                contact.whatsapp = block.whatsapp.or_else(|| {
                    find_whatsapp(&text, &self.country)
                        .into_iter()
                        .next()
                        .map(|n| n.value)
                });
                let name = find_names(&text).into_iter().next();
                contact.role = name
                    .as_ref()
                    .and_then(|n| n.role.clone())
                    .or_else(|| find_role(&text));
                contact.name = name.map(|n| n.name);
                contact.company = find_company(&text).or_else(|| page_company.clone());
                contact.context = text;
                contact
            })
            .collect();
        dedup_contacts(&mut contacts);
        contacts
    }

    fn phones(&self, text: &str) -> Vec<PhoneMatch> {
        find_phones(text, &self.country)
            .into_iter()
            .filter(|p| !is_fax(text, p.start))
            .collect()
    }

    fn anchors(&self, text: &str) -> Vec<Anchor> {
        let mut anchors: Vec<Anchor> = find_emails(text)
            .into_iter()
            .map(|m| Anchor {
                start: m.start,
                end: m.end,
                kind: AnchorKind::Email(m.address),
            })
            .collect();

        anchors.extend(self.phones(text).into_iter().map(|p| Anchor {
            start: p.start,
            end: p.end,
            kind: AnchorKind::Phone {
                value: p.number.value,
                valid: p.number.valid,
            },
        }));

        for m in WHATSAPP_MARKER.find_iter(text) {
            let tail = &text[m.start()..ceil_boundary(text, m.end() + 40)];
            if let Some(number) = find_whatsapp(tail, &self.country).into_iter().next() {
                anchors.push(Anchor {
                    start: m.start(),
                    end: m.start() + tail.len(),
                    kind: AnchorKind::WhatsApp(number.value),
                });
            }
        }

        anchors.sort_by_key(|a| a.start);
        anchors
    }

    fn heavy_path(&self, text: &str, contact_page: bool) -> Vec<ExtractedContact> {
        let gated: Vec<Anchor> = self
            .anchors(text)
            .into_iter()
            .filter(|a| is_relevant(window(text, a.start, a.end, self.radius)))
            .collect();
        if gated.is_empty() {
            return Vec::new();
        }

        let join_distance = self.radius / 2;
        let mut clusters: Vec<Cluster> = Vec::new();
        for anchor in gated {
            match clusters.last_mut() {
                Some(cluster)
                    if anchor.start.saturating_sub(cluster.end) <= join_distance
                        && !cluster.conflicts(&anchor) =>
                {
                    cluster.end = cluster.end.max(anchor.end);
                    cluster.anchors.push(anchor);
                }
                _ => clusters.push(Cluster {
                    start: anchor.start,
                    end: anchor.end,
                    anchors: vec![anchor],
                }),
            }
        }

        let names = find_names(text);
        let page_company = find_company(text);
        let mut contacts: Vec<ExtractedContact> = clusters
            .iter()
            .map(|cluster| {
                let context = window(text, cluster.start, cluster.end, self.radius / 2);
                let name = nearest_name(&names, cluster, self.radius);
                let pattern = name.map_or(ExtractionPattern::ContextWindow, |n| n.pattern.into());
                let mut contact = ExtractedContact::empty(pattern, contact_page);
                for anchor in &cluster.anchors {
                    match &anchor.kind {
                        AnchorKind::Email(address) if contact.email.is_none() => {
                            contact.email = Some(address.clone());
                        }
                        AnchorKind::Phone { value, valid } if contact.phone.is_none() => {
                            contact.phone = Some(value.clone());
                            contact.phone_valid = *valid;
                        }
                        AnchorKind::WhatsApp(value) if contact.whatsapp.is_none() => {
                            contact.whatsapp = Some(value.clone());
                        }
                        _ => {}
                    }
                }
                contact.role = name
                    .and_then(|n| n.role.clone())
                    .or_else(|| find_role(context));
                contact.name = name.map(|n| n.name.clone());
                contact.company = find_company(context).or_else(|| page_company.clone());
                contact.context = context.split_whitespace().collect::<Vec<_>>().join(" ");
                contact
            })
            .collect();
        dedup_contacts(&mut contacts);
        contacts
    }
}

/// Text of the nearest block element around an anchor, bounded in size.
fn enclosing_block_text(anchor: ElementRef<'_>) -> String {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|el| is_block(el.value().name()))
        .map(element_text)
        .take_while(|text| text.chars().count() <= MAX_BLOCK_CHARS)
        .next()
        .unwrap_or_else(|| element_text(anchor))
}

/// Closest name within `radius` of the cluster, names in front preferred on ties.
fn nearest_name<'a>(
    names: &'a [NameMatch],
    cluster: &Cluster,
    radius: usize,
) -> Option<&'a NameMatch> {
    names
        .iter()
        .map(|n| {
            let distance = if n.end <= cluster.start {
                cluster.start - n.end
            } else if n.start >= cluster.end {
                n.start - cluster.end + 1
            } else {
                0
            };
            (distance, n)
        })
        .filter(|(distance, _)| *distance <= radius)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, n)| n)
}

fn dedup_contacts(contacts: &mut Vec<ExtractedContact>) {
    let mut seen = std::collections::HashSet::new();
    contacts.retain(|c| {
        c.has_channel() && seen.insert((c.email.clone(), c.phone.clone(), c.whatsapp.clone()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContactExtractor {
        ContactExtractor::default()
    }

    #[test]
    fn test_contact_url_shapes() {
        assert!(is_contact_url("https://firma.de/kontakt"));
        assert!(is_contact_url("https://firma.de/de/Impressum.html"));
        assert!(is_contact_url("https://firma.de/ueber-uns/team/"));
        assert!(!is_contact_url("https://firma.de/produkte?ref=kontakt"));
        assert!(!is_contact_url("https://firma.de/blog/2024/messe"));
    }

    #[test]
    fn test_pattern_labels() {
        assert_eq!(ExtractionPattern::FastPathAnchor.as_str(), "fast_path_anchor");
        assert_eq!(
            ExtractionPattern::from(NamePattern::TitlePrefix),
            ExtractionPattern::TitlePrefix
        );
        assert_eq!(ExtractionPattern::Capitalization.to_string(), "capitalization");
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let text = "äöü Vertrieb ß 0211 123456 üüü";
        let start = text.find("0211").unwrap_or_default();
        for radius in 0..12 {
            let w = window(text, start, start + 4, radius);
            assert!(w.contains("0211"));
        }
    }

    #[test]
    fn test_gate_drops_irrelevant_numbers() {
        let text = "Öffnungszeiten Mo-Fr, Telefon 0211 123456. Wir backen Brot.";
        assert!(extractor().extract(text, "https://baeckerei.de/start").is_empty());
    }

    #[test]
    fn test_fax_numbers_are_skipped() {
        let text = "Vertrieb: Tel 0211 123456, Fax 0211 123457";
        let contacts = extractor().extract(text, "https://firma.de/start");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].phone.as_deref(), Some("+49211123456"));
    }

    #[test]
    fn test_distant_contacts_are_not_merged() {
        let filler = "Lorem ipsum dolor sit amet. ".repeat(20);
        let text = format!(
            "Vertrieb Nord: Anna Schmidt, anna.schmidt@firma.de {filler} Vertrieb Süd: Thomas Weber, 0221 445566"
        );
        let contacts = extractor().extract(&text, "https://firma.de/vertrieb");
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].name.as_deref(), Some("Anna Schmidt"));
        assert_eq!(contacts[0].email.as_deref(), Some("anna.schmidt@firma.de"));
        assert!(contacts[0].phone.is_none());
        assert_eq!(contacts[1].name.as_deref(), Some("Thomas Weber"));
        assert_eq!(contacts[1].phone.as_deref(), Some("+49221445566"));
    }

    #[test]
    fn test_malformed_input_is_empty() {
        assert!(extractor().extract("", "not a url").is_empty());
        assert!(extractor().extract("<<<>>> <a href=", "https://x.de/kontakt").is_empty());
        assert!(extractor().extract("\u{0}\u{1}", "https://x.de").is_empty());
    }
}
