//! URL canonicalization and path-based ranking.

use std::collections::HashMap;
use url::Url;

/// Query parameters dropped during canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "yclid", "dclid", "igshid", "mc_cid", "mc_eid", "_ga", "_gl",
    "ref", "referrer", "source", "trk", "sessionid", "sid", "phpsessid", "jsessionid", "cid",
];

/// Pagination parameters dropped during canonicalization. Short keys such
/// as `p`, `start` or `offset` often address distinct documents
/// (`/?p=123` on WordPress) and are kept.
const PAGINATION_PARAMS: &[&str] = &["page", "seite", "pagenr", "paged"];

/// Path hints and their weights. First match per group counts.
const CONTACT_HINTS: &[&str] = &["kontakt", "contact", "impressum", "imprint"];
const TEAM_HINTS: &[&str] = &[
    "team",
    "ueber-uns",
    "uber-uns",
    "about",
    "ansprechpartner",
    "mitarbeiter",
];
const CAREER_HINTS: &[&str] = &["karriere", "career", "jobs", "stellenangebote", "bewerbung"];
const LEGAL_HINTS: &[&str] = &["datenschutz", "privacy", "agb", "terms", "cookie", "disclaimer"];

const CONTACT_BONUS: i32 = 30;
const TEAM_BONUS: i32 = 15;
const CAREER_PENALTY: i32 = -10;
const LEGAL_PENALTY: i32 = -20;
const PAGINATION_PENALTY: i32 = -10;
const LONG_URL_PENALTY: i32 = -10;
const DEPTH_PENALTY: i32 = -5;
const MAX_COMFORTABLE_DEPTH: usize = 4;
const MAX_COMFORTABLE_LEN: usize = 120;

/// Canonical form of a URL: lower-case host, no fragment, no tracking or
/// pagination parameters. Non-HTTP URLs yield `None`.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let key = k.to_lowercase();
            !key.starts_with("utm_")
                && !TRACKING_PARAMS.contains(&key.as_str())
                && !PAGINATION_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    Some(url.to_string())
}

/// Host of a URL without a leading `www.`.
#[must_use]
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

fn has_hint(segments: &[String], hints: &[&str]) -> bool {
    segments
        .iter()
        .any(|s| hints.iter().any(|h| s.contains(h)))
}

/// Additive path score; higher is more likely to hold a contact.
#[must_use]
pub fn path_score(url: &str) -> i32 {
    let Ok(parsed) = Url::parse(url) else {
        return 0;
    };
    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(str::to_lowercase).collect())
        .unwrap_or_default();

    let mut score = 0;
    if has_hint(&segments, CONTACT_HINTS) {
        score += CONTACT_BONUS;
    } else if has_hint(&segments, TEAM_HINTS) {
        score += TEAM_BONUS;
    }
    if has_hint(&segments, CAREER_HINTS) {
        score += CAREER_PENALTY;
    }
    if has_hint(&segments, LEGAL_HINTS) {
        score += LEGAL_PENALTY;
    }
    let paginated = segments.windows(2).any(|w| {
        matches!(w[0].as_str(), "page" | "seite") && w[1].chars().all(|c| c.is_ascii_digit())
    }) || segments.iter().any(|s| s.starts_with("seite-") || s.starts_with("page-"));
    if paginated {
        score += PAGINATION_PENALTY;
    }
    if url.len() > MAX_COMFORTABLE_LEN {
        score += LONG_URL_PENALTY;
    }
    if segments.len() > MAX_COMFORTABLE_DEPTH {
        // Depth is bounded by the URL length, so the cast can't wrap.
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let extra = (segments.len() - MAX_COMFORTABLE_DEPTH) as i32;
        score += DEPTH_PENALTY * extra;
    }
    score
}

/// A URL with its ranking score and discovery position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedUrl {
    /// Canonical URL
    pub url: String,
    /// Host without `www.`
    pub domain: String,
    /// Path score plus source bonus
    pub score: i32,
    /// Position in discovery order
    pub order: usize,
}

/// Rank canonical URLs by path score plus a per-domain bonus, best first.
/// Ties keep discovery order.
#[must_use]
pub fn rank_urls(urls: &[String], domain_bonus: &HashMap<String, i32>) -> Vec<RankedUrl> {
    let mut ranked: Vec<RankedUrl> = urls
        .iter()
        .enumerate()
        .filter_map(|(order, url)| {
            let domain = domain_of(url)?;
            let bonus = domain_bonus.get(&domain).copied().unwrap_or(0);
            Some(RankedUrl {
                score: path_score(url) + bonus,
                url: url.clone(),
                domain,
                order,
            })
        })
        .collect();
    // Stable sort keeps discovery order for equal scores.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}
