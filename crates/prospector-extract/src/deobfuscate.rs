//! Reverse common email obfuscation before matching.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static BRACKETED_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\[\(\{<]\s*(?:at|ät|@|aet)\s*[\]\)\}>]\s*").expect("valid regex")
});

static BRACKETED_DOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\[\(\{<]\s*(?:dot|punkt|\.)\s*[\]\)\}>]\s*").expect("valid regex")
});

static SPELLED_OUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([a-z0-9][a-z0-9._%+-]*)\s+(?:at|ät)\s+([a-z0-9-]+(?:\s+(?:dot|punkt)\s+[a-z0-9-]+)+)\b",
    )
    .expect("valid regex")
});

static SPELLED_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:dot|punkt)\s+").expect("valid regex"));

/// HTML entities and escapes that hide `@` and `.`.
const ENTITIES: &[(&str, &str)] = &[
    ("&#64;", "@"),
    ("&#x40;", "@"),
    ("&#X40;", "@"),
    ("&commat;", "@"),
    ("\\u0040", "@"),
    ("&#46;", "."),
    ("&#x2e;", "."),
    ("&#x2E;", "."),
    ("&period;", "."),
];

/// Undo `name [at] firma [dot] de`, `name (at) firma.de`, `name at firma dot de`
/// and entity-encoded variants.
#[must_use]
pub fn deobfuscate(text: &str) -> String {
    let mut out = text.to_string();
    for (from, to) in ENTITIES {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    let out = BRACKETED_AT.replace_all(&out, "@");
    let out = BRACKETED_DOT.replace_all(&out, ".");
    SPELLED_OUT
        .replace_all(&out, |caps: &Captures<'_>| {
            format!("{}@{}", &caps[1], SPELLED_DOT.replace_all(&caps[2], "."))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_forms() {
        assert_eq!(deobfuscate("t.weber [at] firma [dot] de"), "t.weber@firma.de");
        assert_eq!(deobfuscate("t.weber(at)firma.de"), "t.weber@firma.de");
        assert_eq!(deobfuscate("t.weber {ät} firma (punkt) de"), "t.weber@firma.de");
    }

    #[test]
    fn test_spelled_out_form() {
        assert_eq!(
            deobfuscate("Mail: anna at vertrieb-nord dot de bitte"),
            "Mail: anna@vertrieb-nord.de bitte"
        );
    }

    #[test]
    fn test_entities() {
        assert_eq!(deobfuscate("info&#64;firma&#46;de"), "info@firma.de");
    }

    #[test]
    fn test_plain_prose_untouched() {
        let text = "Wir sind at home in Köln. Punkt.";
        assert_eq!(deobfuscate(text), text);
    }
}
