//! Keyword tables shared by the context gate and the scorer.

/// Words that mark sales roles and sales work.
pub const SALES_KEYWORDS: &[&str] = &[
    "vertrieb",
    "verkauf",
    "sales",
    "außendienst",
    "aussendienst",
    "innendienst",
    "account manager",
    "key account",
    "kundenberater",
    "kundenbetreuer",
    "handelsvertreter",
    "vertriebsleiter",
    "verkaufsleiter",
    "verkäufer",
    "vertriebsmitarbeiter",
    "akquise",
    "neukunden",
    "business development",
    "gebietsleiter",
    "vertriebsbeauftragter",
];

/// Phrases people use when looking for a job.
pub const JOB_SEEKER_KEYWORDS: &[&str] = &[
    "stellengesuch",
    "suche stelle",
    "suche job",
    "suche arbeit",
    "suche eine neue",
    "ich suche",
    "neue herausforderung",
    "auf jobsuche",
    "open to work",
    "verfügbar ab",
    "quereinsteiger",
    "quereinstieg",
    "berufserfahrung",
    "lebenslauf",
];

/// Phrases companies use when hiring.
pub const RECRUITING_KEYWORDS: &[&str] = &[
    "wir suchen",
    "stellenangebot",
    "stellenanzeige",
    "verstärkung",
    "m/w/d",
    "w/m/d",
    "jetzt bewerben",
    "bewerbung an",
    "karriere",
    "offene stellen",
];

/// Role titles recognised in front of a name.
pub const ROLE_TITLES: &[&str] = &[
    "Vertriebsleiterin",
    "Vertriebsleiter",
    "Verkaufsleiterin",
    "Verkaufsleiter",
    "Leiter Vertrieb",
    "Leiterin Vertrieb",
    "Vertriebsmitarbeiterin",
    "Vertriebsmitarbeiter",
    "Außendienstmitarbeiterin",
    "Außendienstmitarbeiter",
    "Key Account Managerin",
    "Key Account Manager",
    "Account Managerin",
    "Account Manager",
    "Sales Managerin",
    "Sales Manager",
    "Gebietsleiterin",
    "Gebietsleiter",
    "Handelsvertreterin",
    "Handelsvertreter",
    "Kundenberaterin",
    "Kundenberater",
    "Geschäftsführerin",
    "Geschäftsführer",
    "Inhaberin",
    "Inhaber",
    "Personalleiterin",
    "Personalleiter",
];

/// Whether `text` (already lower-cased) contains any of `keywords`.
#[must_use]
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// How many of `keywords` occur in `text` (already lower-cased).
#[must_use]
pub fn count_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().map(|k| text.matches(k).count()).sum()
}
