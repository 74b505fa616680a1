//! Industry tagging from keyword tables.

/// Industry tag and the keywords that indicate it.
pub const INDUSTRIES: &[(&str, &[&str])] = &[
    ("automotive", &["autohaus", "kfz", "automobil", "fahrzeughandel", "autoteile"]),
    ("insurance", &["versicherung", "versicherungsmakler", "assekuranz"]),
    ("finance", &["finanzberat", "vermögensberat", "baufinanzierung", "kredit", "bank"]),
    ("energy", &["photovoltaik", "solar", "energieberat", "wärmepumpe", "stromanbieter"]),
    ("it", &["software", "saas", "it-dienstleist", "cloud", "it-systemhaus"]),
    ("telecom", &["telekommunikation", "mobilfunk", "glasfaser", "breitband"]),
    ("real_estate", &["immobilien", "hausverwaltung", "makler"]),
    ("medical", &["medizintechnik", "pharma", "sanitätshaus", "dental"]),
    ("construction", &["bauunternehmen", "baustoff", "handwerk", "fenster und türen"]),
    ("logistics", &["logistik", "spedition", "fuhrpark", "kurierdienst"]),
    ("food", &["lebensmittel", "gastronomie", "getränke", "großhandel food"]),
    ("industrial", &["maschinenbau", "industriebedarf", "werkzeug", "anlagenbau"]),
];

/// Industries mentioned in `text`, in table order.
#[must_use]
pub fn detect_industries(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    INDUSTRIES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(tag, _)| (*tag).to_string())
        .collect()
}
