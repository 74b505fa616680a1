//! Loading a full catalog directory from disk.

use prospector_catalog::{CatalogLoader, CatalogRegistry};
use prospector_core::{CatalogConfig, RunMode};
use tempfile::TempDir;

fn write(dir: &std::path::Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, contents).expect("write catalog file");
}

#[test]
fn test_directory_catalog_replaces_builtin() {
    let tmp = TempDir::new().expect("create temp dir");
    write(
        tmp.path(),
        "queries.toml",
        r#"
[[query]]
text = "Außendienst Vertrieb Hamburg Kontakt"
modes = ["companies"]
region = "Hamburg"
priority = 5

[[query]]
text = "Stellengesuch Verkauf"
modes = ["job-seekers"]
"#,
    );
    write(
        tmp.path(),
        "domains.toml",
        r#"
blacklist = ["example-spam.com"]
reveal_hosts = ["anzeigen.example"]
"#,
    );
    write(
        tmp.path(),
        "portals/anzeigen.toml",
        r#"
[portal]
id = "anzeigen"
name = "Anzeigen"
listing_url = "https://anzeigen.example/gesuche?q={query}&p={page}"
detail_selector = "li.result a"
detail_url_contains = "/gesuch/"
modes = ["job-seekers"]
"#,
    );

    let config = CatalogConfig {
        dir: Some(tmp.path().to_path_buf()),
    };
    let registry =
        CatalogRegistry::load_from(&CatalogLoader::from_config(&config)).expect("load catalog");

    let companies = registry.queries_for(RunMode::Companies);
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].region.as_deref(), Some("Hamburg"));

    assert!(registry.is_blacklisted("mail.example-spam.com"));
    assert!(!registry.is_blacklisted("facebook.com"));
    assert!(registry.hides_phone("anzeigen.example"));

    let portals = registry.portals_for(RunMode::JobSeekers);
    assert_eq!(portals.len(), 1);
    assert_eq!(portals[0].portal.max_pages, 3);
    assert_eq!(
        portals[0].listing_page_url("vertrieb", 2),
        "https://anzeigen.example/gesuche?q=vertrieb&p=2"
    );
}

#[test]
fn test_missing_configured_dir_uses_builtin() {
    let config = CatalogConfig {
        dir: Some("/definitely/not/here".into()),
    };
    let registry =
        CatalogRegistry::load_from(&CatalogLoader::from_config(&config)).expect("load catalog");
    assert!(registry.query_count() > 0);
}
