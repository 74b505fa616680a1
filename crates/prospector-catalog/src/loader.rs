//! Catalog loading from TOML files.
//!
//! A catalog directory holds `queries.toml`, `domains.toml` and a `portals/`
//! directory with one file per portal. Any piece that is missing or empty is
//! replaced by the built-in default compiled into the binary.

use crate::{
    definition::{DomainLists, PortalDefinition, QueryFile, QueryTemplate},
    error::{CatalogError, Result},
};
use prospector_core::CatalogConfig;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_QUERIES: &str = include_str!("../defaults/queries.toml");
const DEFAULT_DOMAINS: &str = include_str!("../defaults/domains.toml");
const DEFAULT_PORTALS: &[(&str, &str)] = &[
    (
        "kleinanzeigen-gesuche.toml",
        include_str!("../defaults/portals/kleinanzeigen-gesuche.toml"),
    ),
    (
        "markt-stellengesuche.toml",
        include_str!("../defaults/portals/markt-stellengesuche.toml"),
    ),
];

/// Everything the loader produced, already validated.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Query templates
    pub queries: Vec<QueryTemplate>,
    /// Portal definitions
    pub portals: Vec<PortalDefinition>,
    /// Domain lists
    pub domains: DomainLists,
}

/// Loader for catalog files.
pub struct CatalogLoader {
    /// Catalog directory; `None` means built-in defaults only
    dir: Option<PathBuf>,
}

impl CatalogLoader {
    /// Create a loader for the given catalog directory.
    ///
    /// # Errors
    /// Returns error if the path exists but is not a directory, or doesn't exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(CatalogError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }
        Ok(Self { dir: Some(dir) })
    }

    /// Create a loader that only uses the built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Create a loader from configuration.
    ///
    /// A configured directory that doesn't exist is logged and ignored.
    #[must_use]
    pub fn from_config(config: &CatalogConfig) -> Self {
        match &config.dir {
            Some(dir) => Self::new(dir).unwrap_or_else(|e| {
                warn!(error = %e, "catalog directory unusable, using built-in catalog");
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    /// Load the full catalog.
    ///
    /// Invalid entries are logged as warnings and skipped.
    ///
    /// # Errors
    /// Returns error if the catalog directory can't be read or the built-in
    /// defaults fail to parse.
    pub fn load(&self) -> Result<Catalog> {
        let mut queries = match self.file("queries.toml") {
            Some(path) => Self::parse_queries(&Self::read(&path)?, &path.display().to_string()),
            None => Vec::new(),
        };
        if queries.is_empty() {
            debug!("no usable queries on disk, using built-in queries");
            queries = Self::parse_queries(DEFAULT_QUERIES, "<builtin>/queries.toml");
        }

        let domains = match self.file("domains.toml") {
            Some(path) => Self::parse::<DomainLists>(&Self::read(&path)?, &path)?,
            None => toml::from_str(DEFAULT_DOMAINS).map_err(|e| CatalogError::ParseError {
                path: "<builtin>/domains.toml".to_string(),
                source: e,
            })?,
        }
        .normalized();

        let mut portals = Vec::new();
        if let Some(dir) = self.dir.as_ref().map(|d| d.join("portals")).filter(|d| d.is_dir()) {
            Self::load_portals_dir(&dir, &mut portals)?;
        } else {
            for (name, contents) in DEFAULT_PORTALS {
                Self::push_portal(contents, &format!("<builtin>/portals/{name}"), &mut portals);
            }
        }

        info!(
            queries = queries.len(),
            portals = portals.len(),
            blacklisted = domains.blacklist.len(),
            dir = %self.dir.as_deref().map_or_else(|| "<builtin>".to_string(), |d| d.display().to_string()),
            "loaded catalog"
        );

        Ok(Catalog {
            queries,
            portals,
            domains,
        })
    }

    fn file(&self, name: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(name))
            .filter(|p| p.is_file())
    }

    fn read(path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse<T: DeserializeOwned>(contents: &str, path: &Path) -> Result<T> {
        toml::from_str(contents).map_err(|e| CatalogError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn parse_queries(contents: &str, origin: &str) -> Vec<QueryTemplate> {
        let file: QueryFile = match toml::from_str(contents) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %origin, error = %e, "failed to parse query catalog");
                return Vec::new();
            }
        };

        file.query
            .into_iter()
            .filter(|q| match q.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %origin, error = %e, "skipping invalid query");
                    false
                }
            })
            .collect()
    }

    fn load_portals_dir(dir: &Path, portals: &mut Vec<PortalDefinition>) -> Result<()> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("toml"))
            .collect();
        paths.sort();

        for path in paths {
            match Self::read(&path) {
                Ok(contents) => {
                    Self::push_portal(&contents, &path.display().to_string(), portals);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read portal"),
            }
        }
        Ok(())
    }

    fn push_portal(contents: &str, origin: &str, portals: &mut Vec<PortalDefinition>) {
        match toml::from_str::<PortalDefinition>(contents) {
            Ok(definition) => {
                if let Err(e) = definition.validate() {
                    warn!(path = %origin, error = %e, "skipping invalid portal definition");
                    return;
                }
                if portals.iter().any(|p| p.id() == definition.id()) {
                    warn!(path = %origin, portal_id = %definition.id(), "duplicate portal ID, skipping");
                    return;
                }
                portals.push(definition);
            }
            Err(e) => {
                warn!(path = %origin, error = %e, "failed to parse portal definition");
            }
        }
    }
}
