//! Search provider implementations.

pub mod brave;
pub mod common;
pub mod duckduckgo;
pub mod google;
pub mod portal;

pub use brave::BraveSearchProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use google::GoogleSearchProvider;
pub use portal::PortalCrawler;
