//! Prospector Extract - recovers contacts from fetched pages.
//!
//! The extractor never fails: malformed or irrelevant input yields an
//! empty list. Building blocks are public so the scorer and tests can use
//! them directly.
//!
//! # Modules
//!
//! - [`deobfuscate`] - undo `name [at] firma [dot] de` and friends
//! - [`phone`] - tolerant phone matching and normalization
//! - [`email`] - email matching and personal/generic classification
//! - [`name`] - name heuristics with a plausibility filter
//! - [`keywords`] - keyword tables shared with the scorer
//! - [`extractor`] - [`ContactExtractor`] with fast and heavy paths
//!
//! # Example
//!
//! ```rust
//! use prospector_extract::{normalize_phone, ContactExtractor};
//!
//! assert_eq!(normalize_phone("+49 (0)211 123456", "49").value, "+49211123456");
//!
//! let contacts = ContactExtractor::default().extract(
//!     "Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56",
//!     "https://firma.de/kontakt",
//! );
//! assert_eq!(contacts[0].name.as_deref(), Some("Thomas Weber"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod deobfuscate;
pub mod email;
pub mod extractor;
pub mod keywords;
pub mod name;
pub mod phone;
pub mod text;

pub use deobfuscate::deobfuscate;
pub use email::{find_emails, is_generic_email, is_personal_email, EmailMatch};
pub use extractor::{
    is_contact_url, ContactExtractor, ExtractedContact, ExtractedDocument, ExtractionPattern,
};
pub use name::{find_names, is_plausible_name, NameMatch, NamePattern};
pub use phone::{find_phones, find_whatsapp, normalize_phone, PhoneMatch, PhoneNumber};
pub use text::{looks_like_html, visible_text};
