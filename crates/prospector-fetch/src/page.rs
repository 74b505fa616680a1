//! Fetched page and content classification.

use crate::error::{FetchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of document a response holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// HTML or XHTML markup
    Html,
    /// Plain text
    Text,
    /// PDF converted to text
    Pdf,
}

impl ContentKind {
    /// Classify a `Content-Type` header value.
    ///
    /// A missing header is treated as HTML. PDFs are accepted only when
    /// `enable_pdf` is set.
    pub fn classify(content_type: Option<&str>, enable_pdf: bool) -> Result<Self> {
        let Some(raw) = content_type else {
            return Ok(Self::Html);
        };
        let mime = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "" | "text/html" | "application/xhtml+xml" => Ok(Self::Html),
            "text/plain" => Ok(Self::Text),
            "application/pdf" if enable_pdf => Ok(Self::Pdf),
            _ => Err(FetchError::ContentType(mime)),
        }
    }
}

/// A successfully fetched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    /// HTTP status
    pub status: u16,
    /// Document kind
    pub kind: ContentKind,
    /// Body text (markup for HTML, extracted text for PDFs)
    pub body: String,
    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Whether the body is markup.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.kind == ContentKind::Html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_content_types() {
        assert_eq!(
            ContentKind::classify(Some("text/html; charset=utf-8"), false).ok(),
            Some(ContentKind::Html)
        );
        assert_eq!(ContentKind::classify(None, false).ok(), Some(ContentKind::Html));
        assert_eq!(
            ContentKind::classify(Some("TEXT/PLAIN"), false).ok(),
            Some(ContentKind::Text)
        );
        assert!(ContentKind::classify(Some("image/png"), true).is_err());
    }

    #[test]
    fn test_pdf_requires_flag() {
        assert!(matches!(
            ContentKind::classify(Some("application/pdf"), false),
            Err(FetchError::ContentType(_))
        ));
        assert_eq!(
            ContentKind::classify(Some("application/pdf"), true).ok(),
            Some(ContentKind::Pdf)
        );
    }
}
