//! Binary document retrieval.
//!
//! Orders and judgments are fetched over plain HTTP with a streaming body.
//! The remote's declared content type is not fully trusted: a mismatch is
//! logged but tolerated, while an implausibly small body is rejected as
//! corrupt rather than returned.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::logging::EngineLogger;
use crate::types::DocumentPayload;

/// Bodies under this size are corrupt or error pages, never real documents.
pub const MIN_DOCUMENT_BYTES: usize = 100;

const FALLBACK_FILENAME: &str = "court_document.pdf";
const DOCUMENT_EXTENSION: &str = ".pdf";
const FALLBACK_MIME: &str = "application/pdf";

/// Errors surfaced by document retrieval.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("document body of {size} bytes is below the plausibility threshold")]
    TooSmall { size: usize },
}

/// Streaming fetcher for order/judgment attachments.
pub struct DocumentFetcher {
    client: Client,
    timeout: Duration,
    logger: EngineLogger,
}

impl DocumentFetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        logger: EngineLogger,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            timeout,
            logger,
        })
    }

    /// Retrieve a document, accumulating the streamed body in full.
    pub async fn fetch(&self, url: &str) -> Result<DocumentPayload, DocumentError> {
        self.logger
            .info(format!("fetching document {url}"), Some("documents"), None);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !declared.contains("pdf") && !declared.contains("octet-stream") {
            self.logger.info(
                format!("declared content type '{declared}' does not look like a document"),
                Some("documents"),
                None,
            );
        }

        let mut content = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk?);
        }

        ensure_plausible(&content)?;

        Ok(DocumentPayload {
            filename: filename_from_url(url),
            mime_type: if declared.is_empty() {
                FALLBACK_MIME.to_string()
            } else {
                declared
            },
            content,
        })
    }
}

/// Reject bodies too small to be a real document.
pub fn ensure_plausible(content: &[u8]) -> Result<(), DocumentError> {
    if content.len() < MIN_DOCUMENT_BYTES {
        return Err(DocumentError::TooSmall {
            size: content.len(),
        });
    }
    Ok(())
}

/// Derive a filename from the URL's last path segment, forcing a recognized
/// document extension.
pub fn filename_from_url(url: &str) -> String {
    let candidate = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()?
                .filter(|segment| !segment.is_empty())
                .next_back()
                .map(str::to_string)
        })
        .unwrap_or_default();

    let mut filename = if candidate.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        candidate
    };
    if !filename.to_lowercase().ends_with(DOCUMENT_EXTENSION) {
        filename.push_str(DOCUMENT_EXTENSION);
    }
    filename
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_below_the_threshold_are_rejected() {
        let err = ensure_plausible(&[0u8; 50]).expect_err("too small");
        assert!(matches!(err, DocumentError::TooSmall { size: 50 }));
        assert!(ensure_plausible(&[0u8; 500]).is_ok());
        assert!(ensure_plausible(&[0u8; MIN_DOCUMENT_BYTES]).is_ok());
        assert!(ensure_plausible(&[0u8; MIN_DOCUMENT_BYTES - 1]).is_err());
    }

    #[test]
    fn filenames_come_from_the_last_path_segment() {
        assert_eq!(
            filename_from_url("https://delhihighcourt.nic.in/app/orders/wp1234.pdf"),
            "wp1234.pdf"
        );
        assert_eq!(
            filename_from_url("https://delhihighcourt.nic.in/app/orders/wp1234.PDF"),
            "wp1234.PDF"
        );
    }

    #[test]
    fn query_strings_are_not_part_of_the_filename() {
        assert_eq!(
            filename_from_url("https://delhihighcourt.nic.in/orders/doc.pdf?session=9"),
            "doc.pdf"
        );
    }

    #[test]
    fn missing_extension_is_forced() {
        assert_eq!(
            filename_from_url("https://delhihighcourt.nic.in/orders/doc"),
            "doc.pdf"
        );
    }

    #[test]
    fn unparsable_urls_fall_back_to_a_generic_name() {
        assert_eq!(filename_from_url("not a url"), FALLBACK_FILENAME);
        assert_eq!(
            filename_from_url("https://delhihighcourt.nic.in"),
            FALLBACK_FILENAME
        );
    }
}
