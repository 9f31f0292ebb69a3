use docqa_common::{DocQaError, Result};
use tracing::{debug, warn};

/// Number of characters shown as a preview of an uploaded document.
pub const PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct DocumentProcessor;

impl DocumentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts the text of a PDF held in memory, one page per newline.
    pub async fn extract_text(&self, bytes: Vec<u8>) -> Result<String> {
        let pages = self.extract_pages(bytes).await?;
        Ok(join_pages(&pages))
    }

    /// Returns the text of each page in order.
    ///
    /// Parsing runs on the blocking pool. A parser panic surfaces as an
    /// extraction error so a malformed upload cannot take the process down.
    pub async fn extract_pages(&self, bytes: Vec<u8>) -> Result<Vec<String>> {
        let size = bytes.len();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| {
            warn!(size, error = %e, "PDF parser aborted");
            DocQaError::Extraction(format!("PDF parser aborted: {}", e))
        })?
        .map_err(|e| {
            warn!(size, error = %e, "PDF text extraction failed");
            DocQaError::Extraction(e.to_string())
        })?;

        debug!(size, pages = pages.len(), "Extracted PDF text");
        Ok(pages)
    }
}

/// Concatenates page texts, each followed by a newline.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page.as_ref());
        text.push('\n');
    }
    text
}

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_PAGES: &[u8] = include_bytes!("../testdata/three_pages.pdf");

    #[test]
    fn test_join_pages() {
        assert_eq!(join_pages(&["first", "second"]), "first\nsecond\n");
        assert_eq!(join_pages::<&str>(&[]), "");
    }

    #[test]
    fn test_blank_pages_are_whitespace_only() {
        let text = join_pages(&["", "  ", ""]);
        assert!(text.trim().is_empty());
    }

    #[test]
    fn test_preview_truncates_on_characters() {
        let text = "ü".repeat(1500);
        let shown = preview(&text);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_rejected() {
        let processor = DocumentProcessor::new();
        let result = processor
            .extract_text(b"this is definitely not a pdf".to_vec())
            .await;
        assert!(matches!(result, Err(DocQaError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let processor = DocumentProcessor::new();
        let result = processor.extract_text(Vec::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_extracts_each_page_in_order() {
        let processor = DocumentProcessor::new();
        let pages = processor.extract_pages(THREE_PAGES.to_vec()).await.unwrap();

        assert_eq!(pages.len(), 3);
        assert!(pages[0].contains("Alpha 01") && pages[0].contains("warranty"));
        assert!(pages[1].contains("Bravo 11") && pages[1].contains("receipt"));
        assert!(pages[2].contains("Charlie 06") && pages[2].contains("weekdays"));
        assert!(!pages[0].contains("Bravo"));
    }

    #[tokio::test]
    async fn test_extracted_text_ends_each_page_with_newline() {
        let processor = DocumentProcessor::new();
        let pages = processor.extract_pages(THREE_PAGES.to_vec()).await.unwrap();
        let text = processor.extract_text(THREE_PAGES.to_vec()).await.unwrap();

        assert_eq!(text, join_pages(&pages));
        assert!(text.ends_with('\n'));
        let alpha = text.find("Alpha 01").unwrap();
        let bravo = text.find("Bravo 01").unwrap();
        let charlie = text.find("Charlie 01").unwrap();
        assert!(alpha < bravo && bravo < charlie);
    }
}
