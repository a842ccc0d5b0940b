//! Multi-format text extraction for uploaded documents (PDF, Word).
//!
//! PDFs get two independent strategies: the native text layer first, then
//! per-page optical recognition when the text layer comes back empty or
//! below the configured minimum. Structural failures (malformed file,
//! password protection) fail immediately without attempting OCR. The Word
//! path is a single deterministic extraction with no fallback.
//!
//! Output text is raw; whitespace cleaning is the chunker's job.

use std::io::Read;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::ExtractionError;
use crate::ocr::{OcrEngine, PageRasterizer, PdftoppmRasterizer, TesseractEngine};

/// Supported MIME types for extraction.
pub const MEDIA_PDF: &str = "application/pdf";
pub const MEDIA_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Converts stored file bytes + declared media type into raw text.
pub struct TextExtractor {
    ocr: Box<dyn OcrEngine>,
    rasterizer: Box<dyn PageRasterizer>,
    config: OcrConfig,
}

impl TextExtractor {
    /// Extractor wired to the real subprocess collaborators.
    pub fn new(config: OcrConfig) -> Self {
        Self {
            ocr: Box::new(TesseractEngine),
            rasterizer: Box::new(PdftoppmRasterizer),
            config,
        }
    }

    /// Extractor over caller-supplied collaborators (used by tests).
    pub fn with_collaborators(
        ocr: Box<dyn OcrEngine>,
        rasterizer: Box<dyn PageRasterizer>,
        config: OcrConfig,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            config,
        }
    }

    /// Extract raw text from file bytes according to the declared media
    /// type.
    pub async fn extract(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<String, ExtractionError> {
        match media_type {
            MEDIA_PDF => self.extract_pdf(bytes).await,
            MEDIA_DOCX => extract_docx(bytes),
            other => Err(ExtractionError::UnsupportedType(other.to_string())),
        }
    }

    async fn extract_pdf(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = extract_pdf_text_layer(bytes.to_vec()).await?;

        if text.trim().len() >= self.config.min_text_chars {
            return Ok(text);
        }

        tracing::debug!(
            chars = text.trim().len(),
            "text layer below threshold, falling back to OCR"
        );
        self.ocr_pdf(bytes).await
    }

    /// OCR fallback: rasterize every page, recognize sequentially with a
    /// per-page deadline, skip failed pages, concatenate the rest. Page
    /// images live in a temp dir that is removed unconditionally.
    async fn ocr_pdf(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let dir = tempfile::TempDir::new()?;

        let pages = self
            .rasterizer
            .rasterize(bytes, dir.path(), self.config.render_dpi)
            .await
            .map_err(|e| ExtractionError::Malformed(format!("page rasterization failed: {e}")))?;

        let deadline = Duration::from_secs(self.config.page_timeout_secs);
        let mut recognized = String::new();

        for (page_no, page) in pages.iter().enumerate() {
            match tokio::time::timeout(deadline, self.ocr.recognize(page, &self.config.language))
                .await
            {
                Ok(Ok(text)) => {
                    // strip page-boundary form feeds before concatenation
                    let text = text.replace('\u{c}', " ");
                    let text = text.trim();
                    if !text.is_empty() {
                        if !recognized.is_empty() {
                            recognized.push(' ');
                        }
                        recognized.push_str(text);
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(page = page_no + 1, "page recognition failed: {e}");
                }
                Err(_) => {
                    tracing::warn!(
                        page = page_no + 1,
                        timeout_secs = self.config.page_timeout_secs,
                        "page recognition timed out"
                    );
                }
            }
        }

        let got = recognized.trim().len();
        if got < self.config.min_ocr_chars {
            return Err(ExtractionError::InsufficientText {
                got,
                min: self.config.min_ocr_chars,
            });
        }

        Ok(recognized)
    }
}

/// Text-layer extraction off the async runtime; classifies structural
/// failures so password protection is distinguishable from corruption.
async fn extract_pdf_text_layer(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(classify_pdf_error)
    })
    .await
    .map_err(|e| ExtractionError::Malformed(e.to_string()))?
}

fn classify_pdf_error(e: pdf_extract::OutputError) -> ExtractionError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("encrypt") || lower.contains("password") {
        ExtractionError::PasswordProtected
    } else {
        ExtractionError::Malformed(message)
    }
}

/// Extract text from a docx: read `word/document.xml` out of the ZIP and
/// collect `<w:t>` runs, with a newline per closed paragraph. Single
/// deterministic step, any failure is fatal for the document.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractionError::Malformed(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractionError::Malformed(
            "word/document.xml not found".to_string(),
        ));
    }

    extract_w_t_elements(&doc_xml)
}

fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractionError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
