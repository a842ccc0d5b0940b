//! End-to-end ingestion and ask-flow tests over a temporary SQLite store.
//!
//! External collaborators (OCR engine, page rasterizer, generation
//! service) are mocked; the embedding service runs its deterministic local
//! fallback and the index service runs its durable-store fallback, so the
//! whole pipeline is exercised without any network.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use askdoc::ask;
use askdoc::config::{Config, DbConfig};
use askdoc::embedding::EmbeddingService;
use askdoc::error::GenerationError;
use askdoc::extract::{TextExtractor, MEDIA_DOCX, MEDIA_PDF};
use askdoc::generate::Generator;
use askdoc::index::IndexService;
use askdoc::ingest;
use askdoc::models::{Document, ProcessingState};
use askdoc::ocr::{OcrEngine, PageRasterizer};
use askdoc::retrieve;
use askdoc::services::Services;
use askdoc::store::ChunkStore;
use askdoc::{db, migrate};

const USER: &str = "local";

// ============ Fixtures ============

/// Minimal valid multi-page PDF with one text line per page. Pages with an
/// empty string get an empty content stream (an image-only stand-in).
/// Builds body then xref with correct byte offsets so pdf-extract can
/// parse it.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let font_id = 3 + 2 * n;

    let mut objects: Vec<Vec<u8>> = Vec::new();
    objects.push(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n".to_vec());

    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    objects.push(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            n
        )
        .into_bytes(),
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 3 + 2 * i;
        let content_id = page_id + 1;
        objects.push(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >> endobj\n",
                page_id, content_id, font_id
            )
            .into_bytes(),
        );
        let stream = if text.is_empty() {
            String::new()
        } else {
            format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", text)
        };
        objects.push(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .into_bytes(),
        );
    }

    objects.push(
        format!(
            "{} 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
            font_id
        )
        .into_bytes(),
    );

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for obj in &objects {
        offsets.push(out.len());
        out.extend_from_slice(obj);
    }
    let xref_start = out.len();
    let total = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {}\n", total).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total, xref_start
        )
        .as_bytes(),
    );
    out
}

/// Minimal docx (ZIP) containing word/document.xml with one paragraph per
/// input string.
fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document \
             xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

// ============ Mock collaborators ============

struct FakeRasterizer {
    pages: usize,
    invoked: Arc<AtomicBool>,
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(&self, _pdf: &[u8], out_dir: &Path, _dpi: u32) -> Result<Vec<PathBuf>> {
        self.invoked.store(true, Ordering::SeqCst);
        let mut paths = Vec::new();
        for i in 0..self.pages {
            let path = out_dir.join(format!("page-{:02}.png", i + 1));
            std::fs::write(&path, b"")?;
            paths.push(path);
        }
        Ok(paths)
    }
}

struct FakeOcrEngine {
    text: String,
    invoked: Arc<AtomicBool>,
}

#[async_trait]
impl OcrEngine for FakeOcrEngine {
    async fn recognize(&self, _image: &Path, _language: &str) -> Result<String> {
        self.invoked.store(true, Ordering::SeqCst);
        if self.text.is_empty() {
            return Err(anyhow!("nothing recognized"));
        }
        Ok(self.text.clone())
    }
}

struct MockGenerator {
    invoked: Arc<AtomicBool>,
    fail: bool,
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.invoked.store(true, Ordering::SeqCst);
        if self.fail {
            return Err(GenerationError::Request("mock outage".to_string()));
        }
        Ok("a grounded mock answer".to_string())
    }
}

// ============ Harness ============

struct Harness {
    services: Arc<Services>,
    ocr_invoked: Arc<AtomicBool>,
    generator_invoked: Arc<AtomicBool>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    harness_with("recognized words from a scanned page that easily clear the minimum", false).await
}

async fn harness_with(ocr_text: &str, failing_generator: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: dir.path().join("askdoc.sqlite"),
        },
        chunking: Default::default(),
        embedding: Default::default(),
        index: Default::default(),
        ocr: Default::default(),
        generation: Default::default(),
        retrieval: Default::default(),
    };

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let store = ChunkStore::new(pool);

    let ocr_invoked = Arc::new(AtomicBool::new(false));
    let generator_invoked = Arc::new(AtomicBool::new(false));

    let extractor = TextExtractor::with_collaborators(
        Box::new(FakeOcrEngine {
            text: ocr_text.to_string(),
            invoked: ocr_invoked.clone(),
        }),
        Box::new(FakeRasterizer {
            pages: 2,
            invoked: ocr_invoked.clone(),
        }),
        config.ocr.clone(),
    );

    let services = Services {
        store: store.clone(),
        extractor,
        embedder: EmbeddingService::disabled(),
        index: IndexService::fallback_only(store),
        generator: Box::new(MockGenerator {
            invoked: generator_invoked.clone(),
            fail: failing_generator,
        }),
        config,
    };

    Harness {
        services: Arc::new(services),
        ocr_invoked,
        generator_invoked,
        _dir: dir,
    }
}

const PAGE_TEXT: [&str; 3] = [
    "This is the first page of the fixture document used by the ingestion test suite.",
    "The second page continues with more plain digital text for the text layer.",
    "Finally the third page closes the fixture with a short concluding sentence.",
];

// ============ Ingestion ============

#[tokio::test]
async fn digital_pdf_ingests_with_contiguous_ordinals() {
    let h = harness().await;
    let bytes = pdf_with_pages(&PAGE_TEXT);

    let report = ingest::ingest_document(&h.services, USER, "fixture.pdf", MEDIA_PDF, &bytes)
        .await
        .unwrap();

    assert_eq!(report.state, ProcessingState::Succeeded);
    assert!(report.chunk_count > 0);
    assert_eq!(report.chunks_created, report.chunk_count);
    assert!(!h.ocr_invoked.load(Ordering::SeqCst), "OCR must not run");

    let doc = h
        .services
        .store
        .get_document(&report.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.processed, ProcessingState::Succeeded);

    let chunks = h
        .services
        .store
        .chunks_for_scope(USER, Some(&report.document_id), 100)
        .await
        .unwrap();
    assert_eq!(chunks.len(), report.chunks_created);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64);
        // fallback index path leaves chunks unindexed
        assert!(chunk.index_ref.is_none());
    }
}

#[tokio::test]
async fn image_only_pdf_takes_the_ocr_path() {
    let h = harness().await;
    let bytes = pdf_with_pages(&["", ""]);

    let report = ingest::ingest_document(&h.services, USER, "scan.pdf", MEDIA_PDF, &bytes)
        .await
        .unwrap();

    assert!(h.ocr_invoked.load(Ordering::SeqCst), "OCR must run");
    assert_eq!(report.state, ProcessingState::Succeeded);
    assert!(report.chunk_count > 0);
}

#[tokio::test]
async fn ocr_yielding_too_little_fails_the_document() {
    let h = harness_with("", false).await;
    let bytes = pdf_with_pages(&[""]);

    let report = ingest::ingest_document(&h.services, USER, "scan.pdf", MEDIA_PDF, &bytes)
        .await
        .unwrap();

    assert!(h.ocr_invoked.load(Ordering::SeqCst));
    assert_eq!(report.state, ProcessingState::Failed);
    assert_eq!(report.chunk_count, 0);

    let doc = h
        .services
        .store
        .get_document(&report.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.processed, ProcessingState::Failed);
}

#[tokio::test]
async fn docx_ingests_without_fallback() {
    let h = harness().await;
    let bytes = docx_with_paragraphs(&[
        "The quarterly report covers revenue and expenses in detail.",
        "A second paragraph describes the outlook for the next quarter.",
    ]);

    let report = ingest::ingest_document(&h.services, USER, "report.docx", MEDIA_DOCX, &bytes)
        .await
        .unwrap();

    assert_eq!(report.state, ProcessingState::Succeeded);
    assert!(report.chunk_count > 0);
    assert!(!h.ocr_invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn malformed_docx_marks_document_failed() {
    let h = harness().await;

    let report = ingest::ingest_document(&h.services, USER, "broken.docx", MEDIA_DOCX, b"not a zip")
        .await
        .unwrap();

    assert_eq!(report.state, ProcessingState::Failed);
    let doc = h
        .services
        .store
        .get_document(&report.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.processed, ProcessingState::Failed);
}

#[tokio::test]
async fn unsupported_media_type_marks_document_failed() {
    let h = harness().await;

    let report = ingest::ingest_document(&h.services, USER, "notes.txt", "text/plain", b"hello")
        .await
        .unwrap();

    assert_eq!(report.state, ProcessingState::Failed);
}

#[tokio::test]
async fn spawned_ingest_acknowledges_before_completion() {
    let h = harness().await;
    let bytes = pdf_with_pages(&PAGE_TEXT);

    let (document_id, handle) = ingest::spawn_ingest(
        h.services.clone(),
        USER,
        "fixture.pdf",
        MEDIA_PDF,
        bytes,
    )
    .await
    .unwrap();

    // the row exists as soon as the ack returns
    let doc = h
        .services
        .store
        .get_document(&document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.file_name, "fixture.pdf");

    let report = handle.await.unwrap();
    assert_eq!(report.document_id, document_id);
    assert_eq!(report.state, ProcessingState::Succeeded);
}

#[tokio::test]
async fn delete_cascades_chunks() {
    let h = harness().await;
    let bytes = pdf_with_pages(&PAGE_TEXT);
    let report = ingest::ingest_document(&h.services, USER, "fixture.pdf", MEDIA_PDF, &bytes)
        .await
        .unwrap();
    assert!(h.services.store.chunk_count(&report.document_id).await.unwrap() > 0);

    h.services.store.delete_document(&report.document_id).await.unwrap();

    assert_eq!(
        h.services.store.chunk_count(&report.document_id).await.unwrap(),
        0
    );
    assert!(h
        .services
        .store
        .get_document(&report.document_id)
        .await
        .unwrap()
        .is_none());
}

// ============ Retrieval ============

#[tokio::test]
async fn retrieval_is_scoped_to_one_document() {
    let h = harness().await;

    let a = ingest::ingest_document(
        &h.services,
        USER,
        "alpha.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&["Alpha document text about volcanoes and geology."]),
    )
    .await
    .unwrap();
    let b = ingest::ingest_document(
        &h.services,
        USER,
        "beta.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&["Beta document text about sailing and navigation."]),
    )
    .await
    .unwrap();

    let results = retrieve::search(
        &h.services.embedder,
        &h.services.index,
        USER,
        "tell me about volcanoes",
        Some(&a.document_id),
        5,
    )
    .await
    .unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.document_id, a.document_id);
        assert_ne!(result.document_id, b.document_id);
    }
}

#[tokio::test]
async fn retrieval_respects_top_k_and_descends() {
    let h = harness().await;

    // enough text for well over five chunks at max_chars = 1000
    let sentences: Vec<String> = (0..200)
        .map(|i| format!("Sentence number {} talks about the fixture corpus.", i))
        .collect();
    let paragraph = sentences.join(" ");
    let report = ingest::ingest_document(
        &h.services,
        USER,
        "long.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&[paragraph.as_str()]),
    )
    .await
    .unwrap();
    assert!(report.chunk_count > 5);

    let results = retrieve::search(
        &h.services.embedder,
        &h.services.index,
        USER,
        "what does the corpus say",
        Some(&report.document_id),
        5,
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 5);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for result in &results {
        assert!((0.0..=1.0).contains(&result.score));
    }
}

#[tokio::test]
async fn irrelevant_query_still_returns_scored_passages() {
    let h = harness().await;
    let report = ingest::ingest_document(
        &h.services,
        USER,
        "doc.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&["Nothing in here mentions the query topic at all."]),
    )
    .await
    .unwrap();

    let results = retrieve::search(
        &h.services.embedder,
        &h.services.index,
        USER,
        "what is a zettelkasten",
        Some(&report.document_id),
        5,
    )
    .await
    .unwrap();

    assert!(!results.is_empty(), "chunks exist, so passages must come back");
    for result in &results {
        assert!(result.score > 0.0);
    }
}

// ============ Ask flow ============

#[tokio::test]
async fn empty_store_short_circuits_generation() {
    let h = harness().await;

    let answer = ask::ask(&h.services, USER, "what is in my documents?", None, &[])
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0);
    assert!(answer.sources.is_empty());
    assert!(
        !h.generator_invoked.load(Ordering::SeqCst),
        "generation service must never be invoked without grounding"
    );
}

#[tokio::test]
async fn pending_document_reports_no_content() {
    let h = harness().await;

    let doc = Document {
        id: "pending-doc".to_string(),
        user_id: USER.to_string(),
        file_name: "slow.pdf".to_string(),
        media_type: MEDIA_PDF.to_string(),
        byte_size: 10,
        processed: ProcessingState::Pending,
        created_at: 0,
    };
    h.services.store.insert_document(&doc).await.unwrap();

    let answer = ask::ask(&h.services, USER, "anything?", Some("pending-doc"), &[])
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0);
    assert!(answer.sources.is_empty());
    assert!(!h.generator_invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_document_reports_no_content() {
    let h = harness().await;
    let report = ingest::ingest_document(&h.services, USER, "bad.docx", MEDIA_DOCX, b"garbage")
        .await
        .unwrap();
    assert_eq!(report.state, ProcessingState::Failed);

    let answer = ask::ask(
        &h.services,
        USER,
        "anything?",
        Some(&report.document_id),
        &[],
    )
    .await
    .unwrap();

    assert_eq!(answer.confidence, 0);
    assert!(!h.generator_invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn grounded_question_gets_generated_answer_with_sources() {
    let h = harness().await;
    let report = ingest::ingest_document(
        &h.services,
        USER,
        "report.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&["Revenue grew by twelve percent over the previous year."]),
    )
    .await
    .unwrap();

    let answer = ask::ask(
        &h.services,
        USER,
        "how much did revenue grow?",
        Some(&report.document_id),
        &[],
    )
    .await
    .unwrap();

    assert!(h.generator_invoked.load(Ordering::SeqCst));
    assert_eq!(answer.text, "a grounded mock answer");
    assert!(answer.confidence > 0);
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.len() <= h.services.config.retrieval.top_k);
}

#[tokio::test]
async fn generation_failure_becomes_apology() {
    let h = harness_with("unused", true).await;
    ingest::ingest_document(
        &h.services,
        USER,
        "doc.docx",
        MEDIA_DOCX,
        &docx_with_paragraphs(&["Some indexed content for the generator to fail over."]),
    )
    .await
    .unwrap();

    let answer = ask::ask(&h.services, USER, "summarize this", None, &[])
        .await
        .unwrap();

    assert!(h.generator_invoked.load(Ordering::SeqCst));
    assert_eq!(answer.text, askdoc::generate::APOLOGY);
    // retrieval still worked; the apology keeps its sources and confidence
    assert!(!answer.sources.is_empty());
}
