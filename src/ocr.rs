//! Optical-recognition collaborators for image-based PDFs.
//!
//! Rasterization and recognition are external subprocesses (`pdftoppm` and
//! `tesseract`) behind traits so the extractor can be driven with mocks.
//! Both commands run with `kill_on_drop`, so a caller-imposed deadline that
//! drops the future also terminates the child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Text recognition over a single page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String>;
}

/// Conversion of a PDF into one raster image per page.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf_bytes: &[u8], out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>>;
}

/// OCR engine shelling out to the `tesseract` binary.
pub struct TesseractEngine;

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run tesseract (is tesseract-ocr installed?)")?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Rasterizer shelling out to poppler's `pdftoppm`.
pub struct PdftoppmRasterizer;

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_bytes: &[u8], out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>> {
        let pdf_path = out_dir.join("source.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes)
            .await
            .context("failed to write temporary pdf")?;

        let prefix = out_dir.join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(&pdf_path)
            .arg(&prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run pdftoppm (is poppler-utils installed?)")?;

        if !output.status.success() {
            bail!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // pdftoppm zero-pads page numbers, so a lexicographic sort gives
        // reading order
        let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pages.sort();

        Ok(pages)
    }
}
