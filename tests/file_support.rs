//! PDF and text source files in topic folders.

use std::fs;
use tempfile::TempDir;

use cfa_questgen::config::{ChunkingConfig, SourcesConfig};
use cfa_questgen::error::PipelineError;
use cfa_questgen::ingest::Library;
use cfa_questgen::models::TopicArea;

/// Minimal valid PDF with one page containing "forward rate agreement".
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 54 >> stream\nBT /F1 12 Tf 100 700 Td (forward rate agreement) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn library(root: &std::path::Path) -> Library {
    let sources = SourcesConfig {
        root: root.to_path_buf(),
        include_globs: vec!["**/*.pdf".into(), "**/*.txt".into(), "**/*.md".into()],
    };
    Library::new(&sources, &ChunkingConfig::default()).unwrap()
}

#[test]
fn test_pdf_and_text_are_loaded_together() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(TopicArea::Derivatives.folder_name());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("reading-60-forwards.pdf"), minimal_pdf_with_phrase()).unwrap();
    fs::write(
        dir.join("reading-61-swaps.txt"),
        "A swap exchanges a series of cash flows.\r\n\r\nMost swaps are OTC contracts.",
    )
    .unwrap();

    let docs = library(tmp.path())
        .load_documents(TopicArea::Derivatives, None)
        .unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].file_name, "reading-60-forwards.pdf");
    assert!(
        docs[0].text.contains("forward rate agreement"),
        "PDF text: {:?}",
        docs[0].text
    );
    assert_eq!(docs[1].file_name, "reading-61-swaps.txt");
    assert!(!docs[1].text.contains('\r'));
}

#[test]
fn test_corrupt_pdf_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(TopicArea::Derivatives.folder_name());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a-corrupt.pdf"), b"%PDF-1.4\ngarbage").unwrap();
    fs::write(dir.join("b-options.md"), "# Options\n\nA call option gives the right to buy.").unwrap();

    let chunks = library(tmp.path())
        .load_chunks(TopicArea::Derivatives, None)
        .unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source_file, "b-options.md");
}

#[test]
fn test_unsupported_files_are_not_listed() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(TopicArea::Economics.folder_name());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("slides.pptx"), b"binary").unwrap();

    let lib = library(tmp.path());
    assert!(lib.list_source_files(TopicArea::Economics, None).unwrap().is_empty());
    assert!(matches!(
        lib.load_documents(TopicArea::Economics, None),
        Err(PipelineError::NoSourceMaterial(_))
    ));
}
