//! End-to-end tests against the native pdfium library.
//!
//! These tests render real PDFs, so they need `libpdfium` on the machine.
//! They are gated behind the `PDFIUM_E2E` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   PDFIUM_E2E=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture
//!
//! The PDFs are generated in the test itself, so no fixtures are needed.

use blueprint_ingest::{
    process_to_dir, CancellationToken, DocumentKind, DpiSource, IngestError, PageSelection,
    PdfiumRasterizer, ProcessingConfig, UploadProcessor, UploadStatus,
};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless PDFIUM_E2E is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("PDFIUM_E2E").is_err() {
            println!("SKIP: set PDFIUM_E2E=1 to run pdfium e2e tests");
            return;
        }
    }};
}

fn processor(config: ProcessingConfig) -> UploadProcessor {
    UploadProcessor::new(config, Arc::new(PdfiumRasterizer::from_env()))
}

/// Build a PDF whose pages are `(width_pt, height_pt)` sheets ruled with
/// heavy horizontal lines. Offsets in the xref table are computed, so the
/// file is well-formed.
fn ruled_pdf(pages: &[(u32, u32)]) -> Vec<u8> {
    let n = pages.len();
    // Objects: 1 catalog, 2 page tree, then (page, content) per page.
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        n
    ));
    for (i, &(w, h)) in pages.iter().enumerate() {
        let content_id = 4 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {w} {h}] /Contents {content_id} 0 R >>"
        ));
        let mut ops = String::from("0 0 0 RG 3 w\n");
        let mut y = 18;
        while y < h {
            ops.push_str(&format!("18 {y} m {} {y} l S\n", w - 18));
            y += 18;
        }
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            ops.len(),
            ops
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for off in offsets {
        xref.push_str(&format!("{off:010} 00000 n \n"));
    }
    pdf.extend_from_slice(xref.as_bytes());
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    pdf
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_counts_pages() {
    e2e_skip_unless_ready!();
    let pdf = ruled_pdf(&[(612, 396), (612, 396), (612, 396)]);

    let info = processor(ProcessingConfig::default())
        .inspect(pdf, "application/pdf")
        .await
        .expect("inspect failed");

    assert_eq!(info.kind, DocumentKind::Pdf);
    assert_eq!(info.page_count, 3);
}

#[tokio::test]
async fn test_render_at_target_dpi() {
    e2e_skip_unless_ready!();
    // 8.5 x 5.5 in at 100 DPI -> 850 x 550 px.
    let pdf = ruled_pdf(&[(612, 396)]);
    let config = ProcessingConfig::builder()
        .target_dpi(100)
        .low_res_threshold(100)
        .build()
        .unwrap();

    let result = processor(config)
        .process_upload(pdf, "application/pdf", &PageSelection::All, &CancellationToken::new())
        .await
        .expect("processing failed");

    assert_eq!(result.status(), UploadStatus::Ready);
    let page = &result.pages[0];
    assert!((page.width_px as i64 - 850).abs() <= 2, "width {}", page.width_px);
    assert!((page.height_px as i64 - 550).abs() <= 2, "height {}", page.height_px);
    assert_eq!(page.dpi_source, DpiSource::Metadata);
    assert_eq!(page.dpi_estimated, Some(100));
    assert!(page.warnings.is_empty(), "{:?}", page.warnings);
}

#[tokio::test]
async fn test_portrait_page_comes_back_landscape() {
    e2e_skip_unless_ready!();
    let pdf = ruled_pdf(&[(396, 612)]);
    let config = ProcessingConfig::builder()
        .target_dpi(72)
        .low_res_threshold(100)
        .build()
        .unwrap();

    let result = processor(config)
        .process_upload(pdf, "application/pdf", &PageSelection::All, &CancellationToken::new())
        .await
        .expect("processing failed");

    let page = &result.pages[0];
    assert!(page.width_px > page.height_px);
    assert_eq!(page.cardinal_rotation.degrees(), 90);
}

#[tokio::test]
async fn test_selected_pages_and_low_resolution_warning() {
    e2e_skip_unless_ready!();
    let pdf = ruled_pdf(&[(612, 396), (612, 396), (612, 396)]);
    // 72 DPI keeps the short side at 396 px, under the default 1800 px.
    let config = ProcessingConfig::builder().target_dpi(72).build().unwrap();

    let result = processor(config)
        .process_upload(
            pdf,
            "application/pdf",
            &PageSelection::from_pages(Some(&[3, 1])),
            &CancellationToken::new(),
        )
        .await
        .expect("processing failed");

    let numbers: Vec<usize> = result.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 3]);
    assert!(result
        .all_warnings()
        .iter()
        .any(|w| w.contains("Low resolution")));
}

#[tokio::test]
async fn test_corrupt_pdf_is_fatal() {
    e2e_skip_unless_ready!();
    let err = processor(ProcessingConfig::default())
        .process_upload(
            b"%PDF-1.4\nthis is not a pdf body".to_vec(),
            "application/pdf",
            &PageSelection::All,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, IngestError::CorruptPdf { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_process_to_dir() {
    e2e_skip_unless_ready!();
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("A-101.pdf");
    std::fs::write(&input, ruled_pdf(&[(612, 396), (612, 396)])).unwrap();
    let out_dir = work.path().join("out");
    let config = ProcessingConfig::builder()
        .target_dpi(72)
        .low_res_threshold(100)
        .build()
        .unwrap();

    let result = process_to_dir(&processor(config), &input, None, &out_dir, &PageSelection::All)
        .await
        .expect("process_to_dir failed");

    assert_eq!(result.pages.len(), 2);
    assert!(out_dir.join("page_002.png").is_file());
    assert!(out_dir.join("page_002_thumb.jpg").is_file());
    assert!(out_dir.join("manifest.json").is_file());
}
