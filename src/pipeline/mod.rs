//! Pipeline stages for blueprint page ingestion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different rasteriser behind
//! [`render::PdfRasterizer`]) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ page ──────────────────────────────────────────▶ PageResult
//! (stage)   (render | decode)   quality ▸ geometry ▸ enhance ▸ encode
//! ```
//!
//! 1. [`input`]: classify the MIME type and spool PDFs to a scoped temp dir
//! 2. [`split`]: probe the page count, then yield one raster per selected
//!    page; PDFs go through [`render`] (pdfium), images through [`decode`]
//! 3. [`page`]: run the fixed per-page stages:
//!    [`quality`] checks, [`geometry`] correction, [`enhance`] (CLAHE),
//!    [`encode`] to PNG + JPEG thumbnail, then DPI estimation
//!
//! Every stage here is synchronous and CPU-bound. The async entry points in
//! [`crate::process`] run them inside `spawn_blocking`.

pub mod decode;
pub mod encode;
pub mod enhance;
pub mod geometry;
pub mod input;
pub mod page;
pub mod quality;
pub mod render;
pub mod split;
