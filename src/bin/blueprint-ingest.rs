//! CLI binary for blueprint-ingest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessingConfig` and prints results.

use anyhow::{Context, Result};
use blueprint_ingest::{
    process_to_dir, CancellationToken, PageSelection, PdfiumRasterizer, ProcessingConfig,
    ProcessingProgressCallback, ProgressCallback, UploadProcessor, UploadResult,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Pages that completed with at least one quality warning.
    flagged: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_upload_start` tells us how many pages to expect.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening upload…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            flagged: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_number: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_number))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_number: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_number, Instant::now());
        }
        self.bar.set_message(format!("page {page_number}"));
    }

    fn on_page_complete(&self, page_number: usize, total_pages: usize, warnings: usize) {
        let elapsed = self.elapsed_secs(page_number);
        let (mark, note) = if warnings == 0 {
            (green("✓"), dim("clean"))
        } else {
            self.flagged.fetch_add(1, Ordering::SeqCst);
            (yellow("⚠"), yellow(&format!("{warnings} warning(s)")))
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            mark,
            page_number,
            total_pages,
            note,
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_number: usize, total_pages: usize, error: String) {
        let elapsed = self.elapsed_secs(page_number);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_number,
            total_pages,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_upload_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let flagged = self.flagged.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) processed{}",
                green("✔"),
                bold(&success_count.to_string()),
                if flagged > 0 {
                    format!("  ({} with quality warnings)", yellow(&flagged.to_string()))
                } else {
                    String::new()
                }
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) processed  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a drawing set and write pages + thumbnails + manifest.json
  blueprint-ingest A-series.pdf -o out/

  # Only sheets 1, 3 and 5 to 7, rendered at 200 DPI
  blueprint-ingest --pages 1,3,5-7 --dpi 200 set.pdf -o out/

  # A site photo; prints a quality report without writing files
  blueprint-ingest IMG_2041.jpg

  # Page count only (no rendering)
  blueprint-ingest --inspect-only set.pdf

  # Machine-readable report
  blueprint-ingest --json set.pdf > report.json

OUTPUT LAYOUT (-o DIR):
  DIR/page_001.png         full-resolution page (lossless)
  DIR/page_001_thumb.jpg   thumbnail (longest side ≤ --thumbnail-size)
  DIR/manifest.json        dimensions, DPI, warnings and diagnostics per page

ENVIRONMENT VARIABLES:
  BLUEPRINT_DPI               Rendering DPI for PDF pages
  BLUEPRINT_BLUR_THRESHOLD    Laplacian variance below which a page is blurry
  BLUEPRINT_LOW_RES_THRESHOLD Shortest side (px) below which a page is low resolution
  BLUEPRINT_THUMBNAIL_SIZE    Longest thumbnail side in pixels
  BLUEPRINT_THUMBNAIL_QUALITY Thumbnail JPEG quality
  BLUEPRINT_PAGES             Page selection
  BLUEPRINT_PDF_PASSWORD      Password for encrypted PDFs
  PDFIUM_LIB_PATH             Path to libpdfium
  RUST_LOG                    Log filter (overrides -v / -q)

SETUP:
  PDF input needs the pdfium shared library. It is looked up in
  PDFIUM_LIB_PATH, then the working directory, then the system library path.
  Image input (PNG, JPEG) works without it.
"#;

/// Split blueprint PDFs and photos into corrected, annotated page images.
#[derive(Parser, Debug)]
#[command(
    name = "blueprint-ingest",
    version,
    about = "Split blueprint PDFs and photos into corrected page images",
    long_about = "Split construction drawing PDFs and site photos into per-page images: \
deskewed, turned to landscape, contrast-enhanced, with a thumbnail, a DPI estimate and \
warnings for blurry or low-resolution pages.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF, PNG or JPEG file.
    input: PathBuf,

    /// Write page images, thumbnails and manifest.json into this directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Declared MIME type (default: from the file extension).
    #[arg(long)]
    mime: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5-7.
    #[arg(long, env = "BLUEPRINT_PAGES", default_value = "all")]
    pages: String,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "BLUEPRINT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Laplacian variance below which a page is flagged as blurry.
    #[arg(long, env = "BLUEPRINT_BLUR_THRESHOLD", default_value_t = 100.0)]
    blur_threshold: f64,

    /// Shortest side (px) below which a page is flagged as low resolution.
    #[arg(long, env = "BLUEPRINT_LOW_RES_THRESHOLD", default_value_t = 1800)]
    low_res_threshold: u32,

    /// Longest thumbnail side in pixels (16–4096).
    #[arg(long, env = "BLUEPRINT_THUMBNAIL_SIZE", default_value_t = 400,
          value_parser = clap::value_parser!(u32).range(16..=4096))]
    thumbnail_size: u32,

    /// Thumbnail JPEG quality (1–100).
    #[arg(long, env = "BLUEPRINT_THUMBNAIL_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    thumbnail_quality: u8,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "BLUEPRINT_PDF_PASSWORD")]
    password: Option<String>,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the result as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Print page count only, no processing.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ProcessingProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let selection: PageSelection = cli.pages.parse().context("Invalid --pages")?;

    let rasterizer = match cli.pdfium_lib {
        Some(ref path) => PdfiumRasterizer::with_library_path(path.clone()),
        None => PdfiumRasterizer::new(),
    };
    let processor = UploadProcessor::new(config, Arc::new(rasterizer));

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = processor
            .inspect_path(&cli.input, cli.mime.as_deref())
            .await
            .context("Failed to inspect input")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise info")?
            );
        } else {
            println!("File:   {}", cli.input.display());
            println!("Type:   {}", info.kind);
            println!("Pages:  {}", info.page_count);
        }
        return Ok(());
    }

    // ── Run processing ───────────────────────────────────────────────────
    let result = if let Some(ref out_dir) = cli.output {
        let result = process_to_dir(&processor, &cli.input, cli.mime.as_deref(), out_dir, &selection)
            .await
            .context("Processing failed")?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{}  {}/{} pages  {}ms  →  {}",
                if result.stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                result.stats.processed_pages,
                result.stats.attempted_pages,
                result.stats.total_duration_ms,
                bold(&out_dir.display().to_string()),
            );
        }
        result
    } else {
        processor
            .process_path(&cli.input, cli.mime.as_deref(), &selection, &CancellationToken::new())
            .await
            .context("Processing failed")?
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_report(&result);
    }

    result.into_result().context("Processing failed")?;
    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .target_dpi(cli.dpi)
        .blur_threshold(cli.blur_threshold)
        .low_res_threshold(cli.low_res_threshold)
        .thumbnail_max_size(cli.thumbnail_size)
        .thumbnail_quality(cli.thumbnail_quality);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Per-page table on stdout, then warnings.
fn print_report(result: &UploadResult) {
    println!(
        "{:>4}  {:>11}  {:>5}  {:>4}  {:>7}  {:>8}",
        "page", "size", "dpi", "rot", "skew", "blur"
    );
    for p in &result.pages {
        println!(
            "{:>4}  {:>11}  {:>5}  {:>4}  {:>6.2}°  {:>8.1}",
            p.page_number,
            format!("{}x{}", p.width_px, p.height_px),
            p.dpi_estimated.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            p.cardinal_rotation.degrees(),
            p.skew_correction_deg,
            p.blur_score,
        );
    }
    let warnings = result.all_warnings();
    if !warnings.is_empty() {
        println!();
        for w in warnings {
            println!("{} {}", yellow("warning:"), w);
        }
    }
    println!();
    println!("Status: {}", result.status());
}
