//! CLI binary for scan2doc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints where the document was written.

use anyhow::{Context, Result};
use clap::Parser;
use scan2doc::{
    ConversionConfig, ConversionProgressCallback, Converter, HttpLayout, LayoutEngine,
    OutputFormat, ProgressCallback, SidecarLayout,
};
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

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_conversion_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            warnings: AtomicUsize::new(0),
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
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .map(|mut m| m.remove(&page_num))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_pages} page images…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_warning(&self, page_num: usize, _total: usize, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        let msg: String = if warning.chars().count() > 100 {
            warning.chars().take(99).chain(std::iter::once('…')).collect()
        } else {
            warning.to_string()
        };
        self.bar
            .println(format!("  {} Page {:>3}  {}", yellow("⚠"), page_num, dim(&msg)));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, fragments: usize) {
        let secs = self.elapsed_secs(page_num);
        let mark = if fragments > 0 { green("✓") } else { dim("–") };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}",
            mark,
            page_num,
            total,
            dim(&format!("{fragments:>3} fragments")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_export_fallback(&self, failed: OutputFormat, next: OutputFormat, reason: &str) {
        eprintln!("{} {} export failed ({}), writing {} instead", yellow("⚠"), failed, reason, next);
    }

    fn on_conversion_complete(&self, total_pages: usize, content_pages: usize) {
        self.bar.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} pages with content{}",
            if content_pages == 0 {
                red("✘")
            } else if warnings == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&content_pages.to_string()),
            total_pages,
            if warnings > 0 {
                format!("  ({warnings} warnings)")
            } else {
                String::new()
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # HTML report from a folder of scans (layout JSON next to each image)
  scan2doc scans/ -o out/report

  # Word document, layout from a running service
  scan2doc scans/ -o out/report -f docx --layout-url http://localhost:8866/layout

  # LaTeX with a custom title
  scan2doc scans/ -o out/report -f tex --title "2024 年度报告"

  # Machine-readable result
  scan2doc scans/ -o out/report --json > result.json

LAYOUT INPUT:
  Each page image needs PP-Structure style layout results: either a sidecar
  file (scan_001.png → scan_001.json, or in --layout-dir), or a service given
  with --layout-url that accepts the raw image as the POST body.

OUTPUT FALLBACK:
  html → tex        docx → tex        pdf → html → tex
  PDF output is a .docx ready for "Save as PDF" in Word or LibreOffice.

ENVIRONMENT VARIABLES:
  DEEPSEEK_API_KEY        DeepSeek API key
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (deepseek, openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Convert folders of scanned page images into HTML, Word, PDF or LaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "scan2doc",
    version,
    about = "Convert folders of scanned page images into HTML, Word, PDF or LaTeX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder holding the page images (.jpg .jpeg .png .bmp .tiff .tif).
    input: PathBuf,

    /// Output path; the format's extension is appended.
    #[arg(short, long, env = "SCAN2DOC_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Output format: html, docx, pdf or tex.
    #[arg(short, long, env = "SCAN2DOC_FORMAT", default_value = "html")]
    format: OutputFormat,

    /// Document title.
    #[arg(long, env = "SCAN2DOC_TITLE")]
    title: Option<String>,

    /// Author line (TeX and HTML metadata).
    #[arg(long, env = "SCAN2DOC_AUTHOR")]
    author: Option<String>,

    /// LLM model ID for cleanup (default: deepseek-chat).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: deepseek, openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// POST page images to this layout service instead of reading sidecars.
    #[arg(long, env = "SCAN2DOC_LAYOUT_URL")]
    layout_url: Option<String>,

    /// Read sidecar layout JSON from this folder instead of next to the images.
    #[arg(long, env = "SCAN2DOC_LAYOUT_DIR", conflicts_with = "layout_url")]
    layout_dir: Option<PathBuf>,

    /// Path to a text file with a custom cleanup prompt (must contain {ocr_text}).
    #[arg(long, env = "SCAN2DOC_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max LLM output tokens per region.
    #[arg(long, env = "SCAN2DOC_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SCAN2DOC_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Per-call timeout for cleanup, OCR and layout requests, in seconds.
    #[arg(long, env = "SCAN2DOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Do not re-OCR empty text regions with the vision model.
    #[arg(long, env = "SCAN2DOC_NO_OCR_FALLBACK")]
    no_ocr_fallback: bool,

    /// Keep region images from previous runs instead of clearing them.
    #[arg(long, env = "SCAN2DOC_KEEP_REGIONS")]
    keep_regions: bool,

    /// Print the full result (ConversionOutput) as JSON on stdout.
    #[arg(long, env = "SCAN2DOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2DOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2DOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2DOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    let layout: Arc<dyn LayoutEngine> = match (&cli.layout_url, &cli.layout_dir) {
        (Some(url), _) => Arc::new(
            HttpLayout::new(url.clone(), config.api_timeout)
                .context("Failed to set up layout service client")?,
        ),
        (None, Some(dir)) => Arc::new(SidecarLayout::in_dir(dir)),
        (None, None) => Arc::new(SidecarLayout::new()),
    };

    let converter = Converter::with_layout(layout, config).context("Failed to set up LLM provider")?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = converter
        .convert_folder(&cli.input, &cli.output)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}\t{}", output.path.display(), output.mime_type);

    if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if output.format == output.requested {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.content_pages,
            output.stats.total_pages,
            output.stats.total_duration_ms,
            bold(&output.path.display().to_string()),
        );
        if output.format != output.requested {
            eprintln!(
                "   {}",
                dim(&format!(
                    "requested {}, produced {}",
                    output.requested, output.format
                ))
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .output_format(cli.format)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .ocr_fallback(!cli.no_ocr_fallback)
        .reset_regions_dir(!cli.keep_regions);

    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(ref author) = cli.author {
        builder = builder.author(author.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read cleanup prompt from {:?}", path))?;
        builder = builder.cleanup_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
