//! Configuration types for image-folder-to-document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The external capabilities (layout
//! engine, OCR fallback, cleanup service) are *not* part of the config; they
//! are passed to [`crate::convert::Converter::new`] by the caller.

use crate::error::Scan2DocError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default document title written by every exporter.
pub const DEFAULT_TITLE: &str = "文档处理结果";

/// Default author line of the TeX title block.
pub const DEFAULT_AUTHOR: &str = "自动生成";

/// Directory (next to the output file) that receives cropped region images.
pub const DEFAULT_REGIONS_DIR: &str = "processed_regions";

/// Configuration for one conversion run.
///
/// # Example
/// ```rust
/// use scan2doc::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .output_format(OutputFormat::Docx)
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_format, OutputFormat::Docx);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Requested output format. Default: [`OutputFormat::Html`].
    pub output_format: OutputFormat,

    /// Title written at the top of every output document.
    pub title: String,

    /// Author line of the TeX title block.
    pub author: String,

    /// Name of the region-image directory created next to the output file.
    pub regions_dir_name: String,

    /// Wipe the region-image directory before the run. Default: true.
    pub reset_regions_dir: bool,

    /// Per-call timeout for the cleanup service and vision OCR. Default: 60 s.
    pub api_timeout: Duration,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for cleanup. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the cleanup service may generate per region. Default: 4000.
    pub max_tokens: usize,

    /// Custom cleanup prompt. Must contain `{ocr_text}`. If None, uses built-in default.
    pub cleanup_prompt: Option<String>,

    /// Re-OCR the crop of a text region whose layout result carried no lines.
    /// Only effective when the converter was given a recognizer. Default: true.
    pub ocr_fallback: bool,

    /// Width of pictures in Word output, in inches. Default: 5.0.
    pub picture_width_inches: f32,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            title: DEFAULT_TITLE.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            regions_dir_name: DEFAULT_REGIONS_DIR.to_string(),
            reset_regions_dir: true,
            api_timeout: Duration::from_secs(60),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4000,
            cleanup_prompt: None,
            ocr_fallback: true,
            picture_width_inches: 5.0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_format", &self.output_format)
            .field("title", &self.title)
            .field("regions_dir_name", &self.regions_dir_name)
            .field("reset_regions_dir", &self.reset_regions_dir)
            .field("api_timeout", &self.api_timeout)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("ocr_fallback", &self.ocr_fallback)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Region-image directory for an output written at `output_path`.
    pub fn regions_dir(&self, output_path: &Path) -> std::path::PathBuf {
        output_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.regions_dir_name)
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.fmt(f)
    }
}

impl ConversionConfigBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = author.into();
        self
    }

    pub fn regions_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.regions_dir_name = name.into();
        self
    }

    pub fn reset_regions_dir(mut self, v: bool) -> Self {
        self.config.reset_regions_dir = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout = Duration::from_secs(secs);
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn cleanup_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.cleanup_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_fallback(mut self, v: bool) -> Self {
        self.config.ocr_fallback = v;
        self
    }

    pub fn picture_width_inches(mut self, inches: f32) -> Self {
        self.config.picture_width_inches = inches;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Scan2DocError> {
        let c = &self.config;
        if c.api_timeout.is_zero() {
            return Err(Scan2DocError::InvalidConfig(
                "API timeout must be > 0".into(),
            ));
        }
        let mut parts = Path::new(&c.regions_dir_name).components();
        let single_normal = matches!(
            (parts.next(), parts.next()),
            (Some(Component::Normal(_)), None)
        );
        if c.regions_dir_name.trim().is_empty()
            || c.regions_dir_name.contains(['/', '\\'])
            || !single_normal
        {
            return Err(Scan2DocError::InvalidConfig(format!(
                "regions dir name must be a single path component, got '{}'",
                c.regions_dir_name
            )));
        }
        if let Some(ref p) = c.cleanup_prompt {
            if !p.contains(crate::prompts::OCR_TEXT_PLACEHOLDER) {
                return Err(Scan2DocError::InvalidConfig(
                    "custom cleanup prompt must contain the {ocr_text} placeholder".into(),
                ));
            }
        }
        if !(c.picture_width_inches > 0.0 && c.picture_width_inches <= 20.0) {
            return Err(Scan2DocError::InvalidConfig(format!(
                "picture width must be in (0, 20] inches, got {}",
                c.picture_width_inches
            )));
        }
        Ok(self.config)
    }
}

// ── Output format ────────────────────────────────────────────────────────

/// Target document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Standalone HTML page with region images copied alongside. (default)
    #[default]
    Html,
    /// Word document.
    Docx,
    /// PDF via an intermediate Word document, which is what gets written.
    Pdf,
    /// LaTeX source plus a body-only `.tex.content` companion.
    Tex,
}

impl OutputFormat {
    /// Formats to try, in order, when this one is requested.
    ///
    /// `tex` is always last and has no fallback of its own.
    pub fn fallback_chain(self) -> &'static [OutputFormat] {
        match self {
            OutputFormat::Html => &[OutputFormat::Html, OutputFormat::Tex],
            OutputFormat::Pdf => &[OutputFormat::Pdf, OutputFormat::Html, OutputFormat::Tex],
            OutputFormat::Docx => &[OutputFormat::Docx, OutputFormat::Tex],
            OutputFormat::Tex => &[OutputFormat::Tex],
        }
    }

    /// Extension requested by the caller for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Tex => "tex",
        }
    }

    /// MIME type used when serving a file of this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Html => "text/html",
            OutputFormat::Docx => DOCX_MIME,
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Tex => "text/plain",
        }
    }
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// MIME type for a produced file, judged by its extension.
///
/// Export may fall back to another format, so the produced path's extension
/// is authoritative, not the requested format.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("docx") => DOCX_MIME,
        Some("pdf") => "application/pdf",
        Some("html") | Some("htm") => "text/html",
        _ => "text/plain",
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Scan2DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(OutputFormat::Html),
            "docx" | "word" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            "tex" | "latex" => Ok(OutputFormat::Tex),
            other => Err(Scan2DocError::UnknownFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.output_format, OutputFormat::Html);
        assert_eq!(c.api_timeout, Duration::from_secs(60));
        assert_eq!(c.regions_dir_name, "processed_regions");
        assert!(c.reset_regions_dir);
    }

    #[test]
    fn every_chain_starts_with_itself_and_ends_with_tex() {
        for f in [
            OutputFormat::Html,
            OutputFormat::Docx,
            OutputFormat::Pdf,
            OutputFormat::Tex,
        ] {
            let chain = f.fallback_chain();
            assert_eq!(chain[0], f);
            assert_eq!(*chain.last().unwrap(), OutputFormat::Tex);
        }
    }

    #[test]
    fn parse_format() {
        assert_eq!("HTML".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert_eq!("latex".parse::<OutputFormat>().unwrap(), OutputFormat::Tex);
        assert!(matches!(
            "rtf".parse::<OutputFormat>(),
            Err(Scan2DocError::UnknownFormat(_))
        ));
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for_path(Path::new("out.html")), "text/html");
        assert_eq!(mime_for_path(Path::new("out.DOCX")), DOCX_MIME);
        assert_eq!(mime_for_path(Path::new("out.tex")), "text/plain");
        assert_eq!(mime_for_path(Path::new("out.tex.content")), "text/plain");
    }

    #[test]
    fn regions_dir_is_sibling_of_output() {
        let c = ConversionConfig::default();
        assert_eq!(
            c.regions_dir(Path::new("/tmp/run/report.html")),
            Path::new("/tmp/run/processed_regions")
        );
    }

    #[test]
    fn build_rejects_prompt_without_placeholder() {
        let r = ConversionConfig::builder()
            .cleanup_prompt("fix this text")
            .build();
        assert!(matches!(r, Err(Scan2DocError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_nested_regions_dir() {
        let r = ConversionConfig::builder()
            .regions_dir_name("a/b")
            .build();
        assert!(r.is_err());
    }

    #[test]
    fn build_rejects_dot_regions_dir() {
        // Either would point the wipe-on-start at the output dir or its parent.
        for name in [".", "..", "./"] {
            let r = ConversionConfig::builder().regions_dir_name(name).build();
            assert!(
                matches!(r, Err(Scan2DocError::InvalidConfig(_))),
                "{name:?} accepted"
            );
        }
        assert!(ConversionConfig::builder()
            .regions_dir_name("..regions")
            .build()
            .is_ok());
    }
}
