//! Streaming conversion API: emit pages as they complete.
//!
//! Scanned folders can hold hundreds of pages and each text region costs an
//! LLM round trip, so a run takes minutes. [`convert_stream`] yields each
//! [`PageResult`] as soon as its page is assembled, letting callers show
//! partial results or persist pages incrementally. Pages are processed one at
//! a time, so results arrive in page order.
//!
//! The stream does not export. Collect the bodies and hand them to
//! [`Converter::export_pages`] when the stream ends.

use crate::convert::Converter;
use crate::error::Scan2DocError;
use crate::output::PageResult;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Process the page images in `input_dir`, streaming results in page order.
///
/// `output_path` only determines where region images are saved, exactly as
/// it would for [`Converter::convert_folder`].
///
/// # Example
/// ```rust,no_run
/// use scan2doc::{Converter, ConversionConfig, convert_stream};
/// use futures::StreamExt;
/// use std::path::Path;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = Arc::new(Converter::from_config(ConversionConfig::default())?);
/// let out = Path::new("out/report.html");
/// let mut pages = convert_stream(Arc::clone(&converter), Path::new("scans"), out)?;
///
/// let mut bodies = Vec::new();
/// while let Some(page) = pages.next().await {
///     eprintln!("page {}: {} fragments", page.page_num, page.fragments());
///     bodies.extend(page.body);
/// }
/// let outcome = converter.export_pages(bodies, out).await?;
/// println!("{}", outcome.path.display());
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(
    converter: Arc<Converter>,
    input_dir: &Path,
    output_path: &Path,
) -> Result<PageStream, Scan2DocError> {
    info!("Starting streaming conversion: {}", input_dir.display());

    let (images, regions_dir) = converter.prepare(input_dir, output_path)?;
    let total = images.len();
    if let Some(cb) = &converter.config().progress_callback {
        cb.on_conversion_start(total);
    }

    let regions_dir = Arc::new(regions_dir);
    let content_pages = Arc::new(AtomicUsize::new(0));
    let s = stream::iter(images.into_iter().enumerate()).then(move |(i, source)| {
        let converter = Arc::clone(&converter);
        let regions_dir = Arc::clone(&regions_dir);
        let content_pages = Arc::clone(&content_pages);
        async move {
            let page = converter
                .process_page(&source, i + 1, total, &regions_dir)
                .await;
            if page.has_content() {
                content_pages.fetch_add(1, Ordering::SeqCst);
            }
            // After the last page.
            if i + 1 == total {
                if let Some(cb) = &converter.config().progress_callback {
                    cb.on_conversion_complete(total, content_pages.load(Ordering::SeqCst));
                }
            }
            page
        }
    });

    Ok(Box::pin(s))
}
