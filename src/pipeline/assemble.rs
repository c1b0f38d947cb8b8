//! Page assembly: enriched fragments → page body → document markup.

use crate::model::{EnrichedFragment, PageBody};

/// Separator placed between page bodies in the document markup.
pub const PAGE_SEPARATOR: &str = "\n\n\\newpage\n\n";

/// Build the body of page `index` (1-based).
///
/// Fragments keep the order they were produced in, which is reading order.
/// Blank fragments are dropped; `None` when nothing is left, so the page is
/// omitted from the document.
pub fn assemble_page(index: usize, fragments: Vec<EnrichedFragment>) -> Option<PageBody> {
    let fragments: Vec<EnrichedFragment> = fragments
        .into_iter()
        .filter(|f| !f.markup.trim().is_empty())
        .collect();
    if fragments.is_empty() {
        return None;
    }
    Some(PageBody { index, fragments })
}

/// Join page bodies into the full document markup.
pub fn join_pages(pages: &[PageBody]) -> String {
    pages
        .iter()
        .map(PageBody::to_markup)
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}
