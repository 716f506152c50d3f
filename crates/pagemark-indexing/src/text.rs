//! Text embedded for a whole document.

use pagemark_types::PageIndexEntry;

/// Build the text embedded as a document's aggregate vector.
///
/// One block per page in the given order, separated by a blank line. Each
/// block starts with the one-based page number; highlight excerpts follow on
/// a `Highlights:` line.
///
/// ```
/// use pagemark_indexing::combined_text;
/// use pagemark_types::PageIndexEntry;
///
/// let pages = vec![
///     PageIndexEntry::new(0, "Intro to optimizers"),
///     PageIndexEntry::new(3, "Gradient descent").with_excerpts(vec!["learning rate".into()]),
/// ];
/// assert_eq!(
///     combined_text(&pages),
///     "Page 1: Intro to optimizers\n\nPage 4: Gradient descent\nHighlights: learning rate"
/// );
/// ```
pub fn combined_text(pages: &[PageIndexEntry]) -> String {
    pages
        .iter()
        .map(|page| {
            let mut block = format!(
                "Page {}: {}",
                u64::from(page.page_index) + 1,
                page.summary.trim()
            );
            let excerpts: Vec<&str> = page
                .excerpts()
                .iter()
                .map(|e| e.trim())
                .filter(|e| !e.is_empty())
                .collect();
            if !excerpts.is_empty() {
                block.push_str("\nHighlights: ");
                block.push_str(&excerpts.join("; "));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
