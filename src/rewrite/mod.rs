//! Inlining of references into markup and stylesheets

pub mod css;
pub mod html;

pub use css::{CssReplacer, Resolved, extract_css_urls, rewrite_css};
pub use html::MarkupRewriter;

use crate::error::Result;
use crate::resolver::ReferenceResolver;

/// Rewrite every stylesheet in the resolver's table in place
///
/// References inside a stylesheet are taken relative to the stylesheet's own
/// URL when it has one, else to the document. Returns the number of
/// stylesheets that changed.
pub async fn rewrite_stylesheets(resolver: &ReferenceResolver) -> usize {
    let table = resolver.table();
    let mut changed = 0;

    for (id, sheet) in table.entries() {
        if !sheet.is_stylesheet() {
            continue;
        }
        let css = sheet.text();
        let aliases = resolver.aliases().rebased(sheet.url());
        let rewritten = rewrite_css(&css, resolver, &aliases).await;
        if rewritten != css && table.reset_data(id, rewritten) {
            log::debug!("patched stylesheet {}", sheet.url());
            changed += 1;
        }
    }
    changed
}

/// Produce the self-contained document: stylesheets first, then the markup
pub async fn embed_document(resolver: &ReferenceResolver, html: &str) -> Result<String> {
    let sheets = rewrite_stylesheets(resolver).await;
    log::debug!("{sheets} stylesheets rewritten");
    MarkupRewriter::new(resolver).rewrite(html).await
}
