//! Stylesheet `url(...)` rewriting

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use aho_corasick::{AhoCorasick, Anchored, Input, MatchKind, StartKind};
use lazy_static::lazy_static;
use regex::Regex;

use crate::resolver::ReferenceResolver;
use crate::resource::{Aliases, Resource, is_data_uri, is_fragment};

lazy_static! {
    static ref CSS_URL: Regex =
        Regex::new(r"url\((.+?)\)").expect("BUG: hardcoded CSS url() regex is invalid");
}

const QUOTE_ENTITY: &str = "&#34;";

/// Outcome of resolving each distinct reference, keyed by reference text
pub type Resolved = HashMap<String, Option<Arc<Resource>>>;

/// Every non-inline reference inside `url(...)`, in order of appearance, without duplicates
///
/// Wrapping quotes and `&#34;` left by earlier HTML escaping are removed.
/// Same-document fragments (`url(#grad)`) are not references to resources.
#[must_use]
pub fn extract_css_urls(css: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for cap in CSS_URL.captures_iter(css) {
        let raw = cap.get(1).map_or("", |m| m.as_str());
        let reference = &raw[reference_span(raw)];
        if reference.is_empty() || is_data_uri(reference) || is_fragment(reference) {
            continue;
        }
        if seen.insert(reference.to_string()) {
            urls.push(reference.to_string());
        }
    }
    urls
}

/// Bytes of a `url(...)` argument that hold the reference itself
fn reference_span(raw: &str) -> Range<usize> {
    let is_wrapping = |c: char| matches!(c, ' ' | '"' | '\'');
    let (mut start, mut end) = (0, raw.len());
    loop {
        let inner = &raw[start..end];
        if inner.starts_with(QUOTE_ENTITY) {
            start += QUOTE_ENTITY.len();
        } else if inner.ends_with(QUOTE_ENTITY) {
            end -= QUOTE_ENTITY.len();
        } else if inner.starts_with(is_wrapping) {
            start += 1;
        } else if inner.ends_with(is_wrapping) {
            end -= 1;
        } else {
            return start..end;
        }
    }
}

/// Single-pass multi-pattern replacement, longest match first
///
/// Only the reference inside each `url(...)` token is replaced, and only when
/// a pattern spells the whole of it. Text outside the tokens is copied as is,
/// and replacement text is never rescanned.
#[derive(Debug, Default)]
pub struct CssReplacer {
    automaton: Option<AhoCorasick>,
    replacements: Vec<String>,
}

impl CssReplacer {
    /// Build from `(pattern, replacement)` pairs; for repeated patterns the first pair wins
    #[must_use]
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        let mut replacements = Vec::new();
        for (pattern, replacement) in pairs {
            if pattern.is_empty() || !seen.insert(pattern.clone()) {
                continue;
            }
            patterns.push(pattern);
            replacements.push(replacement);
        }

        if patterns.is_empty() {
            return Self::default();
        }

        match AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .start_kind(StartKind::Anchored)
            .build(&patterns)
        {
            Ok(automaton) => Self {
                automaton: Some(automaton),
                replacements,
            },
            Err(e) => {
                log::warn!("cannot build CSS replacer: {e}");
                Self::default()
            }
        }
    }

    /// Pairs for every resolved reference of `css`
    ///
    /// Each resolved reference contributes its literal, relative and absolute
    /// spellings, all mapped to the same data URI. Unresolved ones are logged.
    #[must_use]
    pub fn for_css(css: &str, aliases: &Aliases, resolved: &Resolved) -> Self {
        let mut pairs = Vec::new();
        for reference in extract_css_urls(css) {
            match resolved.get(&reference).and_then(Option::as_ref) {
                Some(resource) => {
                    let uri = resource.data_uri();
                    let [relative, absolute] = aliases.forms(&reference);
                    pairs.push((reference, uri.to_string()));
                    pairs.push((relative, uri.to_string()));
                    pairs.push((absolute, uri.to_string()));
                }
                None => log::warn!("cannot find css {reference}"),
            }
        }
        Self::new(pairs)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.automaton.is_none()
    }

    #[must_use]
    pub fn replace_all(&self, css: &str) -> String {
        let Some(ac) = &self.automaton else {
            return css.to_string();
        };

        let mut out = String::with_capacity(css.len());
        let mut copied = 0;
        for cap in CSS_URL.captures_iter(css) {
            let Some(group) = cap.get(1) else { continue };
            let span = reference_span(group.as_str());
            let start = group.start() + span.start;
            let end = group.start() + span.end;
            if start == end {
                continue;
            }

            let input = Input::new(&css[start..end]).anchored(Anchored::Yes);
            let Some(found) = ac.find(input) else { continue };
            if found.end() != end - start {
                continue;
            }
            out.push_str(&css[copied..start]);
            out.push_str(&self.replacements[found.pattern().as_usize()]);
            copied = end;
        }
        out.push_str(&css[copied..]);
        out
    }
}

/// Resolve every reference of `css` (fetching if needed) and inline them
pub async fn rewrite_css(css: &str, resolver: &ReferenceResolver, aliases: &Aliases) -> String {
    let references = extract_css_urls(css);
    if references.is_empty() {
        return css.to_string();
    }

    let mut resolved = Resolved::with_capacity(references.len());
    for reference in references {
        let found = resolver.resolve_with(&reference, aliases).await;
        resolved.insert(reference, found);
    }
    CssReplacer::for_css(css, aliases, &resolved).replace_all(css)
}
