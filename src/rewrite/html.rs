//! Markup reference rewriting
//!
//! Rewriting runs in three steps so that no DOM (which is `!Send`) lives
//! across an await point: parse and collect every reference, resolve them
//! (possibly over the network), then parse again and apply the results.

use std::collections::HashSet;

use kuchiki::traits::TendrilSink;
use kuchiki::{Attributes, NodeRef};

use super::css::{CssReplacer, Resolved, extract_css_urls};
use crate::error::{Result, SinglefileError};
use crate::resolver::ReferenceResolver;
use crate::resource::{Aliases, is_content_id, is_data_uri};

const REFERENCE_ELEMENTS: &str = "img, link, script, video, source, iframe";

/// `rel` values of `<link>` elements whose target is inlined
const INLINED_LINK_RELS: [&str; 5] = [
    "stylesheet",
    "icon",
    "shortcut icon",
    "shortcut",
    "apple-touch-icon",
];

/// What to do with an element's reference attribute
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Replace the attribute with a data URI
    Inline(&'static str),
    /// Point a `cid:` frame source at the part's own location
    Frame,
}

fn target_of(tag: &str, attrs: &Attributes) -> Option<Target> {
    match tag {
        "img" | "script" | "video" | "source" => Some(Target::Inline("src")),
        "link" => {
            let rel = attrs.get("rel")?.trim().to_ascii_lowercase();
            INLINED_LINK_RELS
                .contains(&rel.as_str())
                .then_some(Target::Inline("href"))
        }
        "iframe" => Some(Target::Frame),
        _ => None,
    }
}

fn wants_resolution(target: Target, reference: &str) -> bool {
    match target {
        Target::Inline(_) => !reference.is_empty() && !is_data_uri(reference),
        Target::Frame => is_content_id(reference),
    }
}

fn parse(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

type ElementSelect = kuchiki::iter::Select<kuchiki::iter::Elements<kuchiki::iter::Descendants>>;

fn select(document: &NodeRef, selector: &str) -> Result<ElementSelect> {
    document
        .select(selector)
        .map_err(|()| SinglefileError::Parse(format!("invalid selector {selector:?}")))
}

/// Rewrites `href`/`src` attributes and CSS `url(...)` references of a document
pub struct MarkupRewriter<'a> {
    resolver: &'a ReferenceResolver,
}

impl<'a> MarkupRewriter<'a> {
    #[must_use]
    pub fn new(resolver: &'a ReferenceResolver) -> Self {
        Self { resolver }
    }

    /// Rewrite raw document bytes; invalid UTF-8 is replaced
    pub async fn rewrite_bytes(&self, html: &[u8]) -> Result<String> {
        self.rewrite(&String::from_utf8_lossy(html)).await
    }

    /// Rewrite a document, leaving unresolvable references as they are
    pub async fn rewrite(&self, html: &str) -> Result<String> {
        let references = collect_references(html)?;

        let mut resolved = Resolved::with_capacity(references.len());
        for reference in references {
            let found = self.resolver.resolve(&reference).await;
            resolved.insert(reference, found);
        }

        apply(html, &resolved, self.resolver.aliases())
    }
}

/// Distinct references worth resolving, in document order
fn collect_references(html: &str) -> Result<Vec<String>> {
    let document = parse(html);
    let mut seen = HashSet::new();
    let mut references = Vec::new();
    let mut push = |reference: String| {
        if seen.insert(reference.clone()) {
            references.push(reference);
        }
    };

    for element in select(&document, REFERENCE_ELEMENTS)? {
        let attrs = element.attributes.borrow();
        let Some(target) = target_of(&element.name.local, &attrs) else {
            continue;
        };
        let attr = match target {
            Target::Inline(attr) => attr,
            Target::Frame => "src",
        };
        if let Some(reference) = attrs.get(attr).map(str::trim) {
            if wants_resolution(target, reference) {
                push(reference.to_string());
            }
        }
    }

    for style in select(&document, "style")? {
        extract_css_urls(&style.text_contents()).into_iter().for_each(&mut push);
    }
    for element in select(&document, "[style]")? {
        if let Some(css) = element.attributes.borrow().get("style") {
            extract_css_urls(css).into_iter().for_each(&mut push);
        }
    }

    Ok(references)
}

fn apply(html: &str, resolved: &Resolved, aliases: &Aliases) -> Result<String> {
    let document = parse(html);

    for element in select(&document, REFERENCE_ELEMENTS)? {
        let tag = element.name.local.to_string();
        let mut attrs = element.attributes.borrow_mut();
        if tag == "img" {
            attrs.remove("srcset");
        }

        let Some(target) = target_of(&tag, &attrs) else {
            continue;
        };
        let attr = match target {
            Target::Inline(attr) => attr,
            Target::Frame => "src",
        };
        let Some(reference) = attrs.get(attr).map(|r| r.trim().to_string()) else {
            continue;
        };
        if !wants_resolution(target, &reference) {
            continue;
        }

        match (target, resolved.get(&reference).and_then(Option::as_ref)) {
            (Target::Inline(attr), Some(resource)) => {
                attrs.insert(attr, resource.data_uri().to_string());
            }
            (Target::Frame, Some(resource)) => {
                attrs.insert("src", resource.content_location().to_string());
            }
            (_, None) if tag == "link" => log::warn!("cannot find link {reference}"),
            (_, None) => log::warn!("cannot find {tag} source {reference}"),
        }
    }

    let styles: Vec<NodeRef> = select(&document, "style")?
        .map(|style| style.as_node().clone())
        .collect();
    for style in styles {
        let css = style.text_contents();
        let replacer = CssReplacer::for_css(&css, aliases, resolved);
        if replacer.is_empty() {
            continue;
        }
        let rewritten = replacer.replace_all(&css);
        let children: Vec<NodeRef> = style.children().collect();
        for child in children {
            child.detach();
        }
        style.append(NodeRef::new_text(rewritten));
    }

    for element in select(&document, "[style]")? {
        let mut attrs = element.attributes.borrow_mut();
        let Some(css) = attrs.get("style").map(str::to_string) else {
            continue;
        };
        let replacer = CssReplacer::for_css(&css, aliases, resolved);
        if !replacer.is_empty() {
            attrs.insert("style", replacer.replace_all(&css));
        }
    }

    let mut output = Vec::new();
    document
        .serialize(&mut output)
        .map_err(|e| SinglefileError::Parse(format!("cannot serialize document: {e}")))?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::resource::Resource;

    fn resolved(entries: &[(&str, Option<Resource>)]) -> Resolved {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone().map(Arc::new)))
            .collect()
    }

    #[test]
    fn collects_only_rewritable_references() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="a.css"><link rel="canonical" href="http://ex.com/">
            <style>body{background:url("bg.png")}</style></head>
            <body><img src="b.png" srcset="b2.png 2x"><img src="data:image/gif;base64,R0lG">
            <iframe src="https://ex.com/embed"></iframe><iframe src="cid:frame@mhtml.blink"></iframe>
            <div style="background:url(div.png)"></div><img src="b.png"></body></html>"#;

        let refs = collect_references(html).unwrap();
        assert_eq!(
            refs,
            vec!["a.css", "b.png", "cid:frame@mhtml.blink", "bg.png", "div.png"]
        );
    }

    #[test]
    fn frames_point_at_their_location() {
        let mut headers = crate::snapshot::MimeHeaders::default();
        headers.insert("Content-Location", "https://ex.com/embed.html");
        let frame = Resource::new("text/html", "cid:frame@mhtml.blink", "<p>").with_headers(headers);

        let map = resolved(&[("cid:frame@mhtml.blink", Some(frame))]);
        let out = apply(
            r#"<iframe src="cid:frame@mhtml.blink"></iframe>"#,
            &map,
            &Aliases::default(),
        )
        .unwrap();
        assert!(out.contains(r#"<iframe src="https://ex.com/embed.html">"#), "{out}");
    }

    #[test]
    fn unresolved_references_are_left_alone() {
        let map = resolved(&[("gone.png", None)]);
        let out = apply(r#"<img src="gone.png" srcset="gone.png 1x">"#, &map, &Aliases::default()).unwrap();
        assert!(out.contains(r#"<img src="gone.png">"#), "{out}");
    }

    #[test]
    fn style_elements_and_attributes_are_inlined() {
        let png = Resource::new("image/png", "http://ex.com/bg.png", vec![1u8]);
        let uri = png.data_uri().to_string();
        let map = resolved(&[("bg.png", Some(png))]);

        let out = apply(
            r#"<style>a{background:url(bg.png)}</style><p style="background:url('bg.png')">x</p>"#,
            &map,
            &Aliases::from_base_str("http://ex.com/"),
        )
        .unwrap();
        assert_eq!(out.matches(&uri).count(), 2, "{out}");
        assert!(!out.contains("bg.png"));
    }
}
