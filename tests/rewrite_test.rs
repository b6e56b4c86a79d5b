//! Markup and stylesheet reference rewriting

use std::sync::Arc;

use webarchive_singlefile::{
    Aliases, MarkupRewriter, Resource, ResourceTable, WebArchive, embed_document, rewrite_css,
};

mod common;

use common::{attr_of, data_uri_bytes, record, resolver};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n fake png";

fn png_table(url: &str) -> Arc<ResourceTable> {
    let table = Arc::new(ResourceTable::new());
    table.insert([url], Resource::new("image/png", url, PNG));
    table
}

#[tokio::test]
async fn css_url_becomes_single_data_uri() {
    let table = png_table("http://ex.com/img/x.png");
    let resolver = resolver(&table, "http://ex.com/index.html");
    let aliases = Aliases::from_base_str("http://ex.com/index.html");

    let css = r#"body { background: url("img/x.png") no-repeat; }"#;
    let out = rewrite_css(css, &resolver, &aliases).await;

    assert!(!out.contains("img/x.png"));
    assert_eq!(out.matches("data:").count(), 1);
    let start = out.find("data:").unwrap();
    let end = start + out[start..].find('"').unwrap();
    assert_eq!(data_uri_bytes(&out[start..end]), PNG);
    assert!(out[start..end].starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn css_quoting_and_escapes_are_handled() {
    let table = png_table("http://ex.com/a.png");
    let resolver = resolver(&table, "http://ex.com/");
    let aliases = Aliases::from_base_str("http://ex.com/");

    let css = "a{background:url(&#34;/a.png&#34;)} b{background:url('http://ex.com/a.png')} \
               c{background:url(data:image/gif;base64,R0lG)}";
    let out = rewrite_css(css, &resolver, &aliases).await;

    assert!(!out.contains("/a.png"));
    assert!(out.contains("url(data:image/gif;base64,R0lG)"));
    assert_eq!(out.matches("data:image/png;base64,").count(), 2);
}

#[tokio::test]
async fn relative_image_is_completed_against_main_resource() {
    let tmp = common::create_test_dir();
    let bytes = common::bundle_bytes(
        record("text/html", "http://ex.com/a", b"<img src=\"b.png\">"),
        &[record("image/png", "http://ex.com/b.png", PNG)],
    );
    let path = common::write_file(tmp.path(), "page.webarchive", &bytes);
    let archive = WebArchive::load(&path).unwrap();
    assert_eq!(archive.complete("b.png"), "http://ex.com/b.png");

    let resolver = webarchive_singlefile::ReferenceResolver::new(
        Arc::clone(archive.table()),
        archive.aliases().clone(),
        &common::quick_config(),
    )
    .unwrap();
    let html = embed_document(&resolver, &archive.main_document()).await.unwrap();

    let src = attr_of(&html, "img", "src").unwrap();
    assert!(src.starts_with("data:image/png;base64,"));
    assert_eq!(data_uri_bytes(&src), PNG);
}

#[tokio::test]
async fn srcset_is_dropped_and_src_inlined() {
    let table = png_table("http://ex.com/x.png");
    let resolver = resolver(&table, "http://ex.com/");

    let html = MarkupRewriter::new(&resolver)
        .rewrite(r#"<img src="x.png" srcset="x.png 1x, y.png 2x">"#)
        .await
        .unwrap();

    assert!(attr_of(&html, "img", "srcset").is_none());
    let src = attr_of(&html, "img", "src").unwrap();
    assert_eq!(data_uri_bytes(&src), PNG);
}

#[tokio::test]
async fn unreachable_reference_is_left_untouched() {
    let mut server = mockito::Server::new_async().await;
    let missing = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let table = Arc::new(ResourceTable::new());
    let resolver = resolver(&table, &format!("{}/page.html", server.url()));

    let html = MarkupRewriter::new(&resolver)
        .rewrite(r#"<p><img src="missing.png"><img src="missing.png"></p>"#)
        .await
        .unwrap();

    assert_eq!(attr_of(&html, "img", "src").as_deref(), Some("missing.png"));
    assert!(table.is_empty());
    missing.assert_async().await;
}

#[tokio::test]
async fn rewriting_inlined_markup_again_changes_nothing() {
    let table = png_table("http://ex.com/x.png");
    table.insert(
        ["http://ex.com/s.css"],
        Resource::new("text/css", "http://ex.com/s.css", "p{color:red}"),
    );
    let resolver = resolver(&table, "http://ex.com/");
    let rewriter = MarkupRewriter::new(&resolver);

    let input = r#"<html><head><link rel="stylesheet" href="s.css">
<style>div{background:url(x.png)}</style></head>
<body><img src="x.png"><div style="background:url('x.png')"></div></body></html>"#;
    let once = rewriter.rewrite(input).await.unwrap();
    let twice = rewriter.rewrite(&once).await.unwrap();

    assert!(!once.contains("x.png"));
    assert_eq!(once, twice);
}

#[tokio::test]
async fn only_listed_link_relations_are_inlined() {
    let table = Arc::new(ResourceTable::new());
    for (mime, url) in [
        ("image/x-icon", "http://ex.com/favicon.ico"),
        ("text/html", "http://ex.com/next.html"),
    ] {
        table.insert([url], Resource::new(mime, url, "x"));
    }
    let resolver = resolver(&table, "http://ex.com/");

    let html = MarkupRewriter::new(&resolver)
        .rewrite(r#"<link rel="shortcut icon" href="/favicon.ico"><link rel="next" href="/next.html">"#)
        .await
        .unwrap();

    assert!(attr_of(&html, "link[rel='shortcut icon']", "href").unwrap().starts_with("data:image/x-icon"));
    assert_eq!(attr_of(&html, "link[rel=next]", "href").as_deref(), Some("/next.html"));
}

#[tokio::test]
async fn content_id_frames_point_at_their_location() {
    let table = Arc::new(ResourceTable::new());
    let mut frame = Resource::new("text/html", "cid:frame-1@mhtml.blink", "<p>frame</p>");
    let mut headers = webarchive_singlefile::MimeHeaders::default();
    headers.insert("Content-Location", "http://ex.com/frame.html");
    frame = frame.with_headers(headers);
    table.insert(["cid:frame-1@mhtml.blink"], frame);
    let resolver = resolver(&table, "http://ex.com/");

    let html = MarkupRewriter::new(&resolver)
        .rewrite(r#"<iframe src="cid:frame-1@mhtml.blink"></iframe><iframe src="cid:gone@x"></iframe>"#)
        .await
        .unwrap();

    assert_eq!(
        attr_of(&html, "iframe", "src").as_deref(),
        Some("http://ex.com/frame.html")
    );
    assert!(html.contains("cid:gone@x"));
}

#[tokio::test]
async fn stylesheets_are_rewritten_before_they_are_inlined() {
    let table = Arc::new(ResourceTable::new());
    table.insert(
        ["http://cdn.ex.com/css/site.css"],
        Resource::new("text/css", "http://cdn.ex.com/css/site.css", "h1{background:url(../img/bg.png)}"),
    );
    table.insert(
        ["http://cdn.ex.com/img/bg.png"],
        Resource::new("image/png", "http://cdn.ex.com/img/bg.png", PNG),
    );
    let resolver = resolver(&table, "http://ex.com/index.html");

    let html = embed_document(
        &resolver,
        r#"<link rel="stylesheet" href="http://cdn.ex.com/css/site.css"><h1>hi</h1>"#,
    )
    .await
    .unwrap();

    let href = attr_of(&html, "link", "href").unwrap();
    let css = String::from_utf8(data_uri_bytes(&href)).unwrap();
    assert!(css.starts_with("h1{background:url(data:image/png;base64,"));
    assert!(!css.contains("bg.png"));
}

#[tokio::test]
async fn fragment_references_stay_in_the_document() {
    let mut server = mockito::Server::new_async().await;
    let page = server
        .mock("GET", mockito::Matcher::Any)
        .with_header("content-type", "text/html")
        .with_body("<html>PAGE</html>")
        .expect(0)
        .create_async()
        .await;
    let table = Arc::new(ResourceTable::new());
    let resolver = resolver(&table, &format!("{}/a", server.url()));

    let html = MarkupRewriter::new(&resolver)
        .rewrite(r#"<svg><rect style="fill:url(#grad)"/><g style="clip-path:url('#c')"/></svg>"#)
        .await
        .unwrap();

    assert_eq!(attr_of(&html, "rect", "style").as_deref(), Some("fill:url(#grad)"));
    assert_eq!(attr_of(&html, "g", "style").as_deref(), Some("clip-path:url('#c')"));
    assert!(resolver.resolve("#grad").await.is_none());
    assert!(table.is_empty());
    page.assert_async().await;
}

#[tokio::test]
async fn resolved_spelling_does_not_touch_other_urls_ending_the_same() {
    let mut server = mockito::Server::new_async().await;
    let _gone = server
        .mock("GET", "/big/x.png")
        .with_status(404)
        .create_async()
        .await;
    let table = png_table("http://ex.com/x.png");
    let resolver = resolver(&table, "http://ex.com/");
    let aliases = Aliases::from_base_str("http://ex.com/");
    let other = format!("{}/big/x.png", server.url());

    let css = format!("a{{background:url(x.png)}} b{{background:url({other})}}");
    let out = rewrite_css(&css, &resolver, &aliases).await;

    assert_eq!(out.matches("data:image/png;base64,").count(), 1);
    assert!(out.contains(&format!("b{{background:url({other})}}")), "{out}");
    assert!(!out.contains("url(x.png)"));
}
