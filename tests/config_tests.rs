//! Tests for the configuration builder

use std::net::SocketAddr;
use std::time::Duration;

use webarchive_singlefile::{ConvertConfig, RenderOutput, SinglefileError};

#[test]
fn test_defaults() {
    let config = ConvertConfig::default();

    assert!(config.render());
    assert!(config.headless());
    assert!(!config.verbose());
    assert_eq!(config.render_output(), RenderOutput::Document);
    assert_eq!(config.settle_delay(), Duration::from_secs(5));
    assert_eq!(config.scroll_duration(), Duration::from_secs(4));
    assert_eq!(config.fetch_timeout(), Duration::from_secs(60));
    assert_eq!(config.dial_timeout(), Duration::from_secs(60));
    assert_eq!(config.capture_join_timeout(), Duration::from_secs(10));
    assert_eq!(config.max_multipart_depth(), 32);
    assert_eq!(config.output_extension(), "html");
    assert!(config.user_agent().contains("Chrome/"));
    assert!(config.proxy_bind().ip().is_loopback());
    assert_eq!(config.proxy_bind().port(), 0);
}

#[test]
fn test_builder_matches_default() {
    let built = ConvertConfig::builder().build().unwrap();
    let default = ConvertConfig::default();

    assert_eq!(built.output_extension(), default.output_extension());
    assert_eq!(built.fetch_timeout(), default.fetch_timeout());
    assert_eq!(built.user_agent(), default.user_agent());
}

#[test]
fn test_builder_sets_every_field() {
    let bind: SocketAddr = "127.0.0.1:18080".parse().unwrap();
    let config = ConvertConfig::builder()
        .render(false)
        .render_output(RenderOutput::Snapshot)
        .headless(false)
        .settle_delay(Duration::from_millis(10))
        .scroll_duration(Duration::from_millis(20))
        .dial_timeout(Duration::from_secs(3))
        .fetch_timeout(Duration::from_secs(4))
        .capture_join_timeout(Duration::ZERO)
        .user_agent("test-agent/1.0")
        .max_multipart_depth(4)
        .output_extension("xhtml")
        .proxy_bind(bind)
        .verbose(true)
        .build()
        .unwrap();

    assert!(!config.render());
    assert!(!config.headless());
    assert!(config.verbose());
    assert_eq!(config.render_output(), RenderOutput::Snapshot);
    assert_eq!(config.settle_delay(), Duration::from_millis(10));
    assert_eq!(config.scroll_duration(), Duration::from_millis(20));
    assert_eq!(config.dial_timeout(), Duration::from_secs(3));
    assert_eq!(config.fetch_timeout(), Duration::from_secs(4));
    assert_eq!(config.capture_join_timeout(), Duration::ZERO);
    assert_eq!(config.user_agent(), "test-agent/1.0");
    assert_eq!(config.max_multipart_depth(), 4);
    assert_eq!(config.output_extension(), "xhtml");
    assert_eq!(config.proxy_bind(), bind);
}

#[test]
fn test_extension_dot_is_stripped() {
    let config = ConvertConfig::builder().output_extension(".html").build().unwrap();
    assert_eq!(config.output_extension(), "html");
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ConvertConfig::builder().fetch_timeout(Duration::ZERO),
        ConvertConfig::builder().dial_timeout(Duration::ZERO),
        ConvertConfig::builder().max_multipart_depth(0),
        ConvertConfig::builder().user_agent("  "),
        ConvertConfig::builder().output_extension(""),
        ConvertConfig::builder().output_extension("a/b"),
    ];
    for builder in cases {
        let err = builder.build().unwrap_err();
        assert!(matches!(err, SinglefileError::Config(_)), "{err}");
    }
}
