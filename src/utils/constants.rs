//! Shared configuration constants
//!
//! Default values used by the config builder and the components it feeds, kept
//! in one place to avoid magic numbers.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Chrome user agent string sent by the fallback fetch client
///
/// Some origins refuse requests carrying a library default agent, so every
/// fallback fetch presents itself as a stock desktop browser.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Content type assumed for MIME entities that declare none
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Fallback fetch timeout: one minute
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Renderer startup and navigation bound
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Wait after navigation and after scrolling for lazy content to request its resources
///
/// This is a heuristic, not a synchronization primitive: captures started
/// during the settle window are joined explicitly afterwards.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Time taken to scroll through the full page height
pub const DEFAULT_SCROLL_DURATION: Duration = Duration::from_secs(4);

/// Upper bound on waiting for in-flight captures before the final table read
pub const DEFAULT_CAPTURE_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum nesting of multipart bodies inside a snapshot
pub const DEFAULT_MAX_MULTIPART_DEPTH: usize = 32;

/// Extension given to converted documents
pub const DEFAULT_OUTPUT_EXTENSION: &str = "html";

/// Loopback address with an OS-assigned port
pub const DEFAULT_PROXY_BIND: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
