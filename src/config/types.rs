//! Core configuration type for archive conversion

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::renderer::RenderOutput;
use crate::utils::{
    CHROME_USER_AGENT, DEFAULT_CAPTURE_JOIN_TIMEOUT, DEFAULT_DIAL_TIMEOUT, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_MULTIPART_DEPTH, DEFAULT_OUTPUT_EXTENSION, DEFAULT_PROXY_BIND,
    DEFAULT_SCROLL_DURATION, DEFAULT_SETTLE_DELAY,
};

/// Settings for converting one or more inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Drive the renderer through the capture relay; when off, the stored
    /// main document is rewritten as it is
    pub(crate) render: bool,
    pub(crate) render_output: RenderOutput,
    pub(crate) headless: bool,

    /// Heuristic wait after navigation and after scrolling, not a
    /// synchronization point
    pub(crate) settle_delay: Duration,
    pub(crate) scroll_duration: Duration,
    pub(crate) dial_timeout: Duration,
    pub(crate) fetch_timeout: Duration,

    /// Bound on joining captures still running when the renderer returns
    pub(crate) capture_join_timeout: Duration,

    pub(crate) user_agent: String,
    pub(crate) max_multipart_depth: usize,
    pub(crate) output_extension: String,
    pub(crate) proxy_bind: SocketAddr,
    pub(crate) verbose: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            render: true,
            render_output: RenderOutput::Document,
            headless: true,
            settle_delay: DEFAULT_SETTLE_DELAY,
            scroll_duration: DEFAULT_SCROLL_DURATION,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            capture_join_timeout: DEFAULT_CAPTURE_JOIN_TIMEOUT,
            user_agent: CHROME_USER_AGENT.to_string(),
            max_multipart_depth: DEFAULT_MAX_MULTIPART_DEPTH,
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
            proxy_bind: DEFAULT_PROXY_BIND,
            verbose: false,
        }
    }
}
