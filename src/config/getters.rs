//! Getter methods for `ConvertConfig`

use std::net::SocketAddr;
use std::time::Duration;

use super::types::ConvertConfig;
use crate::renderer::RenderOutput;

impl ConvertConfig {
    #[must_use]
    pub fn render(&self) -> bool {
        self.render
    }

    #[must_use]
    pub fn render_output(&self) -> RenderOutput {
        self.render_output
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    #[must_use]
    pub fn scroll_duration(&self) -> Duration {
        self.scroll_duration
    }

    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    #[must_use]
    pub fn capture_join_timeout(&self) -> Duration {
        self.capture_join_timeout
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn max_multipart_depth(&self) -> usize {
        self.max_multipart_depth
    }

    #[must_use]
    pub fn output_extension(&self) -> &str {
        &self.output_extension
    }

    #[must_use]
    pub fn proxy_bind(&self) -> SocketAddr {
        self.proxy_bind
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
