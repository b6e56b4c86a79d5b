//! Builder for `ConvertConfig`
//!
//! Every field has a default, so the builder needs no required-field states;
//! `build()` only rejects values the pipeline cannot work with.

use std::net::SocketAddr;
use std::time::Duration;

use super::types::ConvertConfig;
use crate::error::{Result, SinglefileError};
use crate::renderer::RenderOutput;

#[derive(Debug, Clone, Default)]
pub struct ConvertConfigBuilder {
    config: ConvertConfig,
}

impl ConvertConfig {
    #[must_use]
    pub fn builder() -> ConvertConfigBuilder {
        ConvertConfigBuilder::default()
    }
}

impl ConvertConfigBuilder {
    /// Render through the capture relay (default) or rewrite stored markup only
    #[must_use]
    pub fn render(mut self, render: bool) -> Self {
        self.config.render = render;
        self
    }

    #[must_use]
    pub fn render_output(mut self, output: RenderOutput) -> Self {
        self.config.render_output = output;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn scroll_duration(mut self, duration: Duration) -> Self {
        self.config.scroll_duration = duration;
        self
    }

    /// Bound on renderer startup plus navigation
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Timeout of each fallback fetch
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    /// How long to wait for captures still in flight once rendering is done
    ///
    /// Zero skips the join and reads the table as it is.
    #[must_use]
    pub fn capture_join_timeout(mut self, timeout: Duration) -> Self {
        self.config.capture_join_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn max_multipart_depth(mut self, depth: usize) -> Self {
        self.config.max_multipart_depth = depth;
        self
    }

    /// Extension of written documents, without the dot
    #[must_use]
    pub fn output_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.output_extension = extension.into();
        self
    }

    #[must_use]
    pub fn proxy_bind(mut self, addr: SocketAddr) -> Self {
        self.config.proxy_bind = addr;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// `SinglefileError::Config` for zero timeouts, a zero nesting depth, or an
    /// empty user agent or extension.
    pub fn build(self) -> Result<ConvertConfig> {
        let config = self.config;

        for (name, value) in [
            ("dial_timeout", config.dial_timeout),
            ("fetch_timeout", config.fetch_timeout),
        ] {
            if value.is_zero() {
                return Err(SinglefileError::Config(format!("{name} must be positive")));
            }
        }
        if config.max_multipart_depth == 0 {
            return Err(SinglefileError::Config(
                "max_multipart_depth must be at least 1".to_string(),
            ));
        }
        if config.user_agent.trim().is_empty() {
            return Err(SinglefileError::Config("user_agent must not be empty".to_string()));
        }

        let extension = config.output_extension.trim().trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(SinglefileError::Config(format!(
                "invalid output extension {:?}",
                config.output_extension
            )));
        }
        let output_extension = extension.to_string();

        Ok(ConvertConfig {
            output_extension,
            ..config
        })
    }
}
