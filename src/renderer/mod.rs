//! Boundary to the external page renderer
//!
//! The converter hands a renderer the page address and the capture relay's
//! address; the renderer loads the page through the relay, lets it settle and
//! returns either the rendered markup or a multipart snapshot.

pub mod chromium;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use chromium::ChromiumRenderer;

/// Form of the renderer's result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderOutput {
    /// Outer HTML of the rendered document
    #[default]
    Document,
    /// MHTML capture of the rendered page
    Snapshot,
}

/// What to render and how to reach the network
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Address to navigate to
    pub page_url: String,
    /// Proxy every request must go through
    pub proxy_url: String,
    pub output: RenderOutput,
}

/// Result of a render
#[derive(Debug, Clone)]
pub enum RenderedPage {
    Document(String),
    Snapshot(Vec<u8>),
}

/// Loads a page through a proxy and returns it once settled
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> impl Future<Output = Result<RenderedPage>> + Send;
}
