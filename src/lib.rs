pub mod archive;
pub mod capture_proxy;
pub mod config;
pub mod convert;
pub mod error;
pub mod renderer;
pub mod resolver;
pub mod resource;
pub mod rewrite;
pub mod snapshot;
pub mod utils;

pub use archive::WebArchive;
pub use capture_proxy::CaptureProxy;
pub use config::{ConvertConfig, ConvertConfigBuilder};
pub use convert::Converter;
pub use error::{Result, SinglefileError};
pub use renderer::{
    ChromiumRenderer, RenderOutput, RenderRequest, RenderedPage, Renderer,
    chromium::find_browser_executable,
};
pub use resolver::ReferenceResolver;
pub use resource::{Aliases, Resource, ResourceId, ResourceTable};
pub use rewrite::{MarkupRewriter, embed_document, rewrite_css, rewrite_stylesheets};
pub use snapshot::{MimeHeaders, Snapshot};
pub use utils::{InputKind, discover_inputs, output_path};

/// Convert one input with the default Chromium renderer
pub async fn convert_file(path: &std::path::Path, config: ConvertConfig) -> Result<std::path::PathBuf> {
    Converter::new(config).convert_file(path).await
}
