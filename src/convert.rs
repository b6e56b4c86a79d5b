//! Per-input conversion pipeline
//!
//! Load the input, optionally render it through the capture relay, rewrite the
//! resulting document against the resource table and write it beside the
//! input. Output is written only once every step succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::archive::WebArchive;
use crate::capture_proxy::CaptureProxy;
use crate::config::ConvertConfig;
use crate::error::{Result, SinglefileError};
use crate::renderer::{ChromiumRenderer, RenderRequest, RenderedPage, Renderer};
use crate::resolver::ReferenceResolver;
use crate::resource::{Aliases, ResourceTable};
use crate::rewrite::embed_document;
use crate::snapshot::Snapshot;
use crate::utils::{InputKind, output_path};

/// Converts inputs one at a time with a shared configuration
#[derive(Debug)]
pub struct Converter<R: Renderer = ChromiumRenderer> {
    config: ConvertConfig,
    renderer: Option<R>,
}

impl Converter<ChromiumRenderer> {
    /// Converter driving a local Chromium when `config.render()` is set
    #[must_use]
    pub fn new(config: ConvertConfig) -> Self {
        let renderer = config
            .render()
            .then(|| ChromiumRenderer::from_config(&config));
        Self { config, renderer }
    }
}

impl<R: Renderer> Converter<R> {
    /// Converter using `renderer` for bundles
    ///
    /// The renderer is skipped when `config.render()` is off.
    pub fn with_renderer(config: ConvertConfig, renderer: R) -> Self {
        Self {
            config,
            renderer: Some(renderer),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert one input and write the result beside it
    ///
    /// Returns the path written. Every error carries the input path.
    pub async fn convert_file(&self, input: &Path) -> Result<PathBuf> {
        let target = output_path(input, self.config.output_extension());
        let html = self
            .convert(input)
            .await
            .map_err(|e| e.with_input(input))?;

        tokio::fs::write(&target, html.as_bytes())
            .await
            .map_err(|e| SinglefileError::from(e).with_input(input))?;
        info!("wrote {}", target.display());
        Ok(target)
    }

    /// Convert one input into a self-contained document
    pub async fn convert(&self, input: &Path) -> Result<String> {
        let kind = InputKind::from_path(input).ok_or_else(|| {
            SinglefileError::format(format!("unsupported input type {}", input.display()))
        })?;
        let bytes = tokio::fs::read(input).await?;

        match kind {
            InputKind::Archive => {
                let archive = WebArchive::parse(&bytes)?;
                self.convert_archive(&archive).await
            }
            InputKind::Snapshot => {
                let snapshot = Snapshot::parse(&bytes, self.config.max_multipart_depth())?;
                self.embed_snapshot(&snapshot).await
            }
        }
    }

    /// Convert a loaded bundle
    pub async fn convert_archive(&self, archive: &WebArchive) -> Result<String> {
        let table = Arc::clone(archive.table());
        let aliases = archive.aliases().clone();

        let renderer = match &self.renderer {
            Some(renderer) if self.config.render() => renderer,
            _ => {
                debug!("rewriting stored document of {}", archive.main_url());
                return self
                    .embed(table, aliases, &archive.main_document())
                    .await;
            }
        };

        let proxy = CaptureProxy::start(&table, aliases.clone(), &self.config).await?;
        let request = RenderRequest {
            page_url: archive.main_url().to_string(),
            proxy_url: proxy.url(),
            output: self.config.render_output(),
        };
        let rendered = renderer.render(&request).await;
        // Joined before the final read, even when rendering failed
        proxy.shutdown(self.config.capture_join_timeout()).await;
        debug!("{} resources after capture", table.len());

        match rendered? {
            RenderedPage::Document(html) => self.embed(table, aliases, &html).await,
            RenderedPage::Snapshot(bytes) => {
                let snapshot = Snapshot::parse(&bytes, self.config.max_multipart_depth())?;
                snapshot.merge_bundle(archive);
                self.embed_snapshot(&snapshot).await
            }
        }
    }

    async fn embed_snapshot(&self, snapshot: &Snapshot) -> Result<String> {
        debug!(
            "snapshot of {}: {} parts",
            snapshot.root_location(),
            snapshot.part_count()
        );
        self.embed(
            Arc::clone(snapshot.table()),
            snapshot.aliases().clone(),
            &snapshot.main_document(),
        )
        .await
    }

    async fn embed(&self, table: Arc<ResourceTable>, aliases: Aliases, html: &str) -> Result<String> {
        let resolver = ReferenceResolver::new(table, aliases, &self.config)?;
        embed_document(&resolver, html).await
    }
}
