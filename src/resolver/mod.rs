//! Reference resolution with network fallback
//!
//! Lookup order for a reference: the literal text, then its absolute form.
//! On a miss the absolute form is fetched once per resolver, the result is
//! stored under the absolute URL, its relative form and the literal
//! reference, and the lookup is repeated. Content-identifier references are
//! never fetched: those parts only exist inside the snapshot.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use reqwest::Client;
use tokio::sync::OnceCell;

use crate::config::ConvertConfig;
use crate::error::{Result, SinglefileError};
use crate::resource::{Aliases, Resource, ResourceTable, is_content_id, is_data_uri, is_fragment};
use crate::utils::is_fetchable_url;

/// Looks references up in a shared table and fetches what is missing
#[derive(Debug)]
pub struct ReferenceResolver {
    table: Arc<ResourceTable>,
    aliases: Aliases,
    client: Client,
    timeout: Duration,
    user_agent: String,
    fetches: DashMap<String, Arc<OnceCell<()>>>,
}

impl ReferenceResolver {
    /// Resolver over `table` with its own fetch client
    pub fn new(table: Arc<ResourceTable>, aliases: Aliases, config: &ConvertConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| SinglefileError::Config(format!("cannot build fetch client: {e}")))?;
        Ok(Self::with_client(
            table,
            aliases,
            client,
            config.fetch_timeout(),
            config.user_agent(),
        ))
    }

    pub fn with_client(
        table: Arc<ResourceTable>,
        aliases: Aliases,
        client: Client,
        timeout: Duration,
        user_agent: &str,
    ) -> Self {
        Self {
            table,
            aliases,
            client,
            timeout,
            user_agent: user_agent.to_string(),
            fetches: DashMap::new(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<ResourceTable> {
        &self.table
    }

    #[must_use]
    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Table lookup only, against the document base
    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<Arc<Resource>> {
        self.lookup_with(reference, &self.aliases)
    }

    /// Table lookup only, against an explicit base
    #[must_use]
    pub fn lookup_with(&self, reference: &str, aliases: &Aliases) -> Option<Arc<Resource>> {
        if reference.is_empty() {
            return None;
        }
        self.table.get(reference).or_else(|| {
            let absolute = aliases.absolute(reference);
            if absolute == reference {
                None
            } else {
                self.table.get(&absolute)
            }
        })
    }

    /// Find a reference, fetching it if the table does not have it
    pub async fn resolve(&self, reference: &str) -> Option<Arc<Resource>> {
        self.resolve_with(reference, &self.aliases).await
    }

    /// [`ReferenceResolver::resolve`] with relative references taken against `aliases`
    pub async fn resolve_with(&self, reference: &str, aliases: &Aliases) -> Option<Arc<Resource>> {
        if reference.is_empty() || is_data_uri(reference) || is_fragment(reference) {
            return None;
        }
        if let Some(found) = self.lookup_with(reference, aliases) {
            return Some(found);
        }

        if is_content_id(reference) {
            log::warn!("missing {reference}");
            return None;
        }

        let absolute = aliases.absolute(reference);
        if !is_fetchable_url(&absolute) {
            log::debug!("not fetching {reference}: no network location");
            return None;
        }

        let cell = self.fetches.entry(absolute.clone()).or_default().clone();
        cell.get_or_init(|| self.fetch_into_table(reference, &absolute, aliases))
            .await;

        self.lookup_with(reference, aliases)
    }

    async fn fetch_into_table(&self, reference: &str, absolute: &str, aliases: &Aliases) {
        match self.fetch(absolute).await {
            Ok(resource) => {
                let keys = [
                    absolute.to_string(),
                    aliases.relative(absolute),
                    reference.to_string(),
                ];
                if self.table.insert(keys, resource).is_none() {
                    log::debug!("fetched {absolute} was captured meanwhile");
                }
            }
            Err(e) => log::warn!("{e}"),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Resource> {
        let fetch_error = |reason: String| SinglefileError::NetworkFetch {
            url: url.to_string(),
            reason,
        };

        log::debug!("fetching {url}");
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("status {}", response.status())));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let content_encoding = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let expected_size = response.content_length().unwrap_or(0);
        let mut buffer = Vec::with_capacity(usize::try_from(expected_size).unwrap_or(0));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fetch_error(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }

        Ok(Resource::new(&mime_type, url, buffer).with_content_encoding(content_encoding))
    }
}
