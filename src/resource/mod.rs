//! Typed byte blobs and the shared table that indexes them
//!
//! Bundles, snapshots, fallback fetches and proxy captures all produce
//! [`Resource`] values; every one of them ends up in a [`ResourceTable`]
//! reachable under one or more alias keys.

pub mod aliases;
pub mod table;

pub use aliases::{Aliases, content_id_key, is_content_id, is_data_uri, is_fragment};
pub use table::{ResourceId, ResourceTable};

use std::borrow::Cow;
use std::io::Read;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

use crate::snapshot::headers::MimeHeaders;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A typed byte blob
///
/// Immutable once built. [`ResourceTable::reset_data`] swaps in a new value
/// built by [`Resource::with_data`], which starts with an empty data-URI cache.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    mime_type: String,
    text_encoding: Option<String>,
    content_encoding: Option<String>,
    url: String,
    frame_name: Option<String>,
    headers: MimeHeaders,
    data: Bytes,
    data_uri: OnceLock<String>,
}

impl Resource {
    /// `mime_type` may carry parameters; only the lowercased essence is kept
    pub fn new(mime_type: &str, url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let (essence, charset) = split_media_type(mime_type);
        Self {
            mime_type: essence,
            text_encoding: charset,
            url: url.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_text_encoding(mut self, encoding: Option<String>) -> Self {
        if let Some(encoding) = encoding.filter(|e| !e.trim().is_empty()) {
            self.text_encoding = Some(encoding);
        }
        self
    }

    #[must_use]
    pub fn with_content_encoding(mut self, encoding: Option<String>) -> Self {
        self.content_encoding = encoding
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e != "identity");
        self
    }

    #[must_use]
    pub fn with_frame_name(mut self, name: Option<String>) -> Self {
        self.frame_name = name.filter(|n| !n.is_empty());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: MimeHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Same metadata, new bytes, cleared content encoding and data-URI cache
    #[must_use]
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: self.mime_type.clone(),
            text_encoding: self.text_encoding.clone(),
            content_encoding: None,
            url: self.url.clone(),
            frame_name: self.frame_name.clone(),
            headers: self.headers.clone(),
            data: data.into(),
            data_uri: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn text_encoding(&self) -> Option<&str> {
        self.text_encoding.as_deref()
    }

    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn frame_name(&self) -> Option<&str> {
        self.frame_name.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &MimeHeaders {
        &self.headers
    }

    /// Raw bytes as stored, possibly still content-encoded
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn is_stylesheet(&self) -> bool {
        self.mime_type == "text/css"
    }

    /// Declared `Content-Location`, else the canonical URL
    #[must_use]
    pub fn content_location(&self) -> &str {
        self.headers
            .get("content-location")
            .filter(|l| !l.is_empty())
            .unwrap_or(self.url.as_str())
    }

    /// Bytes with any gzip/deflate content encoding undone
    ///
    /// Undecodable payloads are returned as stored.
    #[must_use]
    pub fn decoded_data(&self) -> Cow<'_, [u8]> {
        let Some(encoding) = self.content_encoding.as_deref() else {
            return Cow::Borrowed(&self.data);
        };

        let mut out = Vec::with_capacity(self.data.len() * 2);
        let decoded = match encoding {
            "gzip" | "x-gzip" => GzDecoder::new(&self.data[..]).read_to_end(&mut out),
            "deflate" => ZlibDecoder::new(&self.data[..])
                .read_to_end(&mut out)
                .or_else(|_| {
                    out.clear();
                    DeflateDecoder::new(&self.data[..]).read_to_end(&mut out)
                }),
            other => {
                log::debug!("leaving {} encoded as {other}", self.url);
                return Cow::Borrowed(&self.data);
            }
        };

        match decoded {
            Ok(_) => Cow::Owned(out),
            Err(e) => {
                log::warn!("cannot decode {} body of {}: {e}", encoding, self.url);
                Cow::Borrowed(&self.data)
            }
        }
    }

    /// Decoded bytes as text, lossily
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.decoded_data()).into_owned()
    }

    /// `data:` rendering of the decoded bytes, computed once
    pub fn data_uri(&self) -> &str {
        self.data_uri.get_or_init(|| {
            let mime = if self.mime_type.is_empty() {
                FALLBACK_MIME_TYPE
            } else {
                self.mime_type.as_str()
            };
            let payload = STANDARD.encode(self.decoded_data());
            match self.text_encoding.as_deref() {
                Some(charset) if mime.starts_with("text/") => {
                    format!("data:{mime};charset={charset};base64,{payload}")
                }
                _ => format!("data:{mime};base64,{payload}"),
            }
        })
    }
}

/// `text/HTML; charset=UTF-8` → (`text/html`, `Some("UTF-8")`)
fn split_media_type(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim().trim_end_matches(';');
    if trimmed.is_empty() {
        return (String::new(), None);
    }
    match trimmed.parse::<mime::Mime>() {
        Ok(parsed) => (
            parsed.essence_str().to_ascii_lowercase(),
            parsed
                .get_param(mime::CHARSET)
                .map(|c| c.as_str().trim_matches('"').to_string()),
        ),
        Err(_) => {
            let essence = trimmed.split(';').next().unwrap_or_default();
            (essence.trim().to_ascii_lowercase(), None)
        }
    }
}
