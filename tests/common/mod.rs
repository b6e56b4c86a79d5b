//! Fixture builders shared by the integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use plist::{Dictionary, Value};
use tempfile::TempDir;
use webarchive_singlefile::{Aliases, ConvertConfig, ReferenceResolver, ResourceTable};

/// Creates a temporary directory for test output
#[allow(dead_code)]
pub fn create_test_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

/// One resource record of a bundle
#[allow(dead_code)]
pub struct Record<'a> {
    pub mime: &'a str,
    pub url: &'a str,
    pub data: &'a [u8],
}

#[allow(dead_code)]
pub fn record<'a>(mime: &'a str, url: &'a str, data: &'a [u8]) -> Record<'a> {
    Record { mime, url, data }
}

fn record_value(record: &Record<'_>) -> Value {
    let mut dict = Dictionary::new();
    dict.insert("WebResourceMIMEType".into(), Value::String(record.mime.into()));
    dict.insert("WebResourceURL".into(), Value::String(record.url.into()));
    dict.insert("WebResourceData".into(), Value::Data(record.data.to_vec()));
    if record.mime.starts_with("text/") {
        dict.insert("WebResourceTextEncodingName".into(), Value::String("UTF-8".into()));
    }
    Value::Dictionary(dict)
}

/// Binary property list of a bundle with a main resource and sub-resources
#[allow(dead_code)]
pub fn bundle_bytes(main: Record<'_>, subresources: &[Record<'_>]) -> Vec<u8> {
    let mut dict = Dictionary::new();
    dict.insert("WebMainResource".into(), record_value(&main));
    dict.insert(
        "WebSubresources".into(),
        Value::Array(subresources.iter().map(record_value).collect()),
    );
    let mut out = Vec::new();
    Value::Dictionary(dict)
        .to_writer_binary(&mut out)
        .expect("serialize bundle");
    out
}

#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// One part of a synthetic MIME snapshot
#[allow(dead_code)]
pub enum Part {
    Leaf {
        mime: String,
        location: String,
        content_id: Option<String>,
        body: Vec<u8>,
    },
    Multipart {
        boundary: String,
        parts: Vec<Part>,
    },
}

#[allow(dead_code)]
impl Part {
    pub fn leaf(mime: &str, location: &str, body: &[u8]) -> Self {
        Self::Leaf {
            mime: mime.to_string(),
            location: location.to_string(),
            content_id: None,
            body: body.to_vec(),
        }
    }

    pub fn with_content_id(self, id: &str) -> Self {
        match self {
            Self::Leaf {
                mime,
                location,
                body,
                ..
            } => Self::Leaf {
                mime,
                location,
                content_id: Some(id.to_string()),
                body,
            },
            other => other,
        }
    }

    pub fn multipart(boundary: &str, parts: Vec<Part>) -> Self {
        Self::Multipart {
            boundary: boundary.to_string(),
            parts,
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            Self::Leaf {
                mime,
                location,
                content_id,
                body,
            } => {
                out.push_str(&format!("Content-Type: {mime}\r\n"));
                if let Some(id) = content_id {
                    out.push_str(&format!("Content-ID: <{id}>\r\n"));
                }
                out.push_str("Content-Transfer-Encoding: base64\r\n");
                out.push_str(&format!("Content-Location: {location}\r\n\r\n"));
                out.push_str(&STANDARD.encode(body));
                out.push_str("\r\n");
            }
            Self::Multipart { boundary, parts } => {
                out.push_str(&format!(
                    "Content-Type: multipart/related; boundary=\"{boundary}\"\r\n\r\n"
                ));
                for part in parts {
                    out.push_str(&format!("--{boundary}\r\n"));
                    part.write(out);
                }
                out.push_str(&format!("--{boundary}--\r\n"));
            }
        }
    }
}

/// Serialized snapshot whose root is `root_location`
#[allow(dead_code)]
pub fn snapshot_bytes(root_location: &str, body: Part) -> Vec<u8> {
    let mut out = String::from("From: <Saved by test>\r\n");
    out.push_str(&format!("Snapshot-Content-Location: {root_location}\r\n"));
    out.push_str("MIME-Version: 1.0\r\n");
    body.write(&mut out);
    out.into_bytes()
}

/// Configuration that keeps network waits short
#[allow(dead_code)]
pub fn quick_config() -> ConvertConfig {
    ConvertConfig::builder()
        .fetch_timeout(Duration::from_secs(5))
        .dial_timeout(Duration::from_secs(5))
        .capture_join_timeout(Duration::from_secs(5))
        .settle_delay(Duration::ZERO)
        .scroll_duration(Duration::ZERO)
        .build()
        .expect("valid config")
}

#[allow(dead_code)]
pub fn resolver(table: &Arc<ResourceTable>, base: &str) -> ReferenceResolver {
    ReferenceResolver::new(Arc::clone(table), Aliases::from_base_str(base), &quick_config())
        .expect("resolver")
}

/// Bytes carried by a base64 `data:` URI
#[allow(dead_code)]
pub fn data_uri_bytes(uri: &str) -> Vec<u8> {
    let (_, payload) = uri.split_once(";base64,").expect("base64 data URI");
    STANDARD.decode(payload).expect("valid base64")
}

/// Value of `attr` on the first element matching `selector`
#[allow(dead_code)]
pub fn attr_of(html: &str, selector: &str, attr: &str) -> Option<String> {
    use kuchiki::traits::TendrilSink;
    let document = kuchiki::parse_html().one(html);
    let element = document.select_first(selector).ok()?;
    let attrs = element.attributes.borrow();
    attrs.get(attr).map(str::to_string)
}
