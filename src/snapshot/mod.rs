//! MIME multipart snapshots (`.mhtml`)
//!
//! A snapshot is one MIME entity, usually `multipart/related`, whose parts are
//! the page's resources. Parts carry a `Content-Location` and often a
//! `Content-ID`; nested multipart parts (frames saved as their own
//! `multipart/alternative` or `multipart/related`) are unwrapped recursively
//! and their leaves flattened into one part table.
//!
//! Parts are stored as [`Resource`]s with their MIME headers attached.

pub mod headers;

use std::path::Path;
use std::sync::Arc;

use mailparse::{MailHeaderMap, ParsedMail};

use crate::archive::WebArchive;
use crate::error::{Result, SinglefileError};
use crate::resource::{Aliases, Resource, ResourceTable, content_id_key, is_content_id, is_data_uri};
use crate::utils::DEFAULT_CONTENT_TYPE;

pub use headers::{MimeHeaders, read_header_block};

/// Header naming the location of the main document
pub const ROOT_LOCATION_HEADER: &str = "Snapshot-Content-Location";

/// A decoded snapshot: the root part plus the aliased part table
#[derive(Debug)]
pub struct Snapshot {
    headers: MimeHeaders,
    root_location: String,
    root: Arc<Resource>,
    table: Arc<ResourceTable>,
    aliases: Aliases,
    part_count: usize,
}

impl Snapshot {
    /// Read and decode a snapshot file
    pub fn load(path: &Path, max_depth: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes, max_depth)
    }

    /// Read and decode a snapshot stream
    pub fn from_reader(mut reader: impl std::io::Read, max_depth: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse(&bytes, max_depth)
    }

    /// Decode snapshot bytes
    ///
    /// `max_depth` bounds multipart nesting; an entity nested deeper is
    /// rejected as malformed.
    pub fn parse(bytes: &[u8], max_depth: usize) -> Result<Self> {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let mail = mailparse::parse_mail(&bytes[start..])?;
        let headers = MimeHeaders::from_mail_headers(&mail.headers)?;

        let mut parts = Vec::new();
        decode_entity(&mail, headers.clone(), 0, max_depth, &mut parts)?;
        if parts.is_empty() {
            return Err(SinglefileError::format("snapshot contains no parts"));
        }

        let root_location = headers
            .get(ROOT_LOCATION_HEADER)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map_or_else(|| parts[0].content_location().to_string(), str::to_string);
        let aliases = Aliases::from_base_str(&root_location);

        let table = Arc::new(ResourceTable::new());
        let part_count = parts.len();
        let first = Arc::new(parts[0].clone());
        for part in parts {
            register_part(&table, &aliases, part);
        }

        let root = table
            .get(&root_location)
            .or_else(|| table.get(&aliases.absolute(&root_location)))
            .unwrap_or_else(|| {
                log::warn!("root part {root_location} not found, using first part");
                first
            });

        Ok(Self {
            headers,
            root_location,
            root,
            table,
            aliases,
            part_count,
        })
    }

    /// Top-level headers of the snapshot entity
    #[must_use]
    pub fn headers(&self) -> &MimeHeaders {
        &self.headers
    }

    /// Declared location of the main document
    #[must_use]
    pub fn root_location(&self) -> &str {
        &self.root_location
    }

    #[must_use]
    pub fn root(&self) -> &Arc<Resource> {
        &self.root
    }

    /// Main document text
    #[must_use]
    pub fn main_document(&self) -> String {
        self.root.text()
    }

    #[must_use]
    pub fn table(&self) -> &Arc<ResourceTable> {
        &self.table
    }

    #[must_use]
    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Number of leaf parts decoded, including any that had no usable alias
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.part_count
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Resource>> {
        self.table.get(key)
    }

    /// Fill gaps in the part table from a bundle
    ///
    /// Every bundle resource is registered under the relative and absolute
    /// form of its URL; keys the snapshot already declares are left alone.
    /// Returns how many resources contributed at least one key.
    pub fn merge_bundle(&self, bundle: &WebArchive) -> usize {
        self.merge_table(bundle.table())
    }

    /// [`Snapshot::merge_bundle`] for any table
    pub fn merge_table(&self, other: &ResourceTable) -> usize {
        let mut merged = 0;
        for resource in other.resources() {
            let keys = self.aliases.forms(resource.url());
            if self.table.insert(keys, Resource::clone(&resource)).is_some() {
                merged += 1;
            }
        }
        log::debug!("merged {merged} bundle resources into snapshot");
        merged
    }
}

/// Decode one entity, appending its leaves to `out`
fn decode_entity(
    mail: &ParsedMail<'_>,
    headers: MimeHeaders,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<Resource>,
) -> Result<()> {
    if !mail.ctype.mimetype.starts_with("multipart/") {
        let media_type = mail
            .headers
            .get_first_value("Content-Type")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let location = headers.get("content-location").map(str::trim).unwrap_or_default().to_string();
        let body = mail.get_body_raw()?;
        out.push(Resource::new(&media_type, location, body).with_headers(headers));
        return Ok(());
    }

    if depth >= max_depth {
        return Err(SinglefileError::format(format!(
            "multipart nesting deeper than {max_depth} levels"
        )));
    }

    let boundary = mail
        .ctype
        .params
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|b| !b.is_empty())
        .ok_or(SinglefileError::MissingBoundary)?;

    if mail.subparts.is_empty() {
        return Err(SinglefileError::format(format!(
            "multipart body has no \"--{boundary}\" delimiter"
        )));
    }

    for sub in &mail.subparts {
        let sub_headers = MimeHeaders::from_mail_headers(&sub.headers)?;
        decode_entity(sub, sub_headers, depth + 1, max_depth, out)?;
    }
    Ok(())
}

/// Register a part under its alias keys
///
/// A `cid:` location is its own key; a `data:` location is already inline and
/// gets no key; any other location is keyed by its relative and absolute
/// forms plus `cid:<Content-ID>` when present.
fn register_part(table: &ResourceTable, aliases: &Aliases, part: Resource) {
    let location = part.content_location().to_string();

    let keys: Vec<String> = if is_content_id(&location) {
        vec![location.clone()]
    } else if is_data_uri(&location) {
        Vec::new()
    } else {
        let mut keys = Vec::with_capacity(3);
        if !location.is_empty() {
            keys.extend(aliases.forms(&location));
        }
        if let Some(cid) = part.headers().get("content-id").and_then(content_id_key) {
            keys.push(cid);
        }
        keys
    };

    if keys.is_empty() {
        log::debug!("part without usable location skipped ({})", part.mime_type());
        return;
    }
    if table.insert(keys, part).is_none() {
        log::debug!("duplicate part {location} ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "\r\n\r\nFrom: <Saved by Blink>\r\n\
Snapshot-Content-Location: http://ex.com/a\r\n\
Subject: test\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related;\r\n\
\ttype=\"text/html\";\r\n\
\tboundary=\"----MultipartBoundary--x----\"\r\n\
\r\n\
------MultipartBoundary--x----\r\n\
Content-Type: text/html\r\n\
Content-ID: <frame-main@mhtml.blink>\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
Content-Location: http://ex.com/a\r\n\
\r\n\
<html><body><img src=3D\"b.png\"></body></html>\r\n\
------MultipartBoundary--x----\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Location: http://ex.com/b.png\r\n\
\r\n\
iVBORw==\r\n\
------MultipartBoundary--x----\r\n\
Content-Type: text/css\r\n\
Content-Location: cid:css-1@mhtml.blink\r\n\
\r\n\
a{}\r\n\
------MultipartBoundary--x------\r\n";

    #[test]
    fn decodes_parts_and_root() {
        let snapshot = Snapshot::parse(SNAPSHOT.as_bytes(), 8).unwrap();

        assert_eq!(snapshot.part_count(), 3);
        assert_eq!(snapshot.root_location(), "http://ex.com/a");
        assert_eq!(
            snapshot.main_document(),
            "<html><body><img src=\"b.png\"></body></html>"
        );

        let png = snapshot.get("http://ex.com/b.png").unwrap();
        assert_eq!(png.data().as_ref(), &[0x89, b'P', b'N', b'G']);
        assert!(Arc::ptr_eq(&png, &snapshot.get("/b.png").unwrap()));

        assert!(snapshot.get("cid:frame-main@mhtml.blink").is_some());
        assert_eq!(snapshot.get("cid:css-1@mhtml.blink").unwrap().text(), "a{}");
    }

    #[test]
    fn multipart_without_boundary_is_distinct_error() {
        let err = Snapshot::parse(b"Content-Type: multipart/related\r\n\r\nbody", 8).unwrap_err();
        assert!(matches!(err, SinglefileError::MissingBoundary));
    }

    #[test]
    fn depth_guard_rejects_deep_nesting() {
        let err = Snapshot::parse(SNAPSHOT.as_bytes(), 0).unwrap_err();
        assert!(matches!(err, SinglefileError::Format(_)));
    }

    #[test]
    fn single_part_document_is_its_own_root() {
        let snapshot = Snapshot::parse(
            b"Content-Type: text/html\r\nContent-Location: http://ex.com/only\r\n\r\n<p>hi</p>",
            8,
        )
        .unwrap();
        assert_eq!(snapshot.root_location(), "http://ex.com/only");
        assert_eq!(snapshot.main_document(), "<p>hi</p>");
    }

    #[test]
    fn merge_fills_gaps_without_overwriting() {
        let snapshot = Snapshot::parse(SNAPSHOT.as_bytes(), 8).unwrap();
        let other = ResourceTable::new();
        other.insert(["http://ex.com/b.png"], Resource::new("image/png", "http://ex.com/b.png", "other"));
        other.insert(["http://ex.com/c.js"], Resource::new("text/javascript", "http://ex.com/c.js", "c()"));

        assert_eq!(snapshot.merge_table(&other), 1);
        assert_eq!(snapshot.get("/b.png").unwrap().data().as_ref(), &[0x89, b'P', b'N', b'G']);
        assert_eq!(snapshot.get("/c.js").unwrap().text(), "c()");
    }
}
