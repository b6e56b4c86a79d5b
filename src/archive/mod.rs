//! Safari `.webarchive` bundles
//!
//! A bundle is a property list (binary or XML) holding a main resource, a flat
//! list of subresources and nested bundles for subframes. Resource records
//! carry MIME type, text encoding, URL, frame name and raw bytes.

use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use plist::{Dictionary, Value};

use crate::error::{Result, SinglefileError};
use crate::resource::{Aliases, Resource, ResourceTable};

const MAIN_RESOURCE: &str = "WebMainResource";
const SUBRESOURCES: &str = "WebSubresources";
const SUBFRAMES: &str = "WebSubframeArchives";

const MIME_TYPE: &str = "WebResourceMIMEType";
const TEXT_ENCODING: &str = "WebResourceTextEncodingName";
const URL: &str = "WebResourceURL";
const FRAME_NAME: &str = "WebResourceFrameName";
const DATA: &str = "WebResourceData";

/// A decoded bundle
///
/// The resource table is built on first use from the main resource, the
/// subresources and every subframe, keyed by literal declared URL. After
/// that the table is authoritative: captures and fetches add to it, the
/// static fields never change.
#[derive(Debug)]
pub struct WebArchive {
    main: Arc<Resource>,
    subresources: Vec<Arc<Resource>>,
    subframes: Vec<WebArchive>,
    aliases: Aliases,
    table: OnceLock<Arc<ResourceTable>>,
}

impl WebArchive {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Decode a binary or XML property list
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value = Value::from_reader(Cursor::new(bytes))?;
        let dict = value
            .as_dictionary()
            .ok_or_else(|| SinglefileError::format("bundle root is not a dictionary"))?;
        Self::from_dictionary(dict)
    }

    fn from_dictionary(dict: &Dictionary) -> Result<Self> {
        let main = dict
            .get(MAIN_RESOURCE)
            .and_then(Value::as_dictionary)
            .ok_or_else(|| SinglefileError::format(format!("bundle has no {MAIN_RESOURCE}")))?;
        let main = read_resource(main)?;
        if main.url().is_empty() {
            return Err(SinglefileError::format("main resource has no URL"));
        }

        let subresources = match dict.get(SUBRESOURCES).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_dictionary)
                .map(|d| read_resource(d).map(Arc::new))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let subframes = match dict.get(SUBFRAMES).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_dictionary)
                .map(Self::from_dictionary)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let aliases = Aliases::from_base_str(main.url());
        Ok(Self {
            main: Arc::new(main),
            subresources,
            subframes,
            aliases,
            table: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn main_resource(&self) -> &Arc<Resource> {
        &self.main
    }

    #[must_use]
    pub fn main_url(&self) -> &str {
        self.main.url()
    }

    /// Main document text as stored in the bundle
    #[must_use]
    pub fn main_document(&self) -> String {
        self.main.text()
    }

    #[must_use]
    pub fn subresources(&self) -> &[Arc<Resource>] {
        &self.subresources
    }

    #[must_use]
    pub fn subframes(&self) -> &[WebArchive] {
        &self.subframes
    }

    /// Alias rules with the main resource URL as base
    #[must_use]
    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Shared resource table, built on first access
    pub fn table(&self) -> &Arc<ResourceTable> {
        self.table.get_or_init(|| {
            let table = Arc::new(ResourceTable::new());
            self.seed(&table);
            log::debug!(
                "bundle {} indexed: {} resources",
                self.main_url(),
                table.len()
            );
            table
        })
    }

    fn seed(&self, table: &ResourceTable) {
        table.insert([self.main.url()], Resource::clone(&self.main));
        for res in &self.subresources {
            table.insert([res.url()], Resource::clone(res));
        }
        for frame in &self.subframes {
            frame.seed(table);
        }
    }

    /// Look up a reference by its literal URL
    #[must_use]
    pub fn resolve(&self, literal: &str) -> Option<Arc<Resource>> {
        self.table().get(literal)
    }

    /// Fill in scheme and host of a reference from the main resource URL
    #[must_use]
    pub fn complete(&self, reference: &str) -> String {
        self.aliases.absolute(reference)
    }
}

fn read_resource(dict: &Dictionary) -> Result<Resource> {
    let text = |key: &str| dict.get(key).and_then(Value::as_string).map(str::to_string);

    let data = match dict.get(DATA) {
        Some(Value::Data(bytes)) => bytes.clone(),
        Some(Value::String(s)) => s.clone().into_bytes(),
        Some(_) => {
            return Err(SinglefileError::format(format!("{DATA} has an unexpected type")));
        }
        None => Vec::new(),
    };

    let mime_type = text(MIME_TYPE).unwrap_or_default();
    let url = text(URL).unwrap_or_default();
    Ok(Resource::new(&mime_type, url, data)
        .with_text_encoding(text(TEXT_ENCODING))
        .with_frame_name(text(FRAME_NAME)))
}
