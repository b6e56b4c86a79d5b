//! URL and path helpers for the conversion pipeline.

use std::path::{Path, PathBuf};

/// Kind of input file, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Safari resource bundle (`.webarchive`)
    Archive,
    /// MIME multipart snapshot (`.mhtml`, `.mht`)
    Snapshot,
}

impl InputKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "webarchive" => Some(Self::Archive),
            "mhtml" | "mht" => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Output location for a converted input: same directory and stem, new extension
#[must_use]
pub fn output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// Collect every convertible file in `dir`, sorted by name
pub fn discover_inputs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && InputKind::from_path(&path).is_some() {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Check if a URL can be fetched over the network
#[must_use]
pub fn is_fetchable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
