//! Alias normalization
//!
//! A reference seen in markup may be spelled as a content identifier
//! (`cid:...`), an absolute URL, a scheme-relative URL (`//host/path`) or a
//! path relative to the document. The table stores resources under a
//! *relative* form (scheme and host stripped) and an *absolute* form (fully
//! qualified against a base), so any spelling can be reduced to a key.

use url::Url;

/// `true` for inline `data:` references
#[must_use]
pub fn is_data_uri(reference: &str) -> bool {
    has_scheme(reference, "data:")
}

/// `true` for same-document fragment references (`#id`)
#[must_use]
pub fn is_fragment(reference: &str) -> bool {
    reference.starts_with('#')
}

/// `true` for content-identifier references (`cid:...`)
#[must_use]
pub fn is_content_id(reference: &str) -> bool {
    has_scheme(reference, "cid:")
}

fn has_scheme(reference: &str, scheme: &str) -> bool {
    reference
        .get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Derives the relative and absolute alias of a reference against one base
#[derive(Debug, Clone, Default)]
pub struct Aliases {
    base: Option<Url>,
}

impl Aliases {
    #[must_use]
    pub fn new(base: Option<Url>) -> Self {
        Self { base }
    }

    /// Aliases against a base given as text; an unparsable base is treated as none
    #[must_use]
    pub fn from_base_str(base: &str) -> Self {
        Self::new(Url::parse(base).ok())
    }

    #[must_use]
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Same rules, different base
    #[must_use]
    pub fn rebased(&self, base: &str) -> Self {
        match Url::parse(base) {
            Ok(url) if url.has_host() => Self::new(Some(url)),
            _ => self.clone(),
        }
    }

    /// Reference with scheme and host stripped
    ///
    /// `http://ex.com/a/b.png?x=1` and `//ex.com/a/b.png?x=1` both reduce to
    /// `/a/b.png?x=1`. References without a host are returned unchanged.
    #[must_use]
    pub fn relative(&self, reference: &str) -> String {
        if is_data_uri(reference) || is_content_id(reference) {
            return reference.to_string();
        }

        if let Some(rest) = reference.strip_prefix("//") {
            return match rest.find(['/', '?', '#']) {
                Some(idx) => normalize_path_start(&rest[idx..]),
                None => "/".to_string(),
            };
        }

        match Url::parse(reference) {
            Ok(url) if url.has_host() => {
                let mut out = url.path().to_string();
                if let Some(query) = url.query() {
                    out.push('?');
                    out.push_str(query);
                }
                if let Some(fragment) = url.fragment() {
                    out.push('#');
                    out.push_str(fragment);
                }
                out
            }
            _ => reference.to_string(),
        }
    }

    /// Reference fully qualified against the base
    ///
    /// Content identifiers and data URIs have no absolute form and are
    /// returned unchanged, as is anything that cannot be joined.
    #[must_use]
    pub fn absolute(&self, reference: &str) -> String {
        if reference.is_empty() || is_data_uri(reference) || is_content_id(reference) {
            return reference.to_string();
        }

        if let Ok(url) = Url::parse(reference) {
            return url.to_string();
        }

        match self.base.as_ref().map(|base| base.join(reference)) {
            Some(Ok(url)) => url.to_string(),
            _ => reference.to_string(),
        }
    }

    /// Both alias forms, relative first
    #[must_use]
    pub fn forms(&self, reference: &str) -> [String; 2] {
        [self.relative(reference), self.absolute(reference)]
    }
}

fn normalize_path_start(rest: &str) -> String {
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

/// `<id@host>` from a Content-ID header becomes `cid:id@host`
#[must_use]
pub fn content_id_key(content_id: &str) -> Option<String> {
    let trimmed = content_id
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("cid:{trimmed}"))
    }
}
