//! MIME header blocks

use mailparse::MailHeader;

use crate::error::{Result, SinglefileError};

/// Ordered MIME header fields with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeHeaders {
    fields: Vec<(String, String)>,
}

impl MimeHeaders {
    /// Copy parsed fields, rejecting lines that carried no field name
    ///
    /// The parser accepts a line without a colon as a name with an empty
    /// value; a name containing whitespace can only come from such a line.
    pub fn from_mail_headers(parsed: &[MailHeader<'_>]) -> Result<Self> {
        let mut headers = Self::default();
        for header in parsed {
            let name = header.get_key();
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(SinglefileError::format(format!(
                    "malformed MIME header line: {name:?}"
                )));
            }
            headers.insert(name, header.get_value().trim());
        }
        Ok(headers)
    }

    /// Append a field; earlier fields with the same name are kept
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split one header block off the front of `input`
///
/// The block ends at the first empty line or at end of input; folded lines
/// are unfolded. Returns the headers and the remaining body.
pub fn read_header_block(input: &[u8]) -> Result<(MimeHeaders, &[u8])> {
    let (parsed, body_start) = mailparse::parse_headers(input)?;
    let headers = MimeHeaders::from_mail_headers(&parsed)?;
    Ok((headers, &input[body_start.min(input.len())..]))
}
