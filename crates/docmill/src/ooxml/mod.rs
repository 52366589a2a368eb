//! Minimal OOXML container plumbing shared by the data-source parser and
//! the template renderers.
//!
//! Only the parts the substitution pipeline touches are modeled; everything
//! else in a container is carried through byte-for-byte by the renderers.

pub mod docx;
pub mod xlsx;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OoxmlError {
    #[error("not a valid OOXML container: {0}")]
    Container(String),

    #[error("missing required part '{0}'")]
    MissingPart(String),

    #[error("XML error in part '{part}': {reason}")]
    Xml { part: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Escapes text for inclusion in XML content or attribute values.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
