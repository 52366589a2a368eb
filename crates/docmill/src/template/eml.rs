//! Message (eml) template rendering.
//!
//! An eml template is RFC 5322 text; substitution runs over the whole
//! file, so placeholders work in the subject line and any other header as
//! well as the body.

use std::collections::BTreeSet;
use std::path::Path;

use super::RenderFailure;
use crate::placeholder::{extract_names as names_in_text, substitute, Record};

pub(super) fn extract_names(bytes: &[u8]) -> Vec<String> {
    names_in_text(&String::from_utf8_lossy(bytes))
}

pub(super) fn render(
    bytes: &[u8],
    record: &Record,
    output: &Path,
) -> Result<BTreeSet<String>, RenderFailure> {
    let text = String::from_utf8_lossy(bytes);

    let mut missing = BTreeSet::new();
    let substituted = substitute(&text, record, &mut missing);

    std::fs::write(output, substituted.as_bytes()).map_err(RenderFailure::Write)?;
    Ok(missing)
}

/// Splits an eml into (headers, body) at the first blank line.
pub fn split_message(text: &str) -> (&str, &str) {
    for separator in ["\r\n\r\n", "\n\n"] {
        if let Some(pos) = text.find(separator) {
            return (&text[..pos], &text[pos + separator.len()..]);
        }
    }
    (text, "")
}

/// The `Subject:` header value, if any.
pub fn subject(text: &str) -> Option<&str> {
    let (headers, _) = split_message(text);
    headers.lines().find_map(|line| {
        line.strip_prefix("Subject:").map(str::trim)
    })
}
