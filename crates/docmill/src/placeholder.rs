//! The `##name##` placeholder convention shared by data-source headers
//! and template bodies.
//!
//! Matching is case-sensitive and exact. A name with leading or trailing
//! whitespace inside the delimiters is not a placeholder at all; the text
//! passes through verbatim.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

pub static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##([^#\s](?:[^#]*[^#\s])?)##").unwrap());

/// One row of a data source: variable name → display value.
pub type Record = HashMap<String, String>;

/// Every distinct placeholder name in `text`, in first-seen order.
pub fn extract_names(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let name = &caps[1];
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replaces every placeholder whose name is a key of `record`; names the
/// record lacks stay verbatim and are collected into `missing`.
pub fn substitute(text: &str, record: &Record, missing: &mut BTreeSet<String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            match record.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.insert(name.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// True when `text` contains at least one placeholder.
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_names() {
        let record = record(&[("name", "Ann"), ("email", "a@x.com")]);
        let mut missing = BTreeSet::new();
        let out = substitute(
            "Hi ##name##, reach you at ##email##",
            &record,
            &mut missing,
        );
        assert_eq!(out, "Hi Ann, reach you at a@x.com");
        assert!(missing.is_empty());
    }

    #[test]
    fn unknown_names_stay_verbatim_and_are_reported() {
        let record = record(&[("name", "Ann")]);
        let mut missing = BTreeSet::new();
        let out = substitute("##name## ##unknown## ##unknown##", &record, &mut missing);
        assert_eq!(out, "Ann ##unknown## ##unknown##");
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), ["unknown"]);
    }

    #[test]
    fn whitespace_padded_names_are_not_placeholders() {
        let record = record(&[("name", "Ann"), (" name ", "wrong")]);
        let mut missing = BTreeSet::new();
        let out = substitute("## name ## and ##name##", &record, &mut missing);
        assert_eq!(out, "## name ## and Ann");
        assert!(missing.is_empty());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let record = record(&[("Name", "Ann")]);
        let mut missing = BTreeSet::new();
        let out = substitute("##name##", &record, &mut missing);
        assert_eq!(out, "##name##");
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn extract_names_dedupes_in_first_seen_order() {
        let names = extract_names("##b## then ##a## then ##b## and ## padded ##");
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn single_character_names_match() {
        assert_eq!(extract_names("##x##"), ["x"]);
        assert!(contains_placeholder("value: ##x##"));
        assert!(!contains_placeholder("no markers here"));
        assert!(!contains_placeholder("####"));
    }

    #[test]
    fn inner_spaces_are_allowed() {
        assert_eq!(extract_names("##first name##"), ["first name"]);
    }
}
