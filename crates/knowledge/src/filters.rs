//! Pre-retrieval document filters.
//!
//! A filter is a set of named allow-lists of source file names (e.g. one
//! list per document group). A document passes when its `file_name` or
//! `document` metadata matches any listed name. No lists, or only empty
//! lists, means no restriction.

use crate::document::DocumentMetadata;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Extensions a listed stem may carry in stored metadata.
const EXTENSIONS: [&str; 6] = [".pdf", ".md", ".xml", ".docx", ".pptx", ".epub"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFilters {
    groups: BTreeMap<String, Vec<String>>,
}

impl DocumentFilters {
    /// Create a new empty filter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow the given file names under `group`
    pub fn with_group(mut self, group: impl Into<String>, file_names: Vec<String>) -> Self {
        self.groups.insert(group.into(), file_names);
        self
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    /// True when the filter restricts nothing
    pub fn is_unrestricted(&self) -> bool {
        self.groups.values().all(|names| names.is_empty())
    }

    /// Every accepted `file_name`/`document` value.
    pub fn candidates(&self) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for value in self.groups.values().flatten() {
            let base = value
                .rsplit(|c: char| c == '/' || c == '\\')
                .next()
                .unwrap_or(value.as_str())
                .to_string();
            let stem = match base.rfind('.') {
                Some(pos) => base[..pos].to_string(),
                None => base.clone(),
            };
            for ext in EXTENSIONS {
                candidates.insert(format!("{}{}", stem, ext));
            }
            candidates.insert(stem);
            candidates.insert(base);
        }
        candidates
    }

    /// Whether a document with `metadata` passes the filter.
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let candidates = self.candidates();
        candidates.contains(&metadata.document)
            || metadata
                .file_name
                .as_ref()
                .is_some_and(|name| candidates.contains(name))
    }

    /// Parse `group=a,b` CLI arguments.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut filters = Self::new();
        for pair in pairs {
            let (group, names) = pair.split_once('=')?;
            let names = names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
            filters.groups.insert(group.trim().to_string(), names);
        }
        Some(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(document: &str, file_name: Option<&str>) -> DocumentMetadata {
        DocumentMetadata {
            document: document.to_string(),
            file_name: file_name.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_filter_is_unrestricted() {
        let filters = DocumentFilters::new();
        assert!(filters.is_unrestricted());
        assert!(filters.matches(&meta("anything.pdf", None)));

        let filters = DocumentFilters::new().with_group("lbo", vec![]);
        assert!(filters.is_unrestricted());
        assert!(filters.matches(&meta("anything.pdf", None)));
    }

    #[test]
    fn test_stem_matches_extension_variants() {
        let filters = DocumentFilters::new().with_group("lbo", vec!["lbo-2024".to_string()]);
        assert!(filters.matches(&meta("lbo-2024.pdf", None)));
        assert!(filters.matches(&meta("other", Some("lbo-2024"))));
        assert!(!filters.matches(&meta("bebauungsplan.pdf", Some("bebauungsplan"))));
    }

    #[test]
    fn test_path_and_extension_are_normalized() {
        let filters =
            DocumentFilters::new().with_group("plans", vec!["uploads/plan-7.docx".to_string()]);
        let candidates = filters.candidates();
        assert!(candidates.contains("plan-7.docx"));
        assert!(candidates.contains("plan-7"));
        assert!(candidates.contains("plan-7.md"));
        assert!(filters.matches(&meta("plan-7.pdf", None)));
    }

    #[test]
    fn test_groups_are_unioned() {
        let filters = DocumentFilters::new()
            .with_group("lbo", vec!["lbo".to_string()])
            .with_group("plans", vec!["plan-1".to_string()]);
        assert!(filters.matches(&meta("lbo.pdf", None)));
        assert!(filters.matches(&meta("plan-1.md", None)));
    }

    #[test]
    fn test_from_pairs() {
        let filters = DocumentFilters::from_pairs(["lbo=a, b", "plans="]).unwrap();
        assert_eq!(filters.groups()["lbo"], vec!["a", "b"]);
        assert!(filters.groups()["plans"].is_empty());
        assert!(DocumentFilters::from_pairs(["missing-separator"]).is_none());
    }
}
