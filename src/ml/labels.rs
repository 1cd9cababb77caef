//! Class label table
//!
//! Ultralytics exports store the class names in the ONNX metadata under the
//! `names` key, formatted as a Python dict literal: `{0: 'A', 1: 'B'}`.
//! A JSON labels file can override them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{SettingsError, UnknownLabel};

/// Label used on screen when a class id has no entry in the table
pub const UNKNOWN_LABEL: &str = "?";

/// Maps class ids produced by the model to human-readable labels
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: BTreeMap<usize, String>,
}

/// Accepted layouts for a labels file
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelsFile {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

impl LabelTable {
    /// Build a table where the n-th name belongs to class id n
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).enumerate().collect(),
        }
    }

    /// Parse the `names` metadata entry written by ultralytics.
    ///
    /// Returns `None` if the string is not a `{id: 'name', ...}` literal.
    pub fn parse_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut names = BTreeMap::new();
        let mut rest = body.trim_start();

        while !rest.is_empty() {
            let colon = rest.find(':')?;
            let id: usize = rest[..colon].trim().parse().ok()?;
            rest = rest[colon + 1..].trim_start();

            let quote = rest.chars().next()?;
            if quote != '\'' && quote != '"' {
                return None;
            }
            let end = rest[1..].find(quote)? + 1;
            names.insert(id, rest[1..end].to_string());
            rest = rest[end + 1..].trim_start();

            match rest.strip_prefix(',') {
                Some(after) => rest = after.trim_start(),
                None if rest.is_empty() => {}
                None => return None,
            }
        }

        Some(Self { names })
    }

    /// Load a JSON labels file: either `["A", "B"]` or `{"0": "A", "1": "B"}`
    pub fn load_json(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    pub fn parse_json(contents: &str) -> Result<Self, SettingsError> {
        let names = match serde_json::from_str(contents)? {
            LabelsFile::List(list) => list.into_iter().enumerate().collect(),
            LabelsFile::Map(map) => map,
        };
        Ok(Self { names })
    }

    /// Look up the label for a class id
    pub fn resolve(&self, class_id: usize) -> Result<&str, UnknownLabel> {
        self.names
            .get(&class_id)
            .map(String::as_str)
            .ok_or(UnknownLabel(class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let table = LabelTable::parse_metadata("{0: 'A', 1: 'B', 2: \"C\"}").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(0), Ok("A"));
        assert_eq!(table.resolve(2), Ok("C"));
    }

    #[test]
    fn test_parse_metadata_with_commas_in_names() {
        let table = LabelTable::parse_metadata("{0: 'thumbs, up', 1: 'B'}").unwrap();
        assert_eq!(table.resolve(0), Ok("thumbs, up"));
        assert_eq!(table.resolve(1), Ok("B"));
    }

    #[test]
    fn test_parse_metadata_empty_dict() {
        let table = LabelTable::parse_metadata("{}").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_metadata_rejects_garbage() {
        assert!(LabelTable::parse_metadata("A,B,C").is_none());
        assert!(LabelTable::parse_metadata("{0: A}").is_none());
        assert!(LabelTable::parse_metadata("{x: 'A'}").is_none());
        assert!(LabelTable::parse_metadata("{0: 'A' 1: 'B'}").is_none());
    }

    #[test]
    fn test_unknown_label() {
        let table = LabelTable::from_names(["A", "B"]);
        assert_eq!(table.resolve(1), Ok("B"));
        assert_eq!(table.resolve(7), Err(UnknownLabel(7)));
    }

    #[test]
    fn test_parse_json_list_and_map() {
        let list = LabelTable::parse_json(r#"["A", "B", "C"]"#).unwrap();
        assert_eq!(list.resolve(2), Ok("C"));

        let map = LabelTable::parse_json(r#"{"0": "A", "5": "F"}"#).unwrap();
        assert_eq!(map.resolve(5), Ok("F"));
        assert!(map.resolve(1).is_err());
    }

    #[test]
    fn test_parse_json_invalid() {
        assert!(LabelTable::parse_json("{not json").is_err());
    }
}
