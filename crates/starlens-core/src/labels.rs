//! Label catalog: class index → display name.
//!
//! The artifact is a JSON object whose keys are string-encoded class indices,
//! e.g. `{"0": "Ada Lovelace", "1": "Alan Turing"}`.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("label map not found: {0}")]
    NotFound(String),
    #[error("failed to read label map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("label map is not a JSON object of strings: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("label map key {0:?} is not a class index")]
    BadIndex(String),
    #[error("label map is empty")]
    Empty,
    #[error("label map indices are not contiguous: missing index {0}")]
    Gap(usize),
}

/// Immutable, index-ordered list of class names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCatalog {
    names: Vec<String>,
}

impl LabelCatalog {
    /// Load the catalog from a JSON label map on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), classes = catalog.len(), "loaded label map");
        Ok(catalog)
    }

    /// Parse a JSON label map.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)?;

        let mut by_index = BTreeMap::new();
        for (key, name) in raw {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| CatalogError::BadIndex(key.clone()))?;
            if by_index.insert(index, name).is_some() {
                // "1" and "01" both parse to 1
                return Err(CatalogError::BadIndex(key));
            }
        }

        Self::from_indexed(by_index)
    }

    fn from_indexed(by_index: BTreeMap<usize, String>) -> Result<Self, CatalogError> {
        if by_index.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut names = Vec::with_capacity(by_index.len());
        for (expected, (index, name)) in by_index.into_iter().enumerate() {
            if index != expected {
                return Err(CatalogError::Gap(expected));
            }
            names.push(name);
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Display name for `index`, or `"Unknown (<index>)"` when out of range.
    pub fn name_or_unknown(&self, index: usize) -> String {
        match self.name(index) {
            Some(name) => name.to_string(),
            None => format!("Unknown ({index})"),
        }
    }

    /// All names in class-index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for LabelCatalog {
    /// Build a catalog whose indices follow iteration order.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_by_numeric_index() {
        let catalog =
            LabelCatalog::from_json(r#"{"10": "K", "2": "C", "0": "A", "1": "B", "3": "D", "4": "E", "5": "F", "6": "G", "7": "H", "8": "I", "9": "J"}"#)
                .unwrap();
        assert_eq!(catalog.len(), 11);
        assert_eq!(catalog.name(0), Some("A"));
        assert_eq!(catalog.name(2), Some("C"));
        // numeric, not lexicographic: "10" sorts after "9"
        assert_eq!(catalog.name(10), Some("K"));
    }

    #[test]
    fn test_empty_map_rejected() {
        assert!(matches!(LabelCatalog::from_json("{}"), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_gap_rejected() {
        let err = LabelCatalog::from_json(r#"{"0": "A", "2": "C"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Gap(1)));
    }

    #[test]
    fn test_not_starting_at_zero_rejected() {
        let err = LabelCatalog::from_json(r#"{"1": "A"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Gap(0)));
    }

    #[test]
    fn test_non_integer_key_rejected() {
        let err = LabelCatalog::from_json(r#"{"zero": "A"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::BadIndex(_)));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = LabelCatalog::from_json(r#"{"1": "A", "01": "B", "0": "C"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::BadIndex(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            LabelCatalog::from_json("[\"A\", \"B\"]"),
            Err(CatalogError::Malformed(_))
        ));
        assert!(matches!(
            LabelCatalog::from_json(r#"{"0": 7}"#),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = LabelCatalog::load("/nonexistent/label_map.json").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("starlens-labels-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"0": "Ada", "1": "Grace"}"#).unwrap();
        let catalog = LabelCatalog::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(catalog.names(), &["Ada".to_string(), "Grace".to_string()]);
    }

    #[test]
    fn test_unknown_fallback() {
        let catalog: LabelCatalog = ["Ada"].into_iter().collect();
        assert_eq!(catalog.name_or_unknown(0), "Ada");
        assert_eq!(catalog.name_or_unknown(3), "Unknown (3)");
    }
}
