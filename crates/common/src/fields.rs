//! Canonical tracking field schema

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Adobe Analytics parameters checked by default
pub const DEFAULT_CANONICAL_FIELDS: &[&str] = &[
    "ce", "cc", "g", "v", "mid", "pageName", "rs", "server", "t", "ns",
    "c3", "c4", "c10", "c19", "c24", "c30", "c31", "c38", "c46", "c48",
    "c49", "c56", "c57", "c58", "c75", "v22", "v5", "v27", "v41", "v45",
    "v60", "v61", "v74", "v75", "v94", "v122", "v140", "h1", "ssf", "lob",
    "visitorCheck", "bh", "bw", "cl", "c", "j", "mcorgid", "pf", "s", "prop22",
];

/// Fixed, ordered set of field names every beacon is projected onto.
///
/// Duplicate names collapse onto their first position so that the record
/// size always equals `len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFields {
    names: Arc<[String]>,
}

impl CanonicalFields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self { names: unique.into() }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Project raw query parameters onto the schema
    pub fn map(&self, raw: &HashMap<String, String>) -> FieldRecord {
        let values = self
            .names
            .iter()
            .map(|name| raw.get(name).cloned().unwrap_or_default())
            .collect();
        FieldRecord {
            names: self.names.clone(),
            values,
        }
    }
}

impl Default for CanonicalFields {
    fn default() -> Self {
        Self::new(DEFAULT_CANONICAL_FIELDS.iter().copied())
    }
}

/// A beacon's parameters in canonical shape, one value per schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    names: Arc<[String]>,
    values: Vec<String>,
}

impl FieldRecord {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a canonical field; `None` if the name is not in the schema
    pub fn get(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl Serialize for FieldRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::parse_query;

    #[test]
    fn test_maps_known_and_defaults_missing() {
        let fields = CanonicalFields::new(["ce", "pageName", "c3", "bogus"]);
        let raw = parse_query("https://x.test/b/ss/rs?ce=UTF-8&pageName=Home&c3=foo");
        let record = fields.map(&raw);

        let pairs: Vec<_> = record.iter().collect();
        assert_eq!(
            pairs,
            vec![("ce", "UTF-8"), ("pageName", "Home"), ("c3", "foo"), ("bogus", "")]
        );
    }

    #[test]
    fn test_unmapped_keys_are_dropped() {
        let fields = CanonicalFields::new(["pageName"]);
        let raw = parse_query("https://x.test/?pageName=Home&AQB=1&AQE=1");
        let record = fields.map(&raw);
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("AQB"), None);
    }

    #[test]
    fn test_record_size_matches_schema() {
        let fields = CanonicalFields::default();
        for url in [
            "https://x.test/",
            "https://x.test/?pageName=a",
            "https://x.test/?a=1&b=2&c=3&v5=x&v5=y&prop22=z",
        ] {
            assert_eq!(fields.map(&parse_query(url)).len(), fields.len());
        }
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let fields = CanonicalFields::new(["t", "ns", "t"]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.names(), &["t".to_string(), "ns".to_string()]);
    }

    #[test]
    fn test_default_schema() {
        let fields = CanonicalFields::default();
        assert_eq!(fields.len(), 50);
        assert!(fields.contains("pageName"));
        assert!(fields.contains("v5"));
        assert!(!fields.contains("events"));
    }

    #[test]
    fn test_record_serializes_in_schema_order() {
        let fields = CanonicalFields::new(["b", "a"]);
        let record = fields.map(&parse_query("https://x.test/?a=1&b=2"));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"b":"2","a":"1"}"#);
    }
}
