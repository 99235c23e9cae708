//! Per-run property store
//!
//! Steps communicate through named properties: extraction steps write them,
//! renderers and publish decisions read them. Each run owns exactly one
//! store; there is no sharing between runs.

use super::errors::PipelineError;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known property names
pub mod keys {
    /// Platform key the run was triggered for
    pub const PLATFORM: &str = "platform";
    /// Build agent name
    pub const AGENT: &str = "agentname";
    /// OS directory name used in store paths
    pub const OS_NAME: &str = "os_name";
    /// Architecture label used in store paths
    pub const UP_ARCH: &str = "up_arch";
    /// Build flags for `make`
    pub const FLAGS: &str = "flags";
    /// Source repository URL
    pub const REPOSITORY: &str = "repository";
    /// Branch being built
    pub const BRANCH: &str = "branch";
    /// `major.minor` version
    pub const MAJMIN: &str = "majmin";
    /// Full version string
    pub const VERSION: &str = "version";
    /// Abbreviated commit hash
    pub const SHORTCOMMIT: &str = "shortcommit";
    /// Commit metadata record
    pub const COMMIT: &str = "commit";
    /// Distributable filename, extension included
    pub const ARTIFACT_FILENAME: &str = "artifact_filename";
}

/// Value held by a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Plain string
    Text(String),
    /// Structured record of named string fields
    Record(BTreeMap<String, String>),
}

impl PropertyValue {
    /// Returns the text if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Record(_) => None,
        }
    }

    /// Returns the record if this is a record value
    #[must_use]
    pub fn as_record(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Record(r) => Some(r),
            Self::Text(_) => None,
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Record(r) => {
                let fields: Vec<String> = r.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", fields.join(", "))
            }
        }
    }
}

/// Property updates produced by one extractor invocation, applied in order
pub type PropertyUpdate = Vec<(String, PropertyValue)>;

/// Mutable property bag for a single pipeline run
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    values: AHashMap<String, PropertyValue>,
    frozen: bool,
}

impl PropertyStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a property, replacing any earlier value of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PropertiesFrozen`] once the run is terminal.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.frozen {
            return Err(PipelineError::PropertiesFrozen(name));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Applies every pair of an extractor update.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PropertiesFrozen`] once the run is terminal;
    /// nothing is written in that case.
    pub fn merge(&mut self, update: PropertyUpdate) -> Result<(), PipelineError> {
        if self.frozen {
            let name = update.first().map(|(k, _)| k.clone()).unwrap_or_default();
            return Err(PipelineError::PropertiesFrozen(name));
        }
        for (name, value) in update {
            tracing::debug!(property = %name, value = %value, "Property set");
            self.values.insert(name, value);
        }
        Ok(())
    }

    /// Reads a property.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] if it was never written.
    pub fn get(&self, name: &str) -> Result<&PropertyValue, PipelineError> {
        self.values
            .get(name)
            .ok_or_else(|| PipelineError::MissingProperty(name.to_string()))
    }

    /// Reads a text property.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] if unset and
    /// [`PipelineError::PropertyType`] if it holds a record.
    pub fn get_text(&self, name: &str) -> Result<&str, PipelineError> {
        self.get(name)?
            .as_text()
            .ok_or_else(|| PipelineError::PropertyType {
                name: name.to_string(),
                expected: "text",
            })
    }

    /// Reads a record property.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] if unset and
    /// [`PipelineError::PropertyType`] if it holds text.
    pub fn get_record(&self, name: &str) -> Result<&BTreeMap<String, String>, PipelineError> {
        self.get(name)?
            .as_record()
            .ok_or_else(|| PipelineError::PropertyType {
                name: name.to_string(),
                expected: "record",
            })
    }

    /// Returns true if the property has been written
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Makes the store read-only
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns true once frozen
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Deep copy of the current values, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Expands `${name}` references against text properties.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] for the first reference
    /// that is not set; unlike shell expansion nothing is left unexpanded.
    pub fn interpolate(&self, template: &str) -> Result<String, PipelineError> {
        static PROPERTY_PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern compiles")
        });

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PROPERTY_PATTERN.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            out.push_str(self.get_text(name.as_str())?);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_unset_property_fails() {
        let store = PropertyStore::new();
        assert_eq!(
            store.get("majmin").unwrap_err(),
            PipelineError::MissingProperty("majmin".into())
        );
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = PropertyStore::new();
        store.set("version", "1.2.3").unwrap();
        store.set("version", "1.2.4").unwrap();
        assert_eq!(store.get_text("version").unwrap(), "1.2.4");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_frozen_store_rejects_writes() {
        let mut store = PropertyStore::new();
        store.set("a", "1").unwrap();
        store.freeze();
        assert!(store.is_frozen());
        assert!(matches!(
            store.set("b", "2"),
            Err(PipelineError::PropertiesFrozen(_))
        ));
        assert!(store.merge(vec![("a".into(), "3".into())]).is_err());
        assert_eq!(store.get_text("a").unwrap(), "1");
    }

    #[test]
    fn test_record_and_text_accessors() {
        let mut store = PropertyStore::new();
        let record = BTreeMap::from([("commitname".to_string(), "Jeff".to_string())]);
        store.set("commit", PropertyValue::Record(record)).unwrap();
        store.set("branch", "master").unwrap();

        assert_eq!(store.get_record("commit").unwrap()["commitname"], "Jeff");
        assert!(matches!(
            store.get_text("commit"),
            Err(PipelineError::PropertyType { .. })
        ));
        assert!(store.get_record("branch").is_err());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = PropertyStore::new();
        store.set("shortcommit", "abcdef1234").unwrap();
        let snapshot = store.snapshot();
        store.set("shortcommit", "0000000000").unwrap();
        assert_eq!(snapshot["shortcommit"], PropertyValue::from("abcdef1234"));
    }

    #[test]
    fn test_interpolate() {
        let mut store = PropertyStore::new();
        store.set("flags", "ARCH=x86_64").unwrap();
        assert_eq!(
            store.interpolate("make ${flags} cleanall").unwrap(),
            "make ARCH=x86_64 cleanall"
        );
        assert_eq!(store.interpolate("no refs").unwrap(), "no refs");
    }

    #[test]
    fn test_interpolate_missing_property() {
        let store = PropertyStore::new();
        assert_eq!(
            store.interpolate("make ${flags} debug").unwrap_err(),
            PipelineError::MissingProperty("flags".into())
        );
    }
}
