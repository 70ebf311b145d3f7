use std::collections::BTreeMap;
use std::fmt;

use super::{FlagError, DEFAULT_ENTRY_DELIMITER, DEFAULT_KEY_VALUE_DELIMITER};

/// A key/value mapping given as one delimited flag value, e.g. `a=1,b=2`.
///
/// Each entry is split on the first key/value delimiter. Later entries win
/// over earlier ones with the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMap {
    data: BTreeMap<String, String>,
    entry_delimiter: String,
    key_value_delimiter: String,
}

impl Default for StringMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StringMap {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            entry_delimiter: DEFAULT_ENTRY_DELIMITER.to_string(),
            key_value_delimiter: DEFAULT_KEY_VALUE_DELIMITER.to_string(),
        }
    }

    pub fn with_entry_delimiter(mut self, delimiter: &str) -> Self {
        debug_assert!(!delimiter.is_empty(), "entry delimiter must not be empty");
        self.entry_delimiter = delimiter.to_string();
        self
    }

    pub fn with_key_value_delimiter(mut self, delimiter: &str) -> Self {
        debug_assert!(
            !delimiter.is_empty(),
            "key/value delimiter must not be empty"
        );
        self.key_value_delimiter = delimiter.to_string();
        self
    }

    /// Replaces the contents with the entries in `raw`. On error the
    /// previous contents are kept.
    pub fn set(&mut self, raw: &str) -> Result<(), FlagError> {
        let mut data = BTreeMap::new();

        if !raw.is_empty() {
            let separator = self.key_value_delimiter.as_str();
            for entry in raw.split(self.entry_delimiter.as_str()) {
                let Some((key, value)) = entry.split_once(separator) else {
                    return Err(FlagError::MalformedEntry {
                        entry: entry.to_string(),
                        delimiter: self.key_value_delimiter.clone(),
                    });
                };
                data.insert(key.to_string(), value.to_string());
            }
        }

        self.data = data;
        Ok(())
    }

    /// Parses `raw` into a new value that keeps this value's delimiters.
    pub fn parse(&self, raw: &str) -> Result<Self, FlagError> {
        let mut parsed = Self {
            data: BTreeMap::new(),
            entry_delimiter: self.entry_delimiter.clone(),
            key_value_delimiter: self.key_value_delimiter.clone(),
        };
        parsed.set(raw)?;
        Ok(parsed)
    }

    /// Clap value parser producing values configured like `self`.
    pub fn value_parser(
        &self,
    ) -> impl Fn(&str) -> Result<StringMap, FlagError> + Clone + Send + Sync + 'static {
        let template = self.clone();
        move |raw: &str| template.parse(raw)
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for StringMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .data
            .iter()
            .map(|(k, v)| format!("{k}{}{v}", self.key_value_delimiter))
            .collect();
        f.write_str(&entries.join(&self.entry_delimiter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace_mappings() -> StringMap {
        StringMap::new()
            .with_entry_delimiter(",")
            .with_key_value_delimiter(":")
    }

    #[test]
    fn test_last_duplicate_wins() {
        let parsed = StringMap::new().parse("a=1,b=2,a=3").unwrap();
        assert_eq!(parsed.data().len(), 2);
        assert_eq!(parsed.data()["a"], "3");
        assert_eq!(parsed.data()["b"], "2");
    }

    #[test]
    fn test_custom_key_value_delimiter() {
        let parsed = namespace_mappings().parse("a:1,b:2").unwrap();
        assert_eq!(parsed.data()["a"], "1");
        assert_eq!(parsed.data()["b"], "2");
        assert_eq!(parsed.to_string(), "a:1,b:2");
    }

    #[test]
    fn test_splits_on_first_delimiter_only() {
        let parsed = StringMap::new().parse("expr=a=b").unwrap();
        assert_eq!(parsed.data()["expr"], "a=b");
    }

    #[test]
    fn test_entry_without_delimiter_is_malformed() {
        let err = StringMap::new().parse("a=1,oops").unwrap_err();
        assert_eq!(
            err,
            FlagError::MalformedEntry {
                entry: "oops".to_string(),
                delimiter: "=".to_string(),
            }
        );
    }

    #[test]
    fn test_default_delimiter_not_accepted_for_mappings() {
        let err = namespace_mappings().parse("src=dst").unwrap_err();
        assert!(matches!(err, FlagError::MalformedEntry { .. }));
    }

    #[test]
    fn test_failed_set_keeps_previous_data() {
        let mut map = StringMap::new();
        map.set("a=1").unwrap();
        assert!(map.set("b").is_err());
        assert_eq!(map.data()["a"], "1");
    }

    #[test]
    fn test_empty_input_is_empty_map() {
        let parsed = StringMap::new().parse("").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.to_string(), "");
    }

    #[test]
    fn test_round_trip() {
        for input in ["", "a=1", "b=2,a=1,b=3", "k=", "=v", "x=a=b"] {
            let once = StringMap::new().parse(input).unwrap();
            let twice = StringMap::new().parse(&once.to_string()).unwrap();
            assert_eq!(once, twice, "input {input:?}");
        }
    }
}
