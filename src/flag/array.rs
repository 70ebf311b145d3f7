use std::fmt;

use super::{FlagError, DEFAULT_ENTRY_DELIMITER};

/// An ordered list of strings given as one delimited flag value.
///
/// Order and duplicates are preserved. Setting the flag again replaces the
/// previous contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringArray {
    values: Vec<String>,
    delimiter: String,
}

impl Default for StringArray {
    fn default() -> Self {
        Self::new()
    }
}

impl StringArray {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            delimiter: DEFAULT_ENTRY_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: &str) -> Self {
        debug_assert!(!delimiter.is_empty(), "entry delimiter must not be empty");
        self.delimiter = delimiter.to_string();
        self
    }

    pub fn set(&mut self, raw: &str) -> Result<(), FlagError> {
        self.values = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split(self.delimiter.as_str())
                .map(str::to_string)
                .collect()
        };
        Ok(())
    }

    /// Parses `raw` into a new value that keeps this value's delimiter.
    pub fn parse(&self, raw: &str) -> Result<Self, FlagError> {
        let mut parsed = Self {
            values: Vec::new(),
            delimiter: self.delimiter.clone(),
        };
        parsed.set(raw)?;
        Ok(parsed)
    }

    /// Clap value parser producing values configured like `self`.
    pub fn value_parser(
        &self,
    ) -> impl Fn(&str) -> Result<StringArray, FlagError> + Clone + Send + Sync + 'static {
        let template = self.clone();
        move |raw: &str| template.parse(raw)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<String> {
        self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for StringArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(&self.delimiter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_empty_sequence() {
        let parsed = StringArray::new().parse("").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.to_string(), "");
    }

    #[test]
    fn test_duplicates_and_order_preserved() {
        let parsed = StringArray::new().parse("x,y,x").unwrap();
        assert_eq!(parsed.values(), ["x", "y", "x"]);
    }

    #[test]
    fn test_custom_delimiter() {
        let parsed = StringArray::new()
            .with_delimiter(";")
            .parse("a,b;c")
            .unwrap();
        assert_eq!(parsed.values(), ["a,b", "c"]);
        assert_eq!(parsed.to_string(), "a,b;c");
    }

    #[test]
    fn test_set_replaces_previous_values() {
        let mut array = StringArray::new();
        array.set("a,b").unwrap();
        array.set("c").unwrap();
        assert_eq!(array.into_inner(), vec!["c".to_string()]);
    }

    #[test]
    fn test_round_trip() {
        for input in ["", "ns1", "ns1,ns2", "a,,b", "x,y,x"] {
            let once = StringArray::new().parse(input).unwrap();
            let twice = StringArray::new().parse(&once.to_string()).unwrap();
            assert_eq!(once, twice, "input {input:?}");
        }
    }
}
