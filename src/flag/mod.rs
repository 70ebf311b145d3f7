//! Delimited-text flag values.
//!
//! Each value type parses a raw command line string into a typed value and
//! formats it back into the canonical delimited form, so that
//! `parse(to_string(parse(s))) == parse(s)` holds for every accepted input.

mod array;
mod map;
mod selector;

pub use array::StringArray;
pub use map::StringMap;
pub use selector::{format_selector, parse_selector, LabelSelectorFlag};

use thiserror::Error;

pub const DEFAULT_ENTRY_DELIMITER: &str = ",";
pub const DEFAULT_KEY_VALUE_DELIMITER: &str = "=";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("error parsing {entry:?}: expected an entry of the form key{delimiter}value")]
    MalformedEntry { entry: String, delimiter: String },

    #[error("invalid label selector {selector:?}: {reason}")]
    MalformedSelector { selector: String, reason: String },
}
