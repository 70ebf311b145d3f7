use thiserror::Error;

use crate::restore::create::Phase;

/// Failures of the `restore create` lifecycle. All of them end the
/// invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("you must specify only one argument, the backup's name")]
    ArgumentCount { given: usize },

    #[error("invalid output format {format:?} - valid values are 'table', 'json', and 'yaml'")]
    UnsupportedOutputFormat { format: String },

    #[error("command lifecycle out of order: expected phase {expected:?}, found {actual:?}")]
    OutOfOrder { expected: Phase, actual: Phase },

    #[error("failed to render restore as JSON: {0}")]
    RenderJson(#[from] serde_json::Error),

    #[error("failed to render restore as YAML: {0}")]
    RenderYaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Returned by the API server or transport; the message is passed
    /// through untouched.
    #[error(transparent)]
    Submission(anyhow::Error),
}
