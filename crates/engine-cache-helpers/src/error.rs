use thiserror::Error;

/// Error raised by a helper or while resolving a placeholder token.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The helper itself reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The helper was called with arguments it cannot handle.
    #[error("helper \"{helper}\" received an invalid argument: {message}")]
    InvalidArgument { helper: String, message: String },

    /// A token was resolved that has no pending invocation in the stash.
    #[error("no pending async helper call for token \"{0}\"")]
    UnknownToken(String),
}

impl HelperError {
    pub fn failed(message: impl Into<String>) -> Self {
        HelperError::Failed(message.into())
    }

    pub fn invalid_argument(helper: impl Into<String>, message: impl Into<String>) -> Self {
        HelperError::InvalidArgument {
            helper: helper.into(),
            message: message.into(),
        }
    }
}
