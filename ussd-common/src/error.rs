//! Error types for the USSD router.

use thiserror::Error;

/// Result type alias using the router error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad fault classes used by the dispatcher to pick a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misconfiguration: bad menu tree, unknown adapter, missing template.
    Configuration,
    /// Malformed transport request or unknown session.
    Protocol,
    /// A handler misbehaved while serving a request.
    Handler,
}

/// Unified error type for the USSD router.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid settings or engine construction input
    #[error("invalid configuration: {0}")]
    Config(String),

    /// More than one top-level option declared with an empty code
    #[error("index screen is already set to `{existing}`, cannot also register `{rejected}`")]
    DuplicateIndexScreen { existing: String, rejected: String },

    /// Menu option declared without a name
    #[error("option name cannot be blank (code `{code}`)")]
    BlankOptionName { code: String },

    /// Adapter name not present in the registry
    #[error("protocol adapter not registered: `{0}`")]
    AdapterNotFound(String),

    /// Handler referenced a template that was never loaded
    #[error("template not found: `{0}`")]
    TemplateNotFound(String),

    /// Template failed to compile or render
    #[error("template `{name}` failed: {reason}")]
    Template { name: String, reason: String },

    /// Transport request could not be parsed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport request is missing a required field
    #[error("missing form field: `{0}`")]
    MissingField(String),

    /// Continuation fragment for a session that is not in the store
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// Required session attribute is absent
    #[error("{0}: not found")]
    AttributeNotFound(String),

    /// Invariant broken while serving a request
    #[error("internal error: {0}")]
    Internal(String),

    /// Wraps another error with the step that produced it
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with a description of what was being attempted.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::DuplicateIndexScreen { .. }
            | Self::BlankOptionName { .. }
            | Self::AdapterNotFound(_)
            | Self::TemplateNotFound(_)
            | Self::Template { .. } => ErrorKind::Configuration,
            Self::InvalidRequest(_) | Self::MissingField(_) | Self::SessionNotFound(_) => {
                ErrorKind::Protocol
            }
            Self::WithContext { source, .. } => source.kind(),
            Self::AttributeNotFound(_) | Self::Internal(_) => ErrorKind::Handler,
        }
    }

    /// Check if this is a protocol fault (answered with "session closed").
    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Check if this is a configuration fault.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// `.context(..)` for any result whose error converts into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
