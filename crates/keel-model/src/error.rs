//! Error types for API calls, CRUD operations and registry lookups

use smol_str::SmolStr;

/// Why a single API call failed
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// The request never got an answer
    #[error("transport failed: {0}")]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// The request could not be built
    #[error("{0}")]
    Encode(
        #[from]
        #[diagnostic_source]
        EncodeError,
    ),

    /// The answer did not decode into the response type
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// The API server answered with a non-success status
    #[error("API server returned {0}")]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),
}

impl ClientError {
    /// HTTP status of the failed call, if the server answered at all
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Http(err) => Some(err.status),
            _ => None,
        }
    }

    /// Whether the server refused the call because the object already exists
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(http::StatusCode::CONFLICT)
    }

    /// Whether the server reported the addressed object as absent
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(http::StatusCode::NOT_FOUND)
    }
}

/// Failures below the HTTP layer
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// The API server could not be reached
    #[error("cannot reach API server: {0}")]
    Connect(String),

    /// URI, header or base address rejected
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Anything else the client reported
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<http::Error> for TransportError {
    fn from(err: http::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Request building errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EncodeError {
    /// A query value could not be form-encoded
    #[error("cannot encode query: {0}")]
    Query(
        #[from]
        #[source]
        serde_html_form::ser::Error,
    ),
    /// The body could not be serialized
    #[error("cannot encode body: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
}

/// Response decoding errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecodeError {
    /// The body is not the expected JSON shape
    #[error("cannot decode body: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
    /// Body was not valid UTF-8 text
    #[error("Response body is not UTF-8: {0}")]
    Utf8(
        #[from]
        #[source]
        std::string::FromUtf8Error,
    ),
}

/// Non-2xx answer, with the body the server sent
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// Status the server answered with
    pub status: http::StatusCode,
    /// Raw body, usually a `Status` document
    pub body: Option<Vec<u8>>,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.body.as_deref().map(std::str::from_utf8) {
            Some(Ok(text)) if !text.is_empty() => write!(f, "{}: {}", self.status, text),
            _ => write!(f, "{}", self.status),
        }
    }
}

/// Result of one API call
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors raised by the synthesized create/read/update/delete surface
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CrudError {
    /// The underlying call failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    /// Explicit namespace argument disagrees with the object's own metadata
    #[error("namespace argument {explicit:?} contradicts metadata namespace {metadata:?}")]
    #[diagnostic(
        code(keel::crud::namespace_mismatch),
        help("drop the namespace argument or make it match metadata.namespace")
    )]
    NamespaceMismatch {
        /// Namespace passed by the caller
        explicit: String,
        /// Namespace carried by the object
        metadata: String,
    },

    /// A namespaced operation was attempted without any namespace
    #[error("{kind} is namespaced but no namespace was given")]
    #[diagnostic(
        code(keel::crud::missing_namespace),
        help("set metadata.namespace or pass a namespace explicitly")
    )]
    MissingNamespace {
        /// Kind of the object
        kind: &'static str,
    },

    /// The object carries no name to address it by
    #[error("{kind} has no metadata.name")]
    #[diagnostic(code(keel::crud::missing_name))]
    MissingName {
        /// Kind of the object
        kind: &'static str,
    },

    /// The schema exposes no operation for the requested role
    #[error("{kind} has no {role} operation")]
    #[diagnostic(code(keel::crud::unsupported))]
    Unsupported {
        /// Kind of the object
        kind: &'static str,
        /// Role that was requested
        role: &'static str,
    },

    /// Response did not decode into the object's type
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// A `modify` callback failed; no update was sent
    #[error("modification aborted: {0}")]
    #[diagnostic(code(keel::crud::aborted))]
    Aborted(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the deprecation & default-release registry
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RegistryError {
    /// Release label is not present in the registry
    #[error("unknown release {0}")]
    #[diagnostic(code(keel::registry::unknown_release))]
    UnknownRelease(SmolStr),

    /// Version is not part of the release
    #[error("release {release} has no version {version}")]
    #[diagnostic(code(keel::registry::unknown_version))]
    UnknownVersion {
        /// Release label
        release: SmolStr,
        /// Requested version
        version: SmolStr,
    },

    /// No release was selected and the registry carries no default
    #[error("no release selected and no default release recorded")]
    #[diagnostic(code(keel::registry::no_default))]
    NoDefaultRelease,

    /// Alias chain loops back on itself
    #[error("deprecation chain for {0} is cyclic")]
    #[diagnostic(code(keel::registry::alias_cycle))]
    AliasCycle(SmolStr),

    /// Registry file could not be read or parsed
    #[error("failed to load registry from {path}: {message}")]
    #[diagnostic(code(keel::registry::load))]
    Load {
        /// File that failed
        path: String,
        /// Underlying failure
        message: String,
    },

    /// A user-defined document type lacks a required structural marker
    #[error("{type_name} is not a valid document type: {reason}")]
    #[diagnostic(
        code(keel::registry::malformed_document),
        help("document types need a non-empty KIND and an API_VERSION of the form `group/vN` or `vN`")
    )]
    MalformedDocument {
        /// Rust type name of the offending type
        type_name: &'static str,
        /// Which marker is missing or malformed
        reason: String,
    },
}
