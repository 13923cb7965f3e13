use std::{io, str::Utf8Error};

use quick_xml::events::attributes::AttrError;

use crate::data::osm::ElementKind;

/// Boxed error produced by an [`HttpTransport`](crate::client::transport::HttpTransport).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server rejected the query (HTTP 400). Never retried.
    #[error("bad query ({} message(s)): {}", .messages.len(), .messages.join(" | "))]
    BadQuery {
        query: String,
        messages: Vec<String>,
    },

    #[error("too many requests to {endpoint}, slow down")]
    TooManyRequests { endpoint: String },

    #[error("gateway timeout from {endpoint}")]
    GatewayTimeout { endpoint: String },

    #[error("unknown HTTP status code {code}{}", .endpoint.as_deref().map(|e| format!(" from {e}")).unwrap_or_default())]
    UnknownHttpStatus { code: u16, endpoint: Option<String> },

    #[error("unknown content type {0:?}")]
    UnknownContentType(String),

    #[error("element data has wrong type: expected {expected}, got {provided:?}")]
    ElementKindMismatch {
        expected: ElementKind,
        provided: String,
    },

    #[error("tag without name/key")]
    MissingTagKey,

    #[error("{element} is missing required attribute {attribute:?}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("invalid number in {field:?}: {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("data incomplete: {0}")]
    DataIncomplete(String),

    #[error("cannot compute bounds of a result without nodes")]
    EmptyBounds,

    #[error("network error talking to {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    #[error("query cancelled")]
    Cancelled,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {message}")]
    Xml { message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn incomplete(message: impl Into<String>) -> Self {
        Error::DataIncomplete(message.into())
    }

    pub(crate) fn invalid_number(field: &str, value: &str) -> Self {
        Error::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error::Xml {
            message: value.to_string()
        }
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::Xml {
            message: value.to_string()
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::Xml {
            message: value.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
