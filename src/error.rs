//! Error taxonomy

use crate::hosh::Etype;
use std::io;
use thiserror::Error;

/// Error type user functions may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum LdictError {
    #[error("invalid field name: {0:?}")]
    WrongKeyType(String),

    #[error("field not found: {0}")]
    KeyNotFound(String),

    #[error("missing field '{field}' required by function (available: {available:?})")]
    Dependence { field: String, available: Vec<String> },

    #[error("function '{0}' has no inputs and no parameters")]
    NoInput(String),

    #[error("function '{function}' has a {etype} identifier, expected ordered")]
    FunctionEType { function: String, etype: Etype },

    #[error("field '{0}' already holds a different value")]
    Overwrite(String),

    #[error("bad output from function '{function}': {reason}")]
    BadOutput { function: String, reason: String },

    #[error("function '{0}' declares no outputs")]
    NoReturn(String),

    #[error("function '{0}' returned more than one mapping")]
    MultipleDicts(String),

    #[error("function '{function}' did not return declared field '{field}'")]
    MissingField { field: String, function: String },

    #[error("inconsistent progression: {0}")]
    InconsistentLange(String),

    #[error("parameter '{0}' must be sampled but no sampler was provided")]
    UndefinedSeed(String),

    #[error("container is read-only")]
    ReadOnly,

    #[error("serialized container has 'id' but no 'ids'")]
    MissingIds,

    #[error("invalid identifier: {0}")]
    WrongId(String),

    #[error("inconsistent identifiers: {0}")]
    InconsistentIds(String),

    #[error("parameter '{0}' conflicts with a field of the same name")]
    ConflictingParameter(String),

    #[error("function '{function}' has no parameter '{parameter}'")]
    UnknownParameter { function: String, parameter: String },

    #[error("argument '{name}' is not {expected}")]
    WrongValueType { name: String, expected: String },

    #[error("function '{function}' failed")]
    Function {
        function: String,
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Envelope(String),

    #[error("cache backend error: {0}")]
    Cache(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LdictError>;
