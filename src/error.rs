use thiserror::Error;

use crate::auth::AuthError;
use crate::cast::CastError;
use crate::operation::Location;

/// Errors produced while turning user input into a request.
///
/// The display strings are stable: scripts match on them.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("parse {location}: {message}")]
    Parse {
        location: &'static str,
        message: String,
    },

    #[error("too few path parameters: got {got}, want {want}")]
    PathArity { got: usize, want: usize },

    #[error("missing required {location} parameter {name:?}")]
    MissingParameter { location: Location, name: String },

    #[error(
        "invalid value for {location} parameter {name:?} (allowed values: {})",
        .allowed.join(", ")
    )]
    InvalidEnumValue {
        location: Location,
        name: String,
        allowed: Vec<String>,
    },

    #[error("could not process {name}: {source}")]
    Cast {
        name: String,
        #[source]
        source: CastError,
    },

    #[error("could not process {key}: {segment:?} is not an object")]
    NestingConflict { key: String, segment: String },

    #[error("unsupported body format {0}")]
    UnsupportedFormat(String),

    #[error("invalid {name} header value")]
    InvalidHeader { name: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}
