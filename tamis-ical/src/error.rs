use thiserror::Error;

/// Failures raised while evaluating a filter against a calendar object.
///
/// Both variants are fatal to the current request; the protocol layer
/// translates them into the matching status codes.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}
