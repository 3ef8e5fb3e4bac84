use thiserror::Error;

/// Errors returned by the auth session and API client.
#[derive(Debug, Error)]
pub enum RedditApiError {
    #[error("fullname '{0}' is not a comment")]
    InvalidFullname(String),
    #[error("could not retrieve comment '{0}'")]
    NotFound(String),
    #[error("{field} is blank")]
    BlankInput { field: &'static str },
    #[error("API errors: {0}")]
    ApiRejected(String),
    #[error("could not post comment: response contained no result")]
    NoResult,
    #[error("access_token response did not contain a token")]
    EmptyToken,
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} returned non-success status {status}: {body}")]
    HttpStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
