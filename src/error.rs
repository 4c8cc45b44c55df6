use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Missing configuration value: {0}")]
    MissingCredential(&'static str),
    #[error("Missing parameters")]
    MissingParameters,

    #[error("The token endpoint rejected the request with status {status}: {details}")]
    AuthFailure { status: u16, details: Value },
    #[error("Unhandled API error {status}: {details}")]
    UnhandledSpotifyError { status: u16, details: String },
    #[error("Malformed response body: {0}")]
    MalformedResponse(String),
    #[error("The now playing service answered with status {0}")]
    BackendStatus(u16),

    #[error("The authorization callback did not contain a code")]
    MissingAuthorizationCode,
    #[error("The user denied the authorization request: {0}")]
    AuthorizationDenied(String),
    #[error("The given state does not match the original state")]
    AuthorizationCodeStateMismatch,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Setup was cancelled before Spotify redirected back")]
    SetupCancelled,

    #[error("Failed to read input: {0}")]
    Prompt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedResponse(err.to_string())
    }
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Prompt(err.to_string())
    }
}
