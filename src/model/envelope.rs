//! Response envelopes the service answers with.
//!
//! The front-end only ever looks at the JSON body: success and failure both arrive as a normal response, and a
//! failure is recognised by its `error` field. Each envelope still knows which HTTP status it should be sent with;
//! for nearly every failure that is `200 OK`.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::token::TokenGrant;
use crate::error::Error;

pub const CONFIGURATION_ERROR: &str = "Configuration Error: Missing Env Vars.";
pub const AUTH_FAIL: &str = "Auth Fail";
pub const SPOTIFY_API_ERROR: &str = "Spotify API Error";
pub const FUNCTION_CRASH: &str = "Function Crash";
pub const MISSING_PARAMETERS: &str = "Missing parameters";
pub const TOKEN_EXCHANGE_FAILED: &str = "Token exchange failed";

/// The body of a `/now-playing` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NowPlaying {
    /// Spotify's currently playing object, exactly as it was received.
    Playing(Value),
    /// Nothing is playing on any device; serializes as `{"is_playing":false}`.
    Idle { is_playing: bool },
    Failed(Failure),
}

/// The body of an `/exchange-token` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TokenExchange {
    Granted(TokenGrant),
    Failed(Failure),
}

/// An error marker: `{"error": ..., "status"?: ..., "details"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(skip)]
    http_status: StatusCode,
}

impl NowPlaying {
    pub fn idle() -> Self {
        NowPlaying::Idle { is_playing: false }
    }

    /// The HTTP status this envelope is sent with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            NowPlaying::Failed(failure) => failure.http_status,
            _ => StatusCode::OK,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            NowPlaying::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Error> for NowPlaying {
    fn from(err: Error) -> Self {
        let failure = match err {
            Error::MissingCredential(_) => {
                Failure::new(CONFIGURATION_ERROR).sent_with(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::AuthFailure { details, .. } => Failure::new(AUTH_FAIL).with_details(details),
            Error::UnhandledSpotifyError { status, details } => Failure::new(SPOTIFY_API_ERROR)
                .with_status(status)
                .with_details(Value::String(details)),
            other => Failure::new(FUNCTION_CRASH).with_details(Value::String(other.to_string())),
        };

        NowPlaying::Failed(failure)
    }
}

impl TokenExchange {
    pub fn http_status(&self) -> StatusCode {
        match self {
            TokenExchange::Granted(_) => StatusCode::OK,
            TokenExchange::Failed(failure) => failure.http_status,
        }
    }
}

impl From<Result<TokenGrant, Error>> for TokenExchange {
    fn from(result: Result<TokenGrant, Error>) -> Self {
        let err = match result {
            Ok(grant) => return TokenExchange::Granted(grant),
            Err(err) => err,
        };

        let failure = match err {
            Error::MissingParameters => Failure::new(MISSING_PARAMETERS).sent_with(StatusCode::BAD_REQUEST),
            Error::AuthFailure { status, details } => Failure::new(TOKEN_EXCHANGE_FAILED)
                .with_details(details)
                .sent_with(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)),
            other => Failure::new(TOKEN_EXCHANGE_FAILED)
                .with_details(Value::String(other.to_string()))
                .sent_with(StatusCode::INTERNAL_SERVER_ERROR),
        };

        TokenExchange::Failed(failure)
    }
}

impl Failure {
    pub fn new<S>(error: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            error: error.into(),
            status: None,
            details: None,
            http_status: StatusCode::OK,
        }
    }

    pub fn with_status(self, status: u16) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    pub fn with_details(self, details: Value) -> Self {
        Self {
            details: Some(details),
            ..self
        }
    }

    pub fn sent_with(self, http_status: StatusCode) -> Self {
        Self { http_status, ..self }
    }

    pub fn http_status(&self) -> StatusCode {
        self.http_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn idle_shape() {
        assert_eq!(serde_json::to_value(NowPlaying::idle()).unwrap(), json!({ "is_playing": false }));
        assert_eq!(NowPlaying::idle().http_status(), StatusCode::OK);
    }

    #[test]
    fn playing_is_passed_through() {
        let payload = json!({ "is_playing": true, "progress_ms": 1000, "item": { "name": "Song" } });
        let envelope = NowPlaying::Playing(payload.clone());

        assert_eq!(serde_json::to_value(&envelope).unwrap(), payload);
    }

    #[test]
    fn configuration_error_is_the_only_non_ok_poll_failure() {
        let envelope = NowPlaying::from(Error::MissingCredential("SPOTIFY_REFRESH_TOKEN"));
        assert_eq!(envelope.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({ "error": "Configuration Error: Missing Env Vars." })
        );

        let envelope = NowPlaying::from(Error::UnhandledSpotifyError {
            status: 502,
            details: "Bad Gateway".to_owned(),
        });
        assert_eq!(envelope.http_status(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({ "error": "Spotify API Error", "status": 502, "details": "Bad Gateway" })
        );
    }

    #[test]
    fn auth_failure_carries_details() {
        let details = json!({ "error": "invalid_grant", "error_description": "Invalid refresh token" });
        let envelope = NowPlaying::from(Error::AuthFailure {
            status: 400,
            details: details.clone(),
        });

        assert_eq!(envelope.http_status(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({ "error": "Auth Fail", "details": details })
        );
    }

    #[test]
    fn malformed_body_is_a_crash() {
        let envelope = NowPlaying::from(Error::MalformedResponse("expected value".to_owned()));
        let failure = envelope.failure().unwrap();

        assert_eq!(failure.error, FUNCTION_CRASH);
        assert_eq!(envelope.http_status(), StatusCode::OK);
    }

    #[test]
    fn exchange_failures_keep_upstream_status() {
        let exchange = TokenExchange::from(Err(Error::AuthFailure {
            status: 400,
            details: json!({ "error": "invalid_grant" }),
        }));

        assert_eq!(exchange.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(&exchange).unwrap(),
            json!({ "error": "Token exchange failed", "details": { "error": "invalid_grant" } })
        );

        let exchange = TokenExchange::from(Err(Error::MissingParameters));
        assert_eq!(exchange.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(serde_json::to_value(&exchange).unwrap(), json!({ "error": "Missing parameters" }));
    }

    #[test]
    fn granted_shape() {
        let exchange = TokenExchange::from(Ok(TokenGrant {
            access_token: "access".to_owned(),
            refresh_token: "refresh".to_owned(),
            scope: None,
            expires_in: Some(3600),
            token_type: Some("Bearer".to_owned()),
        }));

        assert_eq!(exchange.http_status(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&exchange).unwrap(),
            json!({ "access_token": "access", "refresh_token": "refresh", "expires_in": 3600, "token_type": "Bearer" })
        );
    }
}
