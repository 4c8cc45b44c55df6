//! The authorization code flow, used once to obtain the refresh token the service runs on.
//!
//! [Spotify documentation on the authorization code flow.](https://developer.spotify.com/documentation/general/guides/authorization/code-flow/).
//!
//! # Usage
//!
//! ```no_run
//! # use neon_grid::client::{CallbackParams, SpotifyClient};
//! # async fn foo(params: CallbackParams) -> neon_grid::Result<()> {
//! let client = SpotifyClient::new();
//!
//! // the redirect URI has to be one of the redirect URIs registered for the application
//! let request = client
//!     .authorization_request("application client ID", "http://localhost:8888/callback")
//!     .show_dialog(true)
//!     .build();
//!
//! // the user should now be directed to this URL in some manner
//! let authorize_url = request.authorize_url()?;
//!
//! // once they approve, they land on the redirect URI with `code` and `state` in the query
//! let code = request.verify_callback(&params)?;
//!
//! let grant = client
//!     .exchange_authorization_code(
//!         "application client ID",
//!         "application client secret",
//!         code,
//!         request.redirect_uri(),
//!     )
//!     .await?;
//!
//! println!("{}", grant.refresh_token);
//! # Ok(())
//! # }
//! ```

use log::{debug, warn};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Url;
use serde::Deserialize;

use super::{
    build_authorization_header, extract_authentication_error, private::HttpClient, SpotifyClient, RANDOM_STATE_LENGTH,
};
use crate::{
    error::{Error, Result},
    model::token::TokenGrant,
    scope::{ToScopesString, DEFAULT_SCOPES},
};

/// A configured authorization request with its own random state.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    authorize_endpoint: String,
    client_id: String,
    redirect_uri: String,
    state: String,
    scopes: String,
    show_dialog: bool,
}

/// Builder for [AuthorizationRequest].
#[derive(Debug, Clone)]
pub struct AuthorizationRequestBuilder {
    authorize_endpoint: String,
    client_id: String,
    redirect_uri: String,
    scopes: String,
    show_dialog: bool,
}

/// The query parameters Spotify redirects the user back with.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<C> SpotifyClient<C>
where
    C: HttpClient,
{
    /// Begin building an authorization request for the given application and redirect URI.
    pub fn authorization_request<I, R>(&self, client_id: I, redirect_uri: R) -> AuthorizationRequestBuilder
    where
        I: Into<String>,
        R: Into<String>,
    {
        AuthorizationRequestBuilder {
            authorize_endpoint: self.authorize_endpoint().to_owned(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.to_scopes_string(),
            show_dialog: false,
        }
    }

    /// Exchange a one-time authorization code for an access token and a refresh token.
    ///
    /// Empty inputs are a [MissingParameters-error](Error::MissingParameters) and nothing is sent. A rejected request
    /// is an [AuthFailure](Error::AuthFailure) carrying Spotify's response body and status.
    pub async fn exchange_authorization_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        if [client_id, client_secret, code].iter().any(|value| value.trim().is_empty()) {
            return Err(Error::MissingParameters);
        }

        debug!(
            "Requesting access and refresh tokens for authorization code flow with client ID: {}",
            client_id
        );

        let response = self
            .http_client
            .post_form(
                self.token_endpoint(),
                &build_authorization_header(client_id, client_secret),
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await?;

        let response = extract_authentication_error(response)?;
        let grant: TokenGrant = response.json()?;
        debug!("Got token response for authorization code flow: {:?}", grant);

        Ok(grant)
    }
}

impl AuthorizationRequestBuilder {
    /// Specify the [OAuth authorization scopes](crate::scope::Scope) that the user is asked to grant for the
    /// application. Defaults to the two playback read scopes.
    pub fn scopes<T>(self, scopes: T) -> Self
    where
        T: ToScopesString,
    {
        Self {
            scopes: scopes.to_scopes_string(),
            ..self
        }
    }

    /// Set whether or not to force the user to approve the application again, if they've already done so.
    pub fn show_dialog(self, show_dialog: bool) -> Self {
        Self { show_dialog, ..self }
    }

    /// Finalize the builder with a freshly generated state.
    pub fn build(self) -> AuthorizationRequest {
        let state = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_STATE_LENGTH)
            .map(char::from)
            .collect();

        AuthorizationRequest {
            authorize_endpoint: self.authorize_endpoint,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            state,
            scopes: self.scopes,
            show_dialog: self.show_dialog,
        }
    }
}

impl AuthorizationRequest {
    /// Returns an authorization URL the user should be directed to in some manner.
    pub fn authorize_url(&self) -> Result<String> {
        let mut query_params = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("state", self.state.as_str()),
            ("show_dialog", if self.show_dialog { "true" } else { "false" }),
        ];

        if !self.scopes.is_empty() {
            query_params.push(("scope", self.scopes.as_str()));
        }

        let authorize_url = Url::parse_with_params(&self.authorize_endpoint, &query_params)
            .map_err(|err| Error::InvalidUrl(format!("{}: {}", self.authorize_endpoint, err)))?;

        Ok(authorize_url.into())
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Check the parameters the user was redirected back with and return the authorization code.
    ///
    /// A denial is reported first, then a state that doesn't match this request's state, then a missing code.
    pub fn verify_callback<'a>(&self, params: &'a CallbackParams) -> Result<&'a str> {
        debug!("Verifying authorization callback: {:?}", params);

        if let Some(error) = &params.error {
            return Err(Error::AuthorizationDenied(error.clone()));
        }

        if params.state.as_deref() != Some(self.state.as_str()) {
            warn!("Authorization callback state does not match the request state");
            return Err(Error::AuthorizationCodeStateMismatch);
        }

        match params.code.as_deref() {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(Error::MissingAuthorizationCode),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        client::{private::mock::MockHttpClient, SpotifyClientBuilder},
        scope::Scope,
    };

    fn client(http_client: &MockHttpClient) -> SpotifyClient<MockHttpClient> {
        SpotifyClientBuilder::new().http_client(http_client.clone()).build()
    }

    fn callback(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_owned),
            state: state.map(str::to_owned),
            error: error.map(str::to_owned),
        }
    }

    #[test]
    fn authorize_url_contains_everything() {
        let request = client(&MockHttpClient::new())
            .authorization_request("my-client", "http://localhost:8888/callback")
            .build();

        let url = Url::parse(&request.authorize_url().unwrap()).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(url.path(), "/authorize");
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("my-client"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:8888/callback"));
        assert_eq!(get("scope"), Some("user-read-playback-state user-read-currently-playing"));
        assert_eq!(get("show_dialog"), Some("false"));
        assert_eq!(get("state"), Some(request.state()));
    }

    #[test]
    fn state_is_random_alphanumeric() {
        let builder = client(&MockHttpClient::new()).authorization_request("id", "http://localhost/callback");
        let first = builder.clone().build();
        let second = builder.build();

        assert_eq!(first.state().len(), RANDOM_STATE_LENGTH);
        assert!(first.state().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first.state(), second.state());
    }

    #[test]
    fn custom_scopes() {
        let request = client(&MockHttpClient::new())
            .authorization_request("id", "http://localhost/callback")
            .scopes([Scope::UserReadCurrentlyPlaying])
            .show_dialog(true)
            .build();

        let url = request.authorize_url().unwrap();
        assert!(url.contains("scope=user-read-currently-playing"));
        assert!(url.contains("show_dialog=true"));
    }

    #[test]
    fn callback_verification_order() {
        let request = client(&MockHttpClient::new())
            .authorization_request("id", "http://localhost/callback")
            .build();
        let state = request.state().to_owned();

        assert!(matches!(
            request.verify_callback(&callback(None, Some(&state), Some("access_denied"))),
            Err(Error::AuthorizationDenied(reason)) if reason == "access_denied"
        ));
        assert!(matches!(
            request.verify_callback(&callback(Some("code"), Some("forged"), None)),
            Err(Error::AuthorizationCodeStateMismatch)
        ));
        assert!(matches!(
            request.verify_callback(&callback(Some("code"), None, None)),
            Err(Error::AuthorizationCodeStateMismatch)
        ));
        assert!(matches!(
            request.verify_callback(&callback(None, Some(&state), None)),
            Err(Error::MissingAuthorizationCode)
        ));
        assert_eq!(
            request.verify_callback(&callback(Some("code"), Some(&state), None)).unwrap(),
            "code"
        );
    }

    #[tokio::test]
    async fn exchange_posts_the_code() {
        let http_client = MockHttpClient::new();
        http_client.respond(
            200,
            r#"{"access_token":"access","token_type":"Bearer","scope":"user-read-playback-state","expires_in":3600,"refresh_token":"refresh"}"#,
        );

        let grant = client(&http_client)
            .exchange_authorization_code("id", "secret", "the-code", "http://localhost:8888/callback")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "access");
        assert_eq!(grant.refresh_token, "refresh");
        assert_eq!(grant.expires_in, Some(3600));

        let requests = http_client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization, "Basic aWQ6c2VjcmV0");
        assert_eq!(requests[0].form_value("grant_type"), Some("authorization_code"));
        assert_eq!(requests[0].form_value("code"), Some("the-code"));
        assert_eq!(
            requests[0].form_value("redirect_uri"),
            Some("http://localhost:8888/callback")
        );
    }

    #[tokio::test]
    async fn exchange_without_code_sends_nothing() {
        let http_client = MockHttpClient::new();
        let result = client(&http_client)
            .exchange_authorization_code("id", "secret", "", "http://localhost/callback")
            .await;

        assert!(matches!(result, Err(Error::MissingParameters)));
        assert!(http_client.requests().is_empty());
    }

    #[tokio::test]
    async fn exchange_rejection_keeps_status_and_body() {
        let http_client = MockHttpClient::new();
        http_client.respond(400, r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#);

        let result = client(&http_client)
            .exchange_authorization_code("id", "secret", "stale", "http://localhost/callback")
            .await;

        match result {
            Err(Error::AuthFailure { status, details }) => {
                assert_eq!(status, 400);
                assert_eq!(details["error"], json!("invalid_grant"));
            }
            other => panic!("expected an auth failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mismatched_state_never_reaches_the_token_endpoint() {
        let http_client = MockHttpClient::new();
        let client = client(&http_client);
        let request = client.authorization_request("id", "http://localhost/callback").build();

        let params = callback(Some("code"), Some("not-the-state"), None);
        let result = match request.verify_callback(&params) {
            Ok(code) => {
                client
                    .exchange_authorization_code("id", "secret", code, request.redirect_uri())
                    .await
            }
            Err(err) => Err(err),
        };

        assert!(matches!(result, Err(Error::AuthorizationCodeStateMismatch)));
        assert!(http_client.requests().is_empty());
    }
}
