use log::{debug, error};
use serde::Deserialize;

use super::{build_authorization_header, extract_authentication_error, private::HttpClient, SpotifyClient};
use crate::{
    credentials::Credentials,
    error::{Error, Result},
    model::{
        error::{AuthenticationErrorKind, AuthenticationErrorResponse},
        token::AccessToken,
    },
};

#[derive(Deserialize)]
struct RefreshUserTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u32>,

    // these fields are in the response but nothing here needs them. keep them here for logging purposes
    #[allow(dead_code)]
    #[serde(default)]
    scope: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: Option<String>,
}

impl std::fmt::Debug for RefreshUserTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshUserTokenResponse")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl<C> SpotifyClient<C>
where
    C: HttpClient,
{
    /// Trade the long-lived refresh token for a fresh access token.
    ///
    /// The credentials are validated before anything is sent: an empty field is a
    /// [MissingCredential-error](Error::MissingCredential). A rejected request is an
    /// [AuthFailure](Error::AuthFailure) carrying Spotify's response body.
    pub async fn refresh_access_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        credentials.validate()?;

        debug!(
            "Attempting to refresh access token for client ID: {}",
            credentials.client_id()
        );

        let response = self
            .http_client
            .post_form(
                self.token_endpoint(),
                &build_authorization_header(credentials.client_id(), credentials.client_secret()),
                &build_refresh_token_request_form(credentials.refresh_token()),
            )
            .await?;

        let response = extract_authentication_error(response).map_err(log_refresh_token_error)?;
        let token_response: RefreshUserTokenResponse = response.json()?;
        debug!("Got token response for refreshing access token: {:?}", token_response);

        if token_response.access_token.is_empty() {
            return Err(Error::MalformedResponse(
                "token response did not contain an access token".to_owned(),
            ));
        }

        Ok(AccessToken::new(token_response.access_token, token_response.expires_in))
    }
}

fn build_refresh_token_request_form(refresh_token: &str) -> [(&str, &str); 2] {
    [("grant_type", "refresh_token"), ("refresh_token", refresh_token)]
}

fn log_refresh_token_error(err: Error) -> Error {
    if let Error::AuthFailure { details, .. } = &err {
        if let Some(AuthenticationErrorResponse {
            error: AuthenticationErrorKind::InvalidGrant,
            ..
        }) = AuthenticationErrorResponse::from_details(details)
        {
            error!("Spotify rejected the refresh token. It may have been revoked; run setup again to get a new one");
        }
    }

    err
}
