//! The Spotify client: token endpoint calls and the currently playing endpoint.
//!
//! A [SpotifyClient] holds nothing but the endpoint URLs and an [HttpClient]; it keeps no tokens. Credentials are
//! passed in per call, and every access token it hands out is freshly requested.
//!
//! ```no_run
//! # use neon_grid::{client::SpotifyClient, Credentials};
//! # async fn foo() -> neon_grid::Result<()> {
//! let client = SpotifyClient::new();
//! let credentials = Credentials::new("client ID", "client secret", "refresh token");
//!
//! let access_token = client.refresh_access_token(&credentials).await?;
//! let playing = client.currently_playing(&access_token).await?;
//! println!("{:?}", playing);
//! # Ok(())
//! # }
//! ```

pub(crate) mod authorization_code;
pub(crate) mod now_playing;
pub(crate) mod private;
pub(crate) mod refresh;

pub use self::{
    authorization_code::{AuthorizationRequest, AuthorizationRequestBuilder, CallbackParams},
    now_playing::NowPlayingPoller,
    private::{HttpClient, RawResponse},
};

use std::sync::Arc;

use base64::Engine;
use const_format::concatcp;
use log::warn;

use crate::{
    error::{Error, Result},
    model::error::AuthenticationErrorResponse,
};

const RANDOM_STATE_LENGTH: usize = 16;

const API_BASE_URL: &str = "https://api.spotify.com/v1/";
const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com/";

const CURRENTLY_PLAYING_PATH: &str = "me/player/currently-playing";
const AUTHORIZE_PATH: &str = "authorize";
const API_TOKEN_PATH: &str = "api/token";

pub const API_CURRENTLY_PLAYING_ENDPOINT: &str = concatcp!(API_BASE_URL, CURRENTLY_PLAYING_PATH);
pub const ACCOUNTS_AUTHORIZE_ENDPOINT: &str = concatcp!(ACCOUNTS_BASE_URL, AUTHORIZE_PATH);
pub const ACCOUNTS_API_TOKEN_ENDPOINT: &str = concatcp!(ACCOUNTS_BASE_URL, API_TOKEN_PATH);

/// A stateless Spotify client. Cheap to clone; the endpoints are shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SpotifyClient<C = reqwest::Client>
where
    C: HttpClient,
{
    inner: Arc<SpotifyClientRef>,
    http_client: C,
}

#[derive(Debug)]
struct SpotifyClientRef {
    authorize_endpoint: String,
    token_endpoint: String,
    currently_playing_endpoint: String,
}

/// Builder for [SpotifyClient]. The base URLs default to Spotify's own and may be pointed elsewhere, e.g. at a
/// proxy.
#[derive(Debug, Clone)]
pub struct SpotifyClientBuilder<C = reqwest::Client>
where
    C: HttpClient,
{
    accounts_base_url: String,
    api_base_url: String,
    http_client: C,
}

impl SpotifyClient {
    /// A client talking to Spotify with a default `reqwest` client.
    pub fn new() -> Self {
        SpotifyClientBuilder::new().build()
    }
}

impl Default for SpotifyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SpotifyClient<C>
where
    C: HttpClient,
{
    pub fn authorize_endpoint(&self) -> &str {
        &self.inner.authorize_endpoint
    }

    pub fn token_endpoint(&self) -> &str {
        &self.inner.token_endpoint
    }

    pub fn currently_playing_endpoint(&self) -> &str {
        &self.inner.currently_playing_endpoint
    }
}

impl SpotifyClientBuilder {
    pub fn new() -> Self {
        Self {
            accounts_base_url: ACCOUNTS_BASE_URL.to_owned(),
            api_base_url: API_BASE_URL.to_owned(),
            http_client: reqwest::Client::new(),
        }
    }
}

impl Default for SpotifyClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SpotifyClientBuilder<C>
where
    C: HttpClient,
{
    /// Use a different HTTP client, such as a `reqwest::Client` with custom timeouts.
    pub fn http_client<D>(self, http_client: D) -> SpotifyClientBuilder<D>
    where
        D: HttpClient,
    {
        SpotifyClientBuilder {
            accounts_base_url: self.accounts_base_url,
            api_base_url: self.api_base_url,
            http_client,
        }
    }

    pub fn accounts_base_url<S>(self, accounts_base_url: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            accounts_base_url: accounts_base_url.into(),
            ..self
        }
    }

    pub fn api_base_url<S>(self, api_base_url: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            api_base_url: api_base_url.into(),
            ..self
        }
    }

    pub fn build(self) -> SpotifyClient<C> {
        SpotifyClient {
            inner: Arc::new(SpotifyClientRef {
                authorize_endpoint: join_url(&self.accounts_base_url, AUTHORIZE_PATH),
                token_endpoint: join_url(&self.accounts_base_url, API_TOKEN_PATH),
                currently_playing_endpoint: join_url(&self.api_base_url, CURRENTLY_PLAYING_PATH),
            }),
            http_client: self.http_client,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn build_authorization_header(client_id: &str, client_secret: &str) -> String {
    let auth = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(auth))
}

/// Takes a response for a token request and if it isn't successful, turns its body into an
/// [AuthFailure](Error::AuthFailure) carrying the body as-is. On success returns the given response without modifying
/// it.
fn extract_authentication_error(response: RawResponse) -> Result<RawResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let details = response.details();

    match AuthenticationErrorResponse::from_details(&details) {
        Some(auth_error) => warn!(
            "Token request rejected with {}: {:?}: {}",
            status,
            auth_error.error,
            auth_error.description()
        ),
        None => warn!("Token request rejected with {}: {}", status, details),
    }

    Err(Error::AuthFailure { status, details })
}
