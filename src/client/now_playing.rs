use log::{debug, error, warn};
use reqwest::StatusCode;
use serde_json::Value;

use super::{private::HttpClient, SpotifyClient};
use crate::{
    credentials::{CredentialSource, EnvCredentials},
    error::{Error, Result},
    model::{envelope::NowPlaying, error::ApiErrorResponse, token::AccessToken},
};

impl<C> SpotifyClient<C>
where
    C: HttpClient,
{
    /// Get the object currently being played on the user's account, exactly as Spotify returned it. Returns `None`
    /// when nothing is playing on any device.
    pub async fn currently_playing(&self, access_token: &AccessToken) -> Result<Option<Value>> {
        let response = self
            .http_client
            .get_with_bearer(self.currently_playing_endpoint(), access_token.as_str())
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!("Nothing is currently playing");
            return Ok(None);
        }

        if !response.is_success() {
            let status = response.status().as_u16();

            match ApiErrorResponse::from_body(response.body()) {
                Some(api_error) => warn!(
                    "Currently playing request failed with {}: {}",
                    api_error.error.status, api_error.error.message
                ),
                None => warn!("Currently playing request failed with {}: {}", status, response.body()),
            }

            return Err(Error::UnhandledSpotifyError {
                status,
                details: response.into_body(),
            });
        }

        let playing = response.json()?;
        Ok(Some(playing))
    }
}

/// Answers "what is playing right now" from scratch on every call: load credentials, refresh an access token, query
/// the currently playing endpoint.
#[derive(Debug, Clone)]
pub struct NowPlayingPoller<C = reqwest::Client, S = EnvCredentials>
where
    C: HttpClient,
    S: CredentialSource,
{
    client: SpotifyClient<C>,
    credentials: S,
}

impl NowPlayingPoller {
    /// A poller talking to Spotify that reads its credentials from the environment on every poll.
    pub fn from_env() -> Self {
        Self::new(SpotifyClient::new(), EnvCredentials)
    }
}

impl<C, S> NowPlayingPoller<C, S>
where
    C: HttpClient,
    S: CredentialSource,
{
    pub fn new(client: SpotifyClient<C>, credentials: S) -> Self {
        Self { client, credentials }
    }

    pub fn client(&self) -> &SpotifyClient<C> {
        &self.client
    }

    /// Poll once and turn every outcome into an envelope. Never fails; failures are logged and become error markers.
    pub async fn poll(&self) -> NowPlaying {
        match self.try_poll().await {
            Ok(now_playing) => now_playing,
            Err(err) => {
                match &err {
                    Error::MissingCredential(name) => error!("Cannot poll playback: {} is not set", name),
                    Error::AuthFailure { .. } | Error::UnhandledSpotifyError { .. } => {
                        debug!("Playback poll failed: {}", err)
                    }
                    other => error!("Playback poll crashed: {}", other),
                }

                NowPlaying::from(err)
            }
        }
    }

    /// Poll once. The playback endpoint is only called once an access token has been obtained.
    pub async fn try_poll(&self) -> Result<NowPlaying> {
        let credentials = self.credentials.load()?;
        let access_token = self.client.refresh_access_token(&credentials).await?;

        let now_playing = match self.client.currently_playing(&access_token).await? {
            Some(playing) => NowPlaying::Playing(playing),
            None => NowPlaying::idle(),
        };

        Ok(now_playing)
    }
}
