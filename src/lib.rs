//! A small service between the Neon Grid visualizer and the Spotify Web API.
//!
//! The service holds the owner's long-lived credentials and answers one question for the front-end: what is playing
//! right now. Every answer is computed from scratch: load the credentials, trade the refresh token for an access
//! token, ask Spotify. Nothing is cached between requests.
//!
//! - [client] talks to Spotify: refreshing access tokens, exchanging authorization codes and reading the currently
//!   playing object. [NowPlayingPoller](client::NowPlayingPoller) strings these together into one poll.
//! - [server] exposes the polls and the code exchange over HTTP.
//! - [setup] runs the authorization code flow once to produce the credentials.
//! - [poll_loop] is the display side: it polls on an interval and keeps a display state current.
//!
//! # Credentials
//!
//! The service reads `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and `SPOTIFY_REFRESH_TOKEN` from its environment on
//! every request. A missing value is reported in the response instead of stopping the service.

pub mod client;
pub mod credentials;
pub mod error;
pub mod model;
pub mod poll_loop;
pub mod scope;
pub mod server;
pub mod setup;
pub mod visit;

mod util {
    pub(crate) mod duration_millis;
}

pub use crate::{
    credentials::{CredentialSource, Credentials, EnvCredentials},
    error::{Error, Result},
    scope::Scope,
};
