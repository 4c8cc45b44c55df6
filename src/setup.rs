//! One-time interactive setup: walk the owner through the authorization code flow and hand them the three
//! `SPOTIFY_*` values the service needs.

use std::{
    future::IntoFuture,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use dialoguer::{Input, Password};
use log::{debug, error, info, warn};
use reqwest::Url;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};

use crate::{
    client::{AuthorizationRequest, CallbackParams, HttpClient, SpotifyClient},
    credentials::{Credentials, CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR},
    error::{Error, Result},
    model::token::TokenGrant,
};

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";
pub const DEFAULT_ENV_FILE: &str = ".env";

const DASHBOARD_URL: &str = "https://developer.spotify.com/dashboard";
const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Must be registered for the application in Spotify's dashboard.
    pub redirect_uri: String,
    /// Where the callback server listens.
    pub bind: SocketAddr,
    /// Where to write the credentials. `None` only prints them.
    pub env_file: Option<PathBuf>,
    pub open_browser: bool,
}

#[derive(Debug)]
struct SetupState<C>
where
    C: HttpClient,
{
    client: SpotifyClient<C>,
    request: AuthorizationRequest,
    client_secret: String,
    results: mpsc::Sender<Result<TokenGrant>>,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_owned(),
            bind: SocketAddr::from(([127, 0, 0, 1], 8888)),
            env_file: Some(PathBuf::from(DEFAULT_ENV_FILE)),
            open_browser: true,
        }
    }
}

impl SetupOptions {
    /// Ask for whichever of the client ID and secret weren't given. Blocks on the terminal.
    pub fn prompt_missing(self) -> Result<Self> {
        println!("1. Create an application in the Spotify dashboard: {}", DASHBOARD_URL);
        println!("2. Add this redirect URI to it: {}", self.redirect_uri);

        let client_id = match self.client_id.filter(|id| !id.trim().is_empty()) {
            Some(client_id) => client_id,
            None => Input::<String>::new()
                .with_prompt("Spotify client ID")
                .interact_text()?,
        };

        let client_secret = match self.client_secret.filter(|secret| !secret.trim().is_empty()) {
            Some(client_secret) => client_secret,
            None => Password::new()
                .with_prompt("Spotify client secret (hidden)")
                .interact()?,
        };

        Ok(Self {
            client_id: Some(client_id.trim().to_owned()),
            client_secret: Some(client_secret.trim().to_owned()),
            ..self
        })
    }
}

/// Run the callback server until Spotify redirects back once, then print and save the credentials.
pub async fn run<C>(client: SpotifyClient<C>, options: SetupOptions) -> Result<Credentials>
where
    C: HttpClient,
{
    let client_id = options.client_id.clone().unwrap_or_default();
    let client_secret = options.client_secret.clone().unwrap_or_default();
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(Error::MissingParameters);
    }

    let redirect = Url::parse(&options.redirect_uri)
        .map_err(|err| Error::InvalidUrl(format!("{}: {}", options.redirect_uri, err)))?;

    let request = client
        .authorization_request(client_id.as_str(), options.redirect_uri.as_str())
        .build();

    let (results_tx, mut results_rx) = mpsc::channel(1);
    let app = callback_router(
        SetupState {
            client,
            request,
            client_secret: client_secret.clone(),
            results: results_tx,
        },
        redirect.path(),
    )?;

    let listener = TcpListener::bind(options.bind).await?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .into_future(),
    );

    let login_url = login_url(&redirect, options.bind);
    if is_local(&redirect) {
        println!("Waiting for Spotify login at {}", login_url);

        if options.open_browser {
            if let Err(err) = open::that(&login_url) {
                warn!("Failed to open a browser: {}", err);
            }
        }
    } else {
        println!("The redirect URI is not local. Open the address forwarding to this machine, ending in /login");
        println!("For example: {}", login_url);
    }

    let result = tokio::select! {
        result = results_rx.recv() => result.unwrap_or(Err(Error::SetupCancelled)),
        _ = tokio::signal::ctrl_c() => Err(Error::SetupCancelled),
    };

    shutdown_tx.send(()).ok();
    match server.await {
        Ok(served) => served?,
        Err(err) => warn!("Callback server task failed: {}", err),
    }

    let grant = result?;
    let credentials = Credentials::new(client_id, client_secret, grant.refresh_token);

    println!("\nSetup complete. Add these to the service's environment:\n");
    print!("{}", credentials.to_env_lines());

    if let Some(env_file) = &options.env_file {
        write_env_file(env_file, &credentials)?;
        println!("\nSaved to {}", env_file.display());
    }

    Ok(credentials)
}

fn callback_router<C>(state: SetupState<C>, callback_path: &str) -> Result<Router>
where
    C: HttpClient,
{
    let callback_path = if callback_path.is_empty() { "/" } else { callback_path };
    if callback_path == LOGIN_PATH {
        return Err(Error::InvalidUrl(format!(
            "the redirect URI path can't be {}, the setup server serves the login redirect there",
            LOGIN_PATH
        )));
    }

    let authorize_url = state.request.authorize_url().map_err(|err| err.to_string());

    Ok(Router::new()
        .route(
            LOGIN_PATH,
            get(move || async move {
                match authorize_url {
                    Ok(url) => Redirect::to(&url).into_response(),
                    Err(err) => Html(page("Setup failed", &err)).into_response(),
                }
            }),
        )
        .route(callback_path, get(callback::<C>))
        .with_state(Arc::new(state)))
}

async fn callback<C>(State(state): State<Arc<SetupState<C>>>, Query(params): Query<CallbackParams>) -> Response
where
    C: HttpClient,
{
    let result = match state.request.verify_callback(&params) {
        Ok(code) => {
            state
                .client
                .exchange_authorization_code(
                    state.request.client_id(),
                    &state.client_secret,
                    code,
                    state.request.redirect_uri(),
                )
                .await
        }
        Err(err) => Err(err),
    };

    let html = match &result {
        Ok(_) => page(
            "Setup complete",
            "The credentials are in the terminal. You can close this window.",
        ),
        Err(err) => {
            error!("Authorization failed: {}", err);
            page("Setup failed", &err.to_string())
        }
    };

    if state.results.try_send(result).is_err() {
        debug!("Ignoring a callback after the first one");
    }

    Html(html).into_response()
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn is_local(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

/// Where the owner should start the flow: the local server for a local redirect URI, otherwise the same origin as the
/// redirect URI.
fn login_url(redirect: &Url, bind: SocketAddr) -> String {
    if is_local(redirect) {
        let host = redirect.host_str().unwrap_or("localhost");
        return format!("http://{}:{}/login", host, bind.port());
    }

    let mut login = redirect.clone();
    login.set_path(LOGIN_PATH);
    login.set_query(None);
    login.into()
}

/// Write the credentials to an env file, replacing any earlier values and keeping every other line.
pub fn write_env_file(path: &Path, credentials: &Credentials) -> Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(existing) => existing,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    std::fs::write(path, merge_env(&existing, credentials))?;
    info!("Wrote credentials to {}", path.display());

    Ok(())
}

fn merge_env(existing: &str, credentials: &Credentials) -> String {
    let mut merged: String = existing
        .lines()
        .filter(|line| {
            let key = line.split('=').next().unwrap_or_default().trim();
            ![CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR].contains(&key)
        })
        .map(|line| format!("{}\n", line))
        .collect();

    merged.push_str(&credentials.to_env_lines());
    merged
}
