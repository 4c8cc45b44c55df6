use std::{net::SocketAddr, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::error;
use neon_grid::{
    client::{NowPlayingPoller, SpotifyClient},
    poll_loop::{self, DisplayState, HttpSource, PollConfig},
    server::{self, AppState, ServerConfig, DEFAULT_BIND},
    setup::{self, SetupOptions, DEFAULT_ENV_FILE, DEFAULT_REDIRECT_URI},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the now playing API (and optionally the front-end)
    Serve {
        #[arg(long, env = "NEON_GRID_BIND", default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        /// Directory of a built front-end; unknown paths fall back to its index.html
        #[arg(long, env = "NEON_GRID_STATIC_DIR")]
        static_dir: Option<PathBuf>,
    },

    /// Authorize with Spotify once and print the credentials the service needs
    Setup {
        #[arg(long, env = "SPOTIFY_CLIENT_ID")]
        client_id: Option<String>,

        #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Must be registered for the application in Spotify's dashboard
        #[arg(long, default_value = DEFAULT_REDIRECT_URI)]
        redirect_uri: String,

        /// Where the callback server listens
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        #[arg(long, default_value = DEFAULT_ENV_FILE)]
        env_file: PathBuf,

        /// Only print the credentials
        #[arg(long)]
        no_env_file: bool,

        #[arg(long)]
        no_browser: bool,
    },

    /// Poll for what's playing and print it as it changes
    Watch {
        /// A running service's now playing endpoint. Polls Spotify directly when not given
        #[arg(long, env = "NEON_GRID_URL")]
        url: Option<String>,

        #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { bind, static_dir } => {
            server::serve(ServerConfig { bind, static_dir }, AppState::from_env()).await
        }

        Command::Setup {
            client_id,
            client_secret,
            redirect_uri,
            bind,
            env_file,
            no_env_file,
            no_browser,
        } => {
            let options = SetupOptions {
                client_id,
                client_secret,
                redirect_uri,
                bind,
                env_file: (!no_env_file).then_some(env_file),
                open_browser: !no_browser,
            };

            match options.prompt_missing() {
                Ok(options) => setup::run(SpotifyClient::new(), options).await.map(|_| ()),
                Err(err) => Err(err),
            }
        }

        Command::Watch { url, interval_ms } => {
            let config = PollConfig {
                interval: std::time::Duration::from_millis(interval_ms),
                ..PollConfig::default()
            };

            let handle = match url {
                Some(url) => poll_loop::spawn(HttpSource::new(url), config),
                None => poll_loop::spawn(NowPlayingPoller::from_env(), config),
            };

            watch(handle).await;
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn watch(handle: poll_loop::PollLoopHandle) {
    let mut states = handle.subscribe();
    let mut last_line = String::new();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }

                let line = status_line(&states.borrow_and_update());
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop();
}

fn status_line(state: &DisplayState) -> String {
    if state.loading {
        return "Connecting...".to_owned();
    }

    if let Some(error) = &state.error {
        return format!("! {}", error);
    }

    match (&state.track, state.is_playing) {
        (Some(track), true) => {
            let progress = state.progress.unwrap_or_default().as_secs();
            let duration = track.duration().as_secs();

            format!(
                "> {} - {} [{}:{:02} / {}:{:02}]",
                track.artist_names(),
                track.name(),
                progress / 60,
                progress % 60,
                duration / 60,
                duration % 60
            )
        }
        _ => "Nothing playing".to_owned(),
    }
}
