//! The display side: poll the now playing endpoint on a fixed interval and keep a [DisplayState] current, with a beat
//! that pulses while something is playing.
//!
//! ```no_run
//! # use neon_grid::poll_loop::{self, HttpSource, PollConfig};
//! # async fn foo() {
//! let handle = poll_loop::spawn(HttpSource::new("http://127.0.0.1:8888/now-playing"), PollConfig::default());
//! let mut states = handle.subscribe();
//!
//! while states.changed().await.is_ok() {
//!     println!("{:?}", *states.borrow());
//! }
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde::Deserialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    client::{HttpClient, NowPlayingPoller},
    credentials::CredentialSource,
    error::{Error, Result},
    model::playback::{CurrentlyPlaying, PlayingItem},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_BPM: u32 = 120;
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

const BACKEND_UNREACHABLE: &str = "Backend Unreachable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub bpm: u32,
}

/// What a display shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    /// The last track seen playing. Kept when playback stops or a poll fails.
    pub track: Option<PlayingItem>,
    pub is_playing: bool,
    pub progress: Option<Duration>,
    pub beat: bool,
    /// True until the first poll completes, successfully or not.
    pub loading: bool,
    pub error: Option<String>,
}

/// One answer from the now playing endpoint: either an error marker or a (possibly idle) playback object.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub playback: CurrentlyPlaying,
}

/// Where the loop gets its answers from.
#[async_trait]
pub trait NowPlayingSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<PollResponse>;
}

/// Polls a running service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http_client: reqwest::Client,
    url: String,
}

/// Owns the loop's tasks. Dropping it stops them.
#[derive(Debug)]
pub struct PollLoopHandle {
    state: watch::Receiver<DisplayState>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            bpm: DEFAULT_BPM,
        }
    }
}

impl PollConfig {
    /// The interval polls actually run at, never shorter than [MIN_POLL_INTERVAL].
    pub fn poll_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }

    /// The beat flips twice per beat.
    pub fn half_beat(&self) -> Duration {
        Duration::from_millis(30_000 / u64::from(self.bpm.max(1)))
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            track: None,
            is_playing: false,
            progress: None,
            beat: false,
            loading: true,
            error: None,
        }
    }
}

impl DisplayState {
    /// Fold one poll result into the state. Every result replaces the playback part; nothing from an earlier poll
    /// survives except the last track.
    pub fn merge(&mut self, result: Result<PollResponse>) {
        match result {
            Ok(PollResponse { error: Some(error), .. }) => {
                self.error = Some(error);
                self.is_playing = false;
            }
            Ok(PollResponse { error: None, playback }) if playback.is_playing() => {
                self.progress = playback.progress();
                self.track = playback.take_item();
                self.is_playing = true;
                self.error = None;
            }
            Ok(_) => {
                self.is_playing = false;
                self.error = None;
            }
            Err(err) => {
                warn!("Failed to poll now playing: {}", err);
                self.error = Some(format!("{}: {}", BACKEND_UNREACHABLE, err));
                self.is_playing = false;
            }
        }

        self.loading = false;
        if !self.is_playing {
            self.beat = false;
        }
    }
}

impl HttpSource {
    pub fn new<S>(url: S) -> Self
    where
        S: Into<String>,
    {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client<S>(http_client: reqwest::Client, url: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NowPlayingSource for HttpSource {
    async fn fetch(&self) -> Result<PollResponse> {
        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();
        trace!("Now playing service answered with {}", status);

        if !status.is_success() {
            return Err(Error::BackendStatus(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl<C, S> NowPlayingSource for NowPlayingPoller<C, S>
where
    C: HttpClient,
    S: CredentialSource + 'static,
{
    async fn fetch(&self) -> Result<PollResponse> {
        let envelope = self.poll().await;
        Ok(serde_json::from_value(serde_json::to_value(&envelope)?)?)
    }
}

impl PollLoopHandle {
    /// A receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state.clone()
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> DisplayState {
        self.state.borrow().clone()
    }

    pub fn stop(self) {}
}

impl Drop for PollLoopHandle {
    fn drop(&mut self) {
        debug!("Stopping poll loop");

        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start polling. The first poll happens immediately; polls never overlap.
pub fn spawn<S>(source: S, config: PollConfig) -> PollLoopHandle
where
    S: NowPlayingSource,
{
    let (state_tx, state_rx) = watch::channel(DisplayState::default());
    let state_tx = Arc::new(state_tx);

    let poll_task = tokio::spawn(poll(source, config.poll_interval(), Arc::clone(&state_tx)));
    let beat_task = tokio::spawn(beat(config.half_beat(), state_tx, state_rx.clone()));

    PollLoopHandle {
        state: state_rx,
        tasks: vec![poll_task, beat_task],
    }
}

async fn poll<S>(source: S, interval: Duration, state: Arc<watch::Sender<DisplayState>>)
where
    S: NowPlayingSource,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let result = source.fetch().await;
        state.send_modify(|state| state.merge(result));
    }
}

async fn beat(
    half_beat: Duration,
    state: Arc<watch::Sender<DisplayState>>,
    mut changes: watch::Receiver<DisplayState>,
) {
    loop {
        let is_playing = changes.borrow_and_update().is_playing;

        if is_playing {
            let mut ticker = time::interval_at(Instant::now() + half_beat, half_beat);

            loop {
                tokio::select! {
                    _ = ticker.tick() => state.send_modify(|state| {
                        if state.is_playing {
                            state.beat = !state.beat;
                        }
                    }),
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return;
                        }

                        if !changes.borrow_and_update().is_playing {
                            break;
                        }
                    }
                }
            }
        } else if changes.changed().await.is_err() {
            return;
        }
    }
}
