//! A typed view over the currently playing object.
//!
//! The service never rebuilds the upstream payload from these types; it passes Spotify's JSON through as-is. These
//! types are for consumers of that payload, such as the [poll loop](crate::poll_loop), that want to read the handful
//! of fields a display needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Image;
use crate::util::duration_millis;

/// What the user's account is currently playing, if anything.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    is_playing: bool,
    #[serde(default, rename = "progress_ms", with = "duration_millis::option")]
    progress: Option<Duration>,
    #[serde(default)]
    item: Option<PlayingItem>,
}

/// A playing track or episode. Only the fields common to both are read; episodes have no artists or album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingItem {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    album: Option<Album>,
    #[serde(rename = "duration_ms", with = "duration_millis")]
    duration: Duration,
    // episodes carry their cover art here instead of on an album
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default)]
    id: Option<String>,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

impl CurrentlyPlaying {
    /// Whether or not the item is playing.
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Playback progress into the item, if Spotify reported one.
    pub fn progress(&self) -> Option<Duration> {
        self.progress
    }

    /// The playing item.
    pub fn item(&self) -> Option<&PlayingItem> {
        self.item.as_ref()
    }

    /// The playing item. Take ownership of the value.
    pub fn take_item(self) -> Option<PlayingItem> {
        self.item
    }
}

impl PlayingItem {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    pub fn album(&self) -> Option<&Album> {
        self.album.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The artists' names joined with commas, e.g. for a status line.
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The URL of the largest cover image, preferring the album's art over the item's own.
    pub fn cover_art_url(&self) -> Option<&str> {
        let images = match &self.album {
            Some(album) if !album.images.is_empty() => &album.images,
            _ => &self.images,
        };

        // Spotify lists images widest first, but don't rely on it
        images
            .iter()
            .max_by_key(|image| image.width.unwrap_or(0))
            .map(|image| image.url.as_str())
    }
}

impl Artist {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Album {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }
}
