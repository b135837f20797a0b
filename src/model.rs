use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    #[default]
    None,
    RepeatOne,
    RepeatAll,
}

impl LoopMode {
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::RepeatOne,
            Self::RepeatOne => Self::RepeatAll,
            Self::RepeatAll => Self::None,
        }
    }

    /// Short badge shown next to the loop control.
    pub fn badge(self) -> &'static str {
        match self {
            Self::None => "",
            Self::RepeatOne => "(1)",
            Self::RepeatAll => "(A)",
        }
    }
}

/// Tags resolved for one file. Missing values are `None`; display helpers
/// substitute the usual fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Duration,
}

impl TrackMetadata {
    pub fn from_file_name(path: &Path) -> Self {
        Self {
            title: file_stem_title(path),
            artist: None,
            album: None,
            duration: Duration::ZERO,
        }
    }

    pub fn artist_label(&self) -> &str {
        self.artist.as_deref().unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn album_label(&self) -> &str {
        self.album.as_deref().unwrap_or(UNKNOWN_ALBUM)
    }
}

/// A playable file and the key it is listed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    path: PathBuf,
    key: String,
}

impl TrackRef {
    pub fn new(path: impl Into<PathBuf>, metadata: &TrackMetadata) -> Self {
        Self {
            path: path.into(),
            key: derive_key(&metadata.title, metadata.artist.as_deref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

pub fn derive_key(title: &str, artist: Option<&str>) -> String {
    match artist.map(str::trim).filter(|artist| !artist.is_empty()) {
        Some(artist) => format!("{title} ~ {artist}"),
        None => title.to_string(),
    }
}

pub fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string()
}

/// The mutable playback session. Only the transport writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackContext {
    pub current_track: Option<TrackRef>,
    pub current_state: TransportState,
    pub playing_from_playlist: bool,
    pub current_playlist_key: Option<String>,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub is_transitioning: bool,
    pub now_playing: Option<TrackMetadata>,
    pub volume: u8,
}

impl Default for PlaybackContext {
    fn default() -> Self {
        Self {
            current_track: None,
            current_state: TransportState::Stopped,
            playing_from_playlist: false,
            current_playlist_key: None,
            loop_mode: LoopMode::None,
            shuffle: false,
            is_transitioning: false,
            now_playing: None,
            volume: 50,
        }
    }
}
