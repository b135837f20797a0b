#![allow(dead_code)]

use spindle::{MetadataReader, PlaybackPort, Player, PlayerOptions, TrackMetadata};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    Play(PathBuf),
    Pause,
    Unpause,
    Stop,
}

/// What the scripted port saw, plus the knobs a test can turn.
#[derive(Clone, Default)]
pub struct PortScript {
    calls: Arc<Mutex<Vec<PortCall>>>,
    broken: Arc<Mutex<HashSet<PathBuf>>>,
    busy: Arc<AtomicBool>,
    panic_on_poll: Arc<AtomicBool>,
}

impl PortScript {
    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PortCall::Play(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn break_path(&self, path: impl Into<PathBuf>) {
        self.broken.lock().expect("broken").insert(path.into());
    }

    /// Makes the next busy poll panic once.
    pub fn panic_on_next_poll(&self) {
        self.panic_on_poll.store(true, Ordering::SeqCst);
    }

    pub fn panics_pending(&self) -> bool {
        self.panic_on_poll.load(Ordering::SeqCst)
    }

    /// Simulates the audio device draining the current track.
    pub fn finish_track(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

pub struct ScriptedPort {
    script: PortScript,
    paused: bool,
    volume: u8,
}

impl PlaybackPort for ScriptedPort {
    fn play(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.script.broken.lock().expect("broken").contains(path) {
            anyhow::bail!("cannot open {}", path.display());
        }
        self.script
            .calls
            .lock()
            .expect("calls")
            .push(PortCall::Play(path.to_path_buf()));
        self.paused = false;
        self.script.busy.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        self.script.calls.lock().expect("calls").push(PortCall::Pause);
    }

    fn unpause(&mut self) {
        self.paused = false;
        self.script.calls.lock().expect("calls").push(PortCall::Unpause);
    }

    fn stop(&mut self) {
        self.script.busy.store(false, Ordering::SeqCst);
        self.script.calls.lock().expect("calls").push(PortCall::Stop);
    }

    fn is_busy(&self) -> bool {
        if self.script.panic_on_poll.swap(false, Ordering::SeqCst) {
            panic!("device vanished mid-poll");
        }
        !self.paused && self.script.busy.load(Ordering::SeqCst)
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
    }
}

/// Serves canned tags for known paths and the file stem for the rest.
#[derive(Clone, Default)]
pub struct CannedReader {
    tags: HashMap<PathBuf, TrackMetadata>,
}

impl CannedReader {
    pub fn with(mut self, path: &str, title: &str, artist: Option<&str>) -> Self {
        self.tags.insert(
            PathBuf::from(path),
            TrackMetadata {
                title: title.to_string(),
                artist: artist.map(str::to_string),
                album: None,
                duration: Duration::from_secs(180),
            },
        );
        self
    }
}

impl MetadataReader for CannedReader {
    fn read(&self, path: &Path) -> TrackMetadata {
        self.tags
            .get(path)
            .cloned()
            .unwrap_or_else(|| TrackMetadata::from_file_name(path))
    }
}

pub fn quiet_options() -> PlayerOptions {
    PlayerOptions {
        poll_interval: Duration::from_secs(60),
        shuffle_seed: Some(7),
        ..PlayerOptions::default()
    }
}

pub fn player(reader: CannedReader, options: PlayerOptions) -> (Player, PortScript) {
    let script = PortScript::default();
    let port = ScriptedPort {
        script: script.clone(),
        paused: false,
        volume: 0,
    };
    (Player::new(Box::new(port), Box::new(reader), options), script)
}

/// Two tagged songs, "Song A" and "Song B", both in the playlist.
pub fn two_song_player() -> (Player, PortScript) {
    let reader = CannedReader::default()
        .with("a.mp3", "Song A", None)
        .with("b.mp3", "Song B", None);
    let (player, script) = player(reader, quiet_options());
    player.add_to_playlist("a.mp3").expect("add a");
    player.add_to_playlist("b.mp3").expect("add b");
    (player, script)
}
