//! Transport state machine and playlist-advance engine.
//!
//! [`Player`] is a cheap handle to one shared [`Session`]. User operations
//! and the end-of-track monitor both go through the session mutex, so a
//! track load is never observed half-done: the monitor only ever try-locks
//! and skips its tick while an operation is in flight.

use crate::audio::{MAX_VOLUME, PlaybackPort};
use crate::error::{PlayerError, Result};
use crate::events::{EventBus, PlayerEvent};
use crate::metadata::MetadataReader;
use crate::model::{LoopMode, PlaybackContext, TrackRef, TransportState};
use crate::monitor::EndOfTrackMonitor;
use crate::playlist::{Direction, Playlist};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_VOLUME_STEP: u8 = 10;

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub poll_interval: Duration,
    pub volume: u8,
    pub volume_step: u8,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    /// Fixed seed for the shuffle permutation; `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            volume: 50,
            volume_step: DEFAULT_VOLUME_STEP,
            loop_mode: LoopMode::None,
            shuffle: false,
            shuffle_seed: None,
        }
    }
}

/// Everything the transport owns. Lives behind the player's mutex.
pub struct Session {
    ctx: PlaybackContext,
    playlist: Playlist,
    port: Box<dyn PlaybackPort>,
    reader: Box<dyn MetadataReader>,
    events: EventBus,
    volume_step: u8,
}

struct Candidate {
    path: PathBuf,
    from_playlist: bool,
    playlist_key: Option<String>,
}

impl Session {
    fn new(
        port: Box<dyn PlaybackPort>,
        reader: Box<dyn MetadataReader>,
        options: &PlayerOptions,
    ) -> Self {
        let playlist = match options.shuffle_seed {
            Some(seed) => Playlist::with_seed(seed),
            None => Playlist::new(),
        };
        let mut session = Self {
            ctx: PlaybackContext {
                loop_mode: options.loop_mode,
                shuffle: options.shuffle,
                ..PlaybackContext::default()
            },
            playlist,
            port,
            reader,
            events: EventBus::default(),
            volume_step: options.volume_step,
        };
        session.set_volume(options.volume);
        session
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.ctx
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub(crate) fn port_is_busy(&self) -> bool {
        self.port.is_busy()
    }

    #[cfg(test)]
    pub(crate) fn set_transitioning(&mut self, transitioning: bool) {
        self.ctx.is_transitioning = transitioning;
    }

    fn set_state(&mut self, state: TransportState) {
        if self.ctx.current_state != state {
            self.ctx.current_state = state;
            self.events.publish(PlayerEvent::StateChanged(state));
        }
    }

    fn stop_transport(&mut self) {
        self.port.stop();
        self.set_state(TransportState::Stopped);
    }

    fn publish_playlist(&mut self) {
        let len = self.playlist.len();
        self.events.publish(PlayerEvent::PlaylistChanged { len });
    }

    fn current_playlist_index(&self) -> Option<usize> {
        self.ctx
            .current_playlist_key
            .as_deref()
            .and_then(|key| self.playlist.position(key))
    }

    /// Loads `path` and, if the port rejects it, keeps advancing through
    /// the candidates `next_song` would pick until one loads or every
    /// reachable file has been tried once.
    pub(crate) fn play_song(&mut self, path: &Path, from_playlist: bool) {
        self.ctx.is_transitioning = true;
        self.play_with_fallback(path, from_playlist);
        self.ctx.is_transitioning = false;
    }

    fn play_with_fallback(&mut self, path: &Path, from_playlist: bool) {
        if self.try_load(path, from_playlist) {
            return;
        }

        // The advance follows the playlist when either the failed request or
        // the session it interrupted was playing from it.
        let in_playlist = from_playlist || self.ctx.playing_from_playlist;
        // One try per file the advance can still reach.
        let retries = match (in_playlist, from_playlist) {
            (true, true) => self.playlist.len().saturating_sub(1),
            (true, false) => self.playlist.len(),
            (false, _) => 1,
        };
        for _ in 0..retries {
            let Some(candidate) = self.candidate(Direction::Forward, in_playlist) else {
                self.stop_transport();
                return;
            };
            if let Some(key) = candidate.playlist_key {
                self.ctx.current_playlist_key = Some(key);
            }
            if self.try_load(&candidate.path, candidate.from_playlist) {
                return;
            }
        }

        warn!(attempts = retries + 1, "every candidate failed to load");
        self.stop_transport();
    }

    /// One port load. Context fields change only when it succeeds.
    fn try_load(&mut self, path: &Path, from_playlist: bool) -> bool {
        if let Err(err) = self.port.play(path) {
            let reason = format!("{err:#}");
            warn!(path = %path.display(), %reason, "failed to load track");
            self.events.publish(PlayerEvent::LoadFailed {
                path: path.to_path_buf(),
                reason,
            });
            return false;
        }

        let metadata = self.reader.read(path);
        info!(path = %path.display(), title = %metadata.title, "playing");
        self.ctx.playing_from_playlist = from_playlist;
        self.ctx.current_track = Some(TrackRef::new(path, &metadata));
        self.events.publish(PlayerEvent::NowPlaying {
            title: metadata.title.clone(),
            artist: metadata.artist_label().to_string(),
            album: metadata.album_label().to_string(),
            duration: metadata.duration,
        });
        self.ctx.now_playing = Some(metadata);
        self.set_state(TransportState::Playing);
        true
    }

    fn toggle_play_state(&mut self) {
        match self.ctx.current_state {
            TransportState::Playing => {
                self.port.pause();
                self.set_state(TransportState::Paused);
            }
            TransportState::Paused => {
                self.port.unpause();
                self.set_state(TransportState::Playing);
            }
            TransportState::Stopped => {
                if let Some(track) = self.ctx.current_track.clone() {
                    self.play_song(track.path(), self.ctx.playing_from_playlist);
                }
            }
        }
    }

    fn play_from_playlist(&mut self, key: &str) -> Result<()> {
        let track = self
            .playlist
            .get(key)
            .cloned()
            .ok_or_else(|| PlayerError::KeyNotFound(key.to_string()))?;
        self.ctx.current_playlist_key = Some(key.to_string());
        self.play_song(track.path(), true);
        Ok(())
    }

    fn step(&mut self, direction: Direction) {
        let in_playlist = self.ctx.playing_from_playlist;
        match self.candidate(direction, in_playlist) {
            Some(candidate) => {
                if let Some(key) = candidate.playlist_key {
                    self.ctx.current_playlist_key = Some(key);
                }
                self.play_song(&candidate.path, candidate.from_playlist);
            }
            None => self.stop_transport(),
        }
    }

    /// What `next_song`/`previous_song` would play, or `None` to stop.
    fn candidate(&mut self, direction: Direction, in_playlist: bool) -> Option<Candidate> {
        let loop_mode = self.ctx.loop_mode;

        if !in_playlist && loop_mode == LoopMode::None {
            return None;
        }

        if in_playlist && loop_mode != LoopMode::RepeatOne {
            let wrap = loop_mode == LoopMode::RepeatAll;
            let current = self.ctx.current_playlist_key.clone();
            let target = if self.ctx.shuffle {
                self.playlist
                    .shuffled_step(current.as_deref(), direction, wrap)
            } else {
                self.playlist
                    .sequential_step(current.as_deref(), direction, wrap)
            };

            let Some(track) = target.and_then(|idx| self.playlist.entry(idx)) else {
                debug!(?direction, "no playlist entry to move to");
                return None;
            };
            return Some(Candidate {
                path: track.path().to_path_buf(),
                from_playlist: true,
                playlist_key: Some(track.key().to_string()),
            });
        }

        self.ctx.current_track.as_ref().map(|track| Candidate {
            path: track.path().to_path_buf(),
            from_playlist: in_playlist,
            playlist_key: None,
        })
    }

    fn replay_current(&mut self) {
        match self.ctx.current_track.clone() {
            Some(track) => self.play_song(track.path(), self.ctx.playing_from_playlist),
            None => self.stop_transport(),
        }
    }

    pub(crate) fn handle_song_end(&mut self) {
        if self.ctx.current_state == TransportState::Paused {
            return;
        }

        if !self.ctx.playing_from_playlist {
            if self.ctx.loop_mode != LoopMode::None {
                self.replay_current();
            } else {
                self.stop_transport();
            }
            return;
        }

        if self.playlist.is_empty() {
            self.stop_transport();
            return;
        }

        self.step(Direction::Forward);
    }

    fn change_loop_state(&mut self) -> LoopMode {
        self.ctx.loop_mode = self.ctx.loop_mode.next();
        debug!(mode = ?self.ctx.loop_mode, "loop mode changed");
        self.events
            .publish(PlayerEvent::LoopModeChanged(self.ctx.loop_mode));
        self.ctx.loop_mode
    }

    fn toggle_shuffle(&mut self) -> bool {
        self.ctx.shuffle = !self.ctx.shuffle;
        if self.ctx.shuffle {
            let anchor = self.current_playlist_index();
            self.playlist.rebuild_shuffle_order(anchor);
        }
        debug!(shuffle = self.ctx.shuffle, "shuffle toggled");
        self.events
            .publish(PlayerEvent::ShuffleChanged(self.ctx.shuffle));
        self.ctx.shuffle
    }

    fn add_to_playlist(&mut self, path: &Path) -> Option<String> {
        let metadata = self.reader.read(path);
        let track = TrackRef::new(path, &metadata);
        let key = track.key().to_string();
        if !self.playlist.add_media(track) {
            return None;
        }

        let anchor = self.current_playlist_index();
        self.playlist.rebuild_shuffle_order(anchor);
        self.publish_playlist();
        Some(key)
    }

    fn remove_from_playlist(&mut self, key: &str) -> Result<TrackRef> {
        let removed = self
            .playlist
            .remove_media(key)
            .ok_or_else(|| PlayerError::KeyNotFound(key.to_string()))?;

        let anchor = self.current_playlist_index();
        self.playlist.rebuild_shuffle_order(anchor);
        self.publish_playlist();
        Ok(removed)
    }

    fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(MAX_VOLUME);
        self.port.set_volume(volume);
        self.ctx.volume = volume;
        self.events.publish(PlayerEvent::VolumeChanged(volume));
    }

    fn is_current_file(&self, path: &Path) -> bool {
        self.ctx
            .current_track
            .as_ref()
            .is_some_and(|track| track.path() == path)
    }
}

pub(crate) struct Shared {
    session: Mutex<Session>,
    running: AtomicBool,
    monitor: Mutex<Option<EndOfTrackMonitor>>,
    poll_interval: Duration,
}

impl Shared {
    pub(crate) fn session(&self) -> &Mutex<Session> {
        &self.session
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // The monitor only holds a weak reference; waking it lets it notice.
        let monitor = self
            .monitor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(monitor) = monitor.as_ref() {
            monitor.wake();
        }
    }
}

/// Handle to the transport. Clones share the same session.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    pub fn new(
        port: Box<dyn PlaybackPort>,
        reader: Box<dyn MetadataReader>,
        options: PlayerOptions,
    ) -> Self {
        let session = Session::new(port, reader, &options);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                running: AtomicBool::new(true),
                monitor: Mutex::new(None),
                poll_interval: options.poll_interval,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one user operation under the session lock, then makes sure the
    /// monitor is watching if the operation left a track playing.
    fn with_session<R>(&self, operation: impl FnOnce(&mut Session) -> R) -> R {
        let (result, playing) = {
            let mut session = self.lock();
            let result = operation(&mut session);
            (
                result,
                session.ctx.current_state == TransportState::Playing,
            )
        };
        if playing {
            self.ensure_monitor();
        }
        result
    }

    fn ensure_monitor(&self) {
        if !self.shared.is_running() {
            return;
        }
        let mut slot = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(EndOfTrackMonitor::is_alive) {
            return;
        }
        match EndOfTrackMonitor::start(&self.shared) {
            Ok(monitor) => *slot = Some(monitor),
            Err(err) => warn!("failed to start end-of-track monitor: {err:#}"),
        }
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.lock().events.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackContext {
        self.lock().ctx.clone()
    }

    pub fn playlist_keys(&self) -> Vec<String> {
        self.lock().playlist.keys()
    }

    pub fn playlist_selection(&self) -> Option<usize> {
        self.lock().playlist.selected()
    }

    pub fn select_playlist_row(&self, index: usize) {
        self.lock().playlist.select(index);
    }

    pub fn play_song(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PlayerError::EmptyPath);
        }
        self.with_session(|session| session.play_song(path, false));
        Ok(())
    }

    pub fn toggle_play_state(&self) {
        self.with_session(Session::toggle_play_state);
    }

    pub fn play_from_playlist(&self, key: &str) -> Result<()> {
        self.with_session(|session| session.play_from_playlist(key))
    }

    pub fn next_song(&self) {
        self.with_session(|session| session.step(Direction::Forward));
    }

    pub fn previous_song(&self) {
        self.with_session(|session| session.step(Direction::Backward));
    }

    pub fn stop(&self) {
        self.with_session(Session::stop_transport);
    }

    pub fn change_loop_state(&self) -> LoopMode {
        self.with_session(Session::change_loop_state)
    }

    pub fn toggle_shuffle(&self) -> bool {
        self.with_session(Session::toggle_shuffle)
    }

    /// End-of-track handler. The monitor calls this on natural completion;
    /// it is public so hosts with a real "track ended" callback can call it
    /// directly.
    pub fn handle_song_end(&self) {
        self.with_session(Session::handle_song_end);
    }

    /// Adds a file under its derived key. Returns the key, or `None` when an
    /// entry with the same title and artist already exists.
    pub fn add_to_playlist(&self, path: impl AsRef<Path>) -> Result<Option<String>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PlayerError::EmptyPath);
        }
        Ok(self.with_session(|session| session.add_to_playlist(path)))
    }

    pub fn remove_from_playlist(&self, key: &str) -> Result<TrackRef> {
        self.with_session(|session| session.remove_from_playlist(key))
    }

    /// A file was chosen in the explorer: play it, or toggle pause when it
    /// is already the track loaded outside the playlist.
    pub fn activate_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(PlayerError::EmptyPath);
        }
        self.with_session(|session| {
            if session.is_current_file(&path) && !session.ctx.playing_from_playlist {
                session.toggle_play_state();
            } else {
                session.play_song(&path, false);
            }
        });
        Ok(())
    }

    /// A playlist row was chosen: play it, or toggle pause when that entry
    /// is already playing from the playlist.
    pub fn activate_playlist_entry(&self, key: &str) -> Result<()> {
        self.with_session(|session| {
            let track = session
                .playlist
                .get(key)
                .cloned()
                .ok_or_else(|| PlayerError::KeyNotFound(key.to_string()))?;
            if session.is_current_file(track.path()) && session.ctx.playing_from_playlist {
                session.toggle_play_state();
                Ok(())
            } else {
                session.play_from_playlist(key)
            }
        })
    }

    pub fn set_volume(&self, volume: u8) -> u8 {
        self.with_session(|session| {
            session.set_volume(volume);
            session.ctx.volume
        })
    }

    pub fn increase_volume(&self) -> u8 {
        self.with_session(|session| {
            let volume = session.ctx.volume.saturating_add(session.volume_step);
            session.set_volume(volume);
            session.ctx.volume
        })
    }

    pub fn decrease_volume(&self) -> u8 {
        self.with_session(|session| {
            let volume = session.ctx.volume.saturating_sub(session.volume_step);
            session.set_volume(volume);
            session.ctx.volume
        })
    }

    pub fn is_monitor_running(&self) -> bool {
        self.shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(EndOfTrackMonitor::is_alive)
    }

    /// Stops playback and the monitor. The monitor is never restarted on
    /// this player afterwards.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.lock().stop_transport();
        let monitor = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.join();
        }
        info!("player shut down");
    }
}
