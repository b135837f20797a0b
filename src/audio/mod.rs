use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const MAX_VOLUME: u8 = 100;

/// The playback primitive the transport drives. Implementations load one
/// file at a time; loading a new file replaces whatever was playing.
pub trait PlaybackPort: Send {
    fn play(&mut self, path: &Path) -> Result<()>;
    fn pause(&mut self);
    fn unpause(&mut self);
    fn stop(&mut self);
    /// True while a loaded track is audibly playing. Paused and finished
    /// tracks are idle.
    fn is_busy(&self) -> bool;
    /// Volume in percent, `0..=100`.
    fn volume(&self) -> u8;
    fn set_volume(&mut self, volume: u8);
}

fn volume_gain(volume: u8) -> f32 {
    f32::from(volume.min(MAX_VOLUME)) / f32::from(MAX_VOLUME)
}

/// Plays through the system output device.
///
/// The cpal stream stays on its own holder thread for as long as the port
/// lives; only the mixer handle is shared, so the port can move between the
/// UI thread and the end-of-track monitor.
pub struct RodioPort {
    mixer: Mixer,
    sink: Option<Sink>,
    current: Option<PathBuf>,
    volume: u8,
    stream_holder: Option<StreamHolder>,
}

struct StreamHolder {
    release: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RodioPort {
    pub fn open(output: Option<&str>, volume: u8) -> Result<Self> {
        let requested = output.map(ToOwned::to_owned);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Mixer>>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(String::from("audio-output"))
            .spawn(move || match open_output_stream(requested.as_deref()) {
                Ok(stream) => {
                    if ready_tx.send(Ok(stream.mixer().clone())).is_ok() {
                        let _ = release_rx.recv();
                    }
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn audio output thread")?;

        let mixer = ready_rx
            .recv()
            .context("audio output thread exited before opening a stream")??;

        Ok(Self {
            mixer,
            sink: None,
            current: None,
            volume: volume.min(MAX_VOLUME),
            stream_holder: Some(StreamHolder {
                release: release_tx,
                handle,
            }),
        })
    }
}

impl PlaybackPort for RodioPort {
    fn play(&mut self, path: &Path) -> Result<()> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.current = None;

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;

        let sink = Sink::connect_new(&self.mixer);
        sink.set_volume(volume_gain(self.volume));
        sink.append(source);
        self.sink = Some(sink);
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn unpause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.current = None;
    }

    fn is_busy(&self) -> bool {
        match (&self.current, &self.sink) {
            (Some(_), Some(sink)) => !sink.is_paused() && !sink.empty(),
            _ => false,
        }
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        if let Some(sink) = &self.sink {
            sink.set_volume(volume_gain(self.volume));
        }
    }
}

impl Drop for RodioPort {
    fn drop(&mut self) {
        self.stop();
        if let Some(holder) = self.stream_holder.take() {
            let _ = holder.release.send(());
            let _ = holder.handle.join();
        }
    }
}

fn start_stream(builder: OutputStreamBuilder, what: &str) -> Result<OutputStream> {
    builder
        .with_error_callback(|_| {})
        .open_stream_or_fallback()
        .with_context(|| format!("failed to start {what} output stream"))
}

/// Sort key for fallback devices: sound servers before raw hardware.
fn device_rank(name: &str) -> (u8, String) {
    let lower = name.to_ascii_lowercase();
    let rank = ["pulse", "pipewire", "default"]
        .iter()
        .position(|hint| lower.contains(hint))
        .map_or(3, |idx| idx as u8);
    (rank, lower)
}

fn open_output_stream(output: Option<&str>) -> Result<OutputStream> {
    let mut stream = with_quiet_stderr(|| {
        let host = rodio::cpal::default_host();
        let find_device = |name: &str| {
            host.output_devices()
                .ok()
                .into_iter()
                .flatten()
                .find(|device| device.name().ok().as_deref() == Some(name))
        };

        if let Some(requested) = output {
            let device = find_device(requested)
                .with_context(|| format!("audio output device not found: {requested}"))?;
            let builder = OutputStreamBuilder::from_device(device)
                .context("failed to open selected output device")?;
            return start_stream(builder, "selected");
        }

        let default_err = match OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| start_stream(builder, "default"))
        {
            Ok(stream) => return Ok(stream),
            Err(err) => err,
        };

        let mut names: Vec<String> = host
            .output_devices()
            .map(|devices| devices.filter_map(|device| device.name().ok()).collect())
            .unwrap_or_default();
        names.sort_by_cached_key(|name| device_rank(name));
        names.dedup();

        for name in names {
            let opened = find_device(&name)
                .context("output device disappeared")
                .and_then(|device| {
                    OutputStreamBuilder::from_device(device)
                        .context("failed to open fallback output device")
                })
                .and_then(|builder| start_stream(builder, "fallback"));
            if let Ok(stream) = opened {
                tracing::info!(device = %name, "opened fallback output device");
                return Ok(stream);
            }
        }

        Err(default_err.context("unable to start any audio output stream"))
    })?;
    stream.log_on_drop(false);
    Ok(stream)
}

/// Points fd 2 at /dev/null until dropped; ALSA and JACK probe noise
/// would otherwise land on the terminal.
#[cfg(unix)]
struct StderrMute {
    saved: libc::c_int,
}

#[cfg(unix)]
impl StderrMute {
    fn engage() -> Option<Self> {
        let devnull = CString::new("/dev/null").ok()?;
        let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
        if saved < 0 {
            return None;
        }
        let sink = unsafe { libc::open(devnull.as_ptr(), libc::O_WRONLY) };
        if sink >= 0 {
            unsafe {
                libc::dup2(sink, libc::STDERR_FILENO);
                libc::close(sink);
            }
        }
        Some(Self { saved })
    }
}

#[cfg(unix)]
impl Drop for StderrMute {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.saved, libc::STDERR_FILENO);
            libc::close(self.saved);
        }
    }
}

#[cfg(unix)]
fn with_quiet_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let _mute = StderrMute::engage();
    operation()
}

#[cfg(not(unix))]
fn with_quiet_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

#[derive(Debug, Clone, Copy)]
enum Playhead {
    Idle,
    Rolling { since: Instant, before: Duration },
    Held(Duration),
}

impl Playhead {
    fn elapsed(self) -> Duration {
        match self {
            Self::Idle => Duration::ZERO,
            Self::Rolling { since, before } => before.saturating_add(since.elapsed()),
            Self::Held(at) => at,
        }
    }
}

/// Stand-in used when no output device can be opened. It keeps a logical
/// clock so tracks with a known length still end and advance.
pub struct NullPort {
    loaded: Option<PathBuf>,
    length: Option<Duration>,
    playhead: Playhead,
    volume: u8,
}

impl NullPort {
    pub fn new(volume: u8) -> Self {
        Self {
            loaded: None,
            length: None,
            playhead: Playhead::Idle,
            volume: volume.min(MAX_VOLUME),
        }
    }

    /// Opens and decodes `path` the way the device port would. `Ok(None)`
    /// means the container does not report a length.
    fn probe_length(path: &Path) -> Result<Option<Duration>> {
        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let decoder = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(decoder.total_duration().filter(|length| !length.is_zero()))
    }
}

impl Default for NullPort {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PlaybackPort for NullPort {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.stop();
        self.length = Self::probe_length(path)?;
        self.loaded = Some(path.to_path_buf());
        self.playhead = Playhead::Rolling {
            since: Instant::now(),
            before: Duration::ZERO,
        };
        Ok(())
    }

    fn pause(&mut self) {
        if let Playhead::Rolling { .. } = self.playhead {
            self.playhead = Playhead::Held(self.playhead.elapsed());
        }
    }

    fn unpause(&mut self) {
        if let Playhead::Held(before) = self.playhead {
            self.playhead = Playhead::Rolling {
                since: Instant::now(),
                before,
            };
        }
    }

    fn stop(&mut self) {
        self.loaded = None;
        self.length = None;
        self.playhead = Playhead::Idle;
    }

    fn is_busy(&self) -> bool {
        if self.loaded.is_none() || !matches!(self.playhead, Playhead::Rolling { .. }) {
            return false;
        }
        self.length
            .is_none_or(|length| self.playhead.elapsed() < length)
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }
}
