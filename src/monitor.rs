use crate::model::TransportState;
use crate::transport::Shared;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, TryLockError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// An operation held the session, or a load was in progress.
    Transitioning,
    Idle,
    TrackEnded,
}

/// Background poller that notices natural end-of-track and hands it to the
/// transport. One per player; exits once the player stops running or the
/// last player handle is gone.
pub struct EndOfTrackMonitor {
    handle: JoinHandle<()>,
}

impl EndOfTrackMonitor {
    pub(crate) fn start(shared: &Arc<Shared>) -> io::Result<Self> {
        let interval = shared.poll_interval();
        let shared = Arc::downgrade(shared);
        let handle = thread::Builder::new()
            .name(String::from("end-of-track"))
            .spawn(move || run(&shared, interval))?;
        debug!("end-of-track monitor started");
        Ok(Self { handle })
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cuts the current wait short.
    pub(crate) fn wake(&self) {
        self.handle.thread().unpark();
    }

    /// Wakes the poller early and waits for it to observe shutdown.
    pub(crate) fn join(self) {
        self.wake();
        if self.handle.join().is_err() {
            error!("end-of-track monitor exited with a panic");
        }
    }
}

fn run(shared: &Weak<Shared>, interval: Duration) {
    loop {
        thread::park_timeout(interval);
        let outcome = match shared.upgrade() {
            Some(shared) if shared.is_running() => {
                panic::catch_unwind(AssertUnwindSafe(|| tick(&shared)))
            }
            _ => break,
        };

        match outcome {
            Ok(Tick::TrackEnded) => {
                // Let the next track spin up before looking at the port again.
                thread::park_timeout(interval);
            }
            Ok(Tick::Transitioning | Tick::Idle) => {}
            Err(_) => error!("end-of-track tick panicked; monitor keeps polling"),
        }
    }
    debug!("end-of-track monitor stopped");
}

fn tick(shared: &Shared) -> Tick {
    let mut session = match shared.session().try_lock() {
        Ok(session) => session,
        Err(TryLockError::WouldBlock) => return Tick::Transitioning,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
    };

    if session.context().is_transitioning {
        return Tick::Transitioning;
    }

    if session.context().current_state == TransportState::Playing && !session.port_is_busy() {
        debug!("track reached its end");
        session.handle_song_end();
        return Tick::TrackEnded;
    }
    Tick::Idle
}
