//! Change notifications for views bound to the player.
//!
//! Every write to an observable field of the playback context publishes one
//! event before the call that made the write returns. Subscribers receive
//! events over a plain channel, so a slow or vanished view never blocks the
//! transport.

use crate::model::{LoopMode, TransportState};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    NowPlaying {
        title: String,
        artist: String,
        album: String,
        duration: Duration,
    },
    StateChanged(TransportState),
    LoopModeChanged(LoopMode),
    ShuffleChanged(bool),
    PlaylistChanged {
        len: usize,
    },
    VolumeChanged(u8),
    /// A file could not be loaded; the transport has already moved on.
    LoadFailed {
        path: PathBuf,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: PlayerEvent) {
        // Receivers that were dropped are pruned on the next publish.
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_each_event() {
        let mut bus = EventBus::default();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(PlayerEvent::ShuffleChanged(true));

        assert_eq!(first.try_recv(), Ok(PlayerEvent::ShuffleChanged(true)));
        assert_eq!(second.try_recv(), Ok(PlayerEvent::ShuffleChanged(true)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(PlayerEvent::VolumeChanged(40));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(PlayerEvent::VolumeChanged(40)));
    }
}
