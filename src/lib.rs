pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod explorer;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod monitor;
pub mod playlist;
pub mod transport;

pub use audio::{NullPort, PlaybackPort, RodioPort};
pub use error::{PlayerError, Result};
pub use events::PlayerEvent;
pub use metadata::{MetadataReader, TagReader};
pub use model::{LoopMode, PlaybackContext, TrackMetadata, TrackRef, TransportState};
pub use transport::{Player, PlayerOptions};
