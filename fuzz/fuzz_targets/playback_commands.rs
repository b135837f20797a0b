#![no_main]

use libfuzzer_sys::fuzz_target;
use spindle::{NullPort, Player, PlayerOptions, TagReader, TransportState};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Even-numbered tracks exist as short silent WAVs; odd ones are missing,
/// so loads fail and the player has to advance past them.
fn track_dir() -> &'static PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join("spindle-fuzz-tracks");
        let _ = std::fs::create_dir_all(&dir);
        let data_len: u32 = 1_600;
        let mut wav = Vec::new();
        for chunk in [
            b"RIFF".as_slice(),
            (36 + data_len).to_le_bytes().as_slice(),
            b"WAVEfmt ".as_slice(),
            16_u32.to_le_bytes().as_slice(),
            [1, 0, 1, 0].as_slice(),
            8_000_u32.to_le_bytes().as_slice(),
            16_000_u32.to_le_bytes().as_slice(),
            [2, 0, 16, 0].as_slice(),
            b"data".as_slice(),
            data_len.to_le_bytes().as_slice(),
        ] {
            wav.extend_from_slice(chunk);
        }
        wav.resize(wav.len() + data_len as usize, 0);
        for idx in (0..16).step_by(2) {
            let _ = std::fs::write(dir.join(format!("track_{idx}.wav")), &wav);
        }
        dir
    })
}

fuzz_target!(|data: &[u8]| {
    let options = PlayerOptions {
        poll_interval: Duration::from_secs(3600),
        shuffle_seed: Some(data.len() as u64),
        ..PlayerOptions::default()
    };
    let player = Player::new(Box::new(NullPort::default()), Box::new(TagReader), options);
    let dir = track_dir();
    let len = (data.len() % 16).max(1);
    for idx in 0..len {
        let _ = player.add_to_playlist(dir.join(format!("track_{idx}.wav")));
    }

    for byte in data {
        let key = format!("track_{}", usize::from(byte >> 4) % len);
        match byte % 10 {
            0 => player.next_song(),
            1 => player.previous_song(),
            2 => player.toggle_play_state(),
            3 => {
                player.change_loop_state();
            }
            4 => {
                player.toggle_shuffle();
            }
            5 => {
                let _ = player.play_from_playlist(&key);
            }
            6 => {
                let _ = player.remove_from_playlist(&key);
            }
            7 => {
                let _ = player.add_to_playlist(dir.join(format!("{key}.wav")));
            }
            8 => player.handle_song_end(),
            _ => {
                let _ = player.activate_playlist_entry(&key);
            }
        }

        let ctx = player.snapshot();
        assert!(!ctx.is_transitioning);
        if ctx.current_state == TransportState::Playing {
            assert!(ctx.current_track.is_some());
        }
    }
    player.shutdown();
});
