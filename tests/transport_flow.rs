mod common;

use common::{CannedReader, PortCall, player, quiet_options, two_song_player};
use proptest::prop_assert;
use proptest::prop_assert_eq;
use spindle::{LoopMode, PlayerError, PlayerEvent, PlayerOptions, TransportState};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn next_song_moves_to_the_following_entry() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");

    player.next_song();

    let ctx = player.snapshot();
    assert_eq!(
        script.played(),
        vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]
    );
    assert_eq!(ctx.current_playlist_key.as_deref(), Some("Song B"));
    assert_eq!(ctx.current_state, TransportState::Playing);
    player.shutdown();
}

#[test]
fn next_song_wraps_under_repeat_all() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song B").expect("key exists");
    player.change_loop_state();
    assert_eq!(player.change_loop_state(), LoopMode::RepeatAll);

    player.next_song();

    assert_eq!(script.played().last(), Some(&PathBuf::from("a.mp3")));
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song A")
    );
    player.shutdown();
}

#[test]
fn next_song_past_the_end_stops() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song B").expect("key exists");

    player.next_song();

    let ctx = player.snapshot();
    assert_eq!(ctx.current_state, TransportState::Stopped);
    assert_eq!(script.played(), vec![PathBuf::from("b.mp3")]);
    assert_eq!(script.calls().last(), Some(&PortCall::Stop));
    player.shutdown();
}

#[test]
fn failed_load_reports_and_never_plays() {
    let (player, script) = player(CannedReader::default(), quiet_options());
    script.break_path("missing.mp3");
    let events = player.subscribe();

    player.play_song("missing.mp3").expect("non-empty path");

    let ctx = player.snapshot();
    assert_eq!(ctx.current_state, TransportState::Stopped);
    assert!(!ctx.is_transitioning);
    assert!(script.played().is_empty());

    let seen: Vec<PlayerEvent> = events.try_iter().collect();
    assert!(seen.iter().any(|event| matches!(
        event,
        PlayerEvent::LoadFailed { path, .. } if path == &PathBuf::from("missing.mp3")
    )));
    assert!(!seen.contains(&PlayerEvent::StateChanged(TransportState::Playing)));
}

#[test]
fn next_after_removing_the_playing_entry_falls_back() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");
    player.remove_from_playlist("Song A").expect("removed");

    player.next_song();
    assert_eq!(player.snapshot().current_state, TransportState::Stopped);

    player.play_from_playlist("Song B").expect("key exists");
    player.remove_from_playlist("Song B").expect("removed");
    player.add_to_playlist("a.mp3").expect("add");
    player.change_loop_state();
    player.change_loop_state();

    player.next_song();

    let ctx = player.snapshot();
    assert_eq!(ctx.current_playlist_key.as_deref(), Some("Song A"));
    assert_eq!(ctx.current_state, TransportState::Playing);
    assert_eq!(script.played().last(), Some(&PathBuf::from("a.mp3")));
    player.shutdown();
}

#[test]
fn failed_file_during_playlist_playback_advances_the_playlist() {
    let (player, script) = two_song_player();
    script.break_path("bad.mp3");
    player.play_from_playlist("Song A").expect("key exists");

    player.play_song("bad.mp3").expect("non-empty path");

    let ctx = player.snapshot();
    assert!(ctx.playing_from_playlist);
    assert_eq!(ctx.current_state, TransportState::Playing);
    assert_eq!(ctx.current_playlist_key.as_deref(), Some("Song B"));
    assert_eq!(
        script.played(),
        vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]
    );
    player.shutdown();
}

#[test]
fn failed_load_keeps_the_loaded_track_context() {
    let (player, script) = player(CannedReader::default(), quiet_options());
    script.break_path("bad.mp3");
    player.play_song("good.mp3").expect("play");
    player.change_loop_state();

    player.play_song("bad.mp3").expect("non-empty path");

    let ctx = player.snapshot();
    assert!(!ctx.playing_from_playlist);
    assert_eq!(
        ctx.current_track.as_ref().map(|track| track.path().to_path_buf()),
        Some(PathBuf::from("good.mp3"))
    );
    assert_eq!(script.played(), vec![PathBuf::from("good.mp3"); 2]);
    player.shutdown();
}

#[test]
fn thousands_of_broken_entries_stop_without_exhausting_the_stack() {
    const ENTRIES: usize = 5_000;

    let worker = thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let (player, script) = player(CannedReader::default(), quiet_options());
            for idx in 0..ENTRIES {
                let path = format!("t{idx}.opus");
                script.break_path(path.as_str());
                player.add_to_playlist(&path).expect("add");
            }
            player.change_loop_state();
            player.change_loop_state();
            let events = player.subscribe();

            player.play_from_playlist("t0").expect("key exists");

            let failures = events
                .try_iter()
                .filter(|event| matches!(event, PlayerEvent::LoadFailed { .. }))
                .count();
            (player.snapshot(), failures, script.played().len())
        })
        .expect("spawn");

    let (ctx, failures, played) = worker.join().expect("worker finished");
    assert_eq!(ctx.current_state, TransportState::Stopped);
    assert!(!ctx.is_transitioning);
    assert_eq!(failures, ENTRIES);
    assert_eq!(played, 0);
}

#[test]
fn previous_song_steps_back_and_wraps_under_repeat_all() {
    let reader = CannedReader::default()
        .with("a.mp3", "Song A", None)
        .with("b.mp3", "Song B", None)
        .with("c.mp3", "Song C", None);
    let (player, script) = player(reader, quiet_options());
    for path in ["a.mp3", "b.mp3", "c.mp3"] {
        player.add_to_playlist(path).expect("add");
    }
    player.play_from_playlist("Song B").expect("key exists");

    player.previous_song();
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song A")
    );

    player.change_loop_state();
    player.change_loop_state();
    player.previous_song();
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song C")
    );
    assert_eq!(
        script.played(),
        vec![
            PathBuf::from("b.mp3"),
            PathBuf::from("a.mp3"),
            PathBuf::from("c.mp3")
        ]
    );
    player.shutdown();
}

#[test]
fn previous_song_at_the_start_stops_without_repeat() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");

    player.previous_song();

    assert_eq!(player.snapshot().current_state, TransportState::Stopped);
    assert_eq!(script.played(), vec![PathBuf::from("a.mp3")]);
    player.shutdown();
}

#[test]
fn removing_an_unknown_key_is_reported() {
    let (player, _) = two_song_player();
    assert!(matches!(
        player.remove_from_playlist("Nope"),
        Err(PlayerError::KeyNotFound(key)) if key == "Nope"
    ));
    assert_eq!(player.playlist_keys(), vec!["Song A", "Song B"]);
}

#[test]
fn adding_the_same_song_twice_keeps_one_entry() {
    let reader = CannedReader::default()
        .with("a.mp3", "Song A", Some("Band"))
        .with("copy/a.mp3", "Song A", Some("Band"));
    let (player, _) = player(reader, quiet_options());

    assert_eq!(
        player.add_to_playlist("a.mp3").expect("add"),
        Some(String::from("Song A ~ Band"))
    );
    assert_eq!(player.add_to_playlist("copy/a.mp3").expect("add"), None);
    assert_eq!(player.playlist_keys(), vec!["Song A ~ Band"]);
}

#[test]
fn repeat_one_replays_in_both_directions() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");
    assert_eq!(player.change_loop_state(), LoopMode::RepeatOne);

    player.next_song();
    player.previous_song();

    assert_eq!(script.played(), vec![PathBuf::from("a.mp3"); 3]);
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song A")
    );
    player.shutdown();
}

#[test]
fn song_end_outside_playlist_only_changes_state() {
    let (player, _) = player(CannedReader::default(), quiet_options());
    player.play_song("single.mp3").expect("play");
    let before = player.snapshot();
    assert_eq!(before.current_state, TransportState::Playing);

    player.handle_song_end();

    let after = player.snapshot();
    assert_eq!(after.current_state, TransportState::Stopped);
    assert_eq!(
        spindle::PlaybackContext {
            current_state: TransportState::Playing,
            ..after
        },
        before
    );
    player.shutdown();
}

#[test]
fn song_end_while_paused_is_ignored() {
    let (player, script) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");
    player.toggle_play_state();

    player.handle_song_end();

    assert_eq!(player.snapshot().current_state, TransportState::Paused);
    assert_eq!(script.played().len(), 1);
    player.shutdown();
}

#[test]
fn song_end_with_empty_playlist_stops() {
    let (player, _) = two_song_player();
    player.play_from_playlist("Song A").expect("key exists");
    player.change_loop_state();
    player.change_loop_state();
    player.remove_from_playlist("Song A").expect("removed");
    player.remove_from_playlist("Song B").expect("removed");

    player.handle_song_end();

    assert_eq!(player.snapshot().current_state, TransportState::Stopped);
    player.shutdown();
}

#[test]
fn toggle_from_stopped_resumes_the_same_file() {
    let reader = CannedReader::default().with("x.mp3", "Exact", Some("Artist"));
    let (player, script) = player(reader, quiet_options());
    player.play_song("x.mp3").expect("play");
    player.stop();
    assert_eq!(player.snapshot().current_state, TransportState::Stopped);

    player.toggle_play_state();

    let ctx = player.snapshot();
    assert_eq!(ctx.current_state, TransportState::Playing);
    assert_eq!(script.played(), vec![PathBuf::from("x.mp3"); 2]);
    assert_eq!(
        ctx.now_playing.map(|meta| meta.title),
        Some(String::from("Exact"))
    );
    player.shutdown();
}

#[test]
fn toggle_pauses_and_unpauses_the_port() {
    let (player, script) = player(CannedReader::default(), quiet_options());
    player.play_song("x.mp3").expect("play");

    player.toggle_play_state();
    player.toggle_play_state();

    assert_eq!(
        script.calls(),
        vec![
            PortCall::Play(PathBuf::from("x.mp3")),
            PortCall::Pause,
            PortCall::Unpause
        ]
    );
    assert_eq!(player.snapshot().current_state, TransportState::Playing);
    player.shutdown();
}

#[test]
fn observers_hear_each_change_in_order() {
    let reader = CannedReader::default().with("a.mp3", "Song A", Some("Band"));
    let (player, _) = player(reader, quiet_options());
    let events = player.subscribe();

    player.add_to_playlist("a.mp3").expect("add");
    player.play_from_playlist("Song A ~ Band").expect("key exists");
    player.change_loop_state();
    player.toggle_shuffle();
    player.toggle_play_state();

    let seen: Vec<PlayerEvent> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            PlayerEvent::PlaylistChanged { len: 1 },
            PlayerEvent::NowPlaying {
                title: String::from("Song A"),
                artist: String::from("Band"),
                album: String::from(spindle::model::UNKNOWN_ALBUM),
                duration: Duration::from_secs(180),
            },
            PlayerEvent::StateChanged(TransportState::Playing),
            PlayerEvent::LoopModeChanged(LoopMode::RepeatOne),
            PlayerEvent::ShuffleChanged(true),
            PlayerEvent::StateChanged(TransportState::Paused),
        ]
    );
    player.shutdown();
}

#[test]
fn monitor_advances_when_the_track_drains() {
    let options = PlayerOptions {
        poll_interval: Duration::from_millis(10),
        ..quiet_options()
    };
    let reader = CannedReader::default()
        .with("a.mp3", "Song A", None)
        .with("b.mp3", "Song B", None);
    let (player, script) = player(reader, options);
    player.add_to_playlist("a.mp3").expect("add");
    player.add_to_playlist("b.mp3").expect("add");
    player.play_from_playlist("Song A").expect("key exists");
    assert!(player.is_monitor_running());

    script.finish_track();
    assert!(wait_until(|| script.played().len() == 2));
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song B")
    );

    script.finish_track();
    assert!(wait_until(
        || player.snapshot().current_state == TransportState::Stopped
    ));
    assert_eq!(script.played().len(), 2);

    player.shutdown();
    assert!(!player.is_monitor_running());
}

#[test]
fn monitor_keeps_polling_after_a_panicking_tick() {
    let options = PlayerOptions {
        poll_interval: Duration::from_millis(10),
        ..quiet_options()
    };
    let reader = CannedReader::default()
        .with("a.mp3", "Song A", None)
        .with("b.mp3", "Song B", None);
    let (player, script) = player(reader, options);
    player.add_to_playlist("a.mp3").expect("add");
    player.add_to_playlist("b.mp3").expect("add");
    player.play_from_playlist("Song A").expect("key exists");

    script.panic_on_next_poll();
    assert!(wait_until(|| !script.panics_pending()));
    assert!(player.is_monitor_running());

    script.finish_track();
    assert!(wait_until(|| script.played().len() == 2));
    assert_eq!(
        player.snapshot().current_playlist_key.as_deref(),
        Some("Song B")
    );
    player.shutdown();
}

#[test]
fn monitor_leaves_a_paused_track_alone() {
    let options = PlayerOptions {
        poll_interval: Duration::from_millis(10),
        ..quiet_options()
    };
    let (player, script) = player(CannedReader::default(), options);
    player.play_song("x.mp3").expect("play");
    player.toggle_play_state();

    thread::sleep(Duration::from_millis(80));

    assert_eq!(player.snapshot().current_state, TransportState::Paused);
    assert_eq!(script.played().len(), 1);
    player.shutdown();
}

proptest::proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(48))]

    #[test]
    fn repeat_all_cycles_back_to_the_start(len in 1usize..8, start in 0usize..8) {
        let start = start % len;
        let (player, script) = player(CannedReader::default(), quiet_options());
        for idx in 0..len {
            player.add_to_playlist(format!("t{idx}.mp3")).expect("add");
        }
        player.change_loop_state();
        player.change_loop_state();
        player.play_from_playlist(&format!("t{start}")).expect("key exists");

        for step in 1..=len {
            player.next_song();
            let expected = format!("t{}", (start + step) % len);
            let snapshot = player.snapshot();
            prop_assert_eq!(
                snapshot.current_playlist_key.as_deref(),
                Some(expected.as_str())
            );
        }
        prop_assert_eq!(script.played().len(), len + 1);
        player.shutdown();
    }

    #[test]
    fn random_operations_never_leave_a_load_half_done(
        ops in proptest::collection::vec(0u8..10, 1..80),
    ) {
        let (player, script) = player(CannedReader::default(), quiet_options());
        script.break_path("t3.mp3");
        for idx in 0..5 {
            player.add_to_playlist(format!("t{idx}.mp3")).expect("add");
        }

        for op in ops {
            match op {
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
                    let _ = player.play_from_playlist("t1");
                }
                6 => player.handle_song_end(),
                7 => {
                    let _ = player.remove_from_playlist("t2");
                }
                8 => {
                    player.add_to_playlist("t2.mp3").expect("add");
                }
                _ => player.stop(),
            }

            let ctx = player.snapshot();
            prop_assert!(!ctx.is_transitioning);
            if ctx.current_state != TransportState::Stopped {
                prop_assert!(ctx.current_track.is_some());
            }
            if let Some(track) = &ctx.current_track {
                prop_assert!(track.path() != std::path::Path::new("t3.mp3"));
            }
        }
        player.shutdown();
    }
}
