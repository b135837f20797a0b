use crate::audio::{NullPort, PlaybackPort, RodioPort};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::PlayerError;
use crate::events::PlayerEvent;
use crate::explorer::{Activation, EntryKind, Explorer, scan_media};
use crate::metadata::TagReader;
use crate::model::TransportState;
use crate::transport::Player;
use anyhow::{Context, Result};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::thread;
use tracing::{info, warn};

const HELP: &str = "Commands: ls | cd <dir> | play <file> | add <file|dir> | rm <key> | list | pl <key|#> | toggle | stop | next | prev | loop | shuffle | vol <+|-|0-100> | status | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    ChangeDir(String),
    Play(String),
    Add(String),
    Remove(String),
    ShowPlaylist,
    PlayFromPlaylist(String),
    Toggle,
    Stop,
    Next,
    Previous,
    CycleLoop,
    ToggleShuffle,
    VolumeUp,
    VolumeDown,
    SetVolume(u8),
    Status,
    Quit,
}

impl Command {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let input = raw.trim();
        let mut split = input.splitn(2, char::is_whitespace);
        let command = split.next().unwrap_or_default();
        let rest = split.next().unwrap_or("").trim();

        let needs_arg = |usage: &str| -> std::result::Result<String, String> {
            if rest.is_empty() {
                Err(format!("Usage: {usage}"))
            } else {
                Ok(rest.to_string())
            }
        };

        match command {
            "" => Err(String::from("No command")),
            "help" | "?" => Ok(Self::Help),
            "ls" => Ok(Self::List),
            "cd" => needs_arg("cd <dir>").map(Self::ChangeDir),
            "play" => needs_arg("play <file>").map(Self::Play),
            "add" => needs_arg("add <file|dir>").map(Self::Add),
            "rm" => needs_arg("rm <key>").map(Self::Remove),
            "list" => Ok(Self::ShowPlaylist),
            "pl" => needs_arg("pl <key|#>").map(Self::PlayFromPlaylist),
            "toggle" | "p" => Ok(Self::Toggle),
            "stop" => Ok(Self::Stop),
            "next" | "n" => Ok(Self::Next),
            "prev" | "b" => Ok(Self::Previous),
            "loop" => Ok(Self::CycleLoop),
            "shuffle" => Ok(Self::ToggleShuffle),
            "vol" => match rest {
                "+" => Ok(Self::VolumeUp),
                "-" => Ok(Self::VolumeDown),
                value => value
                    .parse::<u8>()
                    .ok()
                    .filter(|volume| *volume <= 100)
                    .map(Self::SetVolume)
                    .ok_or_else(|| String::from("Usage: vol <+|-|0-100>")),
            },
            "status" => Ok(Self::Status),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command: {other}")),
        }
    }
}

pub fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    if let Some(volume) = cli.volume {
        settings.volume = volume;
    }

    let options = settings.player_options();
    let port: Box<dyn PlaybackPort> =
        match RodioPort::open(settings.output_device.as_deref(), options.volume) {
            Ok(port) => Box::new(port),
            Err(err) => {
                warn!("audio output unavailable, using null port: {err:#}");
                Box::new(NullPort::new(options.volume))
            }
        };
    let player = Player::new(port, Box::new(TagReader), options);

    let start_dir = match cli.folder.or(settings.music_dir) {
        Some(dir) => dir,
        None => env::current_dir().context("failed to resolve the working directory")?,
    };
    let mut explorer = Explorer::open(start_dir);

    let printer = {
        let events = player.subscribe();
        thread::Builder::new()
            .name(String::from("event-printer"))
            .spawn(move || print_events(events))
            .context("failed to spawn event printer")?
    };

    if let Some(name) = cli.play {
        if let Activation::Media(path) = explorer.activate(&name) {
            player.play_song(&path)?;
        } else {
            println!("Not a playable file: {name}");
        }
    }

    println!("{HELP}");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read command")?;
        match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&player, &mut explorer, command),
            Err(message) => println!("{message}"),
        }
        stdout.flush().ok();
    }

    player.shutdown();
    drop(player);
    if printer.join().is_err() {
        warn!("event printer exited with a panic");
    }
    info!("bye");
    Ok(())
}

pub fn execute(player: &Player, explorer: &mut Explorer, command: Command) {
    match command {
        Command::Help => println!("{HELP}"),
        Command::List => print_listing(explorer),
        Command::ChangeDir(dir) => match explorer.activate(&dir) {
            Activation::Navigated => {
                if let Some(notice) = explorer.take_notice() {
                    println!("{notice}");
                }
                print_listing(explorer);
            }
            _ => println!("Not a directory: {dir}"),
        },
        Command::Play(name) => match explorer.activate(&name) {
            Activation::Media(path) => report(player.activate_file(path)),
            Activation::Navigated => print_listing(explorer),
            Activation::Ignored => println!("Not a playable file: {name}"),
        },
        Command::Add(name) => {
            let target = explorer.path().join(&name);
            let files = if target.is_dir() {
                scan_media(&target)
            } else {
                vec![target]
            };
            for file in files {
                match player.add_to_playlist(&file) {
                    Ok(Some(key)) => println!("Added {key}"),
                    Ok(None) => println!("Already in playlist: {}", file.display()),
                    Err(err) => println!("{err}"),
                }
            }
        }
        Command::Remove(key) => match player.remove_from_playlist(&key) {
            Ok(track) => println!("Removed {}", track.key()),
            Err(err) => println!("{err}"),
        },
        Command::ShowPlaylist => print_playlist(player),
        Command::PlayFromPlaylist(target) => {
            let key = resolve_playlist_key(player, &target);
            report(player.activate_playlist_entry(&key));
        }
        Command::Toggle => player.toggle_play_state(),
        Command::Stop => player.stop(),
        Command::Next => player.next_song(),
        Command::Previous => player.previous_song(),
        Command::CycleLoop => {
            player.change_loop_state();
        }
        Command::ToggleShuffle => {
            player.toggle_shuffle();
        }
        Command::VolumeUp => {
            player.increase_volume();
        }
        Command::VolumeDown => {
            player.decrease_volume();
        }
        Command::SetVolume(volume) => {
            player.set_volume(volume);
        }
        Command::Status => print_status(player),
        Command::Quit => {}
    }
}

/// Accepts either a playlist key or a 1-based row number.
fn resolve_playlist_key(player: &Player, target: &str) -> String {
    let keys = player.playlist_keys();
    match target.parse::<usize>() {
        Ok(row) if row >= 1 && row <= keys.len() && !keys.iter().any(|key| key == target) => {
            player.select_playlist_row(row - 1);
            keys[row - 1].clone()
        }
        _ => target.to_string(),
    }
}

fn report(result: crate::error::Result<()>) {
    if let Err(err) = result {
        match err {
            PlayerError::KeyNotFound(key) => println!("Not in playlist: {key}"),
            other => println!("{other}"),
        }
    }
}

fn print_listing(explorer: &Explorer) {
    println!("{}", explorer.path().display());
    for entry in explorer.entries() {
        let marker = match entry.kind {
            EntryKind::Parent | EntryKind::Directory => "[DIR]",
            EntryKind::Media => "[AUD]",
            EntryKind::Document => "     ",
        };
        println!("  {marker} {}", entry.label);
    }
}

fn print_playlist(player: &Player) {
    let keys = player.playlist_keys();
    if keys.is_empty() {
        println!("Playlist is empty");
        return;
    }
    let selected = player.playlist_selection();
    let playing = player.snapshot().current_playlist_key;
    for (idx, key) in keys.iter().enumerate() {
        let cursor = if selected == Some(idx) { '>' } else { ' ' };
        let now = if playing.as_deref() == Some(key.as_str()) {
            '*'
        } else {
            ' '
        };
        println!("{cursor}{now} {:>3}. {key}", idx + 1);
    }
}

fn print_status(player: &Player) {
    let ctx = player.snapshot();
    let state = match ctx.current_state {
        TransportState::Playing => "playing",
        TransportState::Paused => "paused",
        TransportState::Stopped => "stopped",
    };
    match &ctx.now_playing {
        Some(meta) => println!(
            "[{state}] {} - {} ({})",
            meta.title,
            meta.artist_label(),
            meta.album_label()
        ),
        None => println!("[{state}] nothing loaded"),
    }
    println!(
        "loop{} shuffle:{} volume:{}%",
        ctx.loop_mode.badge(),
        if ctx.shuffle { "on" } else { "off" },
        ctx.volume
    );
}

fn print_events(events: Receiver<PlayerEvent>) {
    for event in events {
        match event {
            PlayerEvent::NowPlaying {
                title,
                artist,
                album,
                duration,
            } => {
                let secs = duration.as_secs();
                println!(
                    "Now playing: {title} - {artist} ({album}) [{}:{:02}]",
                    secs / 60,
                    secs % 60
                );
            }
            PlayerEvent::StateChanged(state) => println!("State: {state:?}"),
            PlayerEvent::LoopModeChanged(mode) => println!("Loop: {mode:?}"),
            PlayerEvent::ShuffleChanged(on) => {
                println!("Shuffle: {}", if on { "on" } else { "off" })
            }
            PlayerEvent::PlaylistChanged { len } => println!("Playlist: {len} tracks"),
            PlayerEvent::VolumeChanged(volume) => println!("Volume: {volume}%"),
            PlayerEvent::LoadFailed { path, reason } => {
                println!("Unable to play {}: {reason}", display_name(&path))
            }
        }
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
