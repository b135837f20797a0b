use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "spindle", version, about = "A terminal music player")]
pub struct Cli {
    /// Directory the file explorer opens in
    #[arg(long)]
    pub folder: Option<PathBuf>,

    /// File in the starting folder to play right away
    #[arg(long)]
    pub play: Option<String>,

    /// Initial volume, 0 to 100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: Option<u8>,

    /// Also log to stderr
    #[arg(long)]
    pub dev: bool,
}
