use clap::Parser;
use spindle::cli::Cli;
use spindle::{app, config, logging};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = config::load_settings()?;
    let _log_guard = logging::init(&config::log_dir()?, cli.dev)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting spindle");
    app::run(cli, settings)
}
