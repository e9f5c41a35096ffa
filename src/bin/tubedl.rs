#![forbid(unsafe_code)]

//! Interactive batch downloader. Without arguments it opens the shell; with
//! arguments it runs them as comma-separated commands and exits, e.g.
//! `tubedl cd ~/Videos, getall, merge`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tubedl_tools::{
    config::{Config, PathOverrides},
    interrupt::Interrupt,
    logging,
    merge::Ffmpeg,
    prompt::StdinPrompt,
    shell::Shell,
    ytdlp::YtDlp,
};

#[derive(Debug, Parser)]
#[command(name = "tubedl", version, about = "Queue and download videos with yt-dlp")]
struct Cli {
    /// Application directory (default: $TUBEDL_HOME or ~/.tubedl).
    #[arg(long)]
    app_dir: Option<PathBuf>,
    /// Configuration file to read instead of <app dir>/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    queue_file: Option<PathBuf>,
    #[arg(long)]
    history_file: Option<PathBuf>,
    /// Commands to run instead of the interactive shell.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(PathOverrides {
        app_dir: cli.app_dir,
        config_file: cli.config,
        queue_file: cli.queue_file,
        history_file: cli.history_file,
    })
    .context("loading configuration")?;
    logging::init(&config.settings.log_level, Some(&config.paths.debug_log))?;
    tracing::debug!(app_dir = %config.paths.app_dir.display(), "starting");

    let ytdlp = YtDlp::new(&config.settings.ytdlp);
    ytdlp.warn_if_missing();
    let ffmpeg = Ffmpeg::new(&config.settings.ffmpeg);

    let interrupt = Interrupt::new();
    let listener = interrupt.listen();

    let mut shell = Shell::new(config, ytdlp, ffmpeg, StdinPrompt, interrupt);
    shell.startup()?;
    let result = if cli.commands.is_empty() {
        shell.repl().await
    } else {
        shell.run_script(&cli.commands).await
    };

    listener.abort();
    result
}
