#![forbid(unsafe_code)]

//! Folds `<name>.<lang>.ass` subtitles into their `<name>.mp4` videos as
//! `<name>.mkv`, for every pairing under a directory (default: the current
//! one).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tubedl_tools::{
    config::{Config, PathOverrides},
    logging,
    merge::{self, Ffmpeg, MergeOutcome},
};

#[derive(Debug, Parser)]
#[command(name = "merge_subs", version, about = "Merge .ass subtitles into .mp4 videos")]
struct Args {
    #[arg(default_value = ".")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(PathOverrides::default()).context("loading configuration")?;
    logging::init(&config.settings.log_level, None)?;

    let ffmpeg = Ffmpeg::new(&config.settings.ffmpeg);
    let report = merge::merge_dir(&args.dir, &ffmpeg, || false)
        .with_context(|| format!("merging subtitles under {}", args.dir.display()))?;

    for (pairing, outcome) in &report.outcomes {
        match outcome {
            MergeOutcome::Merged { .. } => println!("{}", pairing.output().display()),
            MergeOutcome::Failed(err) => {
                eprintln!("Failed to merge {}: {err}", pairing.video.display())
            }
            MergeOutcome::OutputMissing => {
                eprintln!("No output was written for {}", pairing.video.display())
            }
            MergeOutcome::OutputExists => {
                println!("{} already exists, skipped", pairing.output().display())
            }
        }
    }
    for subtitle in &report.unpaired {
        println!("No video for {}", subtitle.display());
    }
    println!(
        "Merged {} of {} pairings ({} failed)",
        report.merged(),
        report.outcomes.len(),
        report.failed()
    );
    Ok(())
}
