#![forbid(unsafe_code)]

//! Batch video downloading around `yt-dlp`, plus subtitle merging via
//! `ffmpeg`. The binaries in `src/bin` are thin wrappers over these modules.

pub mod config;
pub mod info;
pub mod interrupt;
pub mod langtag;
pub mod logging;
pub mod merge;
pub mod outcome;
pub mod params;
pub mod prompt;
pub mod shell;
pub mod store;
pub mod tidy;
pub mod urls;
pub mod ytdlp;
