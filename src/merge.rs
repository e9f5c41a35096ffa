//! Folding `.ass` subtitles into their `.mp4` videos.
//!
//! A subtitle pairs with a video when its name is the video's stem plus a
//! language tag, e.g. `show.en-US.ass` next to `show.mp4`. Each pairing is
//! remuxed into `show.mkv` with every stream copied and the subtitle tagged
//! with its ISO 639-3 code; the originals are removed once the new file
//! exists.

use crate::langtag::LanguageTag;
use crate::outcome::BestEffort;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use walkdir::WalkDir;

pub const VIDEO_EXT: &str = "mp4";
pub const SUBTITLE_EXT: &str = "ass";
pub const OUTPUT_EXT: &str = "mkv";
pub const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("external tool is missing: {tool}")]
    ToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("language tag {tag} on {} has no three-letter code", .path.display())]
    UnmappedLanguage { path: PathBuf, tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub tag: String,
    /// ISO 639-3 code written into the subtitle stream's metadata.
    pub language: &'static str,
}

impl Pairing {
    pub fn output(&self) -> PathBuf {
        self.video.with_extension(OUTPUT_EXT)
    }
}

#[derive(Debug, Default)]
pub struct Scan {
    pub pairings: Vec<Pairing>,
    /// Subtitles without a valid language tag; never paired.
    pub untagged: Vec<PathBuf>,
    /// Tagged subtitles with no free video to pair with.
    pub unpaired: Vec<PathBuf>,
}

/// First dot-separated component between the stem and the extension that is
/// a valid language tag. The extension itself is never considered.
pub fn language_suffix(subtitle: &Path) -> Option<LanguageTag> {
    let name = subtitle.file_name()?.to_str()?;
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 3 {
        return None;
    }
    parts[1..parts.len() - 1]
        .iter()
        .find_map(|part| LanguageTag::parse(part).ok())
}

/// The video a subtitle belongs to: its stem without `.<tag>`, as `.mp4`.
pub fn expected_video(subtitle: &Path, tag: &LanguageTag) -> Option<PathBuf> {
    let stem = subtitle.file_stem()?.to_str()?;
    let base = stem.strip_suffix(&format!(".{}", tag.as_str())).unwrap_or(stem);
    Some(subtitle.with_file_name(format!("{base}.{VIDEO_EXT}")))
}

fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(ext))
        .map(|entry| entry.into_path())
        .collect()
}

/// Pairs every video under `root` with at most one subtitle. Walks are
/// sorted by file name, so when several subtitles fit the same video the
/// lexically first one wins.
pub fn scan(root: &Path) -> Result<Scan, MergeError> {
    let videos: HashSet<PathBuf> = files_with_extension(root, VIDEO_EXT).into_iter().collect();
    let mut paired: HashSet<PathBuf> = HashSet::new();
    let mut scan = Scan::default();

    for subtitle in files_with_extension(root, SUBTITLE_EXT) {
        let Some(tag) = language_suffix(&subtitle) else {
            tracing::warn!(
                "missing a language code (i.e. en-US) on {}",
                subtitle.display()
            );
            scan.untagged.push(subtitle);
            continue;
        };
        let Some(video) = expected_video(&subtitle, &tag) else {
            scan.unpaired.push(subtitle);
            continue;
        };
        if !videos.contains(&video) || paired.contains(&video) {
            scan.unpaired.push(subtitle);
            continue;
        }

        let language = tag.to_alpha3().map_err(|_| MergeError::UnmappedLanguage {
            path: subtitle.clone(),
            tag: tag.as_str().to_string(),
        })?;
        paired.insert(video.clone());
        scan.pairings.push(Pairing {
            video,
            subtitle,
            tag: tag.as_str().to_string(),
            language,
        });
    }
    Ok(scan)
}

/// Remuxes one video and subtitle into `output`.
pub trait Muxer {
    fn mux(
        &self,
        video: &Path,
        subtitle: &Path,
        language: &str,
        output: &Path,
    ) -> Result<(), MergeError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Copies the video's video and audio streams, drops its subtitle and data
/// streams and adds the subtitle as the only subtitle stream. `-n` keeps an
/// existing output untouched, so callers clear partial output between
/// attempts.
pub fn mux_args(video: &Path, subtitle: &Path, language: &str, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-nostdin", "-n", "-v", "warning", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(video.into());
    args.push("-i".into());
    args.push(subtitle.into());
    for arg in [
        "-map",
        "0",
        "-c:v",
        "copy",
        "-c:a",
        "copy",
        "-map",
        "-0:s",
        "-map",
        "-0:d",
        "-c:s",
        "copy",
        "-map",
        "1:0",
        "-metadata:s:s:0",
    ] {
        args.push(arg.into());
    }
    args.push(format!("language={language}").into());
    args.push(output.into());
    args
}

impl Muxer for Ffmpeg {
    fn mux(
        &self,
        video: &Path,
        subtitle: &Path,
        language: &str,
        output: &Path,
    ) -> Result<(), MergeError> {
        let tool = self.program.display().to_string();
        tracing::debug!(video = %video.display(), subtitle = %subtitle.display(), language, "running ffmpeg");
        let result = Command::new(&self.program)
            .args(mux_args(video, subtitle, language, output))
            .stdin(Stdio::null())
            .output()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => MergeError::ToolMissing { tool: tool.clone() },
                _ => MergeError::Io(err),
            })?;

        if !result.status.success() {
            return Err(MergeError::ToolFailed {
                tool,
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum MergeOutcome {
    /// The new container exists; removing each original is best effort
    /// since a player may still hold it open.
    Merged {
        video: BestEffort<()>,
        subtitle: BestEffort<()>,
    },
    /// Every attempt failed, or the user stopped the merge. The originals
    /// are untouched and no partial output is left behind.
    Failed(MergeError),
    /// The muxer reported success but left no output behind.
    OutputMissing,
    /// An output already existed before the merge; nothing was touched.
    OutputExists,
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged { .. })
    }
}

fn remove_original(path: &Path) -> BestEffort<()> {
    match fs::remove_file(path) {
        Ok(()) => BestEffort::Done(()),
        Err(err) => BestEffort::Skipped(format!("could not remove {}: {err}", path.display())),
    }
}

fn discard_partial(output: &Path) {
    if output.exists()
        && let BestEffort::Skipped(reason) = remove_original(output)
    {
        tracing::warn!(%reason, "partial output left behind");
    }
}

/// Runs the muxer up to [`MAX_ATTEMPTS`] times, then cleans up on success.
/// `stop` is polled after each failed attempt; once it returns true no
/// retry is made. Partial output from a failed attempt is removed.
pub fn merge_pairing(
    muxer: &dyn Muxer,
    pairing: &Pairing,
    stop: &mut dyn FnMut() -> bool,
) -> MergeOutcome {
    let output = pairing.output();
    if output.exists() {
        tracing::info!(output = %output.display(), "output already exists, skipping");
        return MergeOutcome::OutputExists;
    }

    let mut last_error = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match muxer.mux(&pairing.video, &pairing.subtitle, pairing.language, &output) {
            Ok(()) => {
                last_error = None;
                break;
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    video = %pairing.video.display(),
                    error = %err,
                    "merge attempt failed"
                );
                discard_partial(&output);
                last_error = Some(err);
                if stop() {
                    break;
                }
            }
        }
    }
    if let Some(err) = last_error {
        return MergeOutcome::Failed(err);
    }
    if !output.is_file() {
        return MergeOutcome::OutputMissing;
    }

    let video = remove_original(&pairing.video);
    let subtitle = remove_original(&pairing.subtitle);
    for cleanup in [&video, &subtitle] {
        if let BestEffort::Skipped(reason) = cleanup {
            tracing::info!(%reason, "leaving original in place");
        }
    }
    MergeOutcome::Merged { video, subtitle }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub outcomes: Vec<(Pairing, MergeOutcome)>,
    pub untagged: Vec<PathBuf>,
    pub unpaired: Vec<PathBuf>,
    /// The user stopped the batch; later pairings were not attempted.
    pub interrupted: bool,
}

impl MergeReport {
    pub fn merged(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_merged()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| {
                matches!(outcome, MergeOutcome::Failed(_) | MergeOutcome::OutputMissing)
            })
            .count()
    }
}

/// Scans `root` and merges every pairing found, one after another, until
/// `stop` returns true. The report then covers the pairings tried so far.
pub fn merge_dir(
    root: &Path,
    muxer: &dyn Muxer,
    mut stop: impl FnMut() -> bool,
) -> Result<MergeReport, MergeError> {
    let scan = scan(root)?;
    let mut report = MergeReport {
        outcomes: Vec::with_capacity(scan.pairings.len()),
        untagged: scan.untagged,
        unpaired: scan.unpaired,
        interrupted: false,
    };
    let mut stopped = false;
    let mut check = || {
        if !stopped && stop() {
            stopped = true;
        }
        stopped
    };
    for pairing in scan.pairings {
        let outcome = merge_pairing(muxer, &pairing, &mut check);
        report.outcomes.push((pairing, outcome));
        if check() {
            tracing::info!(merged = report.merged(), "merge stopped by user");
            report.interrupted = true;
            break;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tempfile::tempdir;

    /// Fails the first `failures` calls, then writes the output file.
    #[derive(Default)]
    struct FakeMuxer {
        failures: Cell<usize>,
        write_output: bool,
        calls: RefCell<Vec<(PathBuf, PathBuf, String)>>,
    }

    impl FakeMuxer {
        fn succeeding() -> Self {
            Self {
                write_output: true,
                ..Self::default()
            }
        }

        fn failing(failures: usize) -> Self {
            Self {
                failures: Cell::new(failures),
                write_output: true,
                ..Self::default()
            }
        }
    }

    impl Muxer for FakeMuxer {
        fn mux(
            &self,
            video: &Path,
            subtitle: &Path,
            language: &str,
            output: &Path,
        ) -> Result<(), MergeError> {
            self.calls.borrow_mut().push((
                video.to_path_buf(),
                subtitle.to_path_buf(),
                language.to_string(),
            ));
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(MergeError::ToolFailed {
                    tool: "ffmpeg".into(),
                    code: Some(1),
                    stderr: "boom".into(),
                });
            }
            if self.write_output {
                fs::write(output, "mkv")?;
            }
            Ok(())
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn suffix_skips_invalid_parts_and_the_extension() {
        let tag = language_suffix(Path::new("my.show.en-US.ass")).unwrap();
        assert_eq!(tag.as_str(), "en-US");
        assert!(language_suffix(Path::new("episode.xx.ass")).is_none());
        assert!(language_suffix(Path::new("episode.ass")).is_none());

        let video = expected_video(Path::new("/v/my.show.en-US.ass"), &tag).unwrap();
        assert_eq!(video, PathBuf::from("/v/my.show.mp4"));
    }

    #[test]
    fn first_valid_subtitle_wins_a_tie() {
        let dir = tempdir().unwrap();
        for name in ["show.mp4", "show.en-US.ass", "show.ja.ass"] {
            touch(&dir.path().join(name));
        }
        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.pairings.len(), 1);
        let pairing = &scan.pairings[0];
        assert_eq!(pairing.video, dir.path().join("show.mp4"));
        assert_eq!(pairing.subtitle, dir.path().join("show.en-US.ass"));
        assert_eq!(pairing.language, "eng");
        assert_eq!(scan.unpaired, vec![dir.path().join("show.ja.ass")]);
    }

    #[test]
    fn invalid_tag_is_reported_and_never_paired() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("episode.mp4"));
        touch(&dir.path().join("episode.xx.ass"));
        let scan = scan(dir.path()).unwrap();
        assert!(scan.pairings.is_empty());
        assert_eq!(scan.untagged, vec![dir.path().join("episode.xx.ass")]);
    }

    #[test]
    fn pairs_across_subdirectories_only_with_siblings() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("S01").join("ep1.mp4"));
        touch(&dir.path().join("S01").join("ep1.ja.ass"));
        touch(&dir.path().join("S02").join("ep1.en.ass"));
        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.pairings.len(), 1);
        assert_eq!(scan.pairings[0].language, "jpn");
        assert_eq!(scan.unpaired, vec![dir.path().join("S02").join("ep1.en.ass")]);
    }

    #[test]
    fn private_use_tag_aborts_before_muxing() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("show.mp4"));
        touch(&dir.path().join("show.qab.ass"));
        let muxer = FakeMuxer::succeeding();
        let err = merge_dir(dir.path(), &muxer, || false).unwrap_err();
        assert!(matches!(err, MergeError::UnmappedLanguage { ref tag, .. } if tag == "qab"));
        assert!(muxer.calls.borrow().is_empty());
        assert!(dir.path().join("show.mp4").exists());
    }

    #[test]
    fn successful_merge_replaces_originals() {
        let dir = tempdir().unwrap();
        for name in ["show.mp4", "show.en-US.ass"] {
            touch(&dir.path().join(name));
        }
        let muxer = FakeMuxer::failing(1);
        let report = merge_dir(dir.path(), &muxer, || false).unwrap();
        assert_eq!(report.merged(), 1);
        assert_eq!(muxer.calls.borrow().len(), 2);
        assert!(dir.path().join("show.mkv").is_file());
        assert!(!dir.path().join("show.mp4").exists());
        assert!(!dir.path().join("show.en-US.ass").exists());
    }

    #[test]
    fn two_failures_leave_originals_alone() {
        let dir = tempdir().unwrap();
        for name in ["show.mp4", "show.en-US.ass"] {
            touch(&dir.path().join(name));
        }
        let muxer = FakeMuxer::failing(2);
        let report = merge_dir(dir.path(), &muxer, || false).unwrap();
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.outcomes[0].1, MergeOutcome::Failed(_)));
        assert_eq!(muxer.calls.borrow().len(), MAX_ATTEMPTS);
        assert!(!dir.path().join("show.mkv").exists());
        assert!(dir.path().join("show.mp4").exists());
        assert!(dir.path().join("show.en-US.ass").exists());
    }

    #[test]
    fn stop_request_ends_retries_and_the_batch() {
        let dir = tempdir().unwrap();
        for name in ["a.mp4", "a.en.ass", "b.mp4", "b.en.ass", "c.mp4", "c.en.ass"] {
            touch(&dir.path().join(name));
        }
        let muxer = FakeMuxer::failing(10);
        let report = merge_dir(dir.path(), &muxer, || true).unwrap();

        assert!(report.interrupted);
        assert_eq!(muxer.calls.borrow().len(), 1);
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(report.outcomes[0].1, MergeOutcome::Failed(_)));
        assert!(dir.path().join("b.mp4").exists());
    }

    #[test]
    fn missing_output_keeps_originals() {
        let dir = tempdir().unwrap();
        for name in ["show.mp4", "show.en.ass"] {
            touch(&dir.path().join(name));
        }
        let muxer = FakeMuxer::default();
        let report = merge_dir(dir.path(), &muxer, || false).unwrap();
        assert!(matches!(report.outcomes[0].1, MergeOutcome::OutputMissing));
        assert!(dir.path().join("show.mp4").exists());
    }

    #[test]
    fn vanished_original_is_a_benign_skip() {
        let dir = tempdir().unwrap();
        assert!(remove_original(&dir.path().join("gone.mp4")).is_skipped());
    }

    #[test]
    fn ffmpeg_arguments_copy_streams_and_tag_language() {
        let args = mux_args(
            Path::new("a.mp4"),
            Path::new("a.en.ass"),
            "eng",
            Path::new("a.mkv"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args.join(" "),
            "-nostdin -n -v warning -i a.mp4 -i a.en.ass -map 0 -c:v copy -c:a copy \
             -map -0:s -map -0:d -c:s copy -map 1:0 -metadata:s:s:0 language=eng a.mkv"
        );
    }

    #[cfg(unix)]
    #[test]
    fn ffmpeg_stub_failure_carries_stderr() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let script = dir.path().join("ffmpeg");
        fs::write(&script, "#!/usr/bin/env bash\necho 'Invalid data found' >&2\nexit 1\n")?;
        let mut perms = fs::metadata(&script)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms)?;

        let err = Ffmpeg::new(&script)
            .mux(Path::new("a.mp4"), Path::new("a.en.ass"), "eng", &dir.path().join("a.mkv"))
            .unwrap_err();
        match err {
            MergeError::ToolFailed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "Invalid data found");
            }
            other => panic!("unexpected error: {other}"),
        }

        let missing = Ffmpeg::new(dir.path().join("nope"))
            .mux(Path::new("a.mp4"), Path::new("a.en.ass"), "eng", &dir.path().join("a.mkv"))
            .unwrap_err();
        assert!(matches!(missing, MergeError::ToolMissing { .. }));
        Ok(())
    }

    /// Installs an ffmpeg stand-in that, like `ffmpeg -n`, refuses to touch
    /// an existing output. Every call is logged to `calls` next to it.
    #[cfg(unix)]
    fn install_ffmpeg(dir: &Path, body: &str) -> anyhow::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        let calls = dir.join("calls");
        fs::write(
            &script,
            format!(
                "#!/usr/bin/env bash\n\
                 out=\"${{@: -1}}\"\n\
                 echo call >> '{}'\n\
                 if [ -e \"$out\" ]; then\n\
                 \x20 echo \"File '$out' already exists. Exiting.\" >&2\n\
                 \x20 exit 1\n\
                 fi\n\
                 {body}\n",
                calls.display()
            ),
        )?;
        let mut perms = fs::metadata(&script)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms)?;
        Ok(script)
    }

    #[cfg(unix)]
    fn call_count(bin: &Path) -> usize {
        fs::read_to_string(bin.join("calls"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    #[cfg(unix)]
    fn media_dir(root: &Path) -> PathBuf {
        let media = root.join("media");
        for name in ["show.mp4", "show.en-US.ass"] {
            touch(&media.join(name));
        }
        media
    }

    #[cfg(unix)]
    #[test]
    fn ffmpeg_merge_writes_output_and_removes_originals() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        let ffmpeg = Ffmpeg::new(install_ffmpeg(&bin, "printf mkv > \"$out\"")?);
        let media = media_dir(dir.path());

        let report = merge_dir(&media, &ffmpeg, || false)?;
        assert_eq!(report.merged(), 1);
        assert_eq!(call_count(&bin), 1);
        assert_eq!(fs::read_to_string(media.join("show.mkv"))?, "mkv");
        assert!(!media.join("show.mp4").exists());
        assert!(!media.join("show.en-US.ass").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failed_attempts_leave_no_partial_output() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        let ffmpeg = Ffmpeg::new(install_ffmpeg(
            &bin,
            "printf partial > \"$out\"\necho 'Conversion failed!' >&2\nexit 1",
        )?);
        let media = media_dir(dir.path());

        let report = merge_dir(&media, &ffmpeg, || false)?;
        assert_eq!(call_count(&bin), MAX_ATTEMPTS);
        match &report.outcomes[0].1 {
            MergeOutcome::Failed(MergeError::ToolFailed { stderr, .. }) => {
                assert_eq!(stderr, "Conversion failed!");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!media.join("show.mkv").exists());
        assert!(media.join("show.mp4").exists());
        assert!(media.join("show.en-US.ass").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn existing_output_is_skipped_untouched() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        let ffmpeg = Ffmpeg::new(install_ffmpeg(&bin, "printf mkv > \"$out\"")?);
        let media = media_dir(dir.path());
        fs::write(media.join("show.mkv"), "old")?;

        let report = merge_dir(&media, &ffmpeg, || false)?;
        assert!(matches!(report.outcomes[0].1, MergeOutcome::OutputExists));
        assert_eq!(report.failed(), 0);
        assert_eq!(call_count(&bin), 0);
        assert_eq!(fs::read_to_string(media.join("show.mkv"))?, "old");
        assert!(media.join("show.mp4").exists());
        Ok(())
    }
}
