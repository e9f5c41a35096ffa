//! The extraction collaborator: everything that needs a site extractor goes
//! through [`Extractor`], implemented here by shelling out to `yt-dlp`.

use crate::info::VideoInfo;
use crate::params::Params;
use anyhow::{Context, Result, bail};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

pub trait Extractor {
    /// Fetches metadata without downloading anything.
    fn probe(&self, url: &str, params: &Params) -> Result<VideoInfo>;

    /// Downloads `url`; `Ok(false)` means the tool ran but reported failure.
    fn download(&self, url: &str, params: &Params) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `yt-dlp --version` to fail loudly when it is missing.
    pub fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                self.program.display()
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    /// Start-up check that only warns: the queue, merge and clean commands
    /// work without yt-dlp, and each probe or download reports its own error.
    pub fn warn_if_missing(&self) -> bool {
        match self.ensure_available() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "downloads and probes will fail until yt-dlp is available"
                );
                false
            }
        }
    }
}

/// Writes the credentials in `params` to a config file readable only by
/// this user. The file is deleted when the handle drops, so it must outlive
/// the yt-dlp process.
fn secrets_file(params: &Params) -> Result<Option<NamedTempFile>> {
    let Some(contents) = params.secret_config() else {
        return Ok(None);
    };
    let mut file = NamedTempFile::new().context("creating yt-dlp credentials file")?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .context("writing yt-dlp credentials file")?;
    Ok(Some(file))
}

fn with_secrets(command: &mut Command, secrets: Option<&NamedTempFile>) {
    if let Some(file) = secrets {
        command.arg("--config-locations").arg(file.path());
    }
}

impl Extractor for YtDlp {
    fn probe(&self, url: &str, params: &Params) -> Result<VideoInfo> {
        let secrets = secrets_file(params)?;
        let mut command = Command::new(&self.program);
        with_secrets(&mut command, secrets.as_ref());
        command
            .args(
                params
                    .to_args()
                    .into_iter()
                    .filter(|arg| arg != "--console-title"),
            )
            .arg("--dump-single-json")
            .arg("--simulate")
            .arg("--flat-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(url)
            .stdin(Stdio::null());

        tracing::debug!(url, "probing metadata");
        let output = command
            .output()
            .with_context(|| format!("fetching metadata for {url}"))?;

        if !output.status.success() {
            bail!(
                "metadata command failed for {} (status {}): {}",
                url,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let raw_json =
            String::from_utf8(output.stdout).context("parsing metadata JSON response as UTF-8")?;
        VideoInfo::from_json(&raw_json).context("deserializing metadata JSON")
    }

    fn download(&self, url: &str, params: &Params) -> Result<bool> {
        if let Some(template) = params.output_template() {
            ensure_output_dirs(template)?;
        }
        let args = params.to_args();
        tracing::debug!(url, ?args, "starting download");
        let secrets = secrets_file(params)?;
        let mut command = Command::new(&self.program);
        with_secrets(&mut command, secrets.as_ref());
        let status = command
            .args(&args)
            .arg(url)
            .status()
            .with_context(|| format!("running {} for {url}", self.program.display()))?;
        if !status.success() {
            tracing::warn!(url, %status, "download reported failure");
        }
        Ok(status.success())
    }
}

/// Creates the directories of an output template up to the first component
/// that still contains a `%(field)s` placeholder.
pub fn ensure_output_dirs(template: &str) -> Result<()> {
    let Some(parent) = Path::new(template).parent() else {
        return Ok(());
    };
    let mut prefix = PathBuf::new();
    for component in parent.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.contains("%(") || name.contains(")s") {
            break;
        }
        prefix.push(component);
    }
    if !prefix.as_os_str().is_empty() && !prefix.exists() {
        fs::create_dir_all(&prefix).with_context(|| format!("creating {}", prefix.display()))?;
    }
    Ok(())
}
