#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const APP_DIR_ENV: &str = "TUBEDL_HOME";
pub const CONFIG_ENV: &str = "TUBEDL_CONFIG";
pub const QUEUE_ENV: &str = "TUBEDL_QUEUE";
pub const HISTORY_ENV: &str = "TUBEDL_HISTORY";

pub const DEFAULT_APP_DIR: &str = ".tubedl";
pub const CONFIG_FILE: &str = "config.toml";
pub const SECRETS_FILE: &str = "secrets.toml";
pub const QUEUE_FILE: &str = "queue.txt";
pub const HISTORY_FILE: &str = "history.txt";
pub const COOKIES_DIR: &str = "cookies";
pub const DEBUG_LOG_FILE: &str = "debug.log";

/// Behaviour toggles and per-template overrides read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Only fetch audio.
    pub audio: bool,
    /// Only fetch captions.
    pub captions: bool,
    /// Download again even when the URL is already in the history.
    pub forced: bool,
    /// Never prompt during batch work.
    pub idle: bool,
    /// ASCII-only progress bars.
    pub ascii: bool,
    pub quiet: bool,
    /// Use the date-first output template.
    pub dated: bool,
    /// Average number of seconds slept between downloads.
    pub naptime: u64,
    /// Highest vertical resolution to fetch; 0 leaves it uncapped.
    pub maxres: u32,
    pub queue_file: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub videos_dir: Option<PathBuf>,
    pub shows_dir: Option<PathBuf>,
    pub log_level: String,
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub templates: BTreeMap<String, toml::Table>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio: false,
            captions: false,
            forced: false,
            idle: true,
            ascii: false,
            quiet: true,
            dated: false,
            naptime: 3,
            maxres: 0,
            queue_file: None,
            history_file: None,
            videos_dir: None,
            shows_dir: None,
            log_level: "warn".to_string(),
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            templates: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Site credentials keyed by template name (`[twitter]`, `[crunchyroll]`, ...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Secrets(BTreeMap<String, Credentials>);

impl Secrets {
    pub fn get(&self, site: &str) -> Option<&Credentials> {
        self.0.get(site)
    }
}

/// Every file location the tool reads or writes.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub app_dir: PathBuf,
    pub config_file: PathBuf,
    pub secrets_file: PathBuf,
    pub queue_file: PathBuf,
    pub history_file: PathBuf,
    pub cookies_dir: PathBuf,
    pub debug_log: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub app_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub queue_file: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
}

/// Loaded configuration: resolved paths, settings and secrets.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: AppPaths,
    pub settings: Settings,
    pub secrets: Secrets,
    pub home: PathBuf,
    overrides: PathOverrides,
}

impl Config {
    pub fn load(overrides: PathOverrides) -> Result<Self> {
        Self::load_with(overrides, env_var_string, home_dir())
    }

    fn load_with(
        overrides: PathOverrides,
        env_lookup: impl Fn(&str) -> Option<String>,
        home: PathBuf,
    ) -> Result<Self> {
        let app_dir = overrides
            .app_dir
            .clone()
            .or_else(|| env_lookup(APP_DIR_ENV).map(PathBuf::from))
            .map(|path| expand_tilde(&path, &home))
            .unwrap_or_else(|| home.join(DEFAULT_APP_DIR));
        let config_file = overrides
            .config_file
            .clone()
            .or_else(|| env_lookup(CONFIG_ENV).map(PathBuf::from))
            .map(|path| expand_tilde(&path, &home))
            .unwrap_or_else(|| app_dir.join(CONFIG_FILE));

        let settings = read_settings(&config_file)?;
        let secrets_file = app_dir.join(SECRETS_FILE);
        let secrets = read_secrets(&secrets_file)?;

        let queue_file = resolve_file(
            overrides.queue_file.as_deref(),
            env_lookup(QUEUE_ENV),
            settings.queue_file.as_deref(),
            &app_dir.join(QUEUE_FILE),
            &home,
        );
        let history_file = resolve_file(
            overrides.history_file.as_deref(),
            env_lookup(HISTORY_ENV),
            settings.history_file.as_deref(),
            &app_dir.join(HISTORY_FILE),
            &home,
        );

        let paths = AppPaths {
            cookies_dir: app_dir.join(COOKIES_DIR),
            debug_log: app_dir.join(DEBUG_LOG_FILE),
            app_dir,
            config_file,
            secrets_file,
            queue_file,
            history_file,
        };

        Ok(Self {
            paths,
            settings,
            secrets,
            home,
            overrides,
        })
    }

    /// Config rooted at `home` that ignores the process environment.
    #[cfg(test)]
    pub(crate) fn isolated(home: &Path) -> Result<Self> {
        Self::load_with(PathOverrides::default(), |_| None, home.to_path_buf())
    }

    /// Re-reads settings from `path`, or from the current config file when
    /// `path` is absent or not a file. Command-line overrides keep priority.
    pub fn reload(&mut self, path: Option<&Path>) -> Result<()> {
        let target = path
            .map(|path| expand_tilde(path, &self.home))
            .filter(|path| path.is_file())
            .unwrap_or_else(|| self.paths.config_file.clone());
        let settings = read_settings(&target)?;
        self.secrets = read_secrets(&self.paths.secrets_file)?;
        self.paths.queue_file = resolve_file(
            self.overrides.queue_file.as_deref(),
            env_var_string(QUEUE_ENV),
            settings.queue_file.as_deref(),
            &self.paths.app_dir.join(QUEUE_FILE),
            &self.home,
        );
        self.paths.history_file = resolve_file(
            self.overrides.history_file.as_deref(),
            env_var_string(HISTORY_ENV),
            settings.history_file.as_deref(),
            &self.paths.app_dir.join(HISTORY_FILE),
            &self.home,
        );
        self.settings = settings;
        tracing::info!(path = %target.display(), "configuration loaded");
        Ok(())
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.settings
            .videos_dir
            .as_deref()
            .map(|path| expand_tilde(path, &self.home))
            .unwrap_or_else(|| self.home.join("Videos"))
    }

    /// Default root for `merge` and `clean`.
    pub fn shows_dir(&self) -> PathBuf {
        self.settings
            .shows_dir
            .as_deref()
            .map(|path| expand_tilde(path, &self.home))
            .unwrap_or_else(|| self.videos_dir().join("Shows"))
    }

    /// Resolves a user-supplied path against the home directory.
    pub fn expand(&self, path: &Path) -> PathBuf {
        expand_tilde(path, &self.home)
    }
}

fn resolve_file(
    flag: Option<&Path>,
    env_value: Option<String>,
    from_file: Option<&Path>,
    default: &Path,
    home: &Path,
) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env_value.map(PathBuf::from))
        .or_else(|| from_file.map(Path::to_path_buf))
        .map(|path| expand_tilde(&path, home))
        .unwrap_or_else(|| default.to_path_buf())
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Settings::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
}

pub fn read_secrets(path: &Path) -> Result<Secrets> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no secrets file");
        return Ok(Secrets::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn home_dir() -> PathBuf {
    env_var_string("HOME")
        .or_else(|| env_var_string("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Replaces a leading `~` with `home`.
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
