//! yt-dlp options as named layers.
//!
//! An option is a yt-dlp long flag (without the leading `--`) mapped to a TOML
//! value. Templates are named option tables; the layers that apply to a URL
//! are merged by [`merge`], where an earlier layer always beats a later one,
//! so the list reads from most specific to least specific.

use crate::config::{Config, Secrets};
use crate::urls::{self, Site};
use std::collections::BTreeMap;
use std::mem::discriminant;
use std::path::Path;
use toml::Value;

pub type Options = BTreeMap<String, Value>;

const FMT_TIMESTAMP: &str =
    "%(timestamp>%Y-%m-%d-%H-%M-%S,release_date>%Y-%m-%d,upload_date>%Y-%m-%d|20xx-xx-xx)s";
const FMT_DATE_ONLY: &str =
    "%(timestamp>%Y-%m-%d,release_date>%Y-%m-%d,upload_date>%Y-%m-%d|20xx-xx-xx)s";
const FMT_TITLE: &str = "%(title.:100)s";

/// Options kept off the command line, where other local users can read
/// them from the process list. yt-dlp gets them from a config file instead.
pub const SECRET_OPTIONS: [&str; 2] = ["username", "password"];

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub options: Options,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

/// Merged options for one URL. Each value remembers the layer it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, (Value, String)>,
}

/// Folds `layers` into one option set; the first layer to define a key wins.
pub fn merge(layers: &[Layer]) -> Params {
    let mut values = BTreeMap::new();
    for layer in layers {
        for (key, value) in &layer.options {
            values
                .entry(key.clone())
                .or_insert_with(|| (value.clone(), layer.name.clone()));
        }
    }
    Params { values }
}

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).map(|(value, _)| value)
    }

    /// Name of the layer that supplied `key`.
    pub fn source(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|(_, source)| source.as_str())
    }

    pub fn output_template(&self) -> Option<&str> {
        self.get("output").and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value, &str)> {
        self.values
            .iter()
            .map(|(key, (value, source))| (key.as_str(), value, source.as_str()))
    }

    /// Renders the options as yt-dlp arguments. `false` omits the flag and
    /// [`SECRET_OPTIONS`] are left to [`Params::secret_config`].
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, (value, _)) in &self.values {
            if SECRET_OPTIONS.contains(&key.as_str()) {
                continue;
            }
            let flag = format!("--{key}");
            match value {
                Value::Boolean(true) => args.push(flag),
                Value::Boolean(false) => {}
                Value::Array(items) => {
                    let joined = items.iter().map(render_scalar).collect::<Vec<_>>().join(",");
                    args.push(flag);
                    args.push(joined);
                }
                Value::Table(_) => {
                    tracing::warn!(option = %key, "table values cannot be passed to yt-dlp");
                }
                other => {
                    args.push(flag);
                    args.push(render_scalar(other));
                }
            }
        }
        args
    }

    /// The secret options as yt-dlp config file lines, single-quoted the
    /// way yt-dlp splits them. `None` when there are none.
    pub fn secret_config(&self) -> Option<String> {
        let mut lines = String::new();
        for key in SECRET_OPTIONS {
            if let Some(value) = self.get(key) {
                let quoted = render_scalar(value).replace('\'', r"'\''");
                lines.push_str(&format!("--{key} '{quoted}'\n"));
            }
        }
        (!lines.is_empty()).then_some(lines)
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Paths and credentials the built-in templates are rooted at.
pub struct TemplateContext<'a> {
    pub videos_dir: &'a Path,
    pub shows_dir: &'a Path,
    pub cookies_dir: &'a Path,
    pub secrets: &'a Secrets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Templates {
    map: BTreeMap<String, Options>,
}

impl Templates {
    pub fn from_config(config: &Config) -> Self {
        let videos_dir = config.videos_dir();
        let shows_dir = config.shows_dir();
        let mut templates = Self::builtin(&TemplateContext {
            videos_dir: &videos_dir,
            shows_dir: &shows_dir,
            cookies_dir: &config.paths.cookies_dir,
            secrets: &config.secrets,
        });
        templates.overlay(&config.settings.templates);
        templates
    }

    pub fn builtin(ctx: &TemplateContext<'_>) -> Self {
        let out = |dir: &Path, rel: String| dir.join(rel).to_string_lossy().into_owned();
        let videos = ctx.videos_dir;

        let default = Layer::new("default")
            .with(
                "output",
                out(
                    videos,
                    format!("%(uploader,uploader_id|Unknown)s {FMT_TIMESTAMP} {FMT_TITLE} [%(id)s].%(ext)s"),
                ),
            )
            .with("merge-output-format", "mkv")
            .with("no-overwrites", true)
            .with("fixup", "never")
            .with("retries", 20)
            .with("fragment-retries", 20)
            .with("windows-filenames", true)
            .with("console-title", true);
        let audio = Layer::new("audio")
            .with("format", "bestaudio/best")
            .with("extract-audio", true);
        let captions = Layer::new("captions")
            .with("all-subs", true)
            .with("skip-download", true)
            .with("write-subs", true);
        let dated = Layer::new("dated").with(
            "output",
            out(videos, format!("{FMT_DATE_ONLY} {FMT_TITLE} [%(id)s].%(ext)s")),
        );
        let show = Layer::new("show").with(
            "output",
            out(
                ctx.shows_dir,
                "%(series)s/%(season_number|)s %(season|)s %(episode_number)02d - %(episode|)s.%(ext)s"
                    .to_string(),
            ),
        );
        let playlist = Layer::new("playlist").with(
            "output",
            out(
                videos,
                format!("%(playlist_title)s/%(playlist_autonumber,playlist_index|)03d {FMT_TITLE}.%(ext)s"),
            ),
        );
        let podcast = Layer::new("podcast").with(
            "output",
            out(
                &videos.join("Podcasts"),
                format!("{FMT_TITLE} %(webpage_url_basename)s [%(id)s].%(ext)s"),
            ),
        );
        let twitter = with_credentials(Layer::new("twitter"), ctx, "twitter").with(
            "output",
            out(
                videos,
                format!("%(uploader_id,uploader|Unknown)s {FMT_TIMESTAMP} {FMT_TITLE} [%(id)s].%(ext)s"),
            ),
        );
        let twitch = Layer::new("twitch").with("fixup", "never").with(
            "output",
            out(
                &videos.join("Streams"),
                format!("%(uploader,uploader_id|Unknown)s/{FMT_TIMESTAMP} %(title)s.%(ext)s"),
            ),
        );
        let youtube = Layer::new("youtube");
        let crunchyroll = with_credentials(Layer::new("crunchyroll"), ctx, "crunchyroll")
            .with("sub-langs", Value::Array(vec![Value::from("en-US")]))
            .with("write-subs", true)
            .with(
                "output",
                out(
                    ctx.shows_dir,
                    "%(series)s/%(season_number|0)s %(season|)s %(episode_number)02d - %(episode|)s.%(ext)s"
                        .to_string(),
                ),
            );

        let map = [
            default, audio, captions, dated, show, playlist, podcast, twitter, twitch, youtube,
            crunchyroll,
        ]
        .into_iter()
        .map(|layer| (layer.name, layer.options))
        .collect();
        Self { map }
    }

    /// Applies `[templates.<name>]` tables from the config file on top of the
    /// built-ins. Everything is applied; surprises are logged.
    pub fn overlay(&mut self, overrides: &BTreeMap<String, toml::Table>) {
        for (name, table) in overrides {
            let existing = self.map.entry(name.clone()).or_insert_with(|| {
                tracing::warn!(template = %name, "config defines a template that is not built in");
                Options::new()
            });
            for (key, value) in table {
                match existing.get(key) {
                    Some(old) if discriminant(old) == discriminant(value) => {
                        tracing::info!("Config templates.{name}.{key} = {value}");
                    }
                    Some(old) => {
                        tracing::warn!(
                            "Config templates.{name}.{key} was set to {value} ({}) but the default is a {}",
                            value.type_str(),
                            old.type_str()
                        );
                    }
                    None => {
                        tracing::warn!(
                            "Config templates.{name}.{key} has been loaded but is not present in the default"
                        );
                    }
                }
                existing.insert(key.clone(), value.clone());
            }
        }
    }

    /// The named template as a layer; unknown names give an empty layer.
    pub fn layer(&self, name: &str) -> Layer {
        Layer {
            name: name.to_string(),
            options: self.map.get(name).cloned().unwrap_or_default(),
        }
    }

    /// Options for metadata probes: the site template, falling back to
    /// `default` for sites without one.
    pub fn probe_params(&self, url: &str) -> Params {
        match Site::detect(url) {
            Some(site) => merge(&[self.layer(site.template())]),
            None => merge(&[self.layer("default")]),
        }
    }
}

fn with_credentials(mut layer: Layer, ctx: &TemplateContext<'_>, site: &str) -> Layer {
    if let Some(creds) = ctx.secrets.get(site) {
        if let Some(username) = &creds.username {
            layer = layer.with("username", username.as_str());
        }
        if let Some(password) = &creds.password {
            layer = layer.with("password", password.as_str());
        }
    }
    let cookies = ctx.cookies_dir.join(format!("{site}.txt"));
    if cookies.exists() {
        layer = layer.with("cookies", cookies.to_string_lossy().into_owned());
    }
    layer
}

/// Toggles and per-URL facts that decide which layers apply.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub quiet: bool,
    pub audio: bool,
    pub captions: bool,
    pub dated: bool,
    pub maxres: u32,
    pub playlist: bool,
    /// Only meaningful for playlists; `None` leaves yt-dlp's order alone.
    pub playlist_reverse: Option<bool>,
}

/// Layers for `url`, most specific first.
pub fn layers_for(url: &str, templates: &Templates, selection: &Selection) -> Vec<Layer> {
    let mut layers = vec![Layer::new("quiet").with("quiet", selection.quiet)];

    if let Some(site) = Site::detect(url) {
        layers.push(templates.layer(site.template()));
    }
    if urls::is_show(url) {
        layers.push(templates.layer("show"));
    }
    if urls::is_podcast(url) {
        layers.push(templates.layer("podcast"));
    }
    if selection.playlist {
        if let Some(reverse) = selection.playlist_reverse {
            layers.push(Layer::new("playlist-order").with("playlist-reverse", reverse));
        }
        layers.push(templates.layer("playlist"));
    }
    if selection.audio {
        layers.push(templates.layer("audio"));
    }
    if selection.captions {
        layers.push(templates.layer("captions"));
    }
    if selection.maxres > 0 {
        let res = selection.maxres;
        layers.push(Layer::new("maxres").with(
            "format",
            format!("bv*[height<={res}]+ba/b[height<={res}]/bv*+ba/b"),
        ));
    }
    if selection.dated {
        layers.push(templates.layer("dated"));
    }
    layers.push(templates.layer("default"));
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn templates_with(secrets: &Secrets) -> Templates {
        let videos = PathBuf::from("/v");
        let shows = PathBuf::from("/v/Shows");
        let cookies = PathBuf::from("/nonexistent/cookies");
        Templates::builtin(&TemplateContext {
            videos_dir: &videos,
            shows_dir: &shows,
            cookies_dir: &cookies,
            secrets,
        })
    }

    #[test]
    fn earlier_layers_win() {
        let params = merge(&[
            Layer::new("site").with("output", "site.%(ext)s"),
            Layer::new("default")
                .with("output", "default.%(ext)s")
                .with("retries", 20),
        ]);
        assert_eq!(params.output_template(), Some("site.%(ext)s"));
        assert_eq!(params.source("output"), Some("site"));
        assert_eq!(params.get("retries").and_then(Value::as_integer), Some(20));
        assert_eq!(params.source("retries"), Some("default"));
    }

    #[test]
    fn to_args_renders_each_value_kind() {
        let params = merge(&[Layer::new("only")
            .with("quiet", true)
            .with("skip-download", false)
            .with("retries", 3)
            .with("sub-langs", Value::Array(vec!["en-US".into(), "ja".into()]))
            .with("output", "/v/%(title)s.%(ext)s")]);
        assert_eq!(
            params.to_args(),
            vec![
                "--output",
                "/v/%(title)s.%(ext)s",
                "--quiet",
                "--retries",
                "3",
                "--sub-langs",
                "en-US,ja",
            ]
        );
    }

    #[test]
    fn crunchyroll_gets_show_layout_and_credentials() {
        let secrets: Secrets =
            toml::from_str("[crunchyroll]\nusername = \"me\"\npassword = \"pw\"\n").unwrap();
        let templates = templates_with(&secrets);
        let url = "https://www.crunchyroll.com/watch/G123";
        let params = merge(&layers_for(url, &templates, &Selection::default()));
        assert_eq!(params.source("output"), Some("crunchyroll"));
        assert!(params.output_template().unwrap().starts_with("/v/Shows/%(series)s/"));
        assert_eq!(params.get("username").and_then(Value::as_str), Some("me"));
        assert_eq!(params.get("quiet").and_then(Value::as_bool), Some(false));
        assert_eq!(params.source("retries"), Some("default"));
    }

    #[test]
    fn credentials_stay_off_the_command_line() {
        let secrets: Secrets =
            toml::from_str("[crunchyroll]\nusername = \"me\"\npassword = \"p'w\"\n").unwrap();
        let templates = templates_with(&secrets);
        let url = "https://www.crunchyroll.com/watch/G123";
        let params = merge(&layers_for(url, &templates, &Selection::default()));

        let args = params.to_args();
        assert!(!args.iter().any(|arg| arg == "--password" || arg == "--username"));
        assert!(!args.iter().any(|arg| arg.contains("p'w")));
        assert_eq!(
            params.secret_config().as_deref(),
            Some("--username 'me'\n--password 'p'\\''w'\n")
        );
        assert_eq!(Params::default().secret_config(), None);
    }

    #[test]
    fn toggles_add_layers_in_precedence_order() {
        let templates = templates_with(&Secrets::default());
        let selection = Selection {
            audio: true,
            maxres: 720,
            dated: true,
            playlist: true,
            playlist_reverse: Some(true),
            ..Selection::default()
        };
        let names: Vec<String> = layers_for("https://example.com/x", &templates, &selection)
            .into_iter()
            .map(|layer| layer.name)
            .collect();
        assert_eq!(
            names,
            ["quiet", "playlist-order", "playlist", "audio", "maxres", "dated", "default"]
        );

        let params = merge(&layers_for("https://example.com/x", &templates, &selection));
        // audio's format beats the resolution cap, playlist output beats dated.
        assert_eq!(params.get("format").and_then(Value::as_str), Some("bestaudio/best"));
        assert_eq!(params.source("output"), Some("playlist"));
        assert_eq!(params.get("playlist-reverse").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn maxres_sets_format_filter() {
        let templates = templates_with(&Secrets::default());
        let selection = Selection {
            maxres: 1080,
            ..Selection::default()
        };
        let params = merge(&layers_for("https://youtu.be/abc", &templates, &selection));
        assert_eq!(
            params.get("format").and_then(Value::as_str),
            Some("bv*[height<=1080]+ba/b[height<=1080]/bv*+ba/b")
        );
    }

    #[test]
    fn overlay_applies_known_and_unknown_keys() {
        let mut templates = templates_with(&Secrets::default());
        let overrides: BTreeMap<String, toml::Table> = toml::from_str(
            r#"
            [twitch]
            fixup = "warn"
            live-from-start = true

            [custom]
            format = "worst"
            "#,
        )
        .unwrap();
        templates.overlay(&overrides);
        let twitch = templates.layer("twitch");
        assert_eq!(twitch.options["fixup"].as_str(), Some("warn"));
        assert_eq!(twitch.options["live-from-start"].as_bool(), Some(true));
        assert_eq!(templates.layer("custom").options["format"].as_str(), Some("worst"));
    }

    #[test]
    fn probe_params_fall_back_to_default() {
        let templates = templates_with(&Secrets::default());
        let params = templates.probe_params("https://example.com/v");
        assert_eq!(params.source("output"), Some("default"));
        let params = templates.probe_params("https://www.twitch.tv/someone");
        assert_eq!(params.get("fixup").and_then(Value::as_str), Some("never"));
    }
}
