//! The interactive shell: parses command lines (named commands and the
//! one-character shorthands) and drives the queue, the downloader and the
//! subtitle merger.

use crate::config::Config;
use crate::info::{InfoCache, VideoInfo};
use crate::interrupt::{Interrupt, Sleep};
use crate::merge::{self, MergeOutcome, Muxer};
use crate::outcome::BestEffort;
use crate::params::{self, Params, Selection, Templates};
use crate::prompt::{self, Prompt, set_title};
use crate::store::{self, QueueStore};
use crate::tidy;
use crate::urls::{self, MIN_URL_LEN};
use crate::ytdlp::Extractor;
use anyhow::{Context, Result};
use chrono::{Local, TimeDelta};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROMPT: &str = "tubedl> ";

/// Live-wait steps as (seconds to sleep, threshold). Once the time spent
/// waiting exceeds twice the threshold the next step is used.
const WAIT_SCHEDULE: [(u64, u64); 3] = [(10, 30), (30, 60), (60, 86_400)];

const HELP: &[(&str, &str)] = &[
    ("add", "add [front] <url> [...] | <url> [...]   queue URLs"),
    ("del", "del <url|index> [...] | - <url>   remove from queue and/or history"),
    ("drop", "drop [queue file]   clear the queue, its file and the history"),
    ("forget", "forget [history file]   clear the history"),
    ("get", "get <url> [...] | ! <url>   download now"),
    ("getall", "getall [file] | . [file]   download the whole queue"),
    ("load", "load [file] | load- [file] | : [file]   queue URLs from a file"),
    ("save", "save [file] | save- [file] | # [file]   write the queue to a file"),
    ("print", "print [index ...] | @ [index ...]   show the queue"),
    ("history", "history | *   merge the history with its file"),
    ("info", "info <url|index> [...]   title and kind of each URL"),
    ("infodump", "infodump <url> [...] | dump <url>   write metadata JSON to the current directory"),
    ("echo", "echo <url> [...]   show URLs as they would be downloaded"),
    ("params", "params <url|index> [...]   show the yt-dlp options for each URL"),
    ("wait", "wait [url ...]   wait for live streams to end, then download"),
    ("merge", "merge [dir]   fold .ass subtitles into their .mp4 videos"),
    ("clean", "clean [dir]   tidy file names with empty template fields"),
    ("mode", "mode   show the current settings"),
    ("config", "config [file]   reload the configuration"),
    ("audio", "audio | captions | quiet | dated | forced | idle | ascii   toggle a setting"),
    ("naptime", "naptime [seconds]   average pause between downloads"),
    ("res", "res [height]   cap the resolution, or lift the cap"),
    ("clear", "clear   clear the screen"),
    ("exit", "exit [file] | quit   save and leave"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Audio,
    Captions,
    Quiet,
    Dated,
    Forced,
    Idle,
    Ascii,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Del(String),
    Drop(String),
    Forget(String),
    Get(String),
    GetAll(String),
    Load { path: String, history: bool },
    Save { path: String, history: bool },
    Print(String),
    History,
    Info(String),
    Dump(String),
    Echo(String),
    Params(String),
    Wait(String),
    Merge(String),
    Clean(String),
    Mode,
    Config(String),
    Toggle(Toggle),
    Naptime(String),
    Res(String),
    Clear,
    Help(String),
    Exit(String),
}

/// A leading `-` on the argument skips the history step, as does the
/// `load-`/`save-` spelling.
fn history_flag(rest: &str) -> (String, bool) {
    match rest.strip_prefix('-') {
        Some(path) => (path.trim().to_string(), false),
        None => (rest.to_string(), true),
    }
}

impl Command {
    /// Parses one input line; blank lines give `None`. Anything that is not
    /// a command is queued as URLs.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let arg = rest.to_string();

        let command = match word {
            "add" => Command::Add(arg),
            "del" => Command::Del(arg),
            "drop" => Command::Drop(arg),
            "forget" => Command::Forget(arg),
            "get" => Command::Get(arg),
            "getall" => Command::GetAll(arg),
            "load" => {
                let (path, history) = history_flag(rest);
                Command::Load { path, history }
            }
            "save" => {
                let (path, history) = history_flag(rest);
                Command::Save { path, history }
            }
            _ if word.starts_with("load-") => Command::Load {
                path: line["load-".len()..].trim().to_string(),
                history: false,
            },
            _ if word.starts_with("save-") => Command::Save {
                path: line["save-".len()..].trim().to_string(),
                history: false,
            },
            "print" => Command::Print(arg),
            "history" => Command::History,
            "info" => Command::Info(arg),
            "infodump" | "dump" => Command::Dump(arg),
            "echo" => Command::Echo(arg),
            "params" => Command::Params(arg),
            "wait" => Command::Wait(arg),
            "merge" => Command::Merge(arg),
            "clean" => Command::Clean(arg),
            "mode" => Command::Mode,
            "config" => Command::Config(arg),
            "audio" => Command::Toggle(Toggle::Audio),
            "captions" => Command::Toggle(Toggle::Captions),
            "quiet" => Command::Toggle(Toggle::Quiet),
            "dated" => Command::Toggle(Toggle::Dated),
            "forced" => Command::Toggle(Toggle::Forced),
            "idle" => Command::Toggle(Toggle::Idle),
            "ascii" => Command::Toggle(Toggle::Ascii),
            "naptime" => Command::Naptime(arg),
            "res" => Command::Res(arg),
            "clear" => Command::Clear,
            "help" | "?" => Command::Help(arg),
            "exit" | "quit" => Command::Exit(arg),
            _ => Self::shorthand(line),
        };
        Some(command)
    }

    fn shorthand(line: &str) -> Self {
        let mut chars = line.chars();
        let Some(op) = chars.next() else {
            return Command::Add(String::new());
        };
        let rest = chars.as_str().trim();
        match op {
            '.' => Command::GetAll(rest.to_string()),
            '!' => Command::Get(rest.to_string()),
            '-' => Command::Del(rest.to_string()),
            ':' => {
                let (path, history) = history_flag(rest);
                Command::Load { path, history }
            }
            '#' => {
                let (path, history) = history_flag(rest);
                Command::Save { path, history }
            }
            '*' => Command::History,
            '@' => Command::Print(rest.to_string()),
            _ => Command::Add(line.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Stop,
}

/// Metadata for `url`, from the cache when a non-live record is there.
fn lookup<E: Extractor>(
    extractor: &E,
    cache: &mut InfoCache,
    templates: &Templates,
    url: &str,
) -> BestEffort<VideoInfo> {
    if url.chars().count() < MIN_URL_LEN {
        return BestEffort::Skipped(format!("{url} is too short to be a URL"));
    }
    if let Some(info) = cache.fresh(url) {
        return BestEffort::Done(info.clone());
    }
    match extractor.probe(url, &templates.probe_params(url)) {
        Ok(info) => {
            cache.insert(url, info.clone());
            BestEffort::Done(info)
        }
        Err(err) => {
            tracing::debug!(url, error = %format!("{err:#}"), "metadata probe failed");
            BestEffort::Failed(err)
        }
    }
}

fn supported<E: Extractor>(
    extractor: &E,
    cache: &mut InfoCache,
    templates: &Templates,
    url: &str,
    quiet: bool,
) -> bool {
    let found = lookup(extractor, cache, templates, url).is_done();
    if !found && !quiet {
        println!("{url} is not supported");
    }
    found
}

fn progress_bar(len: u64, ascii: bool) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let chars = if ascii { "#>-" } else { "█▉▊▋▌▍▎▏ " };
    let style = ProgressStyle::with_template("{bar:60} {pos}/{len} vid [{elapsed_precise}<{eta_precise}]")
        .map(|style| style.progress_chars(chars))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Up to twice `naptime` seconds, plus a fraction of a second.
fn nap_duration(naptime: u64) -> Duration {
    let mut rng = rand::rng();
    Duration::from_secs(rng.random_range(0..=naptime.saturating_mul(2)))
        .saturating_add(Duration::from_secs_f64(rng.random::<f64>()))
}

/// `base` seconds plus up to a third of it, plus a fraction of a second.
fn jittered(base: u64) -> Duration {
    let mut rng = rand::rng();
    Duration::from_secs(base + rng.random_range(0..=base / 3))
        + Duration::from_secs_f64(rng.random::<f64>())
}

fn yes_or_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

fn report(err: &anyhow::Error) {
    tracing::debug!(error = %format!("{err:#}"), "command failed");
    eprintln!("error: {err:#}");
}

pub struct Shell<E, M, P> {
    config: Config,
    templates: Templates,
    store: QueueStore,
    cache: InfoCache,
    extractor: E,
    muxer: M,
    prompt: P,
    interrupt: Interrupt,
}

impl<E: Extractor, M: Muxer, P: Prompt> Shell<E, M, P> {
    pub fn new(config: Config, extractor: E, muxer: M, prompt: P, interrupt: Interrupt) -> Self {
        let templates = Templates::from_config(&config);
        let store = QueueStore::new(
            config.paths.queue_file.clone(),
            config.paths.history_file.clone(),
        );
        Self {
            config,
            templates,
            store,
            cache: InfoCache::new(),
            extractor,
            muxer,
            prompt,
            interrupt,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Loads the queue file without probing and shows the mode.
    pub fn startup(&mut self) -> Result<()> {
        set_title("starting up");
        self.load("", true, false)?;
        self.print_mode();
        Ok(())
    }

    /// Reads commands until `exit` or end of input; end of input saves too.
    pub async fn repl(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.prompt.ask(PROMPT) else {
                println!();
                self.execute("exit").await?;
                return Ok(());
            };
            match self.execute(&line).await {
                Ok(Flow::Exit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(err) => report(&err),
            }
        }
    }

    /// One-shot mode: `args` joined with spaces and split on commas, with
    /// `cd <dir>` support. Always finishes with `exit`.
    pub async fn run_script(&mut self, args: &[String]) -> Result<()> {
        let joined = args.join(" ");
        for part in joined.split(',').map(str::trim) {
            if let Some(dir) = part.strip_prefix("cd ") {
                let dir = self.config.expand(Path::new(dir.trim()));
                if let Err(err) = env::set_current_dir(&dir)
                    .with_context(|| format!("changing directory to {}", dir.display()))
                {
                    report(&err);
                }
                continue;
            }
            match self.execute(part).await {
                Ok(Flow::Exit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(err) => report(&err),
            }
        }
        self.execute("exit").await.map(|_| ())
    }

    pub async fn execute(&mut self, line: &str) -> Result<Flow> {
        let Some(command) = Command::parse(line) else {
            return Ok(Flow::Continue);
        };
        tracing::debug!(?command, "executing");
        self.interrupt.clear();
        let flow = self.run(command).await;
        if self.store.is_empty() {
            set_title("");
        } else {
            set_title(&format!("{} queued videos", self.store.len()));
        }
        flow
    }

    pub async fn run(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Add(arg) => self.add(&arg),
            Command::Del(arg) => self.del(&arg),
            Command::Drop(arg) => {
                let path = self.optional_path(&arg);
                self.store
                    .drop_queue(path.as_deref(), &mut self.prompt, &mut self.cache)?;
            }
            Command::Forget(arg) => {
                let path = self.optional_path(&arg);
                self.store
                    .forget_history(path.as_deref(), &mut self.prompt, &mut self.cache)?;
            }
            Command::Get(arg) => {
                let urls = arg.split_whitespace().map(str::to_string).collect();
                self.get(urls).await?;
            }
            Command::GetAll(arg) => self.get_all(&arg).await?,
            Command::Load { path, history } => self.load(&path, history, true)?,
            Command::Save { path, history } => self.save(&path, history)?,
            Command::Print(arg) => self.print(&arg),
            Command::History => {
                let count = self.store.reconcile_history()?;
                println!("{count} URLs in the history");
            }
            Command::Info(arg) => self.info(&arg),
            Command::Dump(arg) => self.dump(&arg)?,
            Command::Echo(arg) => self.echo(&arg),
            Command::Params(arg) => self.show_params(&arg),
            Command::Wait(arg) => {
                let urls = arg.split_whitespace().map(str::to_string).collect();
                self.wait(urls).await?;
            }
            Command::Merge(arg) => self.merge(&arg)?,
            Command::Clean(arg) => self.clean(&arg)?,
            Command::Mode => self.print_mode(),
            Command::Config(arg) => self.reload_config(&arg)?,
            Command::Toggle(toggle) => self.toggle(toggle),
            Command::Naptime(arg) => {
                if let Ok(seconds) = arg.parse() {
                    self.config.settings.naptime = seconds;
                }
                println!("We sleep for {}s on average.", self.config.settings.naptime);
            }
            Command::Res(arg) => {
                self.config.settings.maxres = arg.parse().unwrap_or(0);
                match self.config.settings.maxres {
                    0 => println!("We have no limits on resolution"),
                    res => println!("We will go up to {res}p"),
                }
            }
            Command::Clear => {
                print!("\x1b[2J\x1b[H");
                io::stdout().flush().context("flushing stdout")?;
            }
            Command::Help(arg) => print_help(&arg),
            Command::Exit(arg) => {
                self.exit(&arg)?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn optional_path(&self, arg: &str) -> Option<PathBuf> {
        (!arg.is_empty()).then(|| self.config.expand(Path::new(arg)))
    }

    /// A queue index resolves to the URL at that position.
    fn resolve(&self, token: &str) -> String {
        self.store
            .from_index(token)
            .map(str::to_string)
            .unwrap_or_else(|| token.to_string())
    }

    fn lookup(&mut self, url: &str) -> BestEffort<VideoInfo> {
        lookup(&self.extractor, &mut self.cache, &self.templates, url)
    }

    fn is_supported(&mut self, url: &str) -> bool {
        supported(
            &self.extractor,
            &mut self.cache,
            &self.templates,
            url,
            self.config.settings.quiet,
        )
    }

    fn is_live(&mut self, url: &str) -> bool {
        self.lookup(url).ok().is_some_and(|info| info.is_live())
    }

    fn is_playlist(&mut self, url: &str) -> bool {
        urls::looks_like_playlist(url) || self.lookup(url).ok().is_some_and(|info| info.is_playlist())
    }

    /// Options for downloading `url`. With `ask`, interactive mode asks
    /// whether a playlist should be fetched in reverse.
    fn params_for(&mut self, url: &str, ask: bool) -> Params {
        let playlist = self.is_playlist(url);
        let playlist_reverse = (playlist && ask && !self.config.settings.idle).then(|| {
            prompt::yes_no(
                &mut self.prompt,
                "Should we reverse the ordering playlist order?",
                false,
            )
        });
        let settings = &self.config.settings;
        let selection = Selection {
            quiet: settings.quiet,
            audio: settings.audio,
            captions: settings.captions,
            dated: settings.dated,
            maxres: settings.maxres,
            playlist,
            playlist_reverse,
        };
        params::merge(&params::layers_for(url, &self.templates, &selection))
    }

    fn add(&mut self, arg: &str) {
        let report = self.store.add(arg, true, |_| true);
        tracing::debug!(added = report.added, "queued");
        if !self.config.settings.quiet {
            for url in report.rejected {
                println!("{url} is too short to be a URL");
            }
        }
    }

    fn del(&mut self, arg: &str) {
        for token in arg.split_whitespace() {
            let url = self.resolve(token);
            self.store
                .remove(&url, true, true, &mut self.prompt, &mut self.cache);
        }
    }

    fn load(&mut self, arg: &str, history: bool, probe: bool) -> Result<()> {
        let before = self.store.len();
        let path = self.optional_path(arg);
        let extractor = &self.extractor;
        let cache = &mut self.cache;
        let templates = &self.templates;
        let quiet = self.config.settings.quiet;
        let report = self.store.load(path.as_deref(), history, |url| {
            !probe || supported(extractor, cache, templates, url, quiet)
        })?;

        if report.added > 0 {
            println!("Added {} URLs from {}", report.added, report.path.display());
        }
        let total = self.store.len();
        if before > 0 {
            set_title(&format!("loaded {total} videos, {} new", total - before));
        } else {
            set_title(&format!("loaded {total} videos"));
        }
        Ok(())
    }

    fn save(&mut self, arg: &str, history: bool) -> Result<()> {
        set_title("saving");
        let path = self.optional_path(arg);
        let report = self.store.save(path.as_deref(), history)?;
        tracing::info!(path = %report.path.display(), written = report.written, "queue saved");
        Ok(())
    }

    fn print(&self, arg: &str) {
        println!("There are {} URLs in the queue", self.store.len());
        if self.store.is_empty() {
            return;
        }
        if arg.is_empty() {
            for url in self.store.queue() {
                println!("{url}");
            }
            return;
        }
        for token in arg.split_whitespace() {
            if let Some(url) = self.store.from_index(token) {
                println!("{url}");
            }
        }
    }

    fn info(&mut self, arg: &str) {
        for token in arg.split_whitespace() {
            let url = self.resolve(token);
            match self.lookup(&url) {
                BestEffort::Done(info) => {
                    println!("URL: {url}");
                    println!("Title: {}", info.display_title().unwrap_or("(untitled)"));
                    if urls::looks_like_playlist(&url) || info.is_playlist() {
                        println!("Playlist");
                    } else if info.is_live() {
                        println!("Livestream");
                    } else {
                        println!("VOD");
                    }
                }
                other => println!("No info found for {url} ({other})"),
            }
        }
    }

    fn dump(&mut self, arg: &str) -> Result<()> {
        for token in arg.split_whitespace() {
            let url = self.resolve(token);
            match self.lookup(&url) {
                BestEffort::Done(info) => {
                    let name = format!("{}.json", info.id.as_deref().unwrap_or("dump"));
                    let json = serde_json::to_string(&info).context("serializing metadata")?;
                    fs::write(&name, json).with_context(|| format!("writing {name}"))?;
                    println!("Wrote {name}");
                }
                other => println!("No info found for {url} ({other})"),
            }
        }
        Ok(())
    }

    fn echo(&self, arg: &str) {
        for token in arg.split_whitespace() {
            if urls::is_url(token) {
                println!("{}", urls::clean_url(token));
            } else {
                println!("{token}");
            }
        }
    }

    fn show_params(&mut self, arg: &str) {
        for token in arg.split_whitespace() {
            let url = self.resolve(token);
            let params = self.params_for(&url, false);
            println!("{url}");
            for (key, value, source) in params.iter() {
                if key == "password" {
                    println!("  {key} = \"********\"  ({source})");
                } else {
                    println!("  {key} = {value}  ({source})");
                }
            }
        }
    }

    /// Whether `url` should be downloaded by this batch. Finished URLs are
    /// skipped unless forced or, interactively, confirmed again.
    fn should_attempt(&mut self, url: &str) -> bool {
        let forced = self.config.settings.forced;
        let idle = self.config.settings.idle;
        (self.is_supported(url)
            && (!self.store.in_history(url)
                || forced
                || (!idle
                    && prompt::yes_no(
                        &mut self.prompt,
                        &format!("Try download {url} again?"),
                        true,
                    ))))
            || url.contains("playlist")
    }

    fn download(&mut self, raw_url: &str) -> Step {
        let url = urls::clean_url(raw_url);
        let params = self.params_for(&url, true);
        let succeeded = match self.extractor.download(&url, &params) {
            Ok(succeeded) => succeeded,
            Err(err) => {
                tracing::error!(url = %url, error = %format!("{err:#}"), "download failed");
                false
            }
        };
        if self.interrupt.is_raised() {
            return Step::Stop;
        }
        if succeeded
            || (!self.config.settings.idle
                && prompt::yes_no(
                    &mut self.prompt,
                    &format!("Did {url} download properly?"),
                    true,
                ))
        {
            self.store.mark_done(raw_url);
        }
        Step::Next
    }

    async fn nap(&self) -> Sleep {
        let pause = nap_duration(self.config.settings.naptime);
        self.interrupt.sleep(pause).await
    }

    /// Downloads each URL in turn and returns those that were live. The
    /// history is reconciled afterwards even when the user stops the batch.
    async fn get_batch(&mut self, urls: &[String]) -> Result<Vec<String>> {
        let mut still_live = Vec::new();
        if urls.is_empty() {
            println!("No videos to download");
        } else {
            let total = urls.len();
            let plural = if total == 1 { "" } else { "s" };
            set_title(&format!("downloading {total} video{plural}"));
            println!("Getting {total} video{plural}");

            let bar = progress_bar(total as u64, self.config.settings.ascii);
            let mut stopped = false;
            for (index, url) in urls.iter().enumerate() {
                if self.should_attempt(url) {
                    set_title(&format!("[{}/{total}] {url}", index + 1));
                    let skip_live = self.is_live(url)
                        && (self.config.settings.idle
                            || prompt::yes_no(
                                &mut self.prompt,
                                "Currently live, shall we skip and try again later?",
                                true,
                            ));
                    if skip_live {
                        still_live.push(url.clone());
                    } else if self.download(url) == Step::Stop
                        || self.nap().await == Sleep::Interrupted
                    {
                        stopped = true;
                    }
                }
                bar.inc(1);
                if stopped || self.interrupt.take() {
                    stopped = true;
                    break;
                }
            }

            if stopped {
                bar.abandon();
                println!();
                println!("Stopped by user");
                self.interrupt.clear();
            } else {
                bar.finish();
            }
        }
        self.store.reconcile_history()?;
        Ok(still_live)
    }

    async fn get(&mut self, urls: Vec<String>) -> Result<()> {
        let still_live = self.get_batch(&urls).await?;
        if !still_live.is_empty() {
            self.wait(still_live).await?;
        }
        Ok(())
    }

    async fn get_all(&mut self, arg: &str) -> Result<()> {
        set_title("organising queue");
        if !arg.is_empty() || self.store.is_empty() {
            self.load(arg, true, true)?;
        }
        let urls = self.store.queue().to_vec();
        self.get(urls).await
    }

    /// Polls live URLs on a slowing schedule and downloads each once it is
    /// no longer live. Ctrl-C offers an early re-check or giving up.
    async fn wait(&mut self, urls: Vec<String>) -> Result<()> {
        let mut pending: VecDeque<String> = if urls.is_empty() {
            self.store.queue().iter().cloned().collect()
        } else {
            urls.into()
        };
        let mut elapsed = 0;
        let mut step = 0;

        while let Some(url) = pending.pop_front() {
            set_title(&format!("waiting on {url}"));
            if self.is_live(&url) {
                let (wait, threshold) = WAIT_SCHEDULE[step];
                elapsed += wait;
                if elapsed > threshold * 2 && step < WAIT_SCHEDULE.len() - 1 {
                    step += 1;
                }
                let pause = jittered(wait);
                let check_at = Local::now() + TimeDelta::from_std(pause).unwrap_or(TimeDelta::zero());
                set_title(&format!(
                    "waiting on {url}, checking at {}",
                    check_at.format("%H:%M:%S")
                ));

                if self.interrupt.sleep(pause).await == Sleep::Interrupted
                    && !prompt::yes_no(&mut self.prompt, "Test if the video is live now?", true)
                    && !prompt::yes_no(&mut self.prompt, "Do you want to continue waiting?", true)
                {
                    break;
                }
                if self.is_live(&url) {
                    pending.push_back(url);
                    continue;
                }
            }

            let still_live = self.get_batch(std::slice::from_ref(&url)).await?;
            pending.extend(still_live);
            elapsed = 0;
            step = 0;
        }
        Ok(())
    }

    fn merge(&mut self, arg: &str) -> Result<()> {
        let root = self
            .optional_path(arg)
            .unwrap_or_else(|| self.config.shows_dir());
        let interrupt = &self.interrupt;
        let report = merge::merge_dir(&root, &self.muxer, || interrupt.take())?;
        for (pairing, outcome) in &report.outcomes {
            match outcome {
                MergeOutcome::Merged { .. } => println!("Merged {}", pairing.output().display()),
                MergeOutcome::Failed(err) => {
                    println!("Could not merge {}: {err}", pairing.video.display())
                }
                MergeOutcome::OutputMissing => {
                    println!("No output was written for {}", pairing.video.display())
                }
                MergeOutcome::OutputExists => {
                    println!("{} already exists, skipped", pairing.output().display())
                }
            }
        }
        if report.interrupted {
            println!("Stopped by user");
        }
        println!(
            "Merged {} of {} pairings in {}",
            report.merged(),
            report.outcomes.len(),
            root.display()
        );
        Ok(())
    }

    fn clean(&mut self, arg: &str) -> Result<()> {
        let root = self
            .optional_path(arg)
            .unwrap_or_else(|| self.config.shows_dir());
        for (from, to) in tidy::clean_dir(&root)? {
            println!("{} -> {}", from.display(), to.display());
        }
        Ok(())
    }

    fn reload_config(&mut self, arg: &str) -> Result<()> {
        let path = self.optional_path(arg);
        self.config.reload(path.as_deref())?;
        self.templates = Templates::from_config(&self.config);
        self.store.set_files(
            self.config.paths.queue_file.clone(),
            self.config.paths.history_file.clone(),
        );
        Ok(())
    }

    fn toggle(&mut self, toggle: Toggle) {
        let settings = &mut self.config.settings;
        let message = match toggle {
            Toggle::Audio => {
                settings.audio = !settings.audio;
                if settings.audio { "Audio!" } else { "Not audio..." }
            }
            Toggle::Captions => {
                settings.captions = !settings.captions;
                if settings.captions { "Captions!" } else { "Not captions..." }
            }
            Toggle::Quiet => {
                settings.quiet = !settings.quiet;
                if settings.quiet { "Shh" } else { "BOO!" }
            }
            Toggle::Dated => {
                settings.dated = !settings.dated;
                if settings.dated { "Dating now" } else { "Dateless..." }
            }
            Toggle::Forced => {
                settings.forced = !settings.forced;
                if settings.forced {
                    "Force downloads"
                } else {
                    "Doesn't force downloads"
                }
            }
            Toggle::Idle => {
                settings.idle = !settings.idle;
                if settings.idle { "Idling" } else { "Interactive" }
            }
            Toggle::Ascii => {
                settings.ascii = !settings.ascii;
                if settings.ascii { "ASCII bars" } else { "Unicode bars" }
            }
        };
        println!("{message}");
    }

    fn print_mode(&self) {
        let settings = &self.config.settings;
        println!("Mode: {}", if settings.idle { "Idle" } else { "Interactive" });
        println!("ASCII: {}", yes_or_no(settings.ascii));
        println!("Quiet: {}", yes_or_no(settings.quiet));
        println!("Audio: {}", yes_or_no(settings.audio));
        println!("Captions: {}", yes_or_no(settings.captions));
        println!("Dated: {}", yes_or_no(settings.dated));
        println!("Forced: {}", yes_or_no(settings.forced));
        println!("Sleep interval: {} seconds", settings.naptime);
        match settings.maxres {
            0 => println!("Max resolution: Unlimited"),
            res => println!("Max resolution: {res}p"),
        }
    }

    fn exit(&mut self, arg: &str) -> Result<()> {
        tracing::debug!("exit sequence started");
        let path = self.optional_path(arg);
        let report = self.store.save(path.as_deref(), true)?;
        set_title("exiting");
        let saved = store::read_lines(&report.path).unwrap_or(Vec::new()).len();
        println!("Exiting, saved {saved} videos to {}", report.path.display());
        Ok(())
    }
}

fn print_help(arg: &str) {
    let topic = arg.trim();
    let matches: Vec<&(&str, &str)> = HELP
        .iter()
        .filter(|(name, _)| topic.is_empty() || *name == topic)
        .collect();
    if matches.is_empty() {
        println!("No help for {topic}");
    }
    for (_, usage) in matches {
        println!("{usage}");
    }
}
