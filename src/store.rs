//! The download queue and the history of finished URLs, each backed by a
//! plain text file with one URL per line.

use crate::info::InfoCache;
use crate::outcome::BestEffort;
use crate::prompt::{self, Prompt};
use crate::urls::{MIN_URL_LEN, clean_url};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Leading token of `add` that puts the new URLs ahead of the queue.
pub const FRONT: &str = "front";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddReport {
    /// URLs that were not queued before this call.
    pub added: usize,
    pub rejected: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Removal {
    pub from_queue: bool,
    pub from_history: bool,
}

#[derive(Debug)]
pub struct LoadReport {
    pub path: PathBuf,
    pub added: usize,
}

#[derive(Debug)]
pub struct SaveReport {
    pub path: PathBuf,
    pub written: usize,
}

#[derive(Debug)]
pub struct QueueStore {
    queue: Vec<String>,
    queued: HashSet<String>,
    history: BTreeSet<String>,
    deleted: HashSet<String>,
    queue_file: PathBuf,
    history_file: PathBuf,
}

impl QueueStore {
    pub fn new(queue_file: impl Into<PathBuf>, history_file: impl Into<PathBuf>) -> Self {
        Self {
            queue: Vec::new(),
            queued: HashSet::new(),
            history: BTreeSet::new(),
            deleted: HashSet::new(),
            queue_file: queue_file.into(),
            history_file: history_file.into(),
        }
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn history(&self) -> &BTreeSet<String> {
        &self.history
    }

    pub fn is_deleted(&self, url: &str) -> bool {
        self.deleted.contains(url)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    pub fn in_history(&self, url: &str) -> bool {
        self.history.contains(url)
    }

    /// Records a finished download.
    pub fn mark_done(&mut self, url: &str) {
        self.history.insert(url.to_string());
    }

    pub fn queue_file(&self) -> &Path {
        &self.queue_file
    }

    pub fn history_file(&self) -> &Path {
        &self.history_file
    }

    /// Points the store at new backing files, e.g. after a config reload.
    pub fn set_files(&mut self, queue_file: PathBuf, history_file: PathBuf) {
        self.queue_file = queue_file;
        self.history_file = history_file;
    }

    /// Queues the whitespace-separated URLs in `input`.
    ///
    /// With `allow_front` and a leading `front` token the new URLs go ahead
    /// of the existing queue, in input order; URLs that were already queued
    /// move up with them. Candidates shorter than [`MIN_URL_LEN`] or refused
    /// by `accept` are reported back in `rejected`. Everything queued
    /// afterwards loses its deletion marker.
    pub fn add(
        &mut self,
        input: &str,
        allow_front: bool,
        mut accept: impl FnMut(&str) -> bool,
    ) -> AddReport {
        let mut tokens: Vec<&str> = input.split_whitespace().collect();
        let front = allow_front && tokens.len() > 1 && tokens[0] == FRONT;
        if front {
            tokens.remove(0);
        }

        let mut report = AddReport::default();
        let mut batch: Vec<String> = Vec::new();
        for url in tokens {
            if batch.iter().any(|seen| seen == url) {
                continue;
            }
            if !front && self.contains(url) {
                continue;
            }
            if url.chars().count() < MIN_URL_LEN || !accept(url) {
                report.rejected.push(url.to_string());
                continue;
            }
            batch.push(url.to_string());
        }

        report.added = batch.iter().filter(|url| !self.contains(url)).count();
        if front {
            let rest = std::mem::take(&mut self.queue);
            self.queue = batch;
            let moved: HashSet<&String> = self.queue.iter().collect();
            let rest: Vec<String> = rest.into_iter().filter(|url| !moved.contains(url)).collect();
            self.queue.extend(rest);
        } else {
            self.queue.extend(batch);
        }
        self.queued = self.queue.iter().cloned().collect();

        for url in &self.queue {
            self.deleted.remove(url);
        }
        report
    }

    /// Resolves a queue position such as `0` or `-1`.
    pub fn from_index(&self, token: &str) -> Option<&str> {
        let index: i64 = token.parse().ok()?;
        let len = self.queue.len() as i64;
        let index = if index < 0 { len + index } else { index };
        if (0..len).contains(&index) {
            self.queue.get(index as usize).map(String::as_str)
        } else {
            None
        }
    }

    /// Removes `url` from the queue and/or history, asking before each.
    /// Any cached metadata for it is dropped as well.
    pub fn remove(
        &mut self,
        url: &str,
        from_queue: bool,
        from_history: bool,
        prompt: &mut dyn Prompt,
        cache: &mut InfoCache,
    ) -> Removal {
        let mut removal = Removal::default();
        if from_queue
            && self.contains(url)
            && prompt::yes_no(prompt, &format!("Do you want to remove {url} from the queue?"), true)
        {
            self.queue.retain(|queued| queued != url);
            self.queued.remove(url);
            self.deleted.insert(url.to_string());
            cache.evict(url);
            removal.from_queue = true;
        }
        if from_history
            && self.in_history(url)
            && prompt::yes_no(prompt, &format!("Do you want to remove {url} from the history?"), true)
        {
            self.history.remove(url);
            cache.evict(url);
            removal.from_history = true;
        }
        removal
    }

    /// Adds every URL listed in `path` (or the queue file when `path` is not
    /// an existing file). With `include_history` the history is reconciled
    /// afterwards.
    pub fn load(
        &mut self,
        path: Option<&Path>,
        include_history: bool,
        mut accept: impl FnMut(&str) -> bool,
    ) -> Result<LoadReport> {
        let source = match path {
            Some(path) if path.is_file() => path.to_path_buf(),
            _ => self.queue_file.clone(),
        };

        let mut added = 0;
        for line in read_or_log(&source) {
            added += self.add(&line, false, &mut accept).added;
        }
        tracing::debug!(path = %source.display(), added, "loaded queue file");

        if include_history {
            self.reconcile_history()?;
        }
        Ok(LoadReport {
            path: source,
            added,
        })
    }

    /// Writes the queue merged with whatever `path` (default: the queue file)
    /// already lists, minus history and deleted URLs. Nothing is written
    /// when both are empty.
    pub fn save(&mut self, path: Option<&Path>, include_history: bool) -> Result<SaveReport> {
        let target = match path {
            Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
            _ => self.queue_file.clone(),
        };
        if include_history {
            self.reconcile_history()?;
        }

        let mut merged = self.queue.clone();
        let mut seen: HashSet<String> = merged.iter().cloned().collect();
        for line in read_or_log(&target) {
            if seen.insert(line.clone()) {
                merged.push(line);
            }
        }

        let pending: Vec<String> = merged
            .iter()
            .filter(|url| !self.history.contains(*url) && !self.deleted.contains(*url))
            .cloned()
            .collect();
        if !merged.is_empty() {
            write_lines(&target, &pending)?;
        }
        tracing::debug!(path = %target.display(), written = pending.len(), "saved queue file");
        Ok(SaveReport {
            path: target,
            written: pending.len(),
        })
    }

    /// Unions the history with the history file and rewrites the file sorted.
    /// Returns the size of the merged history.
    pub fn reconcile_history(&mut self) -> Result<usize> {
        self.history.extend(read_or_log(&self.history_file));
        let sorted: Vec<String> = self.history.iter().cloned().collect();
        write_lines(&self.history_file, &sorted)?;
        Ok(self.history.len())
    }

    /// Interactive wipe of the queue, optionally its file (`path`, default
    /// the queue file), then of the history via [`Self::forget_history`].
    pub fn drop_queue(
        &mut self,
        path: Option<&Path>,
        prompt: &mut dyn Prompt,
        cache: &mut InfoCache,
    ) -> Result<()> {
        let target = path.map(Path::to_path_buf).unwrap_or_else(|| self.queue_file.clone());
        let history = &self.history;
        self.queue.retain(|url| !history.contains(url));
        self.queued = self.queue.iter().cloned().collect();

        if !self.queue.is_empty() {
            println!(
                "There are {} urls in the queue that have not been downloaded.",
                self.queue.len()
            );
        }
        let message = format!("Do you want to remove all {} urls from the queue?", self.queue.len());
        if prompt::confirm_twice(prompt, &message) {
            self.queue.clear();
            self.queued.clear();
        }

        let on_disk = read_lines(&target).unwrap_or(Vec::new()).len();
        let message = format!("Do you want to remove all {on_disk} urls the queue file?");
        if prompt::confirm_twice(prompt, &message) {
            write_lines(&target, &[])?;
        }

        self.forget_history(None, prompt, cache)
    }

    /// Interactive wipe of the in-memory history (and the metadata cache),
    /// then optionally of the history file (`path`, default the history file).
    pub fn forget_history(
        &mut self,
        path: Option<&Path>,
        prompt: &mut dyn Prompt,
        cache: &mut InfoCache,
    ) -> Result<()> {
        let target = path.map(Path::to_path_buf).unwrap_or_else(|| self.history_file.clone());
        if prompt::confirm_twice(prompt, "Do you want to forget the history of dl'd videos?") {
            self.history.clear();
            cache.clear();
        }
        if prompt::confirm_twice(prompt, "Do you want to forget the history file?") {
            write_lines(&target, &[])?;
        }
        Ok(())
    }
}

/// Reads a URL list: trimmed, blank lines dropped, cleaned, first occurrence
/// wins. A missing file is a benign skip.
pub fn read_lines(path: &Path) -> BestEffort<Vec<String>> {
    if !path.is_file() {
        return BestEffort::Skipped(format!("no file at {}", path.display()));
    }
    let file = match File::open(path).with_context(|| format!("opening {}", path.display())) {
        Ok(file) => file,
        Err(err) => return BestEffort::Failed(err),
    };

    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = match line.with_context(|| format!("reading {}", path.display())) {
            Ok(line) => line,
            Err(err) => return BestEffort::Failed(err),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let url = clean_url(trimmed);
        if seen.insert(url.clone()) {
            lines.push(url);
        }
    }
    BestEffort::Done(lines)
}

fn read_or_log(path: &Path) -> Vec<String> {
    match read_lines(path) {
        BestEffort::Done(lines) => lines,
        BestEffort::Skipped(reason) => {
            tracing::debug!(%reason, "nothing to read");
            Vec::new()
        }
        BestEffort::Failed(err) => {
            tracing::warn!(error = %format!("{err:#}"), "treating unreadable file as empty");
            Vec::new()
        }
    }
}

/// Writes one cleaned URL per line with a trailing newline, dropping blanks
/// and repeats.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut contents = String::new();
    for line in lines.iter().map(|line| line.trim()).filter(|line| !line.is_empty()) {
        let url = clean_url(line);
        if seen.insert(url.clone()) {
            contents.push_str(&url);
            contents.push('\n');
        }
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
