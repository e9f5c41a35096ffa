//! Renames files whose output template had empty fields, e.g.
//! `0 Show - .mkv` becomes `Show.mkv`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MARKER: &str = "0 ";

/// Cleaned stem for a file name starting with `"0 "`, or `None` when the
/// name is left alone.
pub fn tidy_stem(stem: &str) -> Option<String> {
    let rest = stem.strip_prefix(MARKER)?.trim();
    let rest = rest.strip_suffix('.').unwrap_or(rest);
    let rest = rest.strip_suffix(" -").unwrap_or(rest);
    let mut cleaned = rest.to_string();
    while cleaned.contains("  ") {
        cleaned = cleaned.replace("  ", " ");
    }
    Some(cleaned)
}

fn tidied_path(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let new_stem = tidy_stem(stem)?;
    let name = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{new_stem}.{ext}"),
        None => new_stem,
    };
    Some(path.with_file_name(name))
}

/// Renames every matching file under `root`. Existing targets are never
/// overwritten. Returns the renames performed.
pub fn clean_dir(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let mut renamed = Vec::new();
    for path in files {
        let Some(target) = tidied_path(&path) else {
            continue;
        };
        if target.exists() {
            tracing::warn!(
                from = %path.display(),
                to = %target.display(),
                "not renaming over an existing file"
            );
            continue;
        }
        fs::rename(&path, &target)
            .with_context(|| format!("renaming {} to {}", path.display(), target.display()))?;
        tracing::debug!(from = %path.display(), to = %target.display(), "renamed");
        renamed.push((path, target));
    }
    Ok(renamed)
}
