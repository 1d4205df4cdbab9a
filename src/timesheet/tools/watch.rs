//! Detection of files dropped into the download directory by the browser.
//!
//! The portal gives no completion signal for an export; the only evidence is a
//! new file appearing on disk. [`await_new_artifact`] polls for that file and
//! [`claim_artifact`] moves it to a name attributed to the client without ever
//! replacing an existing file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, instrument};

use crate::timesheet::tools::error::Result;

/// Result of waiting for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A new matching file appeared.
    Found(PathBuf),
    /// No new file appeared before the deadline.
    Timeout,
}

/// Lists the files in `dir` whose extension matches `extension`
/// (case-insensitive, without the leading dot).
pub fn snapshot(dir: &Path, extension: &str) -> Result<BTreeSet<PathBuf>> {
    let mut matches = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_extension(&path, extension) {
            matches.insert(path);
        }
    }
    Ok(matches)
}

/// Waits for a file that is not in `before` to show up in `dir`.
///
/// The directory is checked once per `poll_interval`, after sleeping, for
/// `timeout / poll_interval` polls (at least one). The first poll that sees a
/// new file returns it; with several new files the most recently created one
/// wins and equal timestamps fall back to the greatest path.
#[instrument(level = "debug", skip_all, fields(dir = %dir.display(), ?timeout))]
pub fn await_new_artifact(
    dir: &Path,
    extension: &str,
    before: &BTreeSet<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<WatchOutcome> {
    let polls = poll_count(timeout, poll_interval);

    for attempt in 1..=polls {
        thread::sleep(poll_interval);
        let current = snapshot(dir, extension)?;
        let fresh: Vec<PathBuf> = current.difference(before).cloned().collect();
        if let Some(latest) = newest(fresh) {
            debug!(attempt, path = %latest.display(), "new download detected");
            return Ok(WatchOutcome::Found(latest));
        }
        debug!(attempt, polls, "waiting for download");
    }

    Ok(WatchOutcome::Timeout)
}

/// Moves `found` into `target_dir` under the client's sanitised name.
///
/// When `<name>.<ext>` is taken, `_1`, `_2`, ... is appended to the stem until
/// a free name is found. Returns the final path.
#[instrument(level = "debug", skip_all, fields(found = %found.display(), client = client_name))]
pub fn claim_artifact(
    found: &Path,
    target_dir: &Path,
    client_name: &str,
    extension: &str,
) -> Result<PathBuf> {
    let stem = sanitize_file_stem(client_name);
    let target = free_target(target_dir, &stem, extension);
    fs::rename(found, &target)?;
    Ok(target)
}

/// Makes a client name usable as a file stem.
pub fn sanitize_file_stem(raw: &str) -> String {
    let invalid = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim().trim_end_matches('.').to_string();
    if sanitized.is_empty() {
        "client".to_string()
    } else {
        sanitized
    }
}

fn free_target(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let base = dir.join(format!("{stem}.{extension}"));
    if !base.exists() {
        return base;
    }

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}.{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn poll_count(timeout: Duration, poll_interval: Duration) -> u64 {
    if poll_interval.is_zero() {
        return 1;
    }
    let polls = timeout.as_millis() / poll_interval.as_millis().max(1);
    u64::try_from(polls).unwrap_or(u64::MAX).max(1)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn newest(paths: Vec<PathBuf>) -> Option<PathBuf> {
    latest(
        paths
            .into_iter()
            .map(|path| (created_at(&path), path))
            .collect(),
    )
}

/// Latest timestamp wins; equal timestamps go to the greatest path.
fn latest(stamped: Vec<(SystemTime, PathBuf)>) -> Option<PathBuf> {
    stamped.into_iter().max().map(|(_, path)| path)
}

fn created_at(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
