//! Recovery scanner
//!
//! After a crash the working directory still holds the session files the
//! incremental writer kept valid. This scan groups them by session
//! timestamp and picks the best candidate per session, so the user can be
//! offered "you have an unfinished recording from 14:02". Purely advisory:
//! nothing is moved, deleted, or locked here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};

use crate::naming::{day_prefix, parse_session_file, SessionFileKind};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Sessions older than this are not offered
    pub max_age_days: i64,
    /// Files modified more recently than this are skipped; they likely
    /// belong to a session that is still running
    pub min_idle_secs: u64,
    /// A capture session is active right now, so skip everything from
    /// today to avoid racing its files
    pub recording_live: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_age_days: 14,
            min_idle_secs: 60,
            recording_live: false,
        }
    }
}

/// One abandoned session reconstructed from file names.
#[derive(Debug, Clone)]
pub struct RecoverableSession {
    /// Shared `sess_<ts>` stem
    pub stem: String,
    /// Session start time parsed from the stem
    pub timestamp: NaiveDateTime,
    /// Every file in the group, best candidate first
    pub files: Vec<PathBuf>,
    /// The file recovery should act on, chosen by kind priority
    pub selected: PathBuf,
    pub selected_kind: SessionFileKind,
}

/// Scan `dir` for abandoned session files. Returns sessions newest first.
pub fn scan(dir: &Path, opts: &ScanOptions) -> Result<Vec<RecoverableSession>> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "work dir does not exist, nothing to recover");
        return Ok(Vec::new());
    }

    let now = Local::now();
    let today = day_prefix(&now);
    let mut groups: BTreeMap<String, (NaiveDateTime, Vec<(SessionFileKind, PathBuf)>)> =
        BTreeMap::new();

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(parsed) = parse_session_file(name) else {
            continue;
        };

        if !is_idle(&path, opts.min_idle_secs) {
            tracing::debug!(file = name, "skipping recently modified file");
            continue;
        }

        groups
            .entry(parsed.stem.clone())
            .or_insert_with(|| (parsed.timestamp, Vec::new()))
            .1
            .push((parsed.kind, path));
    }

    let mut sessions: Vec<RecoverableSession> = Vec::new();
    for (stem, (timestamp, mut files)) in groups {
        let age = now.naive_local() - timestamp;
        if age > chrono::Duration::days(opts.max_age_days) {
            tracing::debug!(stem = %stem, "session beyond recovery age ceiling");
            continue;
        }
        if opts.recording_live && stem.starts_with(&today) {
            tracing::debug!(stem = %stem, "recording in progress, skipping today's session");
            continue;
        }

        // Priority first, then name, so equal-priority chunks resolve to
        // the lowest index
        files.sort_by(|a, b| {
            a.0.priority()
                .cmp(&b.0.priority())
                .then_with(|| a.1.cmp(&b.1))
        });
        let (selected_kind, selected) = files[0].clone();

        sessions.push(RecoverableSession {
            stem,
            timestamp,
            files: files.into_iter().map(|(_, p)| p).collect(),
            selected,
            selected_kind,
        });
    }

    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    tracing::info!(count = sessions.len(), dir = %dir.display(), "recovery scan finished");
    Ok(sessions)
}

fn is_idle(path: &Path, min_idle_secs: u64) -> bool {
    if min_idle_secs == 0 {
        return true;
    }
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match modified.elapsed() {
        Ok(idle) => idle.as_secs() >= min_idle_secs,
        // Modification time in the future reads as "being written right now"
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{session_stem, session_stem_now};

    fn relaxed() -> ScanOptions {
        ScanOptions {
            max_age_days: 40_000,
            min_idle_secs: 0,
            recording_live: false,
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"RIFF").unwrap();
    }

    #[test]
    fn selects_processed_over_raw_in_one_group() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sess_20260101_100000_raw.wav");
        touch(dir.path(), "sess_20260101_100000_processed.wav");

        let sessions = scan(dir.path(), &relaxed()).unwrap();
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.stem, "sess_20260101_100000");
        assert_eq!(session.files.len(), 2);
        assert_eq!(session.selected_kind, SessionFileKind::Processed);
        assert!(session
            .selected
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("_processed.wav"));
    }

    #[test]
    fn groups_sessions_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sess_20260101_100000_raw.wav");
        touch(dir.path(), "sess_20260102_090000_raw.wav");
        touch(dir.path(), "sess_20260102_090000_raw_sys.wav");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "recordings.json");

        let sessions = scan(dir.path(), &relaxed()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].stem, "sess_20260102_090000");
        assert_eq!(sessions[0].files.len(), 2);
        assert_eq!(sessions[1].stem, "sess_20260101_100000");
    }

    #[test]
    fn chunk_only_group_selects_lowest_index() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sess_20260101_100000_chunk_001.wav");
        touch(dir.path(), "sess_20260101_100000_chunk_000.wav");

        let sessions = scan(dir.path(), &relaxed()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].selected_kind, SessionFileKind::Chunk(0));
    }

    #[test]
    fn age_ceiling_excludes_old_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let old = Local::now() - chrono::Duration::days(30);
        let fresh = Local::now() - chrono::Duration::days(1);
        touch(dir.path(), &format!("{}_raw.wav", session_stem(&old)));
        touch(dir.path(), &format!("{}_raw.wav", session_stem(&fresh)));

        let opts = ScanOptions {
            min_idle_secs: 0,
            ..ScanOptions::default()
        };
        let sessions = scan(dir.path(), &opts).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].stem, session_stem(&fresh));
    }

    #[test]
    fn recently_modified_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sess_20260101_100000_raw.wav");

        // Just written, so the 60-second guard hides it
        let sessions = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert!(sessions.iter().all(|s| s.stem != "sess_20260101_100000"));

        // Relaxing the guard reveals it
        let sessions = scan(dir.path(), &relaxed()).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn live_recording_hides_todays_sessions_only() {
        let dir = tempfile::tempdir().unwrap();
        let yesterday = Local::now() - chrono::Duration::days(1);
        touch(dir.path(), &format!("{}_raw.wav", session_stem_now()));
        touch(dir.path(), &format!("{}_raw.wav", session_stem(&yesterday)));

        let opts = ScanOptions {
            min_idle_secs: 0,
            recording_live: true,
            ..ScanOptions::default()
        };
        let sessions = scan(dir.path(), &opts).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].stem, session_stem(&yesterday));

        let opts = ScanOptions {
            recording_live: false,
            ..opts
        };
        assert_eq!(scan(dir.path(), &opts).unwrap().len(), 2);
    }

    #[test]
    fn missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        assert!(scan(&missing, &ScanOptions::default()).unwrap().is_empty());
    }
}
