//! Recording manifest store
//!
//! One JSON document (`recordings.json`) indexes every retained recording.
//! Load on open, mutate in memory, save atomically on every mutation. The
//! store owns metadata only; deleting the audio files a pruned entry points
//! at is the caller's job.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use deskscribe_types::RecordingEntry;

const MANIFEST_FILE: &str = "recordings.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    recordings: Vec<RecordingEntry>,
}

/// Single-writer store over the manifest document. All mutation happens
/// behind one lock; simultaneous writers from other processes are not
/// supported.
pub struct ManifestStore {
    dir: PathBuf,
    path: PathBuf,
    entries: Mutex<Vec<RecordingEntry>>,
    reconciled: AtomicBool,
}

impl ManifestStore {
    /// Open the manifest in `dir`, creating the directory if needed. A
    /// missing manifest file is an empty store, not an error.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(MANIFEST_FILE);

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            match serde_json::from_str::<ManifestFile>(&content) {
                Ok(file) => file.recordings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "manifest unreadable, starting empty: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::debug!(count = entries.len(), path = %path.display(), "manifest opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            entries: Mutex::new(entries),
            reconciled: AtomicBool::new(false),
        })
    }

    /// Snapshot of all entries, unordered.
    pub fn entries(&self) -> Vec<RecordingEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Absolute path of an entry's primary audio file.
    pub fn audio_path(&self, entry: &RecordingEntry) -> PathBuf {
        self.dir.join(&entry.audio_file)
    }

    /// Append one entry and persist immediately.
    pub fn add_recording(&self, entry: RecordingEntry) -> Result<()> {
        let mut guard = self.entries.lock();
        let mut next = guard.clone();
        next.push(entry);
        self.save(&next)?;
        *guard = next;
        Ok(())
    }

    /// Remove the entry with the given id, persist, and hand it back.
    pub fn remove(&self, id: &str) -> Result<Option<RecordingEntry>> {
        let mut guard = self.entries.lock();
        let Some(pos) = guard.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let mut next = guard.clone();
        let removed = next.remove(pos);
        self.save(&next)?;
        *guard = next;
        Ok(Some(removed))
    }

    /// Drop the oldest entries (by recording timestamp) until at most `n`
    /// remain. Returns the removed entries, oldest first, so the caller can
    /// delete their backing files.
    pub fn prune_to_count(&self, n: usize) -> Result<Vec<RecordingEntry>> {
        let mut guard = self.entries.lock();
        if guard.len() <= n {
            return Ok(Vec::new());
        }

        let mut next = guard.clone();
        next.sort_by_key(|e| e.recorded_at);
        let removed: Vec<RecordingEntry> = next.drain(..next.len() - n).collect();
        self.save(&next)?;
        *guard = next;

        tracing::info!(removed = removed.len(), kept = n, "pruned manifest");
        Ok(removed)
    }

    /// Cross-check entries against the filesystem: entries whose audio file
    /// is gone are dropped, zero durations and sizes are recomputed from the
    /// file. Runs its body once per store; later calls are no-ops.
    pub fn reconcile(&self) -> Result<()> {
        if self.reconciled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut guard = self.entries.lock();
        let mut next = Vec::with_capacity(guard.len());
        let mut changed = false;

        for entry in guard.iter() {
            let audio = self.dir.join(&entry.audio_file);
            if !audio.exists() {
                tracing::warn!(
                    id = %entry.id,
                    file = %audio.display(),
                    "dropping manifest entry, audio file is gone"
                );
                changed = true;
                continue;
            }

            let mut entry = entry.clone();
            if entry.duration_secs <= 0.0 {
                match deskscribe_audio::probe_duration_secs(&audio) {
                    Ok(secs) => {
                        entry.duration_secs = secs;
                        changed = true;
                    }
                    Err(e) => {
                        tracing::warn!(id = %entry.id, "could not recompute duration: {}", e)
                    }
                }
            }
            if entry.size_bytes == 0 {
                if let Ok(meta) = std::fs::metadata(&audio) {
                    entry.size_bytes = meta.len();
                    changed = true;
                }
            }
            next.push(entry);
        }

        if changed {
            self.save(&next)?;
            *guard = next;
        }
        Ok(())
    }

    /// Write-temp-then-rename so a crash mid-save never truncates the
    /// manifest.
    fn save(&self, entries: &[RecordingEntry]) -> Result<()> {
        let file = ManifestFile {
            recordings: entries.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_entry(id: &str, minute: u32) -> RecordingEntry {
        RecordingEntry {
            id: id.to_string(),
            audio_file: format!("{}.wav", id),
            recorded_at: Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, 0).unwrap(),
            duration_secs: 10.0,
            size_bytes: 1024,
            preview: String::new(),
            transcript_file: None,
            dual_source: false,
        }
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ManifestStore::open(dir.path()).unwrap();
            store.add_recording(make_entry("a", 0)).unwrap();
            store.add_recording(make_entry("b", 1)).unwrap();
        }
        let store = ManifestStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.entries().iter().any(|e| e.id == "a"));
        // Atomic save leaves no temp file behind
        assert!(!dir.path().join("recordings.json.tmp").exists());
    }

    #[test]
    fn prune_removes_exactly_the_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();
        // Insert out of chronological order on purpose
        for (id, minute) in [
            ("e4", 4),
            ("e0", 0),
            ("e7", 7),
            ("e2", 2),
            ("e5", 5),
            ("e1", 1),
            ("e6", 6),
            ("e3", 3),
        ] {
            store.add_recording(make_entry(id, minute)).unwrap();
        }

        let removed = store.prune_to_count(5).unwrap();
        let removed_ids: Vec<&str> = removed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(removed_ids, vec!["e0", "e1", "e2"]);

        let kept: Vec<String> = store.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(kept.len(), 5);
        for id in ["e3", "e4", "e5", "e6", "e7"] {
            assert!(kept.contains(&id.to_string()), "missing {}", id);
        }

        // Survives reopen with the same five
        drop(store);
        let store = ManifestStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn prune_under_limit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();
        store.add_recording(make_entry("only", 0)).unwrap();
        assert!(store.prune_to_count(5).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_returns_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();
        store.add_recording(make_entry("gone", 0)).unwrap();

        let removed = store.remove("gone").unwrap().unwrap();
        assert_eq!(removed.id, "gone");
        assert!(store.is_empty());
        assert!(store.remove("gone").unwrap().is_none());
    }

    #[test]
    fn garbage_manifest_starts_empty_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{broken").unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn reconcile_drops_missing_files_and_fixes_durations() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();

        // Real 2-second file with a zeroed duration in the manifest
        let samples = vec![0.1f32; 32_000];
        deskscribe_audio::file_io::write_wav_i16(&dir.path().join("real.wav"), &samples, 16_000)
            .unwrap();
        let mut real = make_entry("real", 0);
        real.duration_secs = 0.0;
        real.size_bytes = 0;
        store.add_recording(real).unwrap();

        // Entry whose file never existed
        store.add_recording(make_entry("phantom", 1)).unwrap();

        store.reconcile().unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "real");
        assert!((entries[0].duration_secs - 2.0).abs() < 0.01);
        assert!(entries[0].size_bytes > 0);
    }

    #[test]
    fn reconcile_runs_once_per_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).unwrap();

        let samples = vec![0.1f32; 16_000];
        let path = dir.path().join("once.wav");
        deskscribe_audio::file_io::write_wav_i16(&path, &samples, 16_000).unwrap();
        store.add_recording(make_entry("once", 0)).unwrap();

        store.reconcile().unwrap();
        assert_eq!(store.len(), 1);

        // File disappears afterwards; a second reconcile must not react
        std::fs::remove_file(&path).unwrap();
        store.reconcile().unwrap();
        assert_eq!(store.len(), 1);
    }
}
