//! Session file naming convention
//!
//! Capture, post-processing, and chunking all write files named
//! `sess_<YYYYMMDD_HHMMSS><suffix>` into the working directory. The recovery
//! scanner groups files back into sessions purely from these names, so writer
//! and scanner must agree here and nowhere else.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};

const STEM_PREFIX: &str = "sess_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// `sess_` + 8 date digits + `_` + 6 time digits
const STEM_LEN: usize = 20;

/// Role of one file within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFileKind {
    /// Raw microphone capture
    Raw,
    /// Raw system-loopback capture
    RawSys,
    /// Silence-stripped copy
    Processed,
    /// MP3 re-encode for upload
    Compressed,
    /// Split chunk, zero-based index
    Chunk(u32),
}

impl SessionFileKind {
    pub fn suffix(&self) -> String {
        match self {
            SessionFileKind::Raw => "_raw.wav".to_string(),
            SessionFileKind::RawSys => "_raw_sys.wav".to_string(),
            SessionFileKind::Processed => "_processed.wav".to_string(),
            SessionFileKind::Compressed => "_compressed.mp3".to_string(),
            SessionFileKind::Chunk(i) => format!("_chunk_{:03}.wav", i),
        }
    }

    /// Recovery preference, lower wins: a processed file supersedes the raw
    /// capture it was derived from, a compressed copy supersedes raw too.
    pub fn priority(&self) -> u8 {
        match self {
            SessionFileKind::Processed => 0,
            SessionFileKind::Compressed => 1,
            SessionFileKind::Raw => 2,
            SessionFileKind::RawSys => 3,
            SessionFileKind::Chunk(_) => 4,
        }
    }
}

/// Session stem for the given start time, e.g. `sess_20260101_100000`.
pub fn session_stem(started: &DateTime<Local>) -> String {
    format!("{}{}", STEM_PREFIX, started.format(TIMESTAMP_FORMAT))
}

/// Session stem for "now".
pub fn session_stem_now() -> String {
    session_stem(&Local::now())
}

/// `sess_<YYYYMMDD>` prefix shared by every session started on `day`.
pub fn day_prefix(day: &DateTime<Local>) -> String {
    format!("{}{}", STEM_PREFIX, day.format("%Y%m%d"))
}

/// Full path of one session file.
pub fn session_file(dir: &Path, stem: &str, kind: SessionFileKind) -> PathBuf {
    dir.join(format!("{}{}", stem, kind.suffix()))
}

/// A file name successfully matched against the convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSessionFile {
    /// The shared `sess_<ts>` stem
    pub stem: String,
    /// Session start time parsed out of the stem
    pub timestamp: NaiveDateTime,
    pub kind: SessionFileKind,
}

/// Parse a bare file name. Returns `None` for anything that is not a
/// session file, including near-misses with a malformed timestamp.
pub fn parse_session_file(file_name: &str) -> Option<ParsedSessionFile> {
    if !file_name.starts_with(STEM_PREFIX)
        || file_name.len() <= STEM_LEN
        || !file_name.is_char_boundary(STEM_LEN)
    {
        return None;
    }
    let (stem, rest) = file_name.split_at(STEM_LEN);
    let timestamp = NaiveDateTime::parse_from_str(&stem[STEM_PREFIX.len()..], TIMESTAMP_FORMAT)
        .ok()?;

    let kind = match rest {
        "_raw.wav" => SessionFileKind::Raw,
        "_raw_sys.wav" => SessionFileKind::RawSys,
        "_processed.wav" => SessionFileKind::Processed,
        "_compressed.mp3" => SessionFileKind::Compressed,
        _ => {
            let index = rest
                .strip_prefix("_chunk_")?
                .strip_suffix(".wav")?
                .parse::<u32>()
                .ok()?;
            SessionFileKind::Chunk(index)
        }
    };

    Some(ParsedSessionFile {
        stem: stem.to_string(),
        timestamp,
        kind,
    })
}
