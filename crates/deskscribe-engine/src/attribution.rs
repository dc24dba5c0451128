//! Source attribution
//!
//! Labels stretches of a dual-source transcript with who was audible:
//! `[You]` for the microphone, `[System]` for loopback, `[Both]` for
//! overlap. The timeline comes from the raw tracks alone; the transcript is
//! never consulted to decide who was active, only to place words.
//!
//! With word timestamps placement is exact. Without them the words are
//! spread over the active segments in proportion to segment length, assuming
//! a uniform speaking pace. That path is an approximation and only ever used
//! as a fallback.

use deskscribe_audio::analysis::{activity_mask, WINDOW_MS};
use deskscribe_types::{ActiveSource, ActivitySegment, Transcript};

/// Activity gaps shorter than this many windows are closed before the
/// timeline is built, so a breath between words does not split a segment.
const SMOOTH_GAP_WINDOWS: usize = 3;

/// Build the session activity timeline from the two raw tracks. Both slices
/// must be at the same sample rate. The result is a partition: sorted,
/// gap-free, overlap-free, covering every window either track has.
pub fn build_activity_timeline(
    mic: &[f32],
    system: &[f32],
    sample_rate: u32,
    mic_threshold: f32,
    system_threshold: f32,
) -> Vec<ActivitySegment> {
    let mut mic_mask = activity_mask(mic, sample_rate, mic_threshold);
    let mut sys_mask = activity_mask(system, sample_rate, system_threshold);
    smooth_mask(&mut mic_mask, SMOOTH_GAP_WINDOWS);
    smooth_mask(&mut sys_mask, SMOOTH_GAP_WINDOWS);

    let windows = mic_mask.len().max(sys_mask.len());
    let mut segments: Vec<ActivitySegment> = Vec::new();

    for i in 0..windows {
        let mic_on = mic_mask.get(i).copied().unwrap_or(false);
        let sys_on = sys_mask.get(i).copied().unwrap_or(false);
        let source = match (mic_on, sys_on) {
            (true, true) => ActiveSource::Both,
            (true, false) => ActiveSource::User,
            (false, true) => ActiveSource::System,
            (false, false) => ActiveSource::None,
        };

        let start = i as i64 * WINDOW_MS as i64;
        let end = start + WINDOW_MS as i64;
        match segments.last_mut() {
            Some(last) if last.source == source => last.end = end,
            _ => segments.push(ActivitySegment { start, end, source }),
        }
    }

    segments
}

/// Close short inactive gaps inside active runs.
fn smooth_mask(mask: &mut [bool], max_gap: usize) {
    let mut i = 0;
    while i < mask.len() {
        if mask[i] {
            i += 1;
            continue;
        }
        let gap_start = i;
        while i < mask.len() && !mask[i] {
            i += 1;
        }
        let bounded_left = gap_start > 0;
        let bounded_right = i < mask.len();
        if bounded_left && bounded_right && i - gap_start < max_gap {
            for w in &mut mask[gap_start..i] {
                *w = true;
            }
        }
    }
}

/// The single source carrying all activity, if there is exactly one.
pub fn single_active_source(timeline: &[ActivitySegment]) -> Option<ActiveSource> {
    let mut found: Option<ActiveSource> = None;
    for seg in timeline {
        if seg.source == ActiveSource::None {
            continue;
        }
        match found {
            None => found = Some(seg.source),
            Some(existing) if existing == seg.source => {}
            Some(_) => return None,
        }
    }
    found
}

/// Re-render the transcript with inline source markers. Returns the text
/// unchanged when attribution has nothing to add: no active segments, a
/// single active source, or an empty transcript.
pub fn attribute(transcript: &Transcript, timeline: &[ActivitySegment]) -> String {
    if transcript.text.trim().is_empty() {
        return transcript.text.clone();
    }

    let active: Vec<&ActivitySegment> = timeline
        .iter()
        .filter(|s| s.source != ActiveSource::None)
        .collect();
    if active.is_empty() || single_active_source(timeline).is_some() {
        return transcript.text.clone();
    }

    if transcript.words.is_empty() {
        render_proportional(&transcript.text, &active)
    } else {
        render_exact(transcript, &active)
    }
}

fn marker(source: ActiveSource) -> &'static str {
    match source {
        ActiveSource::User => "[You]",
        ActiveSource::System => "[System]",
        ActiveSource::Both => "[Both]",
        ActiveSource::None => "",
    }
}

/// Exact path: each word goes to the active segment containing its start
/// time, or the nearest one when it falls outside every segment.
fn render_exact(transcript: &Transcript, active: &[&ActivitySegment]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<ActiveSource> = None;

    for word in &transcript.words {
        let source = source_for_instant(word.start, active);
        if current != Some(source) {
            parts.push(marker(source).to_string());
            current = Some(source);
        }
        parts.push(word.text.clone());
    }

    parts.join(" ")
}

fn source_for_instant(instant_ms: i64, active: &[&ActivitySegment]) -> ActiveSource {
    if let Some(seg) = active.iter().find(|s| s.contains(instant_ms)) {
        return seg.source;
    }
    // Outside every active segment, take the nearest edge
    active
        .iter()
        .min_by_key(|s| {
            if instant_ms < s.start {
                s.start - instant_ms
            } else {
                instant_ms - s.end + 1
            }
        })
        .map(|s| s.source)
        .unwrap_or(ActiveSource::None)
}

/// Fallback path: split the flat word list over the active segments by
/// duration share. Uniform pace is assumed, which is wrong whenever one
/// speaker is faster, so the exact path is always preferred.
fn render_proportional(text: &str, active: &[&ActivitySegment]) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return text.to_string();
    }

    let total_ms: i64 = active.iter().map(|s| s.duration_ms()).sum();
    if total_ms <= 0 {
        return text.to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<ActiveSource> = None;
    let mut taken = 0usize;
    let mut elapsed_ms = 0i64;

    for (i, seg) in active.iter().enumerate() {
        elapsed_ms += seg.duration_ms();
        // Cumulative rounding keeps the total exact
        let until = if i + 1 == active.len() {
            words.len()
        } else {
            ((words.len() as f64) * (elapsed_ms as f64) / (total_ms as f64)).round() as usize
        };
        let until = until.clamp(taken, words.len());
        if until == taken {
            continue;
        }
        if current != Some(seg.source) {
            parts.push(marker(seg.source).to_string());
            current = Some(seg.source);
        }
        parts.extend(words[taken..until].iter().map(|w| w.to_string()));
        taken = until;
    }

    parts.join(" ")
}
