// Transcode progress: ffmpeg `-progress` parsing and the progress snapshot

use serde::Serialize;

/// Progress snapshot for a running job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: String,
    pub phase: String,
    pub current: u64,
    pub total: u64,
    pub percent: f64,
}

impl JobProgress {
    pub fn new(job_id: impl Into<String>, phase: impl Into<String>, current: u64, total: u64) -> Self {
        let total_safe = total.max(1);
        let percent = (current as f64 / total_safe as f64) * 100.0;
        Self {
            job_id: job_id.into(),
            phase: phase.into(),
            current,
            total,
            percent: percent.min(100.0),
        }
    }

    /// Progress of a transcode from ffmpeg's output position (microseconds)
    /// against the source duration (seconds)
    pub fn from_out_time(job_id: impl Into<String>, out_time_us: i64, duration_secs: i64) -> Self {
        let current = (out_time_us.max(0) / 1_000_000) as u64;
        Self::new(job_id, "transcode", current, duration_secs.max(0) as u64)
    }
}

/// One `key=value` record from `ffmpeg -progress pipe:1`
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Output timestamp in microseconds
    OutTime(i64),
    Continue,
    End,
    Field { key: String, value: String },
}

/// Parse one progress line. Lines that are not `key=value` yield None.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    // out_time_ms is also microseconds (long-standing ffmpeg quirk); prefer out_time_us
    let event = match (key, value) {
        ("out_time_us", v) => match v.parse::<i64>() {
            Ok(us) => ProgressEvent::OutTime(us),
            Err(_) => ProgressEvent::Field { key: key.to_string(), value: value.to_string() },
        },
        ("progress", "end") => ProgressEvent::End,
        ("progress", _) => ProgressEvent::Continue,
        _ => ProgressEvent::Field { key: key.to_string(), value: value.to_string() },
    };
    Some(event)
}
