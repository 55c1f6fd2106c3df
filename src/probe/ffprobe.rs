// FFprobe wrapper for stream inspection

use std::path::Path;
use std::process::Command;
use serde::Deserialize;

use crate::constants::{FPS_MAX, FPS_MIN, PROBE_ARGS, STILL_IMAGE_CODECS};
use crate::error::{LibraryError, Result};
use super::{ProbeResult, Stream, StreamType};

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    index: i64,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    channels: Option<i64>,
    tags: Option<FFprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeTags {
    language: Option<String>,
}

/// Run ffprobe on a file and extract its usable streams
pub fn inspect(path: &Path) -> Result<ProbeResult> {
    inspect_with(&crate::tools::ffprobe_path(), path)
}

/// Same as `inspect`, with an explicit ffprobe binary
pub fn inspect_with(ffprobe: &Path, path: &Path) -> Result<ProbeResult> {
    let output = Command::new(ffprobe)
        .args(PROBE_ARGS)
        .arg(path)
        .output()
        .map_err(|e| LibraryError::ProbeError(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LibraryError::ProbeError(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let probed = parse_output(&output.stdout)?;
    if probed.streams.is_empty() {
        return Err(LibraryError::NoStreamsFound(path.display().to_string()));
    }

    log::debug!(
        "Probed {}: {} stream(s), {}s, format {}",
        path.display(),
        probed.streams.len(),
        probed.duration,
        probed.format_name
    );

    Ok(probed)
}

/// Parse ffprobe JSON into typed streams. Unknown stream types and
/// embedded cover art are dropped.
pub fn parse_output(json: &[u8]) -> Result<ProbeResult> {
    let probe_output: FFprobeOutput = serde_json::from_slice(json)
        .map_err(|e| LibraryError::ProbeError(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut result = ProbeResult::default();

    for raw in probe_output.streams.unwrap_or_default() {
        let stream_type = match raw.codec_type.as_deref() {
            Some("video") => StreamType::Video,
            Some("audio") => StreamType::Audio,
            Some("subtitle") => StreamType::Subtitle,
            _ => continue,
        };

        let codec = raw.codec_name.unwrap_or_default();
        let language = raw.tags.and_then(|t| t.language).unwrap_or_default();

        let stream = match stream_type {
            StreamType::Video => {
                let fps = select_fps(
                    rounded_fps(raw.r_frame_rate.as_deref()),
                    rounded_fps(raw.avg_frame_rate.as_deref()),
                );
                if fps == 0 && STILL_IMAGE_CODECS.contains(&codec.as_str()) {
                    continue;
                }
                Stream {
                    stream_type,
                    index: raw.index,
                    codec,
                    width: raw.width.unwrap_or(0),
                    height: raw.height.unwrap_or(0),
                    fps,
                    channels: 0,
                    language: String::new(),
                }
            }
            StreamType::Audio => Stream {
                stream_type,
                index: raw.index,
                codec,
                width: 0,
                height: 0,
                fps: 0,
                channels: raw.channels.unwrap_or(0),
                language,
            },
            StreamType::Subtitle => Stream {
                stream_type,
                index: raw.index,
                codec,
                width: 0,
                height: 0,
                fps: 0,
                channels: 0,
                language,
            },
        };
        result.streams.push(stream);
    }

    if let Some(format) = probe_output.format {
        result.duration = parse_duration_secs(format.duration.as_deref());
        result.format_name = format.format_name.unwrap_or_default();
    }

    Ok(result)
}

/// Parse a frame rate like "30000/1001" and round it up, zeroing values
/// outside the accepted window
fn rounded_fps(rate_str: Option<&str>) -> i64 {
    let Some(rate_str) = rate_str else {
        return 0;
    };

    let value = match rate_str.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den > 0.0 { num / den } else { 0.0 }
        }
        None => rate_str.trim().parse().unwrap_or(0.0),
    };

    let fps = value.ceil() as i64;
    if (FPS_MIN..=FPS_MAX).contains(&fps) {
        fps
    } else {
        0
    }
}

/// Prefer the smaller of the two rates when both are sane
fn select_fps(r_fps: i64, avg_fps: i64) -> i64 {
    match (r_fps, avg_fps) {
        (0, avg) => avg,
        (r, 0) => r,
        (r, avg) => r.min(avg),
    }
}

/// Parse duration string to whole seconds (truncated)
fn parse_duration_secs(duration_str: Option<&str>) -> i64 {
    duration_str
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|secs| secs.max(0.0) as i64)
        .unwrap_or(0)
}
