// Stream probing module

pub mod ffprobe;

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;

pub use ffprobe::{inspect, inspect_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Video => "video",
            StreamType::Audio => "audio",
            StreamType::Subtitle => "subtitle",
        }
    }
}

/// One elementary stream of a container, as ffprobe reported it.
/// Stored as JSON on input files and catalog entries; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub index: i64,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub fps: i64,
    #[serde(default)]
    pub channels: i64,
    #[serde(default)]
    pub language: String,
}

/// Result of probing a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub streams: Vec<Stream>,
    /// Whole seconds
    pub duration: i64,
    /// ffprobe `format_name`, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format_name: String,
}

impl ProbeResult {
    pub fn has_video(&self) -> bool {
        count_type(&self.streams, StreamType::Video) > 0
    }

    pub fn has_audio(&self) -> bool {
        count_type(&self.streams, StreamType::Audio) > 0
    }
}

/// Number of streams of the given type
pub fn count_type(streams: &[Stream], stream_type: StreamType) -> usize {
    streams.iter().filter(|s| s.stream_type == stream_type).count()
}

/// Find a stream by its container index
pub fn find_index(streams: &[Stream], index: i64) -> Option<&Stream> {
    streams.iter().find(|s| s.index == index)
}

/// Check if ffprobe is available
pub fn is_available() -> bool {
    crate::tools::is_tool_available("ffprobe")
}

/// Probe a file that must contain at least one video or audio stream
pub fn inspect_playable(path: &Path) -> Result<ProbeResult> {
    let probed = inspect(path)?;
    if !probed.has_video() && !probed.has_audio() {
        return Err(crate::error::LibraryError::NoStreamsFound(
            path.display().to_string(),
        ));
    }
    Ok(probed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(stream_type: StreamType, index: i64) -> Stream {
        Stream {
            stream_type,
            index,
            codec: String::new(),
            width: 0,
            height: 0,
            fps: 0,
            channels: 0,
            language: String::new(),
        }
    }

    #[test]
    fn test_stream_json_shape() {
        let s = Stream {
            codec: "h264".to_string(),
            width: 1920,
            height: 1080,
            fps: 24,
            ..stream(StreamType::Video, 0)
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["index"], 0);
        assert_eq!(json["fps"], 24);

        // Missing optional fields default to zero/empty
        let parsed: Stream = serde_json::from_str(r#"{"type":"subtitle","index":3}"#).unwrap();
        assert_eq!(parsed.stream_type, StreamType::Subtitle);
        assert_eq!(parsed.language, "");
    }

    #[test]
    fn test_counts_and_lookup() {
        let streams = vec![
            stream(StreamType::Video, 0),
            stream(StreamType::Audio, 1),
            stream(StreamType::Audio, 2),
        ];
        assert_eq!(count_type(&streams, StreamType::Audio), 2);
        assert_eq!(count_type(&streams, StreamType::Subtitle), 0);
        assert_eq!(find_index(&streams, 2).map(|s| s.stream_type), Some(StreamType::Audio));
        assert!(find_index(&streams, 7).is_none());

        let probed = ProbeResult { streams, duration: 10, format_name: String::new() };
        assert!(probed.has_video());
        assert!(probed.has_audio());
    }
}
