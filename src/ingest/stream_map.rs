// Stream selection rules for input files

use std::collections::HashSet;

use crate::db::schema::{InputFile, MetadataKind};
use crate::error::{LibraryError, Result};
use crate::probe::{count_type, find_index, Stream, StreamType};

/// Pick streams automatically when the choice is unambiguous: at most one
/// video, one audio and one subtitle stream. Returns an empty map otherwise.
pub fn auto_map(streams: &[Stream]) -> Vec<i64> {
    let types = [StreamType::Video, StreamType::Audio, StreamType::Subtitle];
    if types.iter().any(|t| count_type(streams, *t) > 1) {
        return Vec::new();
    }

    types
        .iter()
        .filter_map(|t| streams.iter().find(|s| s.stream_type == *t))
        .map(|s| s.index)
        .collect()
}

/// Check an operator-supplied map against the source streams
pub fn validate_stream_map(streams: &[Stream], indices: &[i64]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut mapped: Vec<&Stream> = Vec::with_capacity(indices.len());

    for &idx in indices {
        let stream = find_index(streams, idx).ok_or(LibraryError::InvalidStreamIndex(idx))?;
        if !seen.insert(idx) {
            return Err(LibraryError::ValidationFailed(format!("stream {} mapped twice", idx)));
        }
        mapped.push(stream);
    }

    let mapped_of = |t: StreamType| mapped.iter().filter(|s| s.stream_type == t).count();

    if count_type(streams, StreamType::Video) > 0 && mapped_of(StreamType::Video) != 1 {
        return Err(LibraryError::MissingVideoStream);
    }
    if count_type(streams, StreamType::Audio) > 0 && mapped_of(StreamType::Audio) != 1 {
        return Err(LibraryError::MissingAudioStream);
    }

    Ok(())
}

/// Kind of file the transcoder will produce for this input
pub fn output_type(inp: &InputFile) -> Result<MetadataKind> {
    let mapped = inp.mapped_streams();
    if mapped.iter().any(|s| s.stream_type == StreamType::Video) {
        Ok(MetadataKind::FileVideo)
    } else if mapped.iter().any(|s| s.stream_type == StreamType::Audio) {
        Ok(MetadataKind::FileAudio)
    } else {
        Err(LibraryError::ValidationFailed(format!(
            "input file {} has no mapped video or audio stream",
            inp.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(stream_type: StreamType, index: i64) -> Stream {
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
    fn test_auto_map_orders_video_audio_subtitle() {
        let streams = vec![
            s(StreamType::Subtitle, 0),
            s(StreamType::Audio, 1),
            s(StreamType::Video, 2),
        ];
        assert_eq!(auto_map(&streams), vec![2, 1, 0]);
    }

    #[test]
    fn test_auto_map_audio_only() {
        assert_eq!(auto_map(&[s(StreamType::Audio, 0)]), vec![0]);
    }

    #[test]
    fn test_auto_map_ambiguous_left_empty() {
        let streams = vec![
            s(StreamType::Video, 0),
            s(StreamType::Audio, 1),
            s(StreamType::Audio, 2),
        ];
        assert!(auto_map(&streams).is_empty());

        let subs = vec![
            s(StreamType::Video, 0),
            s(StreamType::Subtitle, 1),
            s(StreamType::Subtitle, 2),
        ];
        assert!(auto_map(&subs).is_empty());
    }

    #[test]
    fn test_validate_stream_map() {
        let streams = vec![
            s(StreamType::Video, 0),
            s(StreamType::Audio, 1),
            s(StreamType::Audio, 2),
            s(StreamType::Subtitle, 3),
        ];

        validate_stream_map(&streams, &[0, 2]).unwrap();
        validate_stream_map(&streams, &[0, 1, 3]).unwrap();

        assert!(matches!(
            validate_stream_map(&streams, &[0, 9]).unwrap_err(),
            LibraryError::InvalidStreamIndex(9)
        ));
        assert!(matches!(
            validate_stream_map(&streams, &[1]).unwrap_err(),
            LibraryError::MissingVideoStream
        ));
        assert!(matches!(
            validate_stream_map(&streams, &[0]).unwrap_err(),
            LibraryError::MissingAudioStream
        ));
        assert!(matches!(
            validate_stream_map(&streams, &[0, 1, 2]).unwrap_err(),
            LibraryError::MissingAudioStream
        ));
        assert!(matches!(
            validate_stream_map(&streams, &[0, 1, 1]).unwrap_err(),
            LibraryError::ValidationFailed(_)
        ));
    }

    #[test]
    fn test_audio_only_source_needs_no_video() {
        let streams = vec![s(StreamType::Audio, 0)];
        validate_stream_map(&streams, &[0]).unwrap();
    }
}
