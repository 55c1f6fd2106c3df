// FFmpeg argument construction for transcodes
// Produces the canonical output profile: h264/aac/mov_text in mp4, or mp3.

use std::path::Path;

use crate::constants::*;
use crate::db::schema::{InputFile, MetadataKind};
use crate::error::{LibraryError, Result};
use crate::probe::StreamType;

/// How an input file becomes its library output
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodePlan {
    /// The source already matches the output profile; copy it byte for byte
    Copy,
    /// Run ffmpeg with these arguments
    Ffmpeg(Vec<String>),
}

impl TranscodePlan {
    /// The command line recorded on the input file when the job is claimed
    pub fn command_line(&self, source: &Path, output: &Path) -> String {
        match self {
            TranscodePlan::Copy => format!("copy {} {}", source.display(), output.display()),
            TranscodePlan::Ffmpeg(args) => format!("ffmpeg {}", args.join(" ")),
        }
    }
}

/// Choose between the copy fast path and an ffmpeg transcode
pub fn plan(inp: &InputFile, kind: MetadataKind, output: &Path) -> Result<TranscodePlan> {
    if can_copy_directly(inp, kind) {
        return Ok(TranscodePlan::Copy);
    }
    Ok(TranscodePlan::Ffmpeg(build_transcode_args(inp, kind, output)?))
}

fn source_extension(inp: &InputFile) -> String {
    Path::new(&inp.source_location)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// True when the source can be copied untouched: every stream is mapped,
/// the container is already the target family, and every stream already
/// uses its target codec. Copy and transcode are never mixed.
pub fn can_copy_directly(inp: &InputFile, kind: MetadataKind) -> bool {
    if inp.source_streams.is_empty() || inp.stream_map.len() != inp.source_streams.len() {
        return false;
    }
    let mut mapped: Vec<i64> = inp.stream_map.clone();
    mapped.sort_unstable();
    let mut all: Vec<i64> = inp.source_streams.iter().map(|s| s.index).collect();
    all.sort_unstable();
    if mapped != all {
        return false;
    }

    let ext = source_extension(inp);
    let formats: Vec<&str> = inp.source_format.split(',').map(str::trim).collect();

    match kind {
        MetadataKind::FileVideo => {
            formats.contains(&MP4_FORMAT_FAMILY)
                && FAST_PATH_VIDEO_EXTENSIONS.contains(&ext.as_str())
                && inp.source_streams.iter().all(|s| match s.stream_type {
                    StreamType::Video => s.codec == PROBED_VIDEO_TARGET,
                    StreamType::Audio => {
                        s.codec == PROBED_VIDEO_AUDIO_TARGET && s.channels == OUTPUT_AUDIO_CHANNELS
                    }
                    StreamType::Subtitle => s.codec == PROBED_SUBTITLE_TARGET,
                })
        }
        MetadataKind::FileAudio => {
            formats.contains(&MP3_FORMAT)
                && FAST_PATH_AUDIO_EXTENSIONS.contains(&ext.as_str())
                && inp.source_streams.iter().all(|s| {
                    s.stream_type == StreamType::Audio && s.codec == PROBED_AUDIO_TARGET
                })
        }
        _ => false,
    }
}

/// Build the ffmpeg argument list writing to `output`
pub fn build_transcode_args(inp: &InputFile, kind: MetadataKind, output: &Path) -> Result<Vec<String>> {
    let mapped = inp.mapped_streams();
    if mapped.len() != inp.stream_map.len() {
        let missing = inp
            .stream_map
            .iter()
            .copied()
            .find(|idx| crate::probe::find_index(&inp.source_streams, *idx).is_none())
            .unwrap_or(-1);
        return Err(LibraryError::InvalidStreamIndex(missing));
    }

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        inp.source_location.clone(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
    ];

    let audio_only = kind == MetadataKind::FileAudio;
    let mut has_video = false;
    let mut has_audio = false;
    let mut has_subtitle = false;

    for stream in &mapped {
        match stream.stream_type {
            StreamType::Video => has_video = true,
            StreamType::Audio => has_audio = true,
            StreamType::Subtitle if audio_only => {
                log::warn!(
                    "Dropping subtitle stream {} of {}: mp3 output cannot carry subtitles",
                    stream.index, inp.source_location
                );
                continue;
            }
            StreamType::Subtitle => has_subtitle = true,
        }
        args.push("-map".into());
        args.push(format!("0:{}", stream.index));
    }

    match kind {
        MetadataKind::FileVideo => {
            if !has_video {
                return Err(LibraryError::MissingVideoStream);
            }
            args.extend([
                "-c:v".into(), VIDEO_CODEC.into(),
                "-preset".into(), VIDEO_PRESET.into(),
                "-crf".into(), VIDEO_CRF.to_string(),
                "-pix_fmt".into(), VIDEO_PIX_FMT.into(),
                "-profile:v".into(), VIDEO_PROFILE.into(),
                "-level:v".into(), VIDEO_LEVEL.into(),
                "-movflags".into(), "+faststart".into(),
            ]);
            if has_audio {
                args.extend([
                    "-c:a".into(), VIDEO_AUDIO_CODEC.into(),
                    "-ac".into(), OUTPUT_AUDIO_CHANNELS.to_string(),
                    "-b:a".into(), VIDEO_AUDIO_BITRATE.into(),
                ]);
            }
            if has_subtitle {
                args.extend(["-c:s".into(), SUBTITLE_CODEC.into()]);
            }
        }
        MetadataKind::FileAudio => {
            if !has_audio {
                return Err(LibraryError::MissingAudioStream);
            }
            let already_mp3 = mapped
                .iter()
                .filter(|s| s.stream_type == StreamType::Audio)
                .all(|s| s.codec == PROBED_AUDIO_TARGET);
            if already_mp3 {
                args.extend(["-c:a".into(), "copy".into()]);
            } else {
                args.extend([
                    "-c:a".into(), AUDIO_CODEC.into(),
                    "-b:a".into(), AUDIO_BITRATE.into(),
                    "-ac".into(), OUTPUT_AUDIO_CHANNELS.to_string(),
                ]);
            }
        }
        other => {
            return Err(LibraryError::ValidationFailed(format!("cannot transcode to {}", other)));
        }
    }

    args.push("-y".into());
    args.push(output.to_string_lossy().to_string());

    Ok(args)
}
