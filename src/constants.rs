// Reelvault Constants
// Output profile and worker timing. Changing the encode profile changes every
// future transcode; existing library files are not touched.

// Paths
pub const APP_DIR: &str = ".reelvault";
pub const DB_FILENAME: &str = "reelvault.db";
pub const DB_BUSY_TIMEOUT_MS: u64 = 5000;

// Property keys
pub const PROPERTY_MEDIA_PATH: &str = "media_path";
pub const PROPERTY_TRANSCODER_STOP: &str = "transcoder_stop";

// Category defaults
pub const CATEGORY_DEFAULT_SORT_INDEX: i64 = 9999;

// Disk suffixes
pub const VIDEO_OUTPUT_EXTENSION: &str = "mp4";
pub const AUDIO_OUTPUT_EXTENSION: &str = "mp3";
pub const POSTER_LARGE_SUFFIX: &str = ".large.jpg";
pub const POSTER_SMALL_SUFFIX: &str = ".small.jpg";
pub const TEMP_OUTPUT_MARKER: &str = "tmp";

// Frame rate sanity window (rounded up fps)
pub const FPS_MIN: i64 = 10;
pub const FPS_MAX: i64 = 320;

// Video codecs that ffprobe reports for embedded cover art / thumbnails
pub const STILL_IMAGE_CODECS: [&str; 6] = ["mjpeg", "png", "bmp", "gif", "webp", "tiff"];

// Probe timeout is enforced by ffprobe itself; duration is whole seconds
pub const PROBE_ARGS: [&str; 6] = [
    "-v", "quiet",
    "-print_format", "json",
    "-show_format",
    "-show_streams",
];

// Video encode profile
pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_PRESET: &str = "slow";
pub const VIDEO_CRF: u32 = 20;
pub const VIDEO_PIX_FMT: &str = "yuv420p";
pub const VIDEO_PROFILE: &str = "high";
pub const VIDEO_LEVEL: &str = "4.1";

// Audio encode profile (inside video output)
pub const VIDEO_AUDIO_CODEC: &str = "aac";
pub const VIDEO_AUDIO_BITRATE: &str = "192k";
pub const OUTPUT_AUDIO_CHANNELS: i64 = 2;

// Audio encode profile (audio-only output)
pub const AUDIO_CODEC: &str = "libmp3lame";
pub const AUDIO_BITRATE: &str = "192k";

// Subtitle codec carried in mp4
pub const SUBTITLE_CODEC: &str = "mov_text";

// Codec names as ffprobe reports them, used by the copy fast path
pub const PROBED_VIDEO_TARGET: &str = "h264";
pub const PROBED_VIDEO_AUDIO_TARGET: &str = "aac";
pub const PROBED_AUDIO_TARGET: &str = "mp3";
pub const PROBED_SUBTITLE_TARGET: &str = "mov_text";

// ffprobe format_name values accepted by the copy fast path
pub const MP4_FORMAT_FAMILY: &str = "mp4";
pub const MP3_FORMAT: &str = "mp3";
pub const FAST_PATH_VIDEO_EXTENSIONS: [&str; 2] = ["mp4", "m4v"];
pub const FAST_PATH_AUDIO_EXTENSIONS: [&str; 1] = ["mp3"];

// Worker timing
pub const TRANSCODE_STALL_SECONDS: u64 = 10;
pub const PROGRESS_POLL_INTERVAL_MS: u64 = 500;
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
pub const WORKER_IDLE_SECONDS: u64 = 5;
pub const WORKER_CLAIM_BATCH: i64 = 8;
pub const STDERR_TAIL_LINES: usize = 20;

// Hashing
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB

// Scanner
pub const SKIP_HIDDEN: &str = "hidden";
pub const SKIP_DIRECTORY: &str = "directory";
