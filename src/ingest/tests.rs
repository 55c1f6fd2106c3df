// Ingest queue tests against a file-backed library in a temp dir

use super::*;
use crate::catalog::{CatalogTree, PathVariant};
use crate::db::schema::{CategoryKind, Metadata, TranscodeStatus};
use crate::probe::{Stream, StreamType};
use tempfile::TempDir;

fn setup() -> (TempDir, Store, IngestQueue) {
    let tmp = TempDir::new().unwrap();
    let store = Store::init(&tmp.path().join("lib.db"), &tmp.path().join("media")).unwrap();
    let queue = IngestQueue::new(store.clone());
    (tmp, store, queue)
}

fn stream(stream_type: StreamType, index: i64, codec: &str) -> Stream {
    Stream {
        stream_type,
        index,
        codec: codec.to_string(),
        width: 0,
        height: 0,
        fps: 0,
        channels: if stream_type == StreamType::Audio { 2 } else { 0 },
        language: String::new(),
    }
}

fn probed(streams: Vec<Stream>) -> ProbeResult {
    ProbeResult {
        streams,
        duration: 42,
        format_name: "matroska,webm".to_string(),
    }
}

/// Create a source file and register it with the given streams
fn register(tmp: &TempDir, queue: &IngestQueue, name: &str, streams: Vec<Stream>) -> InputFile {
    let src_dir = tmp.path().join("incoming");
    fs::create_dir_all(&src_dir).unwrap();
    let path = src_dir.join(name);
    fs::write(&path, b"not really media").unwrap();
    match queue.register(&path.canonicalize().unwrap(), probed(streams)).unwrap() {
        ScanOutcome::Queued(inp) => inp,
        other => panic!("expected Queued, got {:?}", other),
    }
}

fn video_audio() -> Vec<Stream> {
    vec![
        stream(StreamType::Video, 0, "h264"),
        stream(StreamType::Audio, 1, "aac"),
    ]
}

/// Pretend the worker claimed and finished (or failed) this input
fn mark(store: &Store, inp: &InputFile, started: i64, elapsed: i64, error: &str) -> InputFile {
    store
        .with_write(|conn| {
            let mut current = schema::get_input_file(conn, &inp.id)?.unwrap();
            let mut next = current.clone();
            next.transcoding_command = "ffmpeg ...".to_string();
            next.transcoding_time_started = started;
            next.transcoding_time_elapsed = elapsed;
            next.transcoding_error = error.to_string();
            let changes = InputFileChanges::between(&current, &next);
            schema::update_input_file(conn, &mut current, &changes)?;
            Ok(current)
        })
        .unwrap()
}

#[test]
fn test_register_auto_maps_and_dedups() {
    let (tmp, _store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    assert_eq!(inp.stream_map, vec![0, 1]);
    assert_eq!(inp.source_duration, 42);
    assert_eq!(inp.source_format, "matroska,webm");
    assert_eq!(inp.status(), TranscodeStatus::NotStarted);

    let again = queue
        .register(Path::new(&inp.source_location), probed(video_audio()))
        .unwrap();
    assert_eq!(again, ScanOutcome::AlreadyProcessed(inp.id.clone()));

    // scan short-circuits on a registered path without probing
    let scanned = queue.scan(Path::new(&inp.source_location)).unwrap();
    assert_eq!(scanned, ScanOutcome::AlreadyProcessed(inp.id));
}

#[test]
fn test_scan_skips_hidden_and_directories() {
    let (tmp, _store, queue) = setup();
    let hidden = tmp.path().join(".secret.mkv");
    fs::write(&hidden, b"x").unwrap();

    assert_eq!(queue.scan(&hidden).unwrap(), ScanOutcome::Skipped("hidden".to_string()));
    assert_eq!(queue.scan(tmp.path()).unwrap(), ScanOutcome::Skipped("directory".to_string()));
}

#[test]
fn test_register_requires_video_or_audio() {
    let (tmp, _store, queue) = setup();
    let path = tmp.path().join("subs.srt");
    fs::write(&path, b"1").unwrap();
    let err = queue
        .register(&path, probed(vec![stream(StreamType::Subtitle, 0, "subrip")]))
        .unwrap_err();
    assert!(matches!(err, LibraryError::NoStreamsFound(_)));
    assert!(queue.list().unwrap().is_empty());
}

#[test]
fn test_ambiguous_streams_need_map() {
    let (tmp, _store, queue) = setup();
    let mut streams = video_audio();
    streams.push(stream(StreamType::Audio, 2, "ac3"));
    let inp = register(&tmp, &queue, "dual-audio.mkv", streams);
    assert!(inp.stream_map.is_empty());
    register(&tmp, &queue, "simple.mkv", video_audio());

    let needing: Vec<String> = queue.list_needing_map().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(needing, vec![inp.id.clone()]);

    let remapped = queue.remap(&inp.id, &[0, 2]).unwrap();
    assert_eq!(remapped.stream_map, vec![0, 2]);
    assert_eq!(queue.get(&inp.id).unwrap().stream_map, vec![0, 2]);
    assert!(queue.list_needing_map().unwrap().is_empty());
}

#[test]
fn test_remap_without_video_leaves_map_unchanged() {
    let (tmp, _store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());

    let err = queue.remap(&inp.id, &[1]).unwrap_err();
    assert!(matches!(err, LibraryError::MissingVideoStream));
    assert_eq!(queue.get(&inp.id).unwrap().stream_map, vec![0, 1]);

    let err = queue.remap(&inp.id, &[0, 5]).unwrap_err();
    assert!(matches!(err, LibraryError::InvalidStreamIndex(5)));

    let err = queue.remap("missing", &[0, 1]).unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
}

#[test]
fn test_remap_rejected_after_start() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 0, "");

    let err = queue.remap(&inp.id, &[0, 1]).unwrap_err();
    assert!(matches!(err, LibraryError::ValidationFailed(_)));

    mark(&store, &inp, 1_700_000_000, 0, "stopped by operator");
    queue.reset(&inp.id).unwrap();
    queue.remap(&inp.id, &[0, 1]).unwrap();
}

#[test]
fn test_output_type_and_names() {
    let (tmp, store, queue) = setup();
    let video = register(&tmp, &queue, "The Matrix.mkv", video_audio());
    let names = queue.output_names(&video).unwrap();
    assert_eq!(names.display, "The Matrix");
    assert_eq!(names.sort, "matrix");
    assert_eq!(names.kind, MetadataKind::FileVideo);
    assert_eq!(names.path, store.media_root().join("matrix.mp4"));
    assert_eq!(names.temp_path, store.media_root().join("matrix.tmp.mp4"));

    let audio = register(&tmp, &queue, "Song.flac", vec![stream(StreamType::Audio, 0, "flac")]);
    assert_eq!(queue.output_type(&audio).unwrap(), MetadataKind::FileAudio);
    assert_eq!(queue.output_names(&audio).unwrap().path, store.media_root().join("song.mp3"));

    let mut unmapped = video.clone();
    unmapped.stream_map = vec![];
    assert!(matches!(queue.output_type(&unmapped).unwrap_err(), LibraryError::ValidationFailed(_)));
}

#[test]
fn test_reset_removes_temp_output() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 0, "ffmpeg exited with status 1");

    let names = queue.output_names(&inp).unwrap();
    fs::write(&names.temp_path, b"partial").unwrap();

    let reset = queue.reset(&inp.id).unwrap();
    assert_eq!(reset.status(), TranscodeStatus::NotStarted);
    assert_eq!(reset.transcoding_command, "");
    assert_eq!(reset.transcoding_error, "");
    assert_eq!(reset.transcoding_time_elapsed, 0);
    assert_eq!(reset.stream_map, vec![0, 1]);
    assert!(!names.temp_path.exists());
    assert_eq!(queue.get(&inp.id).unwrap(), reset);
}

#[test]
fn test_reset_leaves_other_entries_file_alone() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 0, "boom");

    // A different catalog entry already owns movie.mp4 at the root
    let catalog = CatalogTree::new(store.clone());
    let mut other = Metadata::new("", MetadataKind::FileVideo, "Movie");
    other.name_sort = "movie".to_string();
    fs::write(store.media_root().join("movie.mp4"), b"someone else").unwrap();
    catalog.publish(other).unwrap();

    queue.reset(&inp.id).unwrap();
    assert!(store.media_root().join("movie.mp4").exists());
}

#[test]
fn test_reset_keeps_root_file_it_never_wrote() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "The Movie.mkv", video_audio());
    fs::write(store.media_root().join("movie.mp4"), b"someone else").unwrap();

    // The worker refuses the name and records the failure without running
    let catalog = CatalogTree::new(store.clone());
    let never = || false;
    assert!(crate::jobs::runner::run_next_job(&store, &catalog, &crate::jobs::WorkerOptions::default(), &never).unwrap());
    let failed = queue.get(&inp.id).unwrap();
    assert_eq!(failed.status(), TranscodeStatus::Failed);
    assert_eq!(failed.transcoding_command, "");

    queue.reset(&inp.id).unwrap();
    assert_eq!(fs::read(store.media_root().join("movie.mp4")).unwrap(), b"someone else");

    // A failed transcode keeps its hands off the final name as well
    mark(&store, &inp, 1_700_000_000, 0, "ffmpeg exited with status 1");
    queue.delete(&inp.id).unwrap();
    assert_eq!(fs::read(store.media_root().join("movie.mp4")).unwrap(), b"someone else");
}

#[test]
fn test_reset_and_delete_rejected_while_running() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    let conn = store.connect().unwrap();
    assert!(crate::jobs::claim_input_file(&conn, &inp.id, 1000, "ffmpeg A").unwrap());

    let err = queue.reset(&inp.id).unwrap_err();
    assert!(matches!(err, LibraryError::ValidationFailed(_)));
    let err = queue.delete(&inp.id).unwrap_err();
    assert!(matches!(err, LibraryError::ValidationFailed(_)));

    // Still Running, so no second worker can take it
    let running = queue.get(&inp.id).unwrap();
    assert_eq!(running.status(), TranscodeStatus::Running);
    assert_eq!(running.transcoding_command, "ffmpeg A");
    assert!(!crate::jobs::claim_input_file(&conn, &inp.id, 2000, "ffmpeg B").unwrap());

    crate::jobs::set_failed(&conn, &inp.id, "killed").unwrap();
    assert_eq!(queue.reset(&inp.id).unwrap().status(), TranscodeStatus::NotStarted);
}

#[test]
fn test_reset_deletes_published_metadata_wherever_it_moved() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 30, "");

    let catalog = CatalogTree::new(store.clone());
    let names = queue.output_names(&inp).unwrap();
    fs::write(&names.path, b"transcoded").unwrap();
    let mut md = Metadata::new("", MetadataKind::FileVideo, &names.display);
    md.id = inp.id.clone();
    md.name_sort = names.sort.clone();
    md.duration = 42;
    md.size = 10;
    catalog.publish(md).unwrap();

    let cat = catalog.create_category("Movies", CategoryKind::Movie).unwrap();
    let moved = catalog.reparent(&inp.id, &cat.id).unwrap();
    let moved_path = catalog.path_for(&moved, PathVariant::Media).unwrap();
    assert!(moved_path.is_file());
    assert!(queue.did_succeed(&queue.get(&inp.id).unwrap()).unwrap());

    queue.reset(&inp.id).unwrap();
    assert!(!moved_path.exists());
    assert!(matches!(catalog.get_metadata(&inp.id).unwrap_err(), LibraryError::NotFound(_)));
    assert!(!queue.did_succeed(&queue.get(&inp.id).unwrap()).unwrap());
}

#[test]
fn test_delete_keeps_successful_output() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 30, "");

    let names = queue.output_names(&inp).unwrap();
    fs::write(&names.path, b"transcoded").unwrap();
    let mut md = Metadata::new("", MetadataKind::FileVideo, &names.display);
    md.id = inp.id.clone();
    md.name_sort = names.sort.clone();
    md.duration = 42;
    md.size = 10;
    CatalogTree::new(store.clone()).publish(md).unwrap();

    queue.delete(&inp.id).unwrap();
    assert!(matches!(queue.get(&inp.id).unwrap_err(), LibraryError::NotFound(_)));
    assert!(names.path.is_file());
}

#[test]
fn test_delete_reverses_failed_work() {
    let (tmp, store, queue) = setup();
    let inp = register(&tmp, &queue, "movie.mkv", video_audio());
    mark(&store, &inp, 1_700_000_000, 0, "stalled");

    let names = queue.output_names(&inp).unwrap();
    fs::write(&names.temp_path, b"partial").unwrap();

    queue.delete(&inp.id).unwrap();
    assert!(!names.temp_path.exists());
    assert!(queue.list().unwrap().is_empty());
}

#[test]
fn test_scan_tree_counts() {
    let (tmp, _store, queue) = setup();
    let registered = register(&tmp, &queue, "known.mkv", video_audio());

    let incoming = tmp.path().join("incoming");
    fs::write(incoming.join(".partial.mkv"), b"x").unwrap();
    fs::write(incoming.join("garbage.mkv"), b"definitely not a container").unwrap();

    let summary = queue.scan_tree(&incoming).unwrap();
    assert_eq!(summary.already_processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.queued, 0);
    assert_eq!(queue.list().unwrap().len(), 1);
    assert_eq!(queue.list().unwrap()[0].id, registered.id);

    assert!(matches!(
        queue.scan_tree(&tmp.path().join("nope")).unwrap_err(),
        LibraryError::NotFound(_)
    ));
}
