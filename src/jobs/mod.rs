// Transcode job module
// The queue is the input_files table itself: a claim is a conditional UPDATE
// that exactly one worker wins.

pub mod copy;
pub mod ffmpeg_builder;
pub mod progress;
pub mod runner;
pub mod supervisor;
pub mod worker;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::constants::PROPERTY_TRANSCODER_STOP;
use crate::db::schema;
use crate::error::Result;

pub use runner::WorkerOptions;
pub use supervisor::SupervisorOptions;
pub use worker::TranscodeWorker;

/// Ids of input files ready to transcode, oldest scan first
pub fn list_claim_candidates(conn: &Connection, limit: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM input_files
         WHERE transcoding_time_started = 0
           AND stream_map <> '[]'
           AND transcoding_error = ''
           AND id NOT IN (SELECT id FROM metadata)
         ORDER BY time_scanned, source_location
         LIMIT ?1",
    )?;
    let ids = stmt
        .query_map(params![limit], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Mark an input file Running. Returns false if another worker got there first.
pub fn claim_input_file(conn: &Connection, id: &str, started: i64, command: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE input_files
         SET transcoding_time_started = ?1, transcoding_command = ?2
         WHERE id = ?3
           AND transcoding_time_started = 0
           AND transcoding_error = ''
           AND stream_map <> '[]'
           AND id NOT IN (SELECT id FROM metadata)",
        params![started, command, id],
    )?;
    Ok(rows == 1)
}

/// Record a failure. The start time and command are kept.
pub fn set_failed(conn: &Connection, id: &str, error: &str) -> Result<()> {
    let message = if error.is_empty() { "unknown error" } else { error };
    conn.execute(
        "UPDATE input_files SET transcoding_error = ?1, transcoding_time_elapsed = 0 WHERE id = ?2",
        params![message, id],
    )?;
    Ok(())
}

/// Record success; elapsed is at least one second so the row reads as finished
pub fn set_succeeded(conn: &Connection, id: &str, started: i64) -> Result<i64> {
    let elapsed = (Utc::now().timestamp() - started).max(1);
    conn.execute(
        "UPDATE input_files SET transcoding_time_elapsed = ?1, transcoding_error = '' WHERE id = ?2",
        params![elapsed, id],
    )?;
    Ok(elapsed)
}

/// Current value of the transcoder stop marker
pub fn read_stop_marker(conn: &Connection) -> Result<i64> {
    Ok(schema::get_property(conn, PROPERTY_TRANSCODER_STOP)?
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0))
}

/// Ask running workers to stop after their current job
pub fn request_stop(conn: &Connection) -> Result<i64> {
    let marker = schema::increment_property(conn, PROPERTY_TRANSCODER_STOP)?;
    log::info!("Transcoder stop requested (marker {})", marker);
    Ok(marker)
}

/// Get worker identifier
pub fn get_worker_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let pid = std::process::id();
    format!("{}:{}", hostname, pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{InputFile, Metadata, MetadataKind, TranscodeStatus};
    use crate::db::{open_connection, Store};
    use crate::probe::{Stream, StreamType};
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::init(&dir.path().join("lib.db"), &dir.path().join("media")).unwrap();
        (dir, store)
    }

    fn input(id: &str, scanned: i64, map: Vec<i64>) -> InputFile {
        InputFile {
            id: id.to_string(),
            source_location: format!("/in/{}.mkv", id),
            source_format: "matroska,webm".to_string(),
            source_streams: vec![Stream {
                stream_type: StreamType::Video,
                index: 0,
                codec: "hevc".to_string(),
                width: 1920,
                height: 1080,
                fps: 24,
                channels: 0,
                language: String::new(),
            }],
            stream_map: map,
            source_duration: 90,
            time_scanned: scanned,
            transcoding_command: String::new(),
            transcoding_time_started: 0,
            transcoding_time_elapsed: 0,
            transcoding_error: String::new(),
        }
    }

    fn load(conn: &Connection, id: &str) -> InputFile {
        schema::get_input_file(conn, id).unwrap().unwrap()
    }

    #[test]
    fn test_candidates_filter_and_order() {
        let (_dir, store) = setup();
        let conn = store.connect().unwrap();

        schema::insert_input_file(&conn, &input("late", 20, vec![0])).unwrap();
        schema::insert_input_file(&conn, &input("early", 10, vec![0])).unwrap();
        schema::insert_input_file(&conn, &input("unmapped", 5, vec![])).unwrap();

        let mut failed = input("failed", 1, vec![0]);
        failed.transcoding_time_started = 100;
        failed.transcoding_error = "boom".to_string();
        schema::insert_input_file(&conn, &failed).unwrap();

        // Already published under its own id
        schema::insert_input_file(&conn, &input("published", 2, vec![0])).unwrap();
        let mut md = Metadata::new("", MetadataKind::FileVideo, "Published");
        md.id = "published".to_string();
        md.name_sort = "published".to_string();
        schema::insert_metadata(&conn, &md).unwrap();

        let ids = list_claim_candidates(&conn, 10).unwrap();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
        assert_eq!(list_claim_candidates(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_once() {
        let (_dir, store) = setup();
        let conn = store.connect().unwrap();
        schema::insert_input_file(&conn, &input("a", 1, vec![0])).unwrap();

        assert!(claim_input_file(&conn, "a", 1000, "ffmpeg -i x").unwrap());
        assert!(!claim_input_file(&conn, "a", 2000, "ffmpeg -i y").unwrap());

        let inp = load(&conn, "a");
        assert_eq!(inp.transcoding_time_started, 1000);
        assert_eq!(inp.transcoding_command, "ffmpeg -i x");
        assert_eq!(inp.status(), TranscodeStatus::Running);
    }

    #[test]
    fn test_concurrent_claim_has_one_winner() {
        let (_dir, store) = setup();
        {
            let conn = store.connect().unwrap();
            schema::insert_input_file(&conn, &input("race", 1, vec![0])).unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|n| {
                let db = store.db_path().to_path_buf();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let conn = open_connection(&db).unwrap();
                    barrier.wait();
                    claim_input_file(&conn, "race", 1000 + n, &format!("worker {}", n)).unwrap()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_failed_and_succeeded() {
        let (_dir, store) = setup();
        let conn = store.connect().unwrap();
        schema::insert_input_file(&conn, &input("f", 1, vec![0])).unwrap();
        schema::insert_input_file(&conn, &input("s", 1, vec![0])).unwrap();

        assert!(claim_input_file(&conn, "f", 1000, "ffmpeg").unwrap());
        set_failed(&conn, "f", "").unwrap();
        let inp = load(&conn, "f");
        assert_eq!(inp.status(), TranscodeStatus::Failed);
        assert_eq!(inp.transcoding_time_started, 1000);
        assert_eq!(inp.transcoding_error, "unknown error");

        // Started just now: still reports at least one second
        let now = Utc::now().timestamp();
        assert!(claim_input_file(&conn, "s", now, "copy a b").unwrap());
        assert!(set_succeeded(&conn, "s", now).unwrap() >= 1);
        let inp = load(&conn, "s");
        assert_eq!(inp.status(), TranscodeStatus::Succeeded);
        assert!(inp.transcoding_time_elapsed >= 1);
    }

    #[test]
    fn test_stop_marker() {
        let (_dir, store) = setup();
        let conn = store.connect().unwrap();
        assert_eq!(read_stop_marker(&conn).unwrap(), 0);
        assert_eq!(request_stop(&conn).unwrap(), 1);
        assert_eq!(request_stop(&conn).unwrap(), 2);
        assert_eq!(read_stop_marker(&conn).unwrap(), 2);
    }

    #[test]
    fn test_worker_id_has_pid() {
        let id = get_worker_id();
        assert!(id.ends_with(&format!(":{}", std::process::id())));
    }
}
