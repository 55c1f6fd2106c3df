// Ingest queue module
// Registers raw sources, holds their stream selection, and undoes partial
// transcode work on reset.

pub mod discover;
pub mod stream_map;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::constants::TEMP_OUTPUT_MARKER;
use crate::db::schema::{self, InputFile, InputFileChanges, MetadataKind, TranscodeStatus};
use crate::db::Store;
use crate::error::{LibraryError, Result};
use crate::naming::{name_valid_for_disk, output_sort_name};
use crate::probe::{self, ProbeResult};

pub use stream_map::{auto_map, output_type, validate_stream_map};

/// What happened to a scanned path
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Queued(InputFile),
    /// Already registered; carries the existing id
    AlreadyProcessed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub queued: usize,
    pub already_processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Where a transcode of an input file lands
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNames {
    pub display: String,
    pub sort: String,
    pub kind: MetadataKind,
    /// `<media root>/<sort>.<ext>`
    pub path: PathBuf,
    /// `<media root>/<sort>.tmp.<ext>`
    pub temp_path: PathBuf,
}

/// Compute display/sort names and output paths from the source file name
pub fn output_names(media_root: &Path, inp: &InputFile) -> Result<OutputNames> {
    let kind = output_type(inp)?;
    let display = Path::new(&inp.source_location)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let sort = output_sort_name(&display);
    if !name_valid_for_disk(&sort) {
        return Err(LibraryError::InvalidName(display));
    }

    // output_type only returns file kinds
    let ext = kind.media_extension().unwrap_or_default();
    Ok(OutputNames {
        path: media_root.join(format!("{}.{}", sort, ext)),
        temp_path: media_root.join(format!("{}.{}.{}", sort, TEMP_OUTPUT_MARKER, ext)),
        display,
        sort,
        kind,
    })
}

fn require(conn: &Connection, id: &str) -> Result<InputFile> {
    schema::get_input_file(conn, id)?.ok_or_else(|| LibraryError::NotFound(format!("input file {}", id)))
}

fn did_succeed_in(conn: &Connection, inp: &InputFile) -> Result<bool> {
    if inp.transcoding_time_started == 0 || !inp.transcoding_error.is_empty() {
        return Ok(false);
    }
    Ok(schema::get_metadata(conn, &inp.id)?
        .map(|md| md.duration > 0 && md.size > 0)
        .unwrap_or(false))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reset and delete must not pull a row out from under a running worker
fn reject_running(inp: &InputFile) -> Result<()> {
    if inp.status() == TranscodeStatus::Running {
        return Err(LibraryError::ValidationFailed(format!(
            "input file {} is being transcoded; wait for the job to finish",
            inp.id
        )));
    }
    Ok(())
}

/// Undo any transcode output for `inp` and clear its status fields.
/// The stream map is kept.
fn reset_in(conn: &Connection, media_root: &Path, inp: &mut InputFile) -> Result<()> {
    if schema::get_metadata(conn, &inp.id)?.is_some() {
        // Published: the catalog knows where the files live now
        catalog::metadata::delete(conn, media_root, &inp.id, false)?;
    } else if !inp.transcoding_command.is_empty() {
        // Unpublished runs only ever wrote the temp file; the final name may
        // belong to someone else
        if let Ok(names) = output_names(media_root, inp) {
            remove_if_present(&names.temp_path)?;
        }
    }

    let mut cleared = inp.clone();
    cleared.transcoding_command = String::new();
    cleared.transcoding_time_started = 0;
    cleared.transcoding_time_elapsed = 0;
    cleared.transcoding_error = String::new();
    let changes = InputFileChanges::between(inp, &cleared);
    schema::update_input_file(conn, inp, &changes)?;

    log::info!("Reset input file {}", inp.id);
    Ok(())
}

/// Handle for input file registration and maintenance
#[derive(Debug, Clone)]
pub struct IngestQueue {
    store: Store,
}

impl IngestQueue {
    pub fn new(store: Store) -> Self {
        IngestQueue { store }
    }

    /// Probe and register a single source file
    pub fn scan(&self, path: &Path) -> Result<ScanOutcome> {
        if let Some(reason) = discover::skip_reason(path) {
            return Ok(ScanOutcome::Skipped(reason.to_string()));
        }

        let location = path.canonicalize()?;
        let existing = self.store.with_read(|conn| {
            schema::get_input_file_by_source(conn, &location.to_string_lossy())
        })?;
        if let Some(existing) = existing {
            return Ok(ScanOutcome::AlreadyProcessed(existing.id));
        }

        let probed = probe::inspect_playable(&location)?;
        self.register(&location, probed)
    }

    /// Register an already-probed source
    pub fn register(&self, location: &Path, probed: ProbeResult) -> Result<ScanOutcome> {
        if !probed.has_video() && !probed.has_audio() {
            return Err(LibraryError::NoStreamsFound(location.display().to_string()));
        }

        let source_location = location.to_string_lossy().to_string();
        let inp = InputFile {
            id: schema::new_id(),
            stream_map: auto_map(&probed.streams),
            source_location,
            source_format: probed.format_name,
            source_streams: probed.streams,
            source_duration: probed.duration,
            time_scanned: chrono::Utc::now().timestamp(),
            transcoding_command: String::new(),
            transcoding_time_started: 0,
            transcoding_time_elapsed: 0,
            transcoding_error: String::new(),
        };

        self.store.with_write(|conn| {
            // Another scanner may have registered it since the first check
            if let Some(existing) = schema::get_input_file_by_source(conn, &inp.source_location)? {
                return Ok(ScanOutcome::AlreadyProcessed(existing.id));
            }
            schema::insert_input_file(conn, &inp)?;
            log::info!(
                "Queued {} ({} stream(s), {})",
                inp.source_location,
                inp.source_streams.len(),
                if inp.stream_map.is_empty() { "needs stream map" } else { "auto-mapped" }
            );
            Ok(ScanOutcome::Queued(inp))
        })
    }

    /// Scan every file under `dir`; individual failures are counted, not fatal
    pub fn scan_tree(&self, dir: &Path) -> Result<ScanSummary> {
        if !dir.exists() {
            return Err(LibraryError::NotFound(dir.display().to_string()));
        }

        let found = discover::discover_files(dir);
        let mut summary = ScanSummary {
            failed: found.errors.len(),
            ..Default::default()
        };
        for err in &found.errors {
            log::warn!("Could not read entry while scanning {}: {}", dir.display(), err);
        }

        for file in &found.files {
            match self.scan(file) {
                Ok(ScanOutcome::Queued(_)) => summary.queued += 1,
                Ok(ScanOutcome::AlreadyProcessed(_)) => summary.already_processed += 1,
                Ok(ScanOutcome::Skipped(reason)) => {
                    log::debug!("Skipped {} ({})", file.display(), reason);
                    summary.skipped += 1;
                }
                Err(e) => {
                    log::warn!("Failed to scan {}: {}", file.display(), e);
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Scanned {}: {} queued, {} already processed, {} skipped, {} failed",
            dir.display(),
            summary.queued,
            summary.already_processed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// Replace the stream map. Rejected once a transcode has started.
    pub fn remap(&self, id: &str, indices: &[i64]) -> Result<InputFile> {
        self.store.with_write(|conn| {
            let mut inp = require(conn, id)?;
            if inp.transcoding_time_started != 0 {
                return Err(LibraryError::ValidationFailed(format!(
                    "input file {} has a recorded transcode; reset it before remapping",
                    id
                )));
            }
            validate_stream_map(&inp.source_streams, indices)?;

            let mut updated = inp.clone();
            updated.stream_map = indices.to_vec();
            let changes = InputFileChanges::between(&inp, &updated);

            let tx = conn.unchecked_transaction()?;
            schema::update_input_file(&tx, &mut inp, &changes)?;
            tx.commit()?;

            log::info!("Remapped {} to {:?}", id, inp.stream_map);
            Ok(inp)
        })
    }

    pub fn output_type(&self, inp: &InputFile) -> Result<MetadataKind> {
        output_type(inp)
    }

    pub fn output_names(&self, inp: &InputFile) -> Result<OutputNames> {
        output_names(self.store.media_root(), inp)
    }

    /// Remove published or partial output and return the file to NotStarted.
    /// Rejected while the file is Running.
    pub fn reset(&self, id: &str) -> Result<InputFile> {
        self.store.with_write(|conn| {
            let mut inp = require(conn, id)?;
            reject_running(&inp)?;
            reset_in(conn, self.store.media_root(), &mut inp)?;
            Ok(inp)
        })
    }

    pub fn did_succeed(&self, inp: &InputFile) -> Result<bool> {
        self.store.with_read(|conn| did_succeed_in(conn, inp))
    }

    /// Forget an input file, first undoing any incomplete transcode
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.with_write(|conn| {
            let mut inp = require(conn, id)?;
            reject_running(&inp)?;
            if !did_succeed_in(conn, &inp)? {
                reset_in(conn, self.store.media_root(), &mut inp)?;
            }
            schema::delete_input_file(conn, id)?;
            log::info!("Deleted input file {} ({})", id, inp.source_location);
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<InputFile> {
        self.store.with_read(|conn| require(conn, id))
    }

    pub fn list(&self) -> Result<Vec<InputFile>> {
        self.store.with_read(schema::list_input_files)
    }

    pub fn list_needing_map(&self) -> Result<Vec<InputFile>> {
        self.store.with_read(schema::list_input_files_needing_map)
    }
}
