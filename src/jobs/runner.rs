// Job runner - claims one input file and carries it to a published catalog entry

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use rusqlite::Connection;

use crate::catalog::{paths, CatalogTree};
use crate::constants::WORKER_CLAIM_BATCH;
use crate::db::schema::{self, InputFile, Metadata, MetadataKind};
use crate::db::Store;
use crate::error::{LibraryError, Result};
use crate::ingest::{output_names, OutputNames};
use crate::jobs::ffmpeg_builder::{self, TranscodePlan};
use crate::jobs::supervisor::{self, SupervisorOptions};
use crate::jobs::{claim_input_file, copy, list_claim_candidates, set_failed, set_succeeded};
use crate::{probe, tools};

/// How jobs are executed
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub supervisor: SupervisorOptions,
    /// ffmpeg binary used for transcodes
    pub ffmpeg: PathBuf,
    /// ffprobe binary used to check finished outputs
    pub ffprobe: PathBuf,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            supervisor: SupervisorOptions::default(),
            ffmpeg: tools::ffmpeg_path(),
            ffprobe: tools::ffprobe_path(),
        }
    }
}

/// Everything decided before the claim
struct PreparedJob {
    names: OutputNames,
    plan: TranscodePlan,
    command: String,
}

/// Run a single job from the queue. Returns false when nothing was claimable.
pub fn run_next_job(
    store: &Store,
    catalog: &CatalogTree,
    options: &WorkerOptions,
    stop_check: &dyn Fn() -> bool,
) -> Result<bool> {
    let conn = store.connect()?;

    for id in list_claim_candidates(&conn, WORKER_CLAIM_BATCH)? {
        let Some(inp) = schema::get_input_file(&conn, &id)? else {
            continue;
        };

        let prepared = match prepare(store, &inp) {
            Ok(p) => p,
            Err(e) if !e.is_validation() => return Err(e),
            Err(e) => {
                // Claim with no command so the failure is recorded exactly once
                if !claim_input_file(&conn, &id, Utc::now().timestamp(), "")? {
                    continue;
                }
                set_failed(&conn, &id, &e.to_string())?;
                log::warn!("Input file {} failed before transcoding: {}", id, e);
                return Ok(true);
            }
        };

        let started = Utc::now().timestamp();
        if !claim_input_file(&conn, &id, started, &prepared.command)? {
            log::debug!("Input file {} claimed by another worker", id);
            continue;
        }
        log::info!("Transcoding {} -> {}", inp.source_location, prepared.names.path.display());

        match execute(catalog, &inp, &prepared, options, stop_check) {
            Ok(md) => {
                let elapsed = set_succeeded(&conn, &id, started)?;
                log::info!(
                    "Job {} succeeded in {}s ({} bytes, {}s)",
                    id, elapsed, md.size, md.duration
                );
            }
            Err(e) => {
                fail_claimed(&conn, &inp, &prepared.names, &e)?;
            }
        }
        return Ok(true);
    }

    Ok(false)
}

fn prepare(store: &Store, inp: &InputFile) -> Result<PreparedJob> {
    let names = output_names(store.media_root(), inp)?;

    let owner = store.with_read(|conn| schema::find_metadata_sibling(conn, "", &names.sort))?;
    if let Some(owner) = owner {
        return Err(LibraryError::NameCollision(format!(
            "{} is already used by catalog entry {}",
            names.sort, owner.id
        )));
    }
    let base = store.media_root().join(&names.sort);
    if let Some(existing) = paths::existing_artifact(&base, names.kind) {
        return Err(LibraryError::NameCollision(format!("{} already exists", existing.display())));
    }

    let plan = ffmpeg_builder::plan(inp, names.kind, &names.temp_path)?;
    let command = plan.command_line(Path::new(&inp.source_location), &names.temp_path);
    Ok(PreparedJob { names, plan, command })
}

fn execute(
    catalog: &CatalogTree,
    inp: &InputFile,
    job: &PreparedJob,
    options: &WorkerOptions,
    stop_check: &dyn Fn() -> bool,
) -> Result<Metadata> {
    let names = &job.names;
    remove_stale(&names.temp_path)?;

    match &job.plan {
        TranscodePlan::Copy => {
            copy::copy_with_verify(Path::new(&inp.source_location), &names.temp_path)?;
        }
        TranscodePlan::Ffmpeg(args) => {
            let mut cmd = Command::new(&options.ffmpeg);
            cmd.args(args);
            let run = supervisor::supervise(cmd, &inp.id, inp.source_duration, &options.supervisor, stop_check)?;
            if !run.saw_end {
                log::warn!("Job {}: ffmpeg exited cleanly without reporting progress=end", inp.id);
            }
        }
    }

    let probed = probe::inspect_with(&options.ffprobe, &names.temp_path)?;
    let kind = classify(&probed)?;
    if kind != names.kind {
        return Err(LibraryError::ValidationFailed(format!(
            "output probed as {}, expected {}",
            kind, names.kind
        )));
    }
    let size = fs::metadata(&names.temp_path)?.len() as i64;
    if probed.duration <= 0 || size <= 0 {
        return Err(LibraryError::ValidationFailed(format!(
            "output {} is empty (duration {}s, {} bytes)",
            names.temp_path.display(),
            probed.duration,
            size
        )));
    }

    let mut md = Metadata::new("", kind, &names.display);
    md.id = inp.id.clone();
    md.name_sort = names.sort.clone();
    md.streams = probed.streams;
    md.duration = probed.duration;
    md.size = size;
    // The name may have been taken since `prepare`; publish_file re-checks
    // under the write guard and leaves the temp file in place on failure
    catalog.publish_file(md, &names.temp_path)
}

/// File kind of a finished output
fn classify(probed: &probe::ProbeResult) -> Result<MetadataKind> {
    if probed.has_video() {
        Ok(MetadataKind::FileVideo)
    } else if probed.has_audio() {
        Ok(MetadataKind::FileAudio)
    } else {
        Err(LibraryError::NoStreamsFound("transcode output".to_string()))
    }
}

fn fail_claimed(conn: &Connection, inp: &InputFile, names: &OutputNames, err: &LibraryError) -> Result<()> {
    log::error!("Job {} failed: {}", inp.id, err);

    set_failed(conn, &inp.id, &err.to_string())?;
    if let Err(e) = remove_stale(&names.temp_path) {
        log::warn!("Could not remove {}: {}", names.temp_path.display(), e);
    }
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
