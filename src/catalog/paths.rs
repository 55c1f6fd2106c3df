// Disk path derivation for catalog nodes
// Paths are never stored: they are recomputed from the parent chain.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::constants::{POSTER_LARGE_SUFFIX, POSTER_SMALL_SUFFIX};
use crate::db::schema::{self, Category, Metadata, MetadataKind};
use crate::error::{LibraryError, Result};

// Parent chains deeper than this are treated as a cycle
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathVariant {
    /// Directory of the parent joined with the sort name, no suffix
    Base,
    /// The media file for leaves, the directory for containers
    Media,
    PosterLarge,
    PosterSmall,
}

/// Append `suffix` to the last path component (sort names may contain dots)
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn category_dir(media_root: &Path, cat: &Category) -> PathBuf {
    media_root.join(&cat.name)
}

/// Resolved location a node can be placed under
#[derive(Debug, Clone)]
pub struct ParentDir {
    pub dir: PathBuf,
    pub kind: ParentKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParentKind {
    Root,
    Category(Category),
    Container(Metadata),
}

/// Resolve a parent id ("" for the media root) to its directory.
/// File leaves cannot be parents.
pub fn resolve_parent(conn: &Connection, media_root: &Path, parent_id: &str) -> Result<ParentDir> {
    if parent_id.is_empty() {
        return Ok(ParentDir {
            dir: media_root.to_path_buf(),
            kind: ParentKind::Root,
        });
    }

    if let Some(cat) = schema::get_category(conn, parent_id)? {
        return Ok(ParentDir {
            dir: category_dir(media_root, &cat),
            kind: ParentKind::Category(cat),
        });
    }

    match schema::get_metadata(conn, parent_id)? {
        Some(parent) if parent.media_type.is_file() => Err(LibraryError::ValidationFailed(format!(
            "{} is a {} and cannot contain other entries",
            parent.name_display, parent.media_type
        ))),
        Some(parent) => Ok(ParentDir {
            dir: base_path(conn, media_root, &parent)?,
            kind: ParentKind::Container(parent),
        }),
        None => Err(LibraryError::NotFound(format!("parent {}", parent_id))),
    }
}

/// `<parent dir>/<name_sort>`, walking the parent chain to a category or the root
pub fn base_path(conn: &Connection, media_root: &Path, md: &Metadata) -> Result<PathBuf> {
    let mut segments: Vec<String> = vec![md.name_sort.clone()];
    let mut parent_id = md.parent_id.clone();

    for _ in 0..MAX_DEPTH {
        if parent_id.is_empty() {
            return Ok(join_segments(media_root.to_path_buf(), &segments));
        }
        if let Some(cat) = schema::get_category(conn, &parent_id)? {
            return Ok(join_segments(category_dir(media_root, &cat), &segments));
        }
        let parent = schema::get_metadata(conn, &parent_id)?
            .ok_or_else(|| LibraryError::NotFound(format!("parent {} of {}", parent_id, md.id)))?;
        segments.push(parent.name_sort);
        parent_id = parent.parent_id;
    }

    Err(LibraryError::ValidationFailed(format!(
        "parent chain of {} does not terminate",
        md.id
    )))
}

fn join_segments(start: PathBuf, reversed: &[String]) -> PathBuf {
    reversed.iter().rev().fold(start, |acc, seg| acc.join(seg))
}

/// Apply a variant to an already-computed base path
pub fn variant_path(base: &Path, kind: MetadataKind, variant: PathVariant) -> PathBuf {
    match variant {
        PathVariant::Base => base.to_path_buf(),
        PathVariant::Media => match kind.media_extension() {
            Some(ext) => with_suffix(base, &format!(".{}", ext)),
            None => base.to_path_buf(),
        },
        PathVariant::PosterLarge => with_suffix(base, POSTER_LARGE_SUFFIX),
        PathVariant::PosterSmall => with_suffix(base, POSTER_SMALL_SUFFIX),
    }
}

pub fn path_for(conn: &Connection, media_root: &Path, md: &Metadata, variant: PathVariant) -> Result<PathBuf> {
    let base = base_path(conn, media_root, md)?;
    Ok(variant_path(&base, md.media_type, variant))
}

/// The up-to-three artifacts of a node; the media artifact comes first
pub fn artifacts(base: &Path, kind: MetadataKind) -> [PathBuf; 3] {
    [
        variant_path(base, kind, PathVariant::Media),
        variant_path(base, kind, PathVariant::PosterLarge),
        variant_path(base, kind, PathVariant::PosterSmall),
    ]
}

/// First artifact of `kind` at `base` that already exists on disk
pub fn existing_artifact(base: &Path, kind: MetadataKind) -> Option<PathBuf> {
    artifacts(base, kind).into_iter().find(|p| p.exists())
}

/// Outcome of moving a node's artifacts
#[derive(Debug, Default)]
pub struct MoveReport {
    pub moved: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
    /// False only if the media artifact existed and failed to move
    pub primary_ok: bool,
}

impl MoveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn absorb(&mut self, other: MoveReport) {
        self.moved.extend(other.moved);
        self.failures.extend(other.failures);
        self.primary_ok &= other.primary_ok;
    }

    pub fn into_error(self, operation: &str) -> LibraryError {
        LibraryError::PartialMove {
            operation: operation.to_string(),
            moved: self.moved,
            failures: self.failures,
        }
    }
}

/// Move every existing artifact from one base to another. Missing
/// artifacts are skipped; failures are collected, never rolled back.
pub fn move_artifacts(from_base: &Path, to_base: &Path, kind: MetadataKind) -> MoveReport {
    let mut report = MoveReport {
        primary_ok: true,
        ..Default::default()
    };

    let sources = artifacts(from_base, kind);
    let targets = artifacts(to_base, kind);

    for (i, (from, to)) in sources.iter().zip(targets.iter()).enumerate() {
        if !from.exists() {
            continue;
        }
        match fs::rename(from, to) {
            Ok(()) => {
                log::debug!("Moved {} -> {}", from.display(), to.display());
                report.moved.push(to.clone());
            }
            Err(e) => {
                log::warn!("Failed to move {} -> {}: {}", from.display(), to.display(), e);
                report.failures.push((from.clone(), e.to_string()));
                if i == 0 {
                    report.primary_ok = false;
                }
            }
        }
    }

    report
}

/// Remove every artifact of a node; missing artifacts are ignored
pub fn remove_artifacts(base: &Path, kind: MetadataKind) -> Result<()> {
    for (i, path) in artifacts(base, kind).iter().enumerate() {
        let result = if i == 0 && !kind.is_file() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Move `from` to `to` without replacing anything already at `to`. Callers
/// hold the store's write guard, so the fallback check-then-rename is safe
/// against other catalog writers.
pub fn place_new(from: &Path, to: &Path) -> Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                log::warn!("Could not remove {} after placing it: {}", from.display(), e);
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(LibraryError::NameCollision(
            format!("{} already exists on disk", to.display()),
        )),
        Err(e) => {
            log::debug!("Hard link to {} failed ({}), renaming instead", to.display(), e);
            if to.exists() {
                return Err(LibraryError::NameCollision(format!("{} already exists on disk", to.display())));
            }
            fs::rename(from, to)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::schema::{insert_category, insert_metadata, CategoryKind};
    use tempfile::TempDir;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn node(parent: &str, kind: MetadataKind, sort: &str) -> Metadata {
        Metadata {
            name_sort: sort.to_string(),
            ..Metadata::new(parent, kind, sort)
        }
    }

    #[test]
    fn test_with_suffix_keeps_dots() {
        let p = with_suffix(Path::new("/m/mr. robot"), ".large.jpg");
        assert_eq!(p, PathBuf::from("/m/mr. robot.large.jpg"));
    }

    #[test]
    fn test_path_variants() {
        let conn = setup();
        let root = Path::new("/media");

        let cat = Category::new("TV", CategoryKind::Series);
        insert_category(&conn, &cat).unwrap();
        let series = node(&cat.id, MetadataKind::Series, "lost");
        insert_metadata(&conn, &series).unwrap();
        let season = node(&series.id, MetadataKind::Season, "season 1");
        insert_metadata(&conn, &season).unwrap();
        let episode = node(&season.id, MetadataKind::FileVideo, "pilot");
        insert_metadata(&conn, &episode).unwrap();

        assert_eq!(
            path_for(&conn, root, &episode, PathVariant::Media).unwrap(),
            PathBuf::from("/media/TV/lost/season 1/pilot.mp4")
        );
        assert_eq!(
            path_for(&conn, root, &season, PathVariant::Media).unwrap(),
            PathBuf::from("/media/TV/lost/season 1")
        );
        assert_eq!(
            path_for(&conn, root, &series, PathVariant::PosterSmall).unwrap(),
            PathBuf::from("/media/TV/lost.small.jpg")
        );

        let song = node("", MetadataKind::FileAudio, "song");
        assert_eq!(
            path_for(&conn, root, &song, PathVariant::Media).unwrap(),
            PathBuf::from("/media/song.mp3")
        );
        assert_eq!(
            path_for(&conn, root, &song, PathVariant::Base).unwrap(),
            PathBuf::from("/media/song")
        );
    }

    #[test]
    fn test_dangling_parent_is_not_found() {
        let conn = setup();
        let orphan = node("missing", MetadataKind::Album, "a");
        let err = path_for(&conn, Path::new("/m"), &orphan, PathVariant::Media).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }

    #[test]
    fn test_cycle_detected() {
        let conn = setup();
        let mut a = node("", MetadataKind::Artist, "a");
        let mut b = node("", MetadataKind::Album, "b");
        a.parent_id = b.id.clone();
        b.parent_id = a.id.clone();
        insert_metadata(&conn, &a).unwrap();
        insert_metadata(&conn, &b).unwrap();

        let err = base_path(&conn, Path::new("/m"), &a).unwrap_err();
        assert!(matches!(err, LibraryError::ValidationFailed(_)));
    }

    #[test]
    fn test_resolve_parent_rejects_file_leaf() {
        let conn = setup();
        let leaf = node("", MetadataKind::FileVideo, "movie");
        insert_metadata(&conn, &leaf).unwrap();

        let err = resolve_parent(&conn, Path::new("/m"), &leaf.id).unwrap_err();
        assert!(matches!(err, LibraryError::ValidationFailed(_)));
        let err = resolve_parent(&conn, Path::new("/m"), "nope").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
        assert_eq!(resolve_parent(&conn, Path::new("/m"), "").unwrap().kind, ParentKind::Root);
    }

    #[test]
    fn test_move_artifacts_skips_missing() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("old");
        let to = dir.path().join("new");
        fs::write(with_suffix(&from, ".mp4"), b"video").unwrap();
        fs::write(with_suffix(&from, ".small.jpg"), b"jpg").unwrap();

        let report = move_artifacts(&from, &to, MetadataKind::FileVideo);
        assert!(report.is_clean());
        assert!(report.primary_ok);
        assert_eq!(report.moved.len(), 2);
        assert!(with_suffix(&to, ".mp4").exists());
        assert!(with_suffix(&to, ".small.jpg").exists());
        assert!(!with_suffix(&to, ".large.jpg").exists());
    }

    #[test]
    fn test_move_artifacts_reports_failures() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("old");
        fs::write(with_suffix(&from, ".mp3"), b"audio").unwrap();
        fs::write(with_suffix(&from, ".large.jpg"), b"jpg").unwrap();

        // Target directory does not exist, so every rename fails
        let to = dir.path().join("missing-dir").join("new");
        let report = move_artifacts(&from, &to, MetadataKind::FileAudio);
        assert!(!report.primary_ok);
        assert_eq!(report.failures.len(), 2);
        assert!(report.moved.is_empty());

        match report.into_error("rename") {
            LibraryError::PartialMove { operation, failures, .. } => {
                assert_eq!(operation, "rename");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_remove_artifacts_container() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("album");
        fs::create_dir(&base).unwrap();
        fs::write(base.join("stray.txt"), b"x").unwrap();
        fs::write(with_suffix(&base, ".large.jpg"), b"jpg").unwrap();

        remove_artifacts(&base, MetadataKind::Album).unwrap();
        assert!(!base.exists());
        assert!(!with_suffix(&base, ".large.jpg").exists());

        // Second removal is a no-op
        remove_artifacts(&base, MetadataKind::Album).unwrap();
    }
}
