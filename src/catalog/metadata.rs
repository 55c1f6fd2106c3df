// Metadata node operations
// Each function runs under the caller's write guard. Disk work starts only
// after the DB preconditions pass; multi-file moves are not rolled back.

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::schema::{self, Metadata, MetadataChanges};
use crate::error::{LibraryError, Result};
use crate::naming::{name_valid_for_disk, sort_name};
use super::paths::{self, MoveReport, ParentKind, PathVariant};

// Mirrors the depth guard in paths::base_path
const MAX_DEPTH: usize = 64;

/// A container and its nested containers (file leaves omitted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerNode {
    pub metadata: Metadata,
    pub children: Vec<ContainerNode>,
}

fn require(conn: &Connection, id: &str) -> Result<Metadata> {
    schema::get_metadata(conn, id)?.ok_or_else(|| LibraryError::NotFound(format!("metadata {}", id)))
}

fn check_sibling(conn: &Connection, parent_id: &str, name_sort: &str, self_id: &str) -> Result<()> {
    if let Some(sibling) = schema::find_metadata_sibling(conn, parent_id, name_sort)? {
        if sibling.id != self_id {
            return Err(LibraryError::NameCollision(format!(
                "{:?} already exists here ({})",
                name_sort, sibling.name_display
            )));
        }
    }
    Ok(())
}

fn check_disk(base: &Path, md: &Metadata) -> Result<()> {
    if let Some(existing) = paths::existing_artifact(base, md.media_type) {
        return Err(LibraryError::NameCollision(format!("{} already exists on disk", existing.display())));
    }
    Ok(())
}

/// Patch the record after a move unless the media artifact stayed behind,
/// then surface any failures
fn finish_move(
    conn: &Connection,
    md: &mut Metadata,
    changes: &MetadataChanges,
    report: MoveReport,
    operation: &str,
) -> Result<()> {
    if report.primary_ok {
        schema::update_metadata(conn, md, changes)?;
    }
    if !report.is_clean() {
        return Err(report.into_error(operation));
    }
    Ok(())
}

pub(crate) fn create(conn: &Connection, media_root: &Path, mut md: Metadata) -> Result<Metadata> {
    if md.id.is_empty() {
        md.id = schema::new_id();
    }
    if md.name_sort.is_empty() {
        md.name_sort = sort_name(&md.name_display);
    }
    if !name_valid_for_disk(&md.name_sort) {
        return Err(LibraryError::InvalidName(md.name_sort.clone()));
    }
    schema::validate_metadata(&md)?;

    let parent = paths::resolve_parent(conn, media_root, &md.parent_id)?;
    check_sibling(conn, &md.parent_id, &md.name_sort, &md.id)?;

    let base = parent.dir.join(&md.name_sort);
    let mut created_dir = false;
    if !md.media_type.is_file() {
        check_disk(&base, &md)?;
        fs::create_dir(&base)?;
        created_dir = true;
    }

    if let Err(e) = schema::insert_metadata(conn, &md) {
        if created_dir {
            if let Err(cleanup) = fs::remove_dir(&base) {
                log::warn!("Failed to remove {} after insert error: {}", base.display(), cleanup);
            }
        }
        return Err(e);
    }

    log::info!("Created {} {:?} at {}", md.media_type, md.name_display, base.display());
    Ok(md)
}

/// Move a finished output from `staged` into its final place and register
/// it. Nothing already on disk is overwritten; an output whose name was
/// taken while it was being produced fails with a collision.
pub(crate) fn publish_file(conn: &Connection, media_root: &Path, mut md: Metadata, staged: &Path) -> Result<Metadata> {
    if md.name_sort.is_empty() {
        md.name_sort = sort_name(&md.name_display);
    }
    if !name_valid_for_disk(&md.name_sort) {
        return Err(LibraryError::InvalidName(md.name_sort.clone()));
    }

    let parent = paths::resolve_parent(conn, media_root, &md.parent_id)?;
    check_sibling(conn, &md.parent_id, &md.name_sort, &md.id)?;
    let base = parent.dir.join(&md.name_sort);
    check_disk(&base, &md)?;

    let target = paths::variant_path(&base, md.media_type, PathVariant::Media);
    paths::place_new(staged, &target)?;

    create(conn, media_root, md).map_err(|e| {
        // Placed by us a moment ago and referenced by nothing
        if let Err(cleanup) = fs::remove_file(&target) {
            log::warn!("Failed to remove {} after insert error: {}", target.display(), cleanup);
        }
        e
    })
}

pub(crate) fn rename(
    conn: &Connection,
    media_root: &Path,
    id: &str,
    display: &str,
    sort: &str,
) -> Result<Metadata> {
    let mut md = require(conn, id)?;

    let new_sort = if sort.is_empty() { sort_name(display) } else { sort.to_string() };
    if display.trim().is_empty() {
        return Err(LibraryError::InvalidName(display.to_string()));
    }
    if !name_valid_for_disk(&new_sort) {
        return Err(LibraryError::InvalidName(new_sort));
    }

    if new_sort == md.name_sort {
        let changes = MetadataChanges {
            name_display: Some(display.to_string()),
            ..Default::default()
        };
        schema::update_metadata(conn, &mut md, &changes)?;
        return Ok(md);
    }

    check_sibling(conn, &md.parent_id, &new_sort, &md.id)?;
    let parent = paths::resolve_parent(conn, media_root, &md.parent_id)?;
    let old_base = parent.dir.join(&md.name_sort);
    let new_base = parent.dir.join(&new_sort);
    check_disk(&new_base, &md)?;

    let report = paths::move_artifacts(&old_base, &new_base, md.media_type);
    let changes = MetadataChanges {
        name_display: Some(display.to_string()),
        name_sort: Some(new_sort),
        ..Default::default()
    };
    finish_move(conn, &mut md, &changes, report, "rename")?;

    log::info!("Renamed {} to {:?} ({})", md.id, md.name_display, new_base.display());
    Ok(md)
}

/// True if `candidate` sits somewhere below `ancestor_id`
fn is_descendant(conn: &Connection, candidate: &Metadata, ancestor_id: &str) -> Result<bool> {
    let mut parent_id = candidate.parent_id.clone();
    for _ in 0..MAX_DEPTH {
        if parent_id.is_empty() {
            return Ok(false);
        }
        if parent_id == ancestor_id {
            return Ok(true);
        }
        match schema::get_metadata(conn, &parent_id)? {
            Some(parent) => parent_id = parent.parent_id,
            // Reached a category
            None => return Ok(false),
        }
    }
    Err(LibraryError::ValidationFailed(format!(
        "parent chain of {} does not terminate",
        candidate.id
    )))
}

pub(crate) fn reparent(conn: &Connection, media_root: &Path, id: &str, new_parent: &str) -> Result<Metadata> {
    let mut md = require(conn, id)?;

    if new_parent == md.id {
        return Err(LibraryError::ValidationFailed("an entry cannot be its own parent".to_string()));
    }

    let target = paths::resolve_parent(conn, media_root, new_parent)?;
    if let ParentKind::Container(ref container) = target.kind {
        if is_descendant(conn, container, &md.id)? {
            return Err(LibraryError::ValidationFailed(format!(
                "{} is inside {}; cannot move it there",
                container.name_display, md.name_display
            )));
        }
    }

    if new_parent == md.parent_id {
        return Ok(md);
    }

    check_sibling(conn, new_parent, &md.name_sort, &md.id)?;
    let old_base = paths::base_path(conn, media_root, &md)?;
    let new_base = target.dir.join(&md.name_sort);
    check_disk(&new_base, &md)?;

    let report = paths::move_artifacts(&old_base, &new_base, md.media_type);
    let changes = MetadataChanges {
        parent_id: Some(new_parent.to_string()),
        ..Default::default()
    };
    finish_move(conn, &mut md, &changes, report, "reparent")?;

    log::info!("Moved {:?} to {}", md.name_display, new_base.display());
    Ok(md)
}

/// Delete a node. With `cascade` its subtree goes too; otherwise its direct
/// children are moved to the media root first.
pub(crate) fn delete(conn: &Connection, media_root: &Path, id: &str, cascade: bool) -> Result<()> {
    let md = require(conn, id)?;
    let base = paths::base_path(conn, media_root, &md)?;
    let children = schema::list_metadata_children(conn, &md.id)?;

    if cascade {
        for child in &children {
            delete(conn, media_root, &child.id, true)?;
        }
    } else if !children.is_empty() {
        let mut collisions: Vec<String> = Vec::new();
        for child in &children {
            if schema::find_metadata_sibling(conn, "", &child.name_sort)?.is_some() {
                collisions.push(format!("{} (catalog)", child.name_sort));
                continue;
            }
            if let Some(existing) = paths::existing_artifact(&media_root.join(&child.name_sort), child.media_type) {
                collisions.push(existing.display().to_string());
            }
        }
        if !collisions.is_empty() {
            return Err(LibraryError::NameCollision(format!(
                "cannot move entries of {} to the media root: {}",
                md.name_display,
                collisions.join(", ")
            )));
        }

        let mut report = MoveReport {
            primary_ok: true,
            ..Default::default()
        };
        for mut child in children {
            let moved = paths::move_artifacts(&base.join(&child.name_sort), &media_root.join(&child.name_sort), child.media_type);
            if moved.primary_ok {
                let changes = MetadataChanges {
                    parent_id: Some(String::new()),
                    ..Default::default()
                };
                schema::update_metadata(conn, &mut child, &changes)?;
            }
            report.absorb(moved);
        }
        if !report.is_clean() {
            return Err(report.into_error("delete"));
        }
    }

    paths::remove_artifacts(&base, md.media_type)?;
    schema::delete_metadata(conn, &md.id)?;

    log::info!("Deleted {} {:?}", md.media_type, md.name_display);
    Ok(())
}

/// Nested containers below `parent_id` ("" for the root)
pub(crate) fn container_tree(conn: &Connection, parent_id: &str) -> Result<Vec<ContainerNode>> {
    container_tree_at(conn, parent_id, 0)
}

fn container_tree_at(conn: &Connection, parent_id: &str, depth: usize) -> Result<Vec<ContainerNode>> {
    if depth >= MAX_DEPTH {
        return Ok(Vec::new());
    }
    let mut nodes = Vec::new();
    for child in schema::list_metadata_children(conn, parent_id)? {
        if child.media_type.is_file() {
            continue;
        }
        let children = container_tree_at(conn, &child.id, depth + 1)?;
        nodes.push(ContainerNode { metadata: child, children });
    }
    Ok(nodes)
}
