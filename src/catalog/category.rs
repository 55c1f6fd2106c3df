// Category operations
// Each function runs under the caller's write guard and validates everything
// against the DB and disk before the first side effect.

use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::db::schema::{self, Category, CategoryKind, MetadataChanges};
use crate::error::{LibraryError, Result};
use crate::naming::name_valid_for_disk;
use super::paths::{self, category_dir, MoveReport};

pub(crate) fn create(conn: &Connection, media_root: &Path, name: &str, kind: CategoryKind) -> Result<Category> {
    if !name_valid_for_disk(name) {
        return Err(LibraryError::InvalidName(name.to_string()));
    }
    if schema::get_category_by_name(conn, name)?.is_some() {
        return Err(LibraryError::NameCollision(format!("category {:?} already exists", name)));
    }

    let cat = Category::new(name, kind);
    let dir = category_dir(media_root, &cat);
    if dir.exists() {
        return Err(LibraryError::NameCollision(format!("{} already exists on disk", dir.display())));
    }

    fs::create_dir(&dir)?;
    if let Err(e) = schema::insert_category(conn, &cat) {
        if let Err(cleanup) = fs::remove_dir(&dir) {
            log::warn!("Failed to remove {} after insert error: {}", dir.display(), cleanup);
        }
        return Err(e);
    }

    log::info!("Created category {} ({})", cat.name, cat.media_type);
    Ok(cat)
}

pub(crate) fn update(
    conn: &Connection,
    media_root: &Path,
    id: &str,
    name: &str,
    kind: CategoryKind,
) -> Result<Category> {
    let current = schema::get_category(conn, id)?
        .ok_or_else(|| LibraryError::NotFound(format!("category {}", id)))?;

    if !name_valid_for_disk(name) {
        return Err(LibraryError::InvalidName(name.to_string()));
    }

    if kind != current.media_type && schema::count_metadata_children(conn, id)? > 0 {
        return Err(LibraryError::ValidationFailed(format!(
            "category {} has entries; its type cannot change",
            current.name
        )));
    }

    let mut updated = current.clone();
    updated.media_type = kind;
    updated.name = name.to_string();

    let old_dir = category_dir(media_root, &current);
    let new_dir = category_dir(media_root, &updated);
    let renaming = name != current.name;

    if renaming {
        if let Some(other) = schema::get_category_by_name(conn, name)? {
            if other.id != current.id {
                return Err(LibraryError::NameCollision(format!("category {:?} already exists", name)));
            }
        }
        if new_dir.exists() {
            return Err(LibraryError::NameCollision(format!("{} already exists on disk", new_dir.display())));
        }

        if old_dir.exists() {
            fs::rename(&old_dir, &new_dir)?;
        } else {
            log::warn!("Category directory {} missing; creating {}", old_dir.display(), new_dir.display());
            fs::create_dir(&new_dir)?;
        }
    }

    if let Err(e) = schema::update_category(conn, &updated) {
        if renaming {
            if let Err(undo) = fs::rename(&new_dir, &old_dir) {
                log::error!("Failed to restore {} after update error: {}", old_dir.display(), undo);
            }
        }
        return Err(e);
    }

    if renaming {
        log::info!("Renamed category {} -> {}", current.name, updated.name);
    }
    Ok(updated)
}

/// Delete a category, moving its direct children to the media root first
pub(crate) fn delete(conn: &Connection, media_root: &Path, id: &str) -> Result<()> {
    let cat = schema::get_category(conn, id)?
        .ok_or_else(|| LibraryError::NotFound(format!("category {}", id)))?;
    let dir = category_dir(media_root, &cat);
    let children = schema::list_metadata_children(conn, id)?;

    // Every child must fit at the root before anything moves
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
            cat.name,
            collisions.join(", ")
        )));
    }

    let mut report = MoveReport {
        primary_ok: true,
        ..Default::default()
    };
    for mut child in children {
        let from = dir.join(&child.name_sort);
        let to = media_root.join(&child.name_sort);
        let moved = paths::move_artifacts(&from, &to, child.media_type);
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
        // Keep the category so the unmoved artifacts stay reachable
        return Err(report.into_error("delete category"));
    }

    schema::delete_category(conn, id)?;
    match fs::remove_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Category directory {} left in place: {}", dir.display(), e),
    }

    log::info!("Deleted category {}", cat.name);
    Ok(())
}
