// Catalog tree module
// Owns categories and metadata nodes and keeps their on-disk layout in step
// with the database.

pub mod category;
pub mod metadata;
pub mod paths;


use std::path::{Path, PathBuf};

use crate::db::schema::{self, Category, CategoryKind, Metadata};
use crate::db::Store;
use crate::error::{LibraryError, Result};

pub use metadata::ContainerNode;
pub use paths::PathVariant;

/// Handle for catalog reads and mutations. Mutations hold the store's write
/// guard for their whole validate-then-mutate sequence.
#[derive(Debug, Clone)]
pub struct CatalogTree {
    store: Store,
}

impl CatalogTree {
    pub fn new(store: Store) -> Self {
        CatalogTree { store }
    }

    // ----- Categories -----

    pub fn create_category(&self, name: &str, kind: CategoryKind) -> Result<Category> {
        self.store
            .with_write(|conn| category::create(conn, self.store.media_root(), name, kind))
    }

    pub fn update_category(&self, id: &str, name: &str, kind: CategoryKind) -> Result<Category> {
        self.store
            .with_write(|conn| category::update(conn, self.store.media_root(), id, name, kind))
    }

    pub fn delete_category(&self, id: &str) -> Result<()> {
        self.store
            .with_write(|conn| category::delete(conn, self.store.media_root(), id))
    }

    pub fn get_category(&self, id: &str) -> Result<Category> {
        self.store.with_read(|conn| {
            schema::get_category(conn, id)?
                .ok_or_else(|| LibraryError::NotFound(format!("category {}", id)))
        })
    }

    /// Look up a category by id, falling back to its exact name
    pub fn find_category(&self, id_or_name: &str) -> Result<Category> {
        self.store.with_read(|conn| {
            if let Some(cat) = schema::get_category(conn, id_or_name)? {
                return Ok(cat);
            }
            schema::get_category_by_name(conn, id_or_name)?
                .ok_or_else(|| LibraryError::NotFound(format!("category {}", id_or_name)))
        })
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.store.with_read(schema::list_categories)
    }

    pub fn category_disk_path(&self, cat: &Category) -> PathBuf {
        paths::category_dir(self.store.media_root(), cat)
    }

    // ----- Metadata -----

    /// Create a node. An empty `name_sort` is derived from the display name
    /// and an empty id is generated.
    pub fn create_metadata(&self, md: Metadata) -> Result<Metadata> {
        self.store
            .with_write(|conn| metadata::create(conn, self.store.media_root(), md))
    }

    /// Register a file leaf produced by the transcoder. The leaf keeps the
    /// id it was given, which is the id of its input file.
    pub fn publish(&self, md: Metadata) -> Result<Metadata> {
        check_publishable(&md)?;
        self.create_metadata(md)
    }

    /// Like `publish`, but first moves the output from `staged` to the
    /// leaf's media path. Placement and registration happen under one write
    /// guard and never replace an existing file.
    pub fn publish_file(&self, md: Metadata, staged: &Path) -> Result<Metadata> {
        check_publishable(&md)?;
        self.store
            .with_write(|conn| metadata::publish_file(conn, self.store.media_root(), md, staged))
    }

    pub fn rename(&self, id: &str, display: &str, sort: &str) -> Result<Metadata> {
        self.store
            .with_write(|conn| metadata::rename(conn, self.store.media_root(), id, display, sort))
    }

    pub fn reparent(&self, id: &str, new_parent: &str) -> Result<Metadata> {
        self.store
            .with_write(|conn| metadata::reparent(conn, self.store.media_root(), id, new_parent))
    }

    pub fn delete_metadata(&self, id: &str, cascade: bool) -> Result<()> {
        self.store
            .with_write(|conn| metadata::delete(conn, self.store.media_root(), id, cascade))
    }

    pub fn get_metadata(&self, id: &str) -> Result<Metadata> {
        self.store.with_read(|conn| {
            schema::get_metadata(conn, id)?
                .ok_or_else(|| LibraryError::NotFound(format!("metadata {}", id)))
        })
    }

    /// Direct children of a category, container, or the root (""), by sort name
    pub fn children(&self, parent_id: &str) -> Result<Vec<Metadata>> {
        self.store
            .with_read(|conn| schema::list_metadata_children(conn, parent_id))
    }

    pub fn container_tree(&self, parent_id: &str) -> Result<Vec<ContainerNode>> {
        self.store
            .with_read(|conn| metadata::container_tree(conn, parent_id))
    }

    pub fn path_for(&self, md: &Metadata, variant: PathVariant) -> Result<PathBuf> {
        self.store
            .with_read(|conn| paths::path_for(conn, self.store.media_root(), md, variant))
    }
}

fn check_publishable(md: &Metadata) -> Result<()> {
    if !md.media_type.is_file() {
        return Err(LibraryError::ValidationFailed(format!(
            "only files can be published, not {}",
            md.media_type
        )));
    }
    if md.id.is_empty() {
        return Err(LibraryError::ValidationFailed("published entries need an id".to_string()));
    }
    Ok(())
}
