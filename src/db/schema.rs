// Database schema types and query helpers

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::{AUDIO_OUTPUT_EXTENSION, CATEGORY_DEFAULT_SORT_INDEX, VIDEO_OUTPUT_EXTENSION};
use crate::error::{LibraryError, Result};
use crate::naming::name_valid_for_disk;
use crate::probe::Stream;

/// Read a JSON-encoded TEXT column
fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Run a dynamic UPDATE built from `set_clauses`. The id is bound last.
fn execute_update(
    conn: &Connection,
    table: &str,
    id: &str,
    set_clauses: Vec<String>,
    mut params_vec: Vec<Box<dyn ToSql>>,
) -> Result<()> {
    params_vec.push(Box::new(id.to_string()));
    let id_param = params_vec.len();

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        set_clauses.join(", "),
        id_param
    );

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&sql, params_refs.as_slice())?;
    if rows == 0 {
        return Err(LibraryError::NotFound(format!("{} {}", table, id)));
    }
    Ok(())
}

/// Generate a new record id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ----- Properties -----

pub fn get_property(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM properties WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn set_property(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO properties (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Atomically increment an integer property, returning the new value.
/// A missing or non-numeric value counts as 0.
pub fn increment_property(conn: &Connection, key: &str) -> Result<i64> {
    let value: i64 = conn.query_row(
        "INSERT INTO properties (key, value) VALUES (?1, '1')
         ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
         RETURNING CAST(value AS INTEGER)",
        params![key],
        |row| row.get(0),
    )?;
    Ok(value)
}

// ----- Category -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Movie,
    Series,
    Music,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Movie => "movie",
            CategoryKind::Series => "series",
            CategoryKind::Music => "music",
        }
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "movie" => Ok(CategoryKind::Movie),
            "series" => Ok(CategoryKind::Series),
            "music" => Ok(CategoryKind::Music),
            other => Err(LibraryError::ValidationFailed(format!(
                "unknown category type {:?} (expected movie, series or music)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for CategoryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CategoryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: LibraryError| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub media_type: CategoryKind,
    pub sort_index: i64,
}

impl Category {
    pub fn new(name: &str, media_type: CategoryKind) -> Self {
        Category {
            id: new_id(),
            name: name.to_string(),
            media_type,
            sort_index: CATEGORY_DEFAULT_SORT_INDEX,
        }
    }
}

/// Record-level checks that need no other rows
pub fn validate_category(cat: &Category) -> Result<()> {
    if !name_valid_for_disk(&cat.name) {
        return Err(LibraryError::InvalidName(cat.name.clone()));
    }
    Ok(())
}

pub fn insert_category(conn: &Connection, cat: &Category) -> Result<()> {
    validate_category(cat)?;
    conn.execute(
        "INSERT INTO categories (id, name, media_type, sort_index) VALUES (?1, ?2, ?3, ?4)",
        params![cat.id, cat.name, cat.media_type, cat.sort_index],
    )?;
    Ok(())
}

const CATEGORY_COLUMNS: &str = "id, name, media_type, sort_index";

fn map_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        media_type: row.get(2)?,
        sort_index: row.get(3)?,
    })
}

pub fn get_category(conn: &Connection, id: &str) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS);
    let result = conn.query_row(&sql, params![id], map_category).optional()?;
    Ok(result)
}

pub fn get_category_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE name = ?1", CATEGORY_COLUMNS);
    let result = conn.query_row(&sql, params![name], map_category).optional()?;
    Ok(result)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let sql = format!("SELECT {} FROM categories ORDER BY sort_index, name", CATEGORY_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let cats = stmt
        .query_map([], map_category)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cats)
}

pub fn update_category(conn: &Connection, cat: &Category) -> Result<()> {
    validate_category(cat)?;
    let rows = conn.execute(
        "UPDATE categories SET name = ?1, media_type = ?2, sort_index = ?3 WHERE id = ?4",
        params![cat.name, cat.media_type, cat.sort_index, cat.id],
    )?;
    if rows == 0 {
        return Err(LibraryError::NotFound(format!("category {}", cat.id)));
    }
    Ok(())
}

pub fn delete_category(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    Ok(())
}

// ----- Metadata -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataKind {
    FileVideo,
    FileAudio,
    Series,
    Season,
    Artist,
    Album,
}

impl MetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::FileVideo => "file-video",
            MetadataKind::FileAudio => "file-audio",
            MetadataKind::Series => "series",
            MetadataKind::Season => "season",
            MetadataKind::Artist => "artist",
            MetadataKind::Album => "album",
        }
    }

    /// File leaves hold media; everything else is a directory
    pub fn is_file(&self) -> bool {
        matches!(self, MetadataKind::FileVideo | MetadataKind::FileAudio)
    }

    /// Extension of the media artifact, or None for containers
    pub fn media_extension(&self) -> Option<&'static str> {
        match self {
            MetadataKind::FileVideo => Some(VIDEO_OUTPUT_EXTENSION),
            MetadataKind::FileAudio => Some(AUDIO_OUTPUT_EXTENSION),
            _ => None,
        }
    }
}

impl std::str::FromStr for MetadataKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file-video" => Ok(MetadataKind::FileVideo),
            "file-audio" => Ok(MetadataKind::FileAudio),
            "series" => Ok(MetadataKind::Series),
            "season" => Ok(MetadataKind::Season),
            "artist" => Ok(MetadataKind::Artist),
            "album" => Ok(MetadataKind::Album),
            other => Err(LibraryError::ValidationFailed(format!(
                "unknown metadata type {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for MetadataKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MetadataKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: LibraryError| FromSqlError::Other(Box::new(e)))
    }
}

/// A catalog node. `parent_id` is a category id, a container id, or ""
/// for the media root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub parent_id: String,
    pub media_type: MetadataKind,
    pub name_display: String,
    pub name_sort: String,
    pub streams: Vec<Stream>,
    pub duration: i64,
    pub size: i64,
}

impl Metadata {
    /// A fresh container or file node with no streams
    pub fn new(parent_id: &str, media_type: MetadataKind, name_display: &str) -> Self {
        Metadata {
            id: new_id(),
            parent_id: parent_id.to_string(),
            media_type,
            name_display: name_display.to_string(),
            name_sort: String::new(),
            streams: Vec::new(),
            duration: 0,
            size: 0,
        }
    }
}

/// Typed changeset for a metadata row; `None` means unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataChanges {
    pub parent_id: Option<String>,
    pub name_display: Option<String>,
    pub name_sort: Option<String>,
    pub streams: Option<Vec<Stream>>,
    pub duration: Option<i64>,
    pub size: Option<i64>,
}

impl MetadataChanges {
    /// Fields that differ from `old` to `new`. Id and type never change.
    pub fn between(old: &Metadata, new: &Metadata) -> Self {
        MetadataChanges {
            parent_id: (old.parent_id != new.parent_id).then(|| new.parent_id.clone()),
            name_display: (old.name_display != new.name_display).then(|| new.name_display.clone()),
            name_sort: (old.name_sort != new.name_sort).then(|| new.name_sort.clone()),
            streams: (old.streams != new.streams).then(|| new.streams.clone()),
            duration: (old.duration != new.duration).then_some(new.duration),
            size: (old.size != new.size).then_some(new.size),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == MetadataChanges::default()
    }
}

pub fn validate_metadata(md: &Metadata) -> Result<()> {
    if md.name_display.trim().is_empty() {
        return Err(LibraryError::InvalidName(md.name_display.clone()));
    }
    if !name_valid_for_disk(&md.name_sort) {
        return Err(LibraryError::InvalidName(md.name_sort.clone()));
    }
    if md.parent_id == md.id {
        return Err(LibraryError::ValidationFailed("metadata cannot be its own parent".to_string()));
    }
    Ok(())
}

pub fn validate_metadata_update(current: &Metadata, changes: &MetadataChanges) -> Result<()> {
    if let Some(ref display) = changes.name_display {
        if display.trim().is_empty() {
            return Err(LibraryError::InvalidName(display.clone()));
        }
    }
    if let Some(ref sort) = changes.name_sort {
        if !name_valid_for_disk(sort) {
            return Err(LibraryError::InvalidName(sort.clone()));
        }
    }
    if changes.parent_id.as_deref() == Some(current.id.as_str()) {
        return Err(LibraryError::ValidationFailed("metadata cannot be its own parent".to_string()));
    }
    Ok(())
}

pub fn insert_metadata(conn: &Connection, md: &Metadata) -> Result<()> {
    validate_metadata(md)?;
    conn.execute(
        "INSERT INTO metadata (id, parent_id, media_type, name_display, name_sort, streams, duration, size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            md.id,
            md.parent_id,
            md.media_type,
            md.name_display,
            md.name_sort,
            serde_json::to_string(&md.streams)?,
            md.duration,
            md.size,
        ],
    )?;
    Ok(())
}

const METADATA_COLUMNS: &str = "id, parent_id, media_type, name_display, name_sort, streams, duration, size";

fn map_metadata(row: &rusqlite::Row) -> rusqlite::Result<Metadata> {
    Ok(Metadata {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        media_type: row.get(2)?,
        name_display: row.get(3)?,
        name_sort: row.get(4)?,
        streams: json_column(row, 5)?,
        duration: row.get(6)?,
        size: row.get(7)?,
    })
}

pub fn get_metadata(conn: &Connection, id: &str) -> Result<Option<Metadata>> {
    let sql = format!("SELECT {} FROM metadata WHERE id = ?1", METADATA_COLUMNS);
    let result = conn.query_row(&sql, params![id], map_metadata).optional()?;
    Ok(result)
}

/// Direct children of a category, container, or the root (""), by sort name
pub fn list_metadata_children(conn: &Connection, parent_id: &str) -> Result<Vec<Metadata>> {
    let sql = format!(
        "SELECT {} FROM metadata WHERE parent_id = ?1 ORDER BY name_sort",
        METADATA_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let children = stmt
        .query_map(params![parent_id], map_metadata)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(children)
}

pub fn count_metadata_children(conn: &Connection, parent_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM metadata WHERE parent_id = ?1",
        params![parent_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// The sibling holding `name_sort` under `parent_id`, if any
pub fn find_metadata_sibling(conn: &Connection, parent_id: &str, name_sort: &str) -> Result<Option<Metadata>> {
    let sql = format!(
        "SELECT {} FROM metadata WHERE parent_id = ?1 AND name_sort = ?2",
        METADATA_COLUMNS
    );
    let result = conn.query_row(&sql, params![parent_id, name_sort], map_metadata).optional()?;
    Ok(result)
}

/// Apply a changeset to the row and to `current`
pub fn update_metadata(conn: &Connection, current: &mut Metadata, changes: &MetadataChanges) -> Result<()> {
    validate_metadata_update(current, changes)?;
    if changes.is_empty() {
        return Ok(());
    }

    let mut set_clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref parent_id) = changes.parent_id {
        set_clauses.push(format!("parent_id = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(parent_id.clone()));
    }
    if let Some(ref name_display) = changes.name_display {
        set_clauses.push(format!("name_display = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(name_display.clone()));
    }
    if let Some(ref name_sort) = changes.name_sort {
        set_clauses.push(format!("name_sort = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(name_sort.clone()));
    }
    if let Some(ref streams) = changes.streams {
        set_clauses.push(format!("streams = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(serde_json::to_string(streams)?));
    }
    if let Some(duration) = changes.duration {
        set_clauses.push(format!("duration = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(duration));
    }
    if let Some(size) = changes.size {
        set_clauses.push(format!("size = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(size));
    }

    execute_update(conn, "metadata", &current.id, set_clauses, params_vec)?;

    if let Some(ref parent_id) = changes.parent_id {
        current.parent_id = parent_id.clone();
    }
    if let Some(ref name_display) = changes.name_display {
        current.name_display = name_display.clone();
    }
    if let Some(ref name_sort) = changes.name_sort {
        current.name_sort = name_sort.clone();
    }
    if let Some(ref streams) = changes.streams {
        current.streams = streams.clone();
    }
    if let Some(duration) = changes.duration {
        current.duration = duration;
    }
    if let Some(size) = changes.size {
        current.size = size;
    }
    Ok(())
}

pub fn delete_metadata(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM metadata WHERE id = ?1", params![id])?;
    Ok(())
}

// ----- InputFile -----

/// Transcode lifecycle, derived from the timing and error columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl TranscodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeStatus::NotStarted => "not_started",
            TranscodeStatus::Running => "running",
            TranscodeStatus::Succeeded => "succeeded",
            TranscodeStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFile {
    pub id: String,
    pub source_location: String,
    pub source_format: String,
    pub source_streams: Vec<Stream>,
    /// Ordered source stream indices; empty means unmapped
    pub stream_map: Vec<i64>,
    pub source_duration: i64,
    pub time_scanned: i64,
    pub transcoding_command: String,
    pub transcoding_time_started: i64,
    pub transcoding_time_elapsed: i64,
    pub transcoding_error: String,
}

impl InputFile {
    pub fn status(&self) -> TranscodeStatus {
        if !self.transcoding_error.is_empty() {
            TranscodeStatus::Failed
        } else if self.transcoding_time_started == 0 {
            TranscodeStatus::NotStarted
        } else if self.transcoding_time_elapsed == 0 {
            TranscodeStatus::Running
        } else {
            TranscodeStatus::Succeeded
        }
    }

    /// Source streams in map order
    pub fn mapped_streams(&self) -> Vec<&Stream> {
        self.stream_map
            .iter()
            .filter_map(|idx| crate::probe::find_index(&self.source_streams, *idx))
            .collect()
    }
}

/// Typed changeset for an input file row; `None` means unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFileChanges {
    pub source_location: Option<String>,
    pub source_format: Option<String>,
    pub source_streams: Option<Vec<Stream>>,
    pub stream_map: Option<Vec<i64>>,
    pub source_duration: Option<i64>,
    pub transcoding_command: Option<String>,
    pub transcoding_time_started: Option<i64>,
    pub transcoding_time_elapsed: Option<i64>,
    pub transcoding_error: Option<String>,
}

impl InputFileChanges {
    /// Fields that differ from `old` to `new`. Id and scan time never change.
    pub fn between(old: &InputFile, new: &InputFile) -> Self {
        InputFileChanges {
            source_location: (old.source_location != new.source_location).then(|| new.source_location.clone()),
            source_format: (old.source_format != new.source_format).then(|| new.source_format.clone()),
            source_streams: (old.source_streams != new.source_streams).then(|| new.source_streams.clone()),
            stream_map: (old.stream_map != new.stream_map).then(|| new.stream_map.clone()),
            source_duration: (old.source_duration != new.source_duration).then_some(new.source_duration),
            transcoding_command: (old.transcoding_command != new.transcoding_command)
                .then(|| new.transcoding_command.clone()),
            transcoding_time_started: (old.transcoding_time_started != new.transcoding_time_started)
                .then_some(new.transcoding_time_started),
            transcoding_time_elapsed: (old.transcoding_time_elapsed != new.transcoding_time_elapsed)
                .then_some(new.transcoding_time_elapsed),
            transcoding_error: (old.transcoding_error != new.transcoding_error)
                .then(|| new.transcoding_error.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == InputFileChanges::default()
    }
}

/// The recorded command is frozen once a transcode has started, unless the
/// same update resets the start time to 0.
pub fn validate_input_file_update(current: &InputFile, changes: &InputFileChanges) -> Result<()> {
    if current.transcoding_time_started != 0 {
        if let Some(ref command) = changes.transcoding_command {
            let resetting = changes.transcoding_time_started == Some(0);
            if command != &current.transcoding_command && !resetting {
                return Err(LibraryError::ValidationFailed(format!(
                    "input file {} has a recorded transcode; reset before changing its command",
                    current.id
                )));
            }
        }
    }
    if let Some(ref location) = changes.source_location {
        if location.is_empty() {
            return Err(LibraryError::ValidationFailed("source location cannot be empty".to_string()));
        }
    }
    Ok(())
}

pub fn insert_input_file(conn: &Connection, inp: &InputFile) -> Result<()> {
    if inp.source_location.is_empty() {
        return Err(LibraryError::ValidationFailed("source location cannot be empty".to_string()));
    }
    conn.execute(
        "INSERT INTO input_files (id, source_location, source_format, source_streams, stream_map,
                                  source_duration, time_scanned, transcoding_command,
                                  transcoding_time_started, transcoding_time_elapsed, transcoding_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            inp.id,
            inp.source_location,
            inp.source_format,
            serde_json::to_string(&inp.source_streams)?,
            serde_json::to_string(&inp.stream_map)?,
            inp.source_duration,
            inp.time_scanned,
            inp.transcoding_command,
            inp.transcoding_time_started,
            inp.transcoding_time_elapsed,
            inp.transcoding_error,
        ],
    )?;
    Ok(())
}

const INPUT_FILE_COLUMNS: &str = "id, source_location, source_format, source_streams, stream_map, source_duration,
     time_scanned, transcoding_command, transcoding_time_started, transcoding_time_elapsed, transcoding_error";

fn map_input_file(row: &rusqlite::Row) -> rusqlite::Result<InputFile> {
    Ok(InputFile {
        id: row.get(0)?,
        source_location: row.get(1)?,
        source_format: row.get(2)?,
        source_streams: json_column(row, 3)?,
        stream_map: json_column(row, 4)?,
        source_duration: row.get(5)?,
        time_scanned: row.get(6)?,
        transcoding_command: row.get(7)?,
        transcoding_time_started: row.get(8)?,
        transcoding_time_elapsed: row.get(9)?,
        transcoding_error: row.get(10)?,
    })
}

pub fn get_input_file(conn: &Connection, id: &str) -> Result<Option<InputFile>> {
    let sql = format!("SELECT {} FROM input_files WHERE id = ?1", INPUT_FILE_COLUMNS);
    let result = conn.query_row(&sql, params![id], map_input_file).optional()?;
    Ok(result)
}

pub fn get_input_file_by_source(conn: &Connection, source_location: &str) -> Result<Option<InputFile>> {
    let sql = format!("SELECT {} FROM input_files WHERE source_location = ?1", INPUT_FILE_COLUMNS);
    let result = conn.query_row(&sql, params![source_location], map_input_file).optional()?;
    Ok(result)
}

pub fn list_input_files(conn: &Connection) -> Result<Vec<InputFile>> {
    let sql = format!(
        "SELECT {} FROM input_files ORDER BY time_scanned, source_location",
        INPUT_FILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let files = stmt
        .query_map([], map_input_file)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(files)
}

/// Input files still waiting for an operator to choose streams
pub fn list_input_files_needing_map(conn: &Connection) -> Result<Vec<InputFile>> {
    let sql = format!(
        "SELECT {} FROM input_files WHERE stream_map = '[]' ORDER BY time_scanned, source_location",
        INPUT_FILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let files = stmt
        .query_map([], map_input_file)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(files)
}

/// Apply a changeset to the row and to `current`
pub fn update_input_file(conn: &Connection, current: &mut InputFile, changes: &InputFileChanges) -> Result<()> {
    validate_input_file_update(current, changes)?;
    if changes.is_empty() {
        return Ok(());
    }

    let mut set_clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref location) = changes.source_location {
        set_clauses.push(format!("source_location = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(location.clone()));
    }
    if let Some(ref format) = changes.source_format {
        set_clauses.push(format!("source_format = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(format.clone()));
    }
    if let Some(ref streams) = changes.source_streams {
        set_clauses.push(format!("source_streams = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(serde_json::to_string(streams)?));
    }
    if let Some(ref map) = changes.stream_map {
        set_clauses.push(format!("stream_map = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(serde_json::to_string(map)?));
    }
    if let Some(duration) = changes.source_duration {
        set_clauses.push(format!("source_duration = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(duration));
    }
    if let Some(ref command) = changes.transcoding_command {
        set_clauses.push(format!("transcoding_command = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(command.clone()));
    }
    if let Some(started) = changes.transcoding_time_started {
        set_clauses.push(format!("transcoding_time_started = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(started));
    }
    if let Some(elapsed) = changes.transcoding_time_elapsed {
        set_clauses.push(format!("transcoding_time_elapsed = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(elapsed));
    }
    if let Some(ref error) = changes.transcoding_error {
        set_clauses.push(format!("transcoding_error = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(error.clone()));
    }

    execute_update(conn, "input_files", &current.id, set_clauses, params_vec)?;

    if let Some(ref location) = changes.source_location {
        current.source_location = location.clone();
    }
    if let Some(ref format) = changes.source_format {
        current.source_format = format.clone();
    }
    if let Some(ref streams) = changes.source_streams {
        current.source_streams = streams.clone();
    }
    if let Some(ref map) = changes.stream_map {
        current.stream_map = map.clone();
    }
    if let Some(duration) = changes.source_duration {
        current.source_duration = duration;
    }
    if let Some(ref command) = changes.transcoding_command {
        current.transcoding_command = command.clone();
    }
    if let Some(started) = changes.transcoding_time_started {
        current.transcoding_time_started = started;
    }
    if let Some(elapsed) = changes.transcoding_time_elapsed {
        current.transcoding_time_elapsed = elapsed;
    }
    if let Some(ref error) = changes.transcoding_error {
        current.transcoding_error = error.clone();
    }
    Ok(())
}

pub fn delete_input_file(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM input_files WHERE id = ?1", params![id])?;
    Ok(())
}
