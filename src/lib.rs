// Reelvault - media library core
//
// StreamProbe (probe), IngestQueue (ingest), CatalogTree (catalog) and the
// TranscodeWorker (jobs) share one Store: a SQLite database plus the media
// root it describes.

pub mod catalog;
pub mod constants;
pub mod db;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod jobs;
pub mod naming;
pub mod probe;
pub mod tools;

pub use catalog::CatalogTree;
pub use db::Store;
pub use error::{LibraryError, Result};
pub use ingest::IngestQueue;
pub use jobs::TranscodeWorker;
