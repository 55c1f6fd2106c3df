// Reelvault CLI binary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use reelvault::catalog::{CatalogTree, ContainerNode};
use reelvault::db::schema::{CategoryKind, InputFile, Metadata, MetadataKind};
use reelvault::db::{default_db_path, Store};
use reelvault::ingest::{IngestQueue, ScanOutcome};
use reelvault::jobs::TranscodeWorker;

#[derive(Parser)]
#[command(name = "reelvault")]
#[command(about = "Reelvault - ingest, transcode and catalog a media library", long_about = None)]
#[command(version)]
struct Cli {
    /// Library database (defaults to $REELVAULT_DB, then ~/.reelvault/reelvault.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a library whose media lives under the given directory
    Init {
        media_root: PathBuf,
    },

    /// Probe and queue a source file, or every file under a directory
    Scan {
        path: PathBuf,
    },

    /// List queued input files
    Inputs {
        /// Only show inputs waiting for a stream map
        #[arg(long)]
        needs_map: bool,
    },

    /// Choose which source streams go into the output
    Remap {
        id: String,
        /// Source stream indices, in output order
        #[arg(required = true)]
        indices: Vec<i64>,
    },

    /// Undo a transcode and return the input to the queue
    Reset {
        id: String,
    },

    /// Forget an input file
    DeleteInput {
        id: String,
    },

    /// Run the transcoder
    Transcode {
        /// Keep polling for new work until stopped
        #[arg(long)]
        continuous: bool,
    },

    /// Ask running transcoders to stop after their current job
    Stop,

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Manage catalog entries
    #[command(subcommand)]
    Metadata(MetadataCommands),
}

#[derive(Subcommand)]
enum CategoryCommands {
    Create {
        name: String,
        /// movie, series or music
        #[arg(short, long)]
        kind: String,
    },
    Update {
        /// Category id or name
        category: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        kind: Option<String>,
    },
    Delete {
        /// Category id or name
        category: String,
    },
    List,
}

#[derive(Subcommand)]
enum MetadataCommands {
    Create {
        display: String,
        /// series, season, artist, album, file-video or file-audio
        #[arg(short, long)]
        kind: String,
        /// Parent category (id or name) or container id; omit for the media root
        #[arg(short, long, default_value = "")]
        parent: String,
        #[arg(long, default_value = "")]
        sort: String,
    },
    Rename {
        id: String,
        display: String,
        #[arg(long, default_value = "")]
        sort: String,
    },
    Reparent {
        id: String,
        /// New parent category (id or name), container id, or "" for the media root
        parent: String,
    },
    Delete {
        id: String,
        /// Delete descendants instead of moving them to the media root
        #[arg(long)]
        cascade: bool,
    },
    List {
        #[arg(default_value = "")]
        parent: String,
    },
    Tree {
        #[arg(default_value = "")]
        parent: String,
    },
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let db = resolve_db_path(cli.db)?;

    match cli.command {
        Commands::Init { media_root } => cmd_init(&db, &media_root),
        Commands::Scan { path } => cmd_scan(&db, &path),
        Commands::Inputs { needs_map } => cmd_inputs(&db, needs_map),
        Commands::Remap { id, indices } => cmd_remap(&db, &id, &indices),
        Commands::Reset { id } => cmd_reset(&db, &id),
        Commands::DeleteInput { id } => cmd_delete_input(&db, &id),
        Commands::Transcode { continuous } => cmd_transcode(&db, continuous),
        Commands::Stop => cmd_stop(&db),
        Commands::Category(cmd) => cmd_category(&db, cmd),
        Commands::Metadata(cmd) => cmd_metadata(&db, cmd),
    }
}

fn cmd_init(db: &Path, media_root: &Path) -> Result<()> {
    let store = Store::init(db, media_root)?;
    println!("Initialized library at {}", store.media_root().display());
    println!("  Database:   {}", store.db_path().display());
    Ok(())
}

fn cmd_scan(db: &Path, path: &Path) -> Result<()> {
    let queue = IngestQueue::new(open_store(db)?);

    if path.is_dir() {
        let summary = queue.scan_tree(path)?;
        println!("Scan complete:");
        println!("  Queued:             {}", summary.queued);
        println!("  Already processed:  {}", summary.already_processed);
        println!("  Skipped:            {}", summary.skipped);
        println!("  Failed:             {}", summary.failed);
        return Ok(());
    }

    match queue.scan(path)? {
        ScanOutcome::Queued(inp) => {
            println!("Queued {}", inp.id);
            print_input(&inp);
        }
        ScanOutcome::AlreadyProcessed(id) => println!("Already queued as {}", id),
        ScanOutcome::Skipped(reason) => println!("Skipped ({})", reason),
    }
    Ok(())
}

fn cmd_inputs(db: &Path, needs_map: bool) -> Result<()> {
    let queue = IngestQueue::new(open_store(db)?);
    let inputs = if needs_map { queue.list_needing_map()? } else { queue.list()? };

    if inputs.is_empty() {
        println!("No input files. Use 'reelvault scan <path>' to add sources.");
        return Ok(());
    }

    println!("{:<36}  {:>11}  {:>9}  {:<12}  {}", "ID", "Status", "Duration", "Map", "Source");
    println!("{}", "-".repeat(100));
    for inp in &inputs {
        println!(
            "{:<36}  {:>11}  {:>9}  {:<12}  {}",
            inp.id,
            inp.status().as_str(),
            format_duration(inp.source_duration),
            format_map(&inp.stream_map),
            inp.source_location
        );
        if !inp.transcoding_error.is_empty() {
            println!("{:<36}  error: {}", "", first_line(&inp.transcoding_error));
        }
    }
    println!();
    println!("{} input file(s)", inputs.len());
    Ok(())
}

fn cmd_remap(db: &Path, id: &str, indices: &[i64]) -> Result<()> {
    let queue = IngestQueue::new(open_store(db)?);
    let inp = queue.remap(id, indices)?;
    println!("Remapped {} to {}", inp.id, format_map(&inp.stream_map));
    Ok(())
}

fn cmd_reset(db: &Path, id: &str) -> Result<()> {
    let queue = IngestQueue::new(open_store(db)?);
    let inp = queue.reset(id)?;
    println!("Reset {} ({})", inp.id, inp.source_location);
    Ok(())
}

fn cmd_delete_input(db: &Path, id: &str) -> Result<()> {
    let queue = IngestQueue::new(open_store(db)?);
    queue.delete(id)?;
    println!("Deleted input file {}", id);
    Ok(())
}

fn cmd_transcode(db: &Path, continuous: bool) -> Result<()> {
    let worker = TranscodeWorker::new(open_store(db)?);
    let count = if continuous {
        println!("Transcoder {} running; use 'reelvault stop' to end it", worker.worker_id());
        worker.run_continuous()?
    } else {
        worker.run_once()?
    };
    println!("Processed {} job(s)", count);
    Ok(())
}

fn cmd_stop(db: &Path) -> Result<()> {
    let worker = TranscodeWorker::new(open_store(db)?);
    let marker = worker.request_stop()?;
    println!("Stop requested (marker {})", marker);
    Ok(())
}

fn cmd_category(db: &Path, cmd: CategoryCommands) -> Result<()> {
    let catalog = CatalogTree::new(open_store(db)?);

    match cmd {
        CategoryCommands::Create { name, kind } => {
            let cat = catalog.create_category(&name, kind.parse::<CategoryKind>()?)?;
            println!("Created category {} ({}) at {}", cat.name, cat.id, catalog.category_disk_path(&cat).display());
        }
        CategoryCommands::Update { category, name, kind } => {
            let current = catalog.find_category(&category)?;
            let kind = match kind {
                Some(k) => k.parse::<CategoryKind>()?,
                None => current.media_type,
            };
            let name = name.unwrap_or_else(|| current.name.clone());
            let cat = catalog.update_category(&current.id, &name, kind)?;
            println!("Updated category {} ({}, {})", cat.id, cat.name, cat.media_type);
        }
        CategoryCommands::Delete { category } => {
            let current = catalog.find_category(&category)?;
            catalog.delete_category(&current.id)?;
            println!("Deleted category {}; its entries moved to the media root", current.name);
        }
        CategoryCommands::List => {
            let categories = catalog.list_categories()?;
            if categories.is_empty() {
                println!("No categories.");
                return Ok(());
            }
            println!("{:<36}  {:<8}  {:>5}  {}", "ID", "Type", "Order", "Name");
            println!("{}", "-".repeat(70));
            for cat in &categories {
                println!("{:<36}  {:<8}  {:>5}  {}", cat.id, cat.media_type, cat.sort_index, cat.name);
            }
        }
    }
    Ok(())
}

fn cmd_metadata(db: &Path, cmd: MetadataCommands) -> Result<()> {
    let catalog = CatalogTree::new(open_store(db)?);

    match cmd {
        MetadataCommands::Create { display, kind, parent, sort } => {
            let parent_id = resolve_parent(&catalog, &parent);
            let mut md = Metadata::new(&parent_id, kind.parse::<MetadataKind>()?, &display);
            md.name_sort = sort;
            let md = catalog.create_metadata(md)?;
            println!("Created {} {} ({})", md.media_type, md.name_display, md.id);
        }
        MetadataCommands::Rename { id, display, sort } => {
            let md = catalog.rename(&id, &display, &sort)?;
            println!("Renamed {} to {} (sort {:?})", md.id, md.name_display, md.name_sort);
        }
        MetadataCommands::Reparent { id, parent } => {
            let parent_id = resolve_parent(&catalog, &parent);
            let md = catalog.reparent(&id, &parent_id)?;
            let path = catalog.path_for(&md, reelvault::catalog::PathVariant::Media)?;
            println!("Moved {} to {}", md.name_display, path.display());
        }
        MetadataCommands::Delete { id, cascade } => {
            catalog.delete_metadata(&id, cascade)?;
            println!("Deleted {}", id);
        }
        MetadataCommands::List { parent } => {
            let parent_id = resolve_parent(&catalog, &parent);
            let children = catalog.children(&parent_id)?;
            if children.is_empty() {
                println!("No entries.");
                return Ok(());
            }
            println!("{:<36}  {:<10}  {:>9}  {:>10}  {}", "ID", "Type", "Duration", "Size", "Name");
            println!("{}", "-".repeat(90));
            for md in &children {
                println!(
                    "{:<36}  {:<10}  {:>9}  {:>10}  {}",
                    md.id,
                    md.media_type,
                    if md.media_type.is_file() { format_duration(md.duration) } else { String::new() },
                    if md.media_type.is_file() { format_size(md.size) } else { String::new() },
                    md.name_display
                );
            }
        }
        MetadataCommands::Tree { parent } => {
            let parent_id = resolve_parent(&catalog, &parent);
            let tree = catalog.container_tree(&parent_id)?;
            if tree.is_empty() {
                println!("No containers.");
            }
            print_tree(&tree, 0);
        }
    }
    Ok(())
}

// --- Helper Functions ---

fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os("REELVAULT_DB").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    default_db_path().context("Could not determine a home directory; pass --db")
}

fn open_store(db: &Path) -> Result<Store> {
    Store::open(db).with_context(|| {
        format!(
            "No library at {}. Use 'reelvault init <media root>' to create one.",
            db.display()
        )
    })
}

/// Category names are accepted wherever a parent id is
fn resolve_parent(catalog: &CatalogTree, parent: &str) -> String {
    if parent.is_empty() {
        return String::new();
    }
    catalog
        .find_category(parent)
        .map(|cat| cat.id)
        .unwrap_or_else(|_| parent.to_string())
}

fn print_input(inp: &InputFile) {
    println!("  Source:    {}", inp.source_location);
    println!("  Duration:  {}", format_duration(inp.source_duration));
    for stream in &inp.source_streams {
        let detail = match stream.stream_type {
            reelvault::probe::StreamType::Video => format!("{}x{} @ {}fps", stream.width, stream.height, stream.fps),
            reelvault::probe::StreamType::Audio => format!("{}ch {}", stream.channels, stream.language),
            reelvault::probe::StreamType::Subtitle => stream.language.clone(),
        };
        println!("  #{:<3} {:<9} {:<10} {}", stream.index, stream.stream_type.as_str(), stream.codec, detail);
    }
    if inp.stream_map.is_empty() {
        println!("  Map:       (none) use 'reelvault remap {} <indices...>'", inp.id);
    } else {
        println!("  Map:       {}", format_map(&inp.stream_map));
    }
}

fn print_tree(nodes: &[ContainerNode], depth: usize) {
    for node in nodes {
        println!(
            "{}{} [{}] ({})",
            "  ".repeat(depth),
            node.metadata.name_display,
            node.metadata.media_type,
            node.metadata.id
        );
        print_tree(&node.children, depth + 1);
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

fn format_map(map: &[i64]) -> String {
    if map.is_empty() {
        return "-".to_string();
    }
    map.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
