//! foldex - index folders, keep the index live, browse virtual folders.
//!
//! Usage:
//!   foldex add PATH            Register a source
//!   foldex scan PATH           Crawl a source and reconcile its index
//!   foldex watch PATH...       Apply live changes until Ctrl-C
//!   foldex sources             List registered sources
//!   foldex place PATH FILE     Import placements for a source
//!   foldex tree PATH           Print the virtual tree of a source
//!   foldex --help              Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use foldex_core::{
    IndexConfig, IndexStore, MemoryStore, Placement, Source, virtual_file_count,
};
use foldex_scan::{CrawlResult, Crawler};
use foldex_virtual::{VirtualFolder, VirtualNode, VirtualTreeMaterializer};
use foldex_watch::WatcherManager;

#[derive(Parser)]
#[command(
    name = "foldex",
    version,
    about = "Index folders and browse them through virtual folders",
    long_about = "foldex crawls registered folders into an index, keeps the index \
                  current with filesystem watchers, and materializes virtual folder \
                  trees from file placements."
)]
struct Cli {
    /// Index snapshot file
    #[arg(long, global = true, default_value = "foldex-state.json")]
    state: PathBuf,

    /// TOML file with indexing settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a folder as a source
    Add {
        /// Folder to register
        path: PathBuf,

        /// Display name (defaults to the folder name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Crawl a source, registering it first if needed
    Scan {
        /// Folder to crawl
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Watch registered sources and apply changes until interrupted
    Watch {
        /// Source folders to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List registered sources
    Sources {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Import placements for a source from a JSON array
    Place {
        /// Source folder
        path: PathBuf,

        /// JSON file containing placements
        placements: PathBuf,
    },

    /// Print the virtual tree of a source
    Tree {
        /// Source folder
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only list the direct children of this virtual folder
        #[arg(long)]
        at: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(
        MemoryStore::open(&cli.state)
            .with_context(|| format!("Cannot open state file {}", cli.state.display()))?,
    );

    match cli.command {
        Command::Add { path, name } => run_add(&store, &path, name)?,
        Command::Scan { path, format } => run_scan(&store, config, &path, format).await?,
        Command::Watch { paths } => run_watch(&store, config, &paths).await?,
        Command::Sources { format } => run_sources(&store, format)?,
        Command::Place { path, placements } => run_place(&store, &path, &placements)?,
        Command::Tree { path, at, format } => run_tree(&store, &path, at.as_deref(), format)?,
    }

    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "foldex=info",
        1 => "foldex=debug",
        _ => "foldex=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<IndexConfig> {
    let Some(path) = path else {
        return Ok(IndexConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config {}", path.display()))?;
    let config: IndexConfig =
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Look up the source registered for `path`.
fn find_source(store: &MemoryStore, path: &Path) -> Result<Source> {
    let path = path.canonicalize().context("Invalid path")?;
    store
        .list_sources()?
        .into_iter()
        .find(|s| s.path == path)
        .ok_or_else(|| eyre!("{} is not a registered source; run `foldex add` first", path.display()))
}

/// Register `path` unless it already is a source.
fn register(store: &MemoryStore, path: &Path, name: Option<String>) -> Result<(Source, bool)> {
    let path = path.canonicalize().context("Invalid path")?;
    if let Some(existing) = store.list_sources()?.into_iter().find(|s| s.path == path) {
        return Ok((existing, false));
    }
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    let source = store.add_source(&name, &path)?;
    store.save_sync()?;
    Ok((source, true))
}

fn run_add(store: &MemoryStore, path: &Path, name: Option<String>) -> Result<()> {
    let (source, created) = register(store, path, name)?;
    if created {
        println!("Added source {} '{}' at {}", source.id, source.name, source.path.display());
    } else {
        println!("Source {} already registered at {}", source.id, source.path.display());
    }
    Ok(())
}

/// Crawl a source and print a summary.
async fn run_scan(
    store: &Arc<MemoryStore>,
    config: IndexConfig,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let (source, _) = register(store, path, None)?;
    let crawler = Arc::new(Crawler::new(Arc::clone(store), config)?);

    let mut progress_rx = crawler.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match progress_rx.recv().await {
                Ok(progress) => {
                    eprintln!("[{}] {}", progress.status, progress.message);
                    if progress.status.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    eprintln!("Scanning {}...", source.path.display());
    let result = crawler
        .spawn_scan(source.id, source.path.clone())
        .await
        .context("Scan task failed")?;
    // Closing the channel ends the reporter even if no terminal update was sent.
    drop(crawler);
    let _ = reporter.await;

    match format {
        OutputFormat::Text => print_scan_summary(&source, &result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    if !result.is_done() {
        bail!("Scan of {} failed", source.path.display());
    }
    Ok(())
}

fn print_scan_summary(source: &Source, result: &CrawlResult) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", source.path.display(), format_size(result.bytes_scanned));
    if let Some(parent) = result.linked_to {
        println!(" Linked to indexed parent source {parent}");
    } else {
        println!(
            " {} files, {} folders indexed",
            result.files_scanned, result.folders_scanned
        );
        println!(
            " {} files, {} folders removed",
            result.files_removed, result.folders_removed
        );
    }
    println!(" Finished in {:.2}s ({})", result.duration.as_secs_f64(), result.status);
    println!("{}", "─".repeat(60));

    if result.has_errors() {
        println!();
        println!("{} problem(s) during scan", result.errors.len());
        for error in result.errors.iter().take(20) {
            println!("   {error}");
        }
        if result.errors.len() > 20 {
            println!("   ... and {} more", result.errors.len() - 20);
        }
    }
}

/// Watch sources until Ctrl-C, then save the index.
async fn run_watch(store: &Arc<MemoryStore>, config: IndexConfig, paths: &[PathBuf]) -> Result<()> {
    let sources = paths
        .iter()
        .map(|p| find_source(store, p))
        .collect::<Result<Vec<_>>>()?;

    let manager = WatcherManager::new(Arc::clone(store), config)?;
    let mut changes = manager.subscribe();

    for source in &sources {
        if manager.start_watching(source.id) {
            eprintln!("Watching {}", source.path.display());
        } else {
            eprintln!("Could not watch {}", source.path.display());
        }
    }
    if manager.watched_sources().is_empty() {
        bail!("No source could be watched");
    }
    eprintln!("Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Cannot listen for Ctrl-C")?;
                break;
            }
            change = changes.recv() => match change {
                Ok(change) => println!("{:>6}  {}", change.kind, change.path.display()),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "change notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.stop_all();
    store.save_sync()?;
    eprintln!("Index saved to {}", display_state(store));
    Ok(())
}

fn run_sources(store: &MemoryStore, format: OutputFormat) -> Result<()> {
    let sources = store.list_sources()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    if sources.is_empty() {
        println!(" No sources registered.");
        return Ok(());
    }
    for source in &sources {
        let files = virtual_file_count(store, source)?;
        let link = match source.parent_id {
            Some(parent) => format!(" (linked to {parent})"),
            None => String::new(),
        };
        println!(
            " {:>4}  {:<20} {:>8} files  {}{}",
            source.id,
            truncate(&source.name, 20),
            files,
            source.path.display(),
            link
        );
    }
    Ok(())
}

fn run_place(store: &MemoryStore, path: &Path, placements: &Path) -> Result<()> {
    let source = find_source(store, path)?;
    let text = std::fs::read_to_string(placements)
        .with_context(|| format!("Cannot read {}", placements.display()))?;
    let placements: Vec<Placement> =
        serde_json::from_str(&text).context("Placements must be a JSON array")?;

    let count = placements.len();
    store.put_placements(source.id, placements)?;
    store.save_sync()?;
    println!("Imported {count} placement(s) for {}", source.path.display());
    Ok(())
}

fn run_tree(store: &Arc<MemoryStore>, path: &Path, at: Option<&str>, format: OutputFormat) -> Result<()> {
    let source = find_source(store, path)?;
    let materializer = VirtualTreeMaterializer::new(Arc::clone(store));

    match at {
        Some(virtual_path) => {
            let children = materializer.children(source.id, virtual_path)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&children)?),
                OutputFormat::Text => {
                    if children.is_empty() {
                        println!(" {virtual_path} has no entries.");
                    }
                    for child in &children {
                        print_node(child, 0);
                    }
                }
            }
        }
        None => {
            let tree = materializer.tree(source.id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
                OutputFormat::Text => print_tree(&tree),
            }
        }
    }
    Ok(())
}

fn print_tree(root: &VirtualFolder) {
    println!("/ ({} files)", root.file_count);
    for child in root.children() {
        print_node(child, 1);
    }
}

/// Print a node and its loaded descendants.
fn print_node(node: &VirtualNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        VirtualNode::Folder(folder) => {
            println!("{indent}{}/ ({} files)", folder.name, folder.file_count);
            for child in folder.children() {
                print_node(child, depth + 1);
            }
        }
        VirtualNode::File(file) => match &file.file {
            Some(record) => println!(
                "{indent}{}  {}  <- {}",
                file.name,
                format_size(record.size),
                record.path.display()
            ),
            None => println!("{indent}{}  (not indexed)", file.name),
        },
    }
}

fn display_state(store: &MemoryStore) -> String {
    store
        .snapshot_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max chars.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
