//! Command-line interface for the semantic code index.

use clap::{Parser, Subcommand};
use semdex::error::ErrorContext as _;
use semdex::indexing::{ChangeMonitor, ProgressEvent, ProgressSender, spawn_change_source};
use semdex::{IndexError, ProjectHandle, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "semdex")]
#[command(author, version, about = "Incremental semantic code index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to the detected workspace)
    #[arg(long, global = true)]
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the project, re-embedding only changed files
    Index {
        /// Re-embed every file regardless of recorded hashes
        #[arg(long)]
        force: bool,
    },
    /// Search the index for semantically similar code
    Search {
        /// Natural language or code query
        query: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the project and reindex after changes settle
    Watch,
    /// Show index and cache statistics
    Stats,
    /// Remove cached embeddings older than the given age
    PurgeCache {
        /// Age threshold in days
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("semdex=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => fail(&e),
    };
    if let Some(path) = &cli.path {
        settings.workspace_root = Some(path.clone());
    }

    if let Err(e) = run(cli.command, Arc::new(settings)).await {
        fail(&e);
    }
}

fn fail(e: &IndexError) -> ! {
    eprintln!("Error [{}]: {e}", e.status_code());
    for suggestion in e.recovery_suggestions() {
        eprintln!("Suggestion: {suggestion}");
    }
    std::process::exit(e.exit_code());
}

async fn run(command: Commands, settings: Arc<Settings>) -> Result<(), IndexError> {
    match command {
        Commands::Index { force } => {
            let handle = open_project(&settings)?;
            let (progress, events) = ProgressSender::channel();
            let reporter = std::thread::spawn(move || {
                for event in events {
                    match event {
                        ProgressEvent::Scanning { discovered } => {
                            eprint!("\rScanning: {discovered} files");
                        }
                        ProgressEvent::Embedding { current, total } => {
                            eprint!("\rEmbedding: {current}/{total} chunks");
                        }
                        ProgressEvent::Committing => eprintln!("\nCommitting..."),
                        ProgressEvent::Completed | ProgressEvent::Failed { .. } => break,
                    }
                }
            });

            let result = tokio::task::spawn_blocking({
                let handle = Arc::clone(&handle);
                move || handle.reindex(force, &progress)
            })
            .await
            .map_err(|e| IndexError::General(format!("indexing task panicked: {e}")))?;
            let _ = reporter.join();

            let stats = result?;
            println!(
                "Indexed {} files ({} chunks) in {:.2}s; {} unchanged, {} removed, {} skipped",
                stats.files_processed,
                stats.chunks_created,
                stats.elapsed.as_secs_f64(),
                stats.changes.unchanged,
                stats.changes.removed.len(),
                stats.files_skipped,
            );
            Ok(())
        }

        Commands::Search { query, limit, json } => {
            let handle = open_project(&settings)?;
            // Verify pass: repopulates the in-memory index from the file
            // records and the warm embedding cache
            handle.reindex(false, &ProgressSender::disabled())?;

            let limit = limit.unwrap_or(settings.search.default_limit);
            let results = handle.search(&query, limit)?;

            if json {
                let out =
                    serde_json::to_string_pretty(&results).context("cannot serialize results")?;
                println!("{out}");
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for result in &results {
                    println!(
                        "{:.3}  {}:{}-{}  [{}]",
                        result.score.get(),
                        result.file_path.display(),
                        result.start_line,
                        result.end_line,
                        result.chunk_kind,
                    );
                    for line in result.content.lines().take(3) {
                        println!("       {line}");
                    }
                }
            }
            Ok(())
        }

        Commands::Watch => {
            let handle = open_project(&settings)?;
            let root = settings.root();
            let debounce = Duration::from_secs(settings.watch.debounce_secs);

            let (rx, _guard) = spawn_change_source(&settings, &root)?;
            println!(
                "Watching {} ({:?} debounce). Ctrl-C to stop.",
                root.display(),
                debounce
            );

            let monitor = ChangeMonitor::new(debounce, rx, handle);
            tokio::select! {
                () = monitor.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\nStopping watch.");
                }
            }
            Ok(())
        }

        Commands::Stats => {
            let handle = open_project(&settings)?;
            handle.reindex(false, &ProgressSender::disabled())?;

            let stats = handle.stats();
            println!("Index:");
            println!("  entries:   {}", stats.chunk_count);
            println!("  files:     {}", stats.file_count);
            println!("  dimension: {}", stats.dimension);
            println!("  precision: {}", stats.precision);
            println!("  memory:    {:.1} MiB", stats.memory_usage_mb);
            println!("Embedding cache:");
            println!("  entries: {}", stats.cache.entries);
            println!(
                "  size:    {:.1} MiB",
                stats.cache.bytes as f64 / (1024.0 * 1024.0)
            );
            Ok(())
        }

        Commands::PurgeCache { older_than_days } => {
            let handle = open_project(&settings)?;
            let max_age = Duration::from_secs(older_than_days * 24 * 60 * 60);
            let removed = handle.embedder().cache().purge_older_than(max_age);
            println!("Removed {removed} cached embeddings older than {older_than_days} days.");
            Ok(())
        }
    }
}

fn open_project(settings: &Arc<Settings>) -> Result<Arc<ProjectHandle>, IndexError> {
    let root = settings.root();
    let name = root
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(Arc::new(ProjectHandle::open(
        Arc::clone(settings),
        &name,
        &root,
    )?))
}
