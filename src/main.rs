//! Command-line interface for the WordNet dictionary.
//!
//! Imports a WNDB dictionary into SQLite, serves the HTTP API and looks up
//! words from the terminal.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{LevelFilter, debug, error, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use wordnet_dict::{
    ImportOptions, Importer, IndexWordImporter, PartOfSpeech, QueryService, RelationType, Store,
    SynsetImporter, WnError,
    config::{self, ServeConfig},
    data, db,
    error::Result,
    http,
    progress::{ProgressCallback, ProgressUpdate},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "WordNet dictionary importer and API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the SQLite database file (defaults to the user data directory)
    #[arg(long, global = true, env = "WNDICT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Set verbosity level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import synsets from the data.* files
    Import {
        /// Directory holding the WNDB index.* and data.* files
        #[arg(long)]
        dict_dir: Option<PathBuf>,
        /// Stop after this many records
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        limit: Option<u64>,
        /// Records per transaction
        #[arg(long, default_value_t = wordnet_dict::DEFAULT_BATCH_SIZE as u64,
              value_parser = clap::value_parser!(u64).range(1..))]
        batch_size: u64,
    },
    /// Import every lemma of the index.* files as a word
    ImportWords {
        #[arg(long)]
        dict_dir: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short = 'H', long, env = "HOST", default_value = config::DEFAULT_HOST)]
        host: String,
        #[arg(short, long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
        port: u16,
    },
    /// Define a word
    Define {
        /// The word to define
        word: String,
    },
    /// List the lemmas a word reaches through one relation type
    Related {
        word: String,
        /// Relation label (e.g. "Hypernym", "Also See") or pointer symbol (e.g. "@", "~i")
        #[arg(short, long, default_value = "Hypernym")]
        relation: RelationType,
    },
    /// Download and extract a zipped WNDB dictionary
    Download {
        /// URL of a zip archive containing the WNDB files
        #[arg(long, env = "WNDICT_DOWNLOAD_URL")]
        url: String,
        #[arg(long)]
        dict_dir: Option<PathBuf>,
    },
    /// Delete the database file
    ClearDb,
}

/// Sets up logging based on verbosity level. `RUST_LOG` takes precedence.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

type ProgressBars = Arc<Mutex<HashMap<String, ProgressBar>>>;

/// Creates a progress callback for displaying download and import progress.
fn create_progress_callback(
    multi_progress: MultiProgress,
    progress_bars: ProgressBars,
) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        let Ok(mut bars) = progress_bars.lock() else {
            return;
        };

        if update.current_item == 0 && !bars.contains_key(&update.stage_description) {
            let pb = multi_progress.add(ProgressBar::new(update.total_items.unwrap_or(0)));
            let style_template = if update.total_items.is_some() {
                "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({percent}%) {msg}"
            } else {
                "{prefix:>12.cyan.bold} [{elapsed_precise}] {spinner} {pos} {msg}"
            };

            pb.set_style(
                ProgressStyle::default_bar()
                    .template(style_template)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );
            pb.set_prefix(update.stage_description.clone());
            pb.set_message(update.message.unwrap_or_default());
            pb.enable_steady_tick(Duration::from_millis(100));
            bars.insert(update.stage_description, pb);
        } else if let Some(pb) = bars.get(&update.stage_description) {
            pb.set_position(update.current_item);
            if let Some(msg) = update.message {
                pb.set_message(msg);
            }
            if let Some(total) = update.total_items {
                if update.current_item >= total {
                    pb.finish_and_clear();
                }
            }
        }
    })
}

fn clear_progress(progress_bars: &ProgressBars) {
    if let Ok(bars) = progress_bars.lock() {
        for pb in bars.values() {
            pb.finish_and_clear();
        }
    }
    std::io::stdout().flush().ok();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Command failed: {}", e);
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = config::resolve_db_path(cli.db_path.as_deref())?;

    match cli.command {
        Commands::Import {
            dict_dir,
            limit,
            batch_size,
        } => {
            let dict_dir = config::resolve_dict_dir(dict_dir.as_deref())?;
            let options = ImportOptions {
                batch_size: usize::try_from(batch_size)
                    .map_err(|_| WnError::InvalidArgument("batch size too large".to_string()))?,
                limit,
            };
            handle_import(&db_path, dict_dir, options).await
        }
        Commands::ImportWords { dict_dir } => {
            let dict_dir = config::resolve_dict_dir(dict_dir.as_deref())?;
            handle_import_words(&db_path, dict_dir).await
        }
        Commands::Serve { host, port } => {
            let serve = ServeConfig { host, port };
            let addr = serve.socket_addr()?;
            let store = Store::open(&db_path)?;
            let listener = TcpListener::bind(addr).await?;
            http::serve(listener, QueryService::new(store)).await
        }
        Commands::Define { word } => {
            let store = Store::open(&db_path)?;
            handle_define(&QueryService::new(store), &word).await
        }
        Commands::Related { word, relation } => {
            let store = Store::open(&db_path)?;
            handle_related(&QueryService::new(store), &word, relation).await
        }
        Commands::Download { url, dict_dir } => {
            let dict_dir = config::resolve_dict_dir(dict_dir.as_deref())?;
            handle_download(&url, dict_dir).await
        }
        Commands::ClearDb => {
            info!("Clearing database...");
            if db::remove_database_file(&db_path)? {
                println!("{}", "Database cleared successfully.".green());
            } else {
                println!(
                    "{}",
                    format!("No database found at {}.", db_path.display()).yellow()
                );
            }
            Ok(())
        }
    }
}

async fn handle_import(db_path: &Path, dict_dir: PathBuf, options: ImportOptions) -> Result<()> {
    let missing = data::missing_dictionary_files(&dict_dir);
    if !missing.is_empty() {
        warn!("{} is missing {}", dict_dir.display(), missing.join(", "));
    }

    let store = Store::open(db_path)?;
    let multi_progress = MultiProgress::new();
    let progress_bars: ProgressBars = Arc::new(Mutex::new(HashMap::new()));
    let callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());

    let importer = SynsetImporter::new(store, dict_dir, options).with_progress(callback);
    info!("Running importer '{}'", importer.name());
    let result = importer.run().await;
    clear_progress(&progress_bars);

    let summary = result?;
    println!(
        "{}",
        format!(
            "Imported {} synsets in {} batches ({} lines skipped).",
            summary.processed, summary.flushes, summary.skipped
        )
        .green()
    );
    Ok(())
}

async fn handle_import_words(db_path: &Path, dict_dir: PathBuf) -> Result<()> {
    let store = Store::open(db_path)?;
    let multi_progress = MultiProgress::new();
    let progress_bars: ProgressBars = Arc::new(Mutex::new(HashMap::new()));
    let callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());

    let importer = IndexWordImporter::new(store, dict_dir).with_progress(callback);
    info!("Running importer '{}'", importer.name());
    let result = importer.run().await;
    clear_progress(&progress_bars);

    let summary = result?;
    println!(
        "{}",
        format!(
            "Read {} index lemmas, {} new words.",
            summary.processed, summary.totals.words_inserted
        )
        .green()
    );
    Ok(())
}

async fn handle_download(url: &str, dict_dir: PathBuf) -> Result<()> {
    let multi_progress = MultiProgress::new();
    let progress_bars: ProgressBars = Arc::new(Mutex::new(HashMap::new()));
    let callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());

    let result = data::download_dictionary(url, &dict_dir, Some(callback)).await;
    clear_progress(&progress_bars);

    let written = result?;
    println!(
        "{}",
        format!(
            "Extracted {} dictionary files into {}.",
            written.len(),
            dict_dir.display()
        )
        .green()
    );
    Ok(())
}

/// Handles the define command by looking up and displaying word definitions.
async fn handle_define(query: &QueryService, word: &str) -> Result<()> {
    info!("Defining word: '{}'", word);
    let start_lookup = Instant::now();
    let entries = match query.definitions_for(word).await {
        Ok(entries) => entries,
        Err(WnError::LemmaNotFound(_)) => {
            println!("No definitions found for '{}'.", word.yellow());
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let hypernyms: HashMap<(String, PartOfSpeech), Vec<String>> = query
        .related_for(word, RelationType::Hypernym)
        .await?
        .into_iter()
        .map(|entry| ((entry.offset, entry.pos), entry.lemmas))
        .collect();
    debug!("Lookup for '{}' took: {:?}", word, start_lookup.elapsed());

    let lemma = wordnet_dict::normalize_lemma(word).unwrap_or_else(|| word.to_string());
    println!("\n{}", lemma.bold().cyan());

    for (counter, entry) in entries.iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("{}:", counter + 1).bold(),
            format!("({})", entry.pos).italic(),
            entry.definition
        );
        for example in &entry.examples {
            println!("        {}", format!("\"{}\"", example).italic());
        }
        print_lemmas("Synonyms", &entry.synonyms);
        print_lemmas("Antonyms", &entry.antonyms);
        if let Some(related) = hypernyms.get(&(entry.offset.clone(), entry.pos)) {
            print_lemmas("Hypernyms", related);
        }
    }
    println!();
    Ok(())
}

async fn handle_related(query: &QueryService, word: &str, relation: RelationType) -> Result<()> {
    let entries = match query.related_for(word, relation).await {
        Ok(entries) => entries,
        Err(WnError::LemmaNotFound(_)) => {
            println!("No definitions found for '{}'.", word.yellow());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    println!(
        "\n{} {}",
        word.bold().cyan(),
        format!("{} ({})", relation, relation.symbol()).italic()
    );
    let mut found = false;
    for entry in entries.iter().filter(|e| !e.lemmas.is_empty()) {
        found = true;
        println!(
            "  {} {}",
            format!("{} ({})", entry.offset, entry.pos).bold(),
            entry.lemmas.join(", ").green()
        );
    }
    if !found {
        println!("  none");
    }
    println!();
    Ok(())
}

fn print_lemmas(label: &str, lemmas: &[String]) {
    if !lemmas.is_empty() {
        println!("        {}: {}", label.magenta(), lemmas.join(", ").green());
    }
}
