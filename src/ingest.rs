//! Importers that stream WNDB files into the store.

use crate::db::{self, FlushStats, Store};
use crate::error::{Result, WnError};
use crate::lines::LineSource;
use crate::models::{IndexEntry, PartOfSpeech, SenseRecord};
use crate::parse::{ParseSkip, parse_data_line, parse_index_line};
use crate::progress::{ProgressCallback, ProgressUpdate};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 750;

const WORD_CHUNK_SIZE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Records per transaction.
    pub batch_size: usize,
    /// Stop after this many accepted records.
    pub limit: Option<u64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
        }
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(WnError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.limit == Some(0) {
            return Err(WnError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records accepted from the source files.
    pub processed: u64,
    /// Lines rejected by the parser, not counting headers and blank lines.
    pub skipped: u64,
    /// Committed transactions.
    pub flushes: u64,
    pub totals: FlushStats,
}

/// A single import job.
#[async_trait]
pub trait Importer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<ImportSummary>;
}

type Reporter = Arc<Mutex<Option<ProgressCallback>>>;

fn report(reporter: &Reporter, update: ProgressUpdate) {
    if let Ok(mut guard) = reporter.lock() {
        if let Some(cb) = guard.as_mut() {
            cb(update);
        }
    }
}

fn log_skip(path: &Path, line: usize, skip: &ParseSkip) {
    if skip.is_noise() {
        return;
    }
    warn!("Skipping {}:{}: {}", path.display(), line, skip);
}

// --- Synsets ---

/// Bulk importer for the `data.*` files.
///
/// Files are read in the order noun, verb, adjective, adverb. Each batch is
/// committed in its own transaction; a failing flush rolls back only itself
/// and aborts the run, leaving earlier batches in place.
pub struct SynsetImporter {
    store: Store,
    dict_dir: PathBuf,
    options: ImportOptions,
    reporter: Reporter,
}

impl SynsetImporter {
    pub fn new(store: Store, dict_dir: impl Into<PathBuf>, options: ImportOptions) -> Self {
        SynsetImporter {
            store,
            dict_dir: dict_dir.into(),
            options,
            reporter: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_progress(self, callback: ProgressCallback) -> Self {
        SynsetImporter {
            reporter: Arc::new(Mutex::new(Some(callback))),
            ..self
        }
    }

    async fn flush(
        &self,
        batch: &mut Vec<SenseRecord>,
        summary: &mut ImportSummary,
        stage: &str,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let records = std::mem::replace(batch, Vec::with_capacity(self.options.batch_size));
        let stats = self
            .store
            .call(move |conn| db::persist_batch(conn, &records))
            .await?;
        summary.flushes += 1;
        summary.totals.absorb(stats);
        report(
            &self.reporter,
            ProgressUpdate::advance(
                stage,
                summary.processed,
                self.options.limit,
                Some(format!("{} synsets committed", summary.totals.records)),
            ),
        );
        Ok(())
    }
}

#[async_trait]
impl Importer for SynsetImporter {
    fn name(&self) -> &'static str {
        "synsets"
    }

    async fn run(&self) -> Result<ImportSummary> {
        self.options.validate()?;
        let started = Instant::now();
        let mut summary = ImportSummary::default();
        let mut batch: Vec<SenseRecord> = Vec::with_capacity(self.options.batch_size);
        let mut stage = String::new();

        'files: for pos in PartOfSpeech::IMPORT_ORDER {
            let source = LineSource::new(self.dict_dir.join(pos.data_file()));
            stage = format!("Importing {}", pos.data_file());
            info!("{} from {:?}", stage, source.path());
            report(
                &self.reporter,
                ProgressUpdate::new_stage(stage.as_str(), self.options.limit),
            );

            let mut lines = source.open().await?;
            while let Some(line) = lines.next_line().await? {
                match parse_data_line(&line) {
                    Ok(record) => {
                        batch.push(record);
                        summary.processed += 1;
                    }
                    Err(skip) => {
                        if !skip.is_noise() {
                            summary.skipped += 1;
                        }
                        log_skip(lines.path(), lines.line_number(), &skip);
                        continue;
                    }
                }

                let limit_reached = self
                    .options
                    .limit
                    .is_some_and(|limit| summary.processed >= limit);
                if batch.len() >= self.options.batch_size || limit_reached {
                    self.flush(&mut batch, &mut summary, &stage).await?;
                }
                if limit_reached {
                    info!("Import limit of {} records reached", summary.processed);
                    break 'files;
                }
            }
            debug!("Finished {:?}", source.path());
        }

        self.flush(&mut batch, &mut summary, &stage).await?;

        info!(
            "Imported {} records in {} flushes ({} skipped). Took {:.2?}",
            summary.processed,
            summary.flushes,
            summary.skipped,
            started.elapsed()
        );
        Ok(summary)
    }
}

// --- Index words ---

/// Loads every lemma of the `index.*` files as a word row.
pub struct IndexWordImporter {
    store: Store,
    dict_dir: PathBuf,
    reporter: Reporter,
}

impl IndexWordImporter {
    pub fn new(store: Store, dict_dir: impl Into<PathBuf>) -> Self {
        IndexWordImporter {
            store,
            dict_dir: dict_dir.into(),
            reporter: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_progress(self, callback: ProgressCallback) -> Self {
        IndexWordImporter {
            reporter: Arc::new(Mutex::new(Some(callback))),
            ..self
        }
    }

    async fn flush(&self, chunk: &mut Vec<IndexEntry>, summary: &mut ImportSummary) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let entries = std::mem::replace(chunk, Vec::with_capacity(WORD_CHUNK_SIZE));
        let count = entries.len() as u64;
        let inserted = self
            .store
            .call(move |conn| db::insert_words(conn, &entries))
            .await?;
        summary.flushes += 1;
        summary.totals.records += count;
        summary.totals.words_inserted += inserted;
        Ok(())
    }
}

#[async_trait]
impl Importer for IndexWordImporter {
    fn name(&self) -> &'static str {
        "index-words"
    }

    async fn run(&self) -> Result<ImportSummary> {
        let started = Instant::now();
        let mut summary = ImportSummary::default();
        let mut chunk: Vec<IndexEntry> = Vec::with_capacity(WORD_CHUNK_SIZE);

        for pos in PartOfSpeech::IMPORT_ORDER {
            let source = LineSource::new(self.dict_dir.join(pos.index_file()));
            let stage = format!("Importing {}", pos.index_file());
            info!("{} from {:?}", stage, source.path());
            report(&self.reporter, ProgressUpdate::new_stage(stage.as_str(), None));

            let mut lines = source.open().await?;
            while let Some(line) = lines.next_line().await? {
                match parse_index_line(&line) {
                    Ok(entry) => {
                        chunk.push(entry);
                        summary.processed += 1;
                    }
                    Err(skip) => {
                        if !skip.is_noise() {
                            summary.skipped += 1;
                        }
                        log_skip(lines.path(), lines.line_number(), &skip);
                        continue;
                    }
                }
                if chunk.len() >= WORD_CHUNK_SIZE {
                    self.flush(&mut chunk, &mut summary).await?;
                    report(
                        &self.reporter,
                        ProgressUpdate::advance(stage.as_str(), summary.processed, None, None),
                    );
                }
            }
            self.flush(&mut chunk, &mut summary).await?;
            report(
                &self.reporter,
                ProgressUpdate::advance(
                    stage.as_str(),
                    summary.processed,
                    None,
                    Some(format!("{} new words", summary.totals.words_inserted)),
                ),
            );
        }

        info!(
            "Imported {} index lemmas ({} new words, {} skipped). Took {:.2?}",
            summary.processed,
            summary.totals.words_inserted,
            summary.skipped,
            started.elapsed()
        );
        Ok(summary)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::write_dictionary;
    use super::*;
    use rusqlite::params;
    use tempfile::tempdir;

    async fn offsets_in_store(store: &Store) -> Vec<String> {
        store
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT \"offset\" FROM synsets ORDER BY id")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn imports_all_four_files() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();

        let summary = SynsetImporter::new(store.clone(), dir.path(), ImportOptions::default())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.processed, 10);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.flushes, 1);
        assert_eq!(summary.totals.synsets_inserted, 10);

        // noun, verb, adjective, adverb
        let offsets = offsets_in_store(&store).await;
        assert_eq!(offsets.first().map(String::as_str), Some("07526757"));
        assert_eq!(offsets.last().map(String::as_str), Some("00013887"));
    }

    #[tokio::test]
    async fn reimport_is_idempotent_and_replaces_examples() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();
        let options = ImportOptions {
            batch_size: 3,
            limit: None,
        };

        SynsetImporter::new(store.clone(), dir.path(), options)
            .run()
            .await
            .unwrap();
        let before = store.call(|conn| db::table_counts(conn)).await.unwrap();

        let second = SynsetImporter::new(store.clone(), dir.path(), options)
            .run()
            .await
            .unwrap();
        let after = store.call(|conn| db::table_counts(conn)).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(second.totals.synsets_inserted, 0);
        assert_eq!(second.totals.words_inserted, 0);
        assert_eq!(second.totals.links_inserted, 0);
        assert_eq!(second.flushes, 4);

        // A changed gloss replaces the examples but the definition stays.
        let edited = super::fixtures::ADJECTIVES.replace(
            "marked by good fortune; \"a felicitous life\"",
            "new wording; \"a glad tiding\"",
        );
        std::fs::write(dir.path().join("data.adj"), edited).unwrap();
        SynsetImporter::new(store.clone(), dir.path(), options)
            .run()
            .await
            .unwrap();

        let (definition, examples) = store
            .call(|conn| {
                let definition: String = conn.query_row(
                    "SELECT definition FROM synsets WHERE \"offset\" = ?1",
                    params!["01148682"],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT e.text FROM examples e JOIN synsets s ON s.id = e.synset_id
                     WHERE s.\"offset\" = ?1 ORDER BY e.id",
                )?;
                let examples = stmt
                    .query_map(params!["01148682"], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok((definition, examples))
            })
            .await
            .unwrap();
        assert_eq!(definition, "marked by good fortune;");
        assert_eq!(examples, vec!["a glad tiding"]);
    }

    #[tokio::test]
    async fn limit_imports_an_exact_prefix() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();

        let summary = SynsetImporter::new(
            store.clone(),
            dir.path(),
            ImportOptions {
                batch_size: 1,
                limit: Some(4),
            },
        )
        .run()
        .await
        .unwrap();
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.flushes, 4);
        assert_eq!(
            offsets_in_store(&store).await,
            vec!["07526757", "05169242", "05169853", "01835496"]
        );
    }

    #[tokio::test]
    async fn limit_flushes_partial_batch() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();

        let summary = SynsetImporter::new(
            store.clone(),
            dir.path(),
            ImportOptions {
                batch_size: 750,
                limit: Some(2),
            },
        )
        .run()
        .await
        .unwrap();
        assert_eq!(summary.flushes, 1);
        assert_eq!(offsets_in_store(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_flush_rolls_back_and_keeps_earlier_commits() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let options = ImportOptions {
            batch_size: 3,
            limit: None,
        };

        let reference = Store::open_in_memory().unwrap();
        SynsetImporter::new(
            reference.clone(),
            dir.path(),
            ImportOptions {
                limit: Some(3),
                ..options
            },
        )
        .run()
        .await
        .unwrap();
        let first_flush = reference.call(|conn| db::table_counts(conn)).await.unwrap();

        // The second batch holds travel, move and happy; happy's examples are rejected.
        let store = Store::open_in_memory().unwrap();
        store
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_happy_examples BEFORE INSERT ON examples
                     WHEN (SELECT \"offset\" FROM synsets WHERE id = NEW.synset_id) = '01148283'
                     BEGIN SELECT RAISE(ABORT, 'example rejected'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let result = SynsetImporter::new(store.clone(), dir.path(), options)
            .run()
            .await;
        assert!(matches!(result, Err(WnError::Database(_))));

        let counts = store.call(|conn| db::table_counts(conn)).await.unwrap();
        assert_eq!(counts, first_flush);
        assert_eq!(
            offsets_in_store(&store).await,
            vec!["07526757", "05169242", "05169853"]
        );
        let stray_words: i64 = store
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM words WHERE lemma IN ('travel', 'go', 'move', 'happy')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(stray_words, 0);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_and_counted() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let noisy = format!(
            "{}\nnotanoffset 00 n 01 x 0 000 | bad\n00000099 00 q 01 x 0 000 | bad pos\n",
            super::fixtures::NOUNS
        );
        std::fs::write(dir.path().join("data.noun"), noisy).unwrap();
        let store = Store::open_in_memory().unwrap();

        let summary = SynsetImporter::new(store, dir.path(), ImportOptions::default())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.processed, 10);
        assert_eq!(summary.skipped, 2);
    }

    #[tokio::test]
    async fn missing_data_file_aborts() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        std::fs::remove_file(dir.path().join("data.adv")).unwrap();
        let store = Store::open_in_memory().unwrap();

        let result = SynsetImporter::new(store.clone(), dir.path(), ImportOptions::default())
            .run()
            .await;
        assert!(matches!(result, Err(WnError::DataFileNotFound(_))));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let importer = SynsetImporter::new(
            store,
            "/nonexistent",
            ImportOptions {
                batch_size: 0,
                limit: None,
            },
        );
        assert!(matches!(
            importer.run().await,
            Err(WnError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn progress_callback_sees_commits() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        SynsetImporter::new(store, dir.path(), ImportOptions::default())
            .with_progress(Box::new(move |update| {
                sink.lock().unwrap().push(update.stage_description);
            }))
            .run()
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("Importing data.noun"));
        assert!(seen.iter().any(|s| s == "Importing data.adv"));
    }

    #[tokio::test]
    async fn index_words_are_loaded_once() {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();

        let importer = IndexWordImporter::new(store.clone(), dir.path());
        assert_eq!(importer.name(), "index-words");
        let first = importer.run().await.unwrap();
        assert_eq!(first.processed, 7);
        assert_eq!(first.totals.words_inserted, 7);

        let second = importer.run().await.unwrap();
        assert_eq!(second.totals.words_inserted, 0);
        let counts = store.call(|conn| db::table_counts(conn)).await.unwrap();
        assert_eq!(counts.words, 7);
        assert_eq!(counts.synsets, 0);
    }
}
