use crate::error::{Result, WnError};
use crate::models::{IndexEntry, PartOfSpeech, SenseRecord};
use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// --- Schema Definition ---

const SCHEMA_VERSION: u32 = 1;

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const CREATE_WORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS words (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lemma TEXT NOT NULL, -- normalized: lowercase, spaces instead of underscores
    pos TEXT NOT NULL,   -- 'n', 'v', 'a', 's' or 'r'
    UNIQUE (lemma, pos)
);";

// "offset" is a keyword and must stay quoted.
const CREATE_SYNSETS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS synsets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    \"offset\" TEXT NOT NULL, -- verbatim from the data file, zero padded
    pos TEXT NOT NULL,
    definition TEXT NOT NULL,
    sense_key TEXT,
    UNIQUE (\"offset\", pos)
);";

const CREATE_WORD_SYNSETS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS word_synsets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    word_id INTEGER NOT NULL,
    synset_id INTEGER NOT NULL,
    UNIQUE (word_id, synset_id),
    FOREIGN KEY (word_id) REFERENCES words(id) ON DELETE CASCADE,
    FOREIGN KEY (synset_id) REFERENCES synsets(id) ON DELETE CASCADE
);";

const CREATE_EXAMPLES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS examples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    synset_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    FOREIGN KEY (synset_id) REFERENCES synsets(id) ON DELETE CASCADE
);";

const CREATE_RELATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    synset_id INTEGER NOT NULL,
    relation_type TEXT NOT NULL, -- RelationType label, e.g. 'Antonym'
    target_offset TEXT NOT NULL, -- target pos is not recorded
    FOREIGN KEY (synset_id) REFERENCES synsets(id) ON DELETE CASCADE
);";

// --- Indices ---

const CREATE_WORD_LEMMA_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_word_lemma ON words (lemma);";
const CREATE_SYNSET_OFFSET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_synset_offset ON synsets (\"offset\");";
const CREATE_WORD_SYNSET_SYNSET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_word_synset_synset ON word_synsets (synset_id);";
const CREATE_EXAMPLE_SYNSET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_example_synset ON examples (synset_id);";
const CREATE_RELATION_SYNSET_TYPE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_relation_synset_type ON relations (synset_id, relation_type);";

const SCHEMA: [&str; 11] = [
    CREATE_METADATA_TABLE,
    CREATE_WORDS_TABLE,
    CREATE_SYNSETS_TABLE,
    CREATE_WORD_SYNSETS_TABLE,
    CREATE_EXAMPLES_TABLE,
    CREATE_RELATIONS_TABLE,
    CREATE_WORD_LEMMA_INDEX,
    CREATE_SYNSET_OFFSET_INDEX,
    CREATE_WORD_SYNSET_SYNSET_INDEX,
    CREATE_EXAMPLE_SYNSET_INDEX,
    CREATE_RELATION_SYNSET_TYPE_INDEX,
];

// --- Initialization Function ---

/// Creates all necessary tables and indices in the database if they don't exist.
/// Also checks and sets the schema version.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    debug!(
        "Initializing database schema (version {})...",
        SCHEMA_VERSION
    );
    let tx = conn.transaction()?;

    for statement in SCHEMA {
        tx.execute(statement, [])?;
    }

    let existing_version_str: Option<String> = tx
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing_version_str {
        Some(v_str) => {
            let existing_version: u32 = v_str.parse().map_err(|e| {
                WnError::Internal(format!(
                    "Failed to parse existing schema version '{}': {}",
                    v_str, e
                ))
            })?;
            match existing_version.cmp(&SCHEMA_VERSION) {
                std::cmp::Ordering::Less => {
                    warn!(
                        "Database schema version ({}) is older than expected ({}). Updating version marker.",
                        existing_version, SCHEMA_VERSION
                    );
                    tx.execute(
                        "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
                        params![SCHEMA_VERSION.to_string()],
                    )?;
                }
                std::cmp::Ordering::Greater => {
                    warn!(
                        "Database schema version ({}) is newer than expected ({}). Using potentially incompatible schema.",
                        existing_version, SCHEMA_VERSION
                    );
                }
                std::cmp::Ordering::Equal => {
                    debug!(
                        "Database schema version ({}) matches expected version.",
                        existing_version
                    );
                }
            }
        }
        None => {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            info!("Set initial schema version in metadata table.");
        }
    }

    tx.commit()?;
    Ok(())
}

/// Opens (creating if needed) a database file and applies connection pragmas.
pub fn open_db_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    configure_connection(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    // WAL lets a serving process read while an import commits.
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("SQLite journal mode: {}", mode);
    conn.pragma_update(None, "cache_size", "-64000")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

// --- Store ---

/// Shared handle to the SQLite connection.
///
/// Cloning is cheap. All SQL runs on the blocking thread pool through
/// [`Store::call`]; callers never hold the lock across an `.await`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<Arc<PathBuf>>,
}

impl Store {
    /// Opens the database at `path` and makes sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Using database path: {:?}", path);
        let mut conn = open_db_connection(path)?;
        initialize_database(&mut conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(Arc::new(path.to_path_buf())),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        initialize_database(&mut conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file backing this store; `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Runs `f` with exclusive access to the connection on a blocking thread.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| WnError::Internal("Mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

// --- Flush ---

/// Row-level effect of one or more flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Records handed to the flush, before deduplication.
    pub records: u64,
    pub words_inserted: u64,
    pub synsets_inserted: u64,
    pub links_inserted: u64,
    pub examples_written: u64,
    pub relations_written: u64,
}

impl FlushStats {
    pub fn absorb(&mut self, other: FlushStats) {
        self.records += other.records;
        self.words_inserted += other.words_inserted;
        self.synsets_inserted += other.synsets_inserted;
        self.links_inserted += other.links_inserted;
        self.examples_written += other.examples_written;
        self.relations_written += other.relations_written;
    }
}

/// A synset key seen in one batch: the first record wins, members are merged.
struct MergedSynset<'a> {
    record: &'a SenseRecord,
    members: Vec<&'a str>,
}

fn merge_records(records: &[SenseRecord]) -> Vec<MergedSynset<'_>> {
    let mut merged: Vec<MergedSynset<'_>> = Vec::with_capacity(records.len());
    let mut by_key: HashMap<(&str, PartOfSpeech), usize> = HashMap::new();

    for record in records {
        match by_key.entry((record.offset.as_str(), record.pos)) {
            Entry::Occupied(slot) => {
                let target = &mut merged[*slot.get()];
                for lemma in &record.lemmas {
                    if !target.members.contains(&lemma.as_str()) {
                        target.members.push(lemma);
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(MergedSynset {
                    record,
                    members: record.lemmas.iter().map(String::as_str).collect(),
                });
            }
        }
    }
    merged
}

/// Writes one batch of parsed records in a single transaction.
///
/// Words and synsets are inserted with conflict-skip, so an existing synset
/// keeps its stored definition. Examples and relations of every synset in the
/// batch are replaced. Any error rolls back the whole batch.
pub fn persist_batch(conn: &mut Connection, records: &[SenseRecord]) -> Result<FlushStats> {
    let mut stats = FlushStats {
        records: records.len() as u64,
        ..FlushStats::default()
    };
    if records.is_empty() {
        return Ok(stats);
    }

    let merged = merge_records(records);
    let tx = conn.transaction()?;
    {
        let mut insert_word = tx.prepare(
            "INSERT INTO words (lemma, pos) VALUES (?1, ?2)
             ON CONFLICT(lemma, pos) DO NOTHING",
        )?;
        let mut select_word = tx.prepare("SELECT id FROM words WHERE lemma = ?1 AND pos = ?2")?;
        let mut insert_synset = tx.prepare(
            "INSERT INTO synsets (\"offset\", pos, definition) VALUES (?1, ?2, ?3)
             ON CONFLICT(\"offset\", pos) DO NOTHING",
        )?;
        let mut select_synset =
            tx.prepare("SELECT id FROM synsets WHERE \"offset\" = ?1 AND pos = ?2")?;
        let mut insert_link = tx.prepare(
            "INSERT INTO word_synsets (word_id, synset_id) VALUES (?1, ?2)
             ON CONFLICT(word_id, synset_id) DO NOTHING",
        )?;
        let mut delete_examples = tx.prepare("DELETE FROM examples WHERE synset_id = ?1")?;
        let mut delete_relations = tx.prepare("DELETE FROM relations WHERE synset_id = ?1")?;
        let mut insert_example =
            tx.prepare("INSERT INTO examples (synset_id, text) VALUES (?1, ?2)")?;
        let mut insert_relation = tx.prepare(
            "INSERT INTO relations (synset_id, relation_type, target_offset) VALUES (?1, ?2, ?3)",
        )?;

        let mut word_ids: HashMap<(&str, PartOfSpeech), i64> = HashMap::new();
        for synset in &merged {
            for &lemma in &synset.members {
                let key = (lemma, synset.record.pos);
                if word_ids.contains_key(&key) {
                    continue;
                }
                stats.words_inserted += insert_word.execute(params![lemma, synset.record.pos])? as u64;
                let id: i64 =
                    select_word.query_row(params![lemma, synset.record.pos], |row| row.get(0))?;
                word_ids.insert(key, id);
            }
        }

        for synset in &merged {
            let record = synset.record;
            stats.synsets_inserted += insert_synset.execute(params![
                record.offset,
                record.pos,
                record.definition
            ])? as u64;
            let synset_id: i64 =
                select_synset.query_row(params![record.offset, record.pos], |row| row.get(0))?;

            for &lemma in &synset.members {
                let word_id = word_ids.get(&(lemma, record.pos)).copied().ok_or_else(|| {
                    WnError::Internal(format!("Word id missing for '{}'", lemma))
                })?;
                stats.links_inserted += insert_link.execute(params![word_id, synset_id])? as u64;
            }

            delete_examples.execute(params![synset_id])?;
            delete_relations.execute(params![synset_id])?;

            for example in &record.examples {
                insert_example.execute(params![synset_id, example])?;
                stats.examples_written += 1;
            }
            for (relation, targets) in &record.relations {
                for target in targets {
                    insert_relation.execute(params![synset_id, relation.as_str(), target])?;
                    stats.relations_written += 1;
                }
            }
        }
    }
    tx.commit()?;

    debug!(
        "Flushed {} records ({} synsets, {} new words, {} new links)",
        stats.records,
        merged.len(),
        stats.words_inserted,
        stats.links_inserted
    );
    Ok(stats)
}

/// Inserts index lemmas as words, skipping existing `(lemma, pos)` pairs.
/// Returns the number of new rows.
pub fn insert_words(conn: &mut Connection, entries: &[IndexEntry]) -> Result<u64> {
    let tx = conn.transaction()?;
    let mut inserted = 0u64;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO words (lemma, pos) VALUES (?1, ?2)
             ON CONFLICT(lemma, pos) DO NOTHING",
        )?;
        for entry in entries {
            inserted += stmt.execute(params![entry.lemma, entry.pos])? as u64;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

// --- Maintenance ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub words: u64,
    pub synsets: u64,
    pub word_synsets: u64,
    pub examples: u64,
    pub relations: u64,
}

pub fn table_counts(conn: &Connection) -> Result<RowCounts> {
    let count = |table: &str| -> Result<u64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    };
    Ok(RowCounts {
        words: count("words")?,
        synsets: count("synsets")?,
        word_synsets: count("word_synsets")?,
        examples: count("examples")?,
        relations: count("relations")?,
    })
}

fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Deletes a database file together with its `-wal` and `-shm` companions.
///
/// Returns `false` when there was no database file to delete.
pub fn remove_database_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        info!("Database file not found, nothing to clear: {:?}", path);
        return Ok(false);
    }
    fs::remove_file(path)?;
    info!("Deleted database file: {:?}", path);
    for suffix in ["-wal", "-shm"] {
        let companion = companion_path(path, suffix);
        if companion.exists() {
            if let Err(e) = fs::remove_file(&companion) {
                warn!("Failed to delete {:?}: {}", companion, e);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationType;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(offset: &str, pos: PartOfSpeech, lemmas: &[&str], definition: &str) -> SenseRecord {
        SenseRecord {
            offset: offset.to_string(),
            pos,
            definition: definition.to_string(),
            examples: Vec::new(),
            lemmas: lemmas.iter().map(|l| l.to_string()).collect(),
            relations: BTreeMap::new(),
        }
    }

    fn examples_of(conn: &Connection, offset: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT e.text FROM examples e JOIN synsets s ON s.id = e.synset_id
                 WHERE s.\"offset\" = ?1 ORDER BY e.id",
            )
            .unwrap();
        stmt.query_map(params![offset], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn schema_version_is_recorded_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_database(&mut conn).unwrap();
        initialize_database(&mut conn).unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn duplicate_synsets_in_one_batch_merge_membership() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_database(&mut conn).unwrap();

        let mut first = record("00001740", PartOfSpeech::N, &["entity"], "first");
        first.examples = vec!["kept".to_string()];
        let mut second = record("00001740", PartOfSpeech::N, &["entity", "thing"], "second");
        second.examples = vec!["dropped".to_string()];

        let stats = persist_batch(&mut conn, &[first, second]).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.synsets_inserted, 1);
        assert_eq!(stats.words_inserted, 2);
        assert_eq!(stats.links_inserted, 2);

        let definition: String = conn
            .query_row("SELECT definition FROM synsets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(definition, "first");
        assert_eq!(examples_of(&conn, "00001740"), vec!["kept"]);
    }

    #[test]
    fn re_persist_replaces_examples_and_relations_only() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_database(&mut conn).unwrap();

        let mut first_import = record("01148283", PartOfSpeech::A, &["happy"], "enjoying joy");
        first_import.examples = vec!["a happy smile".to_string(), "happy days".to_string()];
        first_import
            .relations
            .insert(RelationType::Antonym, vec!["01149494".to_string()]);
        persist_batch(&mut conn, &[first_import]).unwrap();

        let mut changed = record("01148283", PartOfSpeech::A, &["happy"], "rewritten gloss");
        changed.examples = vec!["only one now".to_string()];
        let stats = persist_batch(&mut conn, &[changed]).unwrap();
        assert_eq!(stats.synsets_inserted, 0);
        assert_eq!(stats.words_inserted, 0);
        assert_eq!(stats.links_inserted, 0);

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.synsets, 1);
        assert_eq!(counts.words, 1);
        assert_eq!(counts.word_synsets, 1);
        assert_eq!(counts.relations, 0);
        assert_eq!(examples_of(&conn, "01148283"), vec!["only one now"]);

        let definition: String = conn
            .query_row("SELECT definition FROM synsets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(definition, "enjoying joy");
    }

    #[test]
    fn same_offset_different_pos_are_distinct_synsets() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_database(&mut conn).unwrap();
        persist_batch(
            &mut conn,
            &[
                record("02000000", PartOfSpeech::N, &["run"], "a noun"),
                record("02000000", PartOfSpeech::V, &["run"], "a verb"),
            ],
        )
        .unwrap();
        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.synsets, 2);
        assert_eq!(counts.words, 2);
    }

    #[test]
    fn insert_words_skips_existing() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_database(&mut conn).unwrap();
        let entry = IndexEntry {
            lemma: "dog".to_string(),
            pos: PartOfSpeech::N,
        };
        assert_eq!(insert_words(&mut conn, &[entry.clone()]).unwrap(), 1);
        assert_eq!(insert_words(&mut conn, &[entry]).unwrap(), 0);
    }

    #[test]
    fn remove_database_file_removes_companions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wordnet.sqlite");
        std::fs::write(&path, b"").unwrap();
        std::fs::write(dir.path().join("wordnet.sqlite-wal"), b"").unwrap();
        std::fs::write(dir.path().join("wordnet.sqlite-shm"), b"").unwrap();

        assert!(remove_database_file(&path).unwrap());
        assert!(!path.exists());
        assert!(!dir.path().join("wordnet.sqlite-wal").exists());
        assert!(!dir.path().join("wordnet.sqlite-shm").exists());
        assert!(!remove_database_file(&path).unwrap());
    }

    #[tokio::test]
    async fn store_runs_closures_on_the_connection() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("nested").join("db.sqlite")).unwrap();
        let batch = vec![record("00000002", PartOfSpeech::V, &["walk"], "move on foot")];
        let stats = store
            .call(move |conn| persist_batch(conn, &batch))
            .await
            .unwrap();
        assert_eq!(stats.synsets_inserted, 1);
        let counts = store.call(|conn| table_counts(conn)).await.unwrap();
        assert_eq!(counts.word_synsets, 1);
        assert!(store.path().is_some());
    }
}
