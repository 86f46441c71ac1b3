//! Read-only lemma lookups over the store.

use crate::db::Store;
use crate::error::{Result, WnError};
use crate::models::{AntonymEntry, LemmaEntry, PartOfSpeech, RelatedEntry, SynonymEntry};
use crate::parse::normalize_lemma;
use crate::relations::RelationType;
use log::debug;
use rusqlite::{Connection, params, params_from_iter};
use std::collections::HashMap;

// Stays well below SQLite's bound parameter limit.
const IN_LIST_CHUNK: usize = 500;

#[derive(Debug, Clone)]
struct SynsetRow {
    id: i64,
    offset: String,
    pos: PartOfSpeech,
    definition: String,
}

/// Lemma-centric queries.
///
/// Every lookup normalizes its input the same way the importer does, so
/// `"Ice_Cream"` and `"ice cream"` are the same key. Lookups do not run inside
/// a read transaction: while an import is committing, one call may see
/// synsets from the newest batch next to older state.
#[derive(Clone)]
pub struct QueryService {
    store: Store,
}

impl QueryService {
    pub fn new(store: Store) -> Self {
        QueryService { store }
    }

    /// Synsets containing `lemma`, ordered by part of speech then offset.
    async fn synsets_for(&self, lemma: &str) -> Result<(String, Vec<SynsetRow>)> {
        let normalized = normalize_lemma(lemma)
            .ok_or_else(|| WnError::InvalidArgument("lemma must not be empty".to_string()))?;
        let key = normalized.clone();
        let synsets = self
            .store
            .call(move |conn| fetch_synsets(conn, &key))
            .await?;
        debug!("{} synsets for '{}'", synsets.len(), normalized);
        if synsets.is_empty() {
            return Err(WnError::LemmaNotFound(normalized));
        }
        Ok((normalized, synsets))
    }

    async fn examples(&self, ids: Vec<i64>) -> Result<HashMap<i64, Vec<String>>> {
        self.store
            .call(move |conn| fetch_examples(conn, &ids))
            .await
    }

    async fn synonyms(&self, ids: Vec<i64>, lemma: String) -> Result<HashMap<i64, Vec<String>>> {
        self.store
            .call(move |conn| fetch_members(conn, &ids, Some(lemma.as_str())))
            .await
    }

    async fn related(
        &self,
        ids: Vec<i64>,
        relation: RelationType,
    ) -> Result<HashMap<i64, Vec<String>>> {
        self.store
            .call(move |conn| fetch_related_lemmas(conn, &ids, relation))
            .await
    }

    /// Full entries for every synset of `lemma`.
    pub async fn definitions_for(&self, lemma: &str) -> Result<Vec<LemmaEntry>> {
        let (lemma, synsets) = self.synsets_for(lemma).await?;
        let ids: Vec<i64> = synsets.iter().map(|s| s.id).collect();

        let (mut examples, mut synonyms, mut antonyms) = tokio::try_join!(
            self.examples(ids.clone()),
            self.synonyms(ids.clone(), lemma),
            self.related(ids, RelationType::Antonym),
        )?;

        Ok(synsets
            .into_iter()
            .map(|s| LemmaEntry {
                examples: examples.remove(&s.id).unwrap_or_default(),
                synonyms: synonyms.remove(&s.id).unwrap_or_default(),
                antonyms: antonyms.remove(&s.id).unwrap_or_default(),
                offset: s.offset,
                pos: s.pos,
                definition: s.definition,
            })
            .collect())
    }

    pub async fn synonyms_for(&self, lemma: &str) -> Result<Vec<SynonymEntry>> {
        let (lemma, synsets) = self.synsets_for(lemma).await?;
        let ids = synsets.iter().map(|s| s.id).collect();
        let mut synonyms = self.synonyms(ids, lemma).await?;
        Ok(synsets
            .into_iter()
            .map(|s| SynonymEntry {
                synonyms: synonyms.remove(&s.id).unwrap_or_default(),
                offset: s.offset,
                pos: s.pos,
            })
            .collect())
    }

    pub async fn antonyms_for(&self, lemma: &str) -> Result<Vec<AntonymEntry>> {
        Ok(self
            .related_for(lemma, RelationType::Antonym)
            .await?
            .into_iter()
            .map(|entry| AntonymEntry {
                offset: entry.offset,
                pos: entry.pos,
                antonyms: entry.lemmas,
            })
            .collect())
    }

    /// Distinct parts of speech of `lemma`, in entry order.
    pub async fn parts_of_speech_for(&self, lemma: &str) -> Result<Vec<PartOfSpeech>> {
        let (_, synsets) = self.synsets_for(lemma).await?;
        let mut parts: Vec<PartOfSpeech> = Vec::new();
        for synset in synsets {
            if !parts.contains(&synset.pos) {
                parts.push(synset.pos);
            }
        }
        Ok(parts)
    }

    /// Lemmas reached from each synset of `lemma` through `relation`.
    ///
    /// Relation targets are stored by offset only, so a target offset shared
    /// by synsets of different parts of speech contributes the members of all
    /// of them.
    pub async fn related_for(&self, lemma: &str, relation: RelationType) -> Result<Vec<RelatedEntry>> {
        let (_, synsets) = self.synsets_for(lemma).await?;
        let ids = synsets.iter().map(|s| s.id).collect();
        let mut related = self.related(ids, relation).await?;
        Ok(synsets
            .into_iter()
            .map(|s| RelatedEntry {
                lemmas: related.remove(&s.id).unwrap_or_default(),
                offset: s.offset,
                pos: s.pos,
            })
            .collect())
    }
}

// --- SQL helpers, run on the blocking pool ---

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn fetch_synsets(conn: &Connection, lemma: &str) -> Result<Vec<SynsetRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.id, s.\"offset\", s.pos, s.definition
         FROM synsets s
         JOIN word_synsets ws ON ws.synset_id = s.id
         JOIN words w ON w.id = ws.word_id
         WHERE w.lemma = ?1
         ORDER BY s.pos, s.\"offset\"",
    )?;
    let rows = stmt.query_map(params![lemma], |row| {
        Ok(SynsetRow {
            id: row.get(0)?,
            offset: row.get(1)?,
            pos: row.get(2)?,
            definition: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn fetch_examples(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut out: HashMap<i64, Vec<String>> = HashMap::new();
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let sql = format!(
            "SELECT synset_id, text FROM examples WHERE synset_id IN ({}) ORDER BY id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, text) = row?;
            out.entry(id).or_default().push(text);
        }
    }
    Ok(out)
}

/// Member lemmas per synset in membership order, optionally leaving one out.
fn fetch_members(
    conn: &Connection,
    ids: &[i64],
    exclude: Option<&str>,
) -> Result<HashMap<i64, Vec<String>>> {
    let mut out: HashMap<i64, Vec<String>> = HashMap::new();
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let sql = format!(
            "SELECT ws.synset_id, w.lemma
             FROM word_synsets ws
             JOIN words w ON w.id = ws.word_id
             WHERE ws.synset_id IN ({})
             ORDER BY ws.id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, lemma) = row?;
            if Some(lemma.as_str()) == exclude {
                continue;
            }
            push_unique(out.entry(id).or_default(), lemma);
        }
    }
    Ok(out)
}

/// Target offsets of `relation` per source synset, in stored order.
fn fetch_relation_targets(
    conn: &Connection,
    ids: &[i64],
    relation: RelationType,
) -> Result<HashMap<i64, Vec<String>>> {
    let mut out: HashMap<i64, Vec<String>> = HashMap::new();
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let sql = format!(
            "SELECT synset_id, target_offset FROM relations
             WHERE relation_type = ? AND synset_id IN ({})
             ORDER BY id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let bound = std::iter::once(rusqlite::types::Value::from(relation.as_str().to_string()))
            .chain(chunk.iter().map(|id| rusqlite::types::Value::from(*id)));
        let rows = stmt.query_map(params_from_iter(bound), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, target) = row?;
            push_unique(out.entry(id).or_default(), target);
        }
    }
    Ok(out)
}

/// Member lemmas of every synset with one of `offsets`, any part of speech.
fn fetch_lemmas_by_offset(
    conn: &Connection,
    offsets: &[String],
) -> Result<HashMap<String, Vec<String>>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for chunk in offsets.chunks(IN_LIST_CHUNK) {
        let sql = format!(
            "SELECT s.\"offset\", w.lemma
             FROM synsets s
             JOIN word_synsets ws ON ws.synset_id = s.id
             JOIN words w ON w.id = ws.word_id
             WHERE s.\"offset\" IN ({})
             ORDER BY s.pos, ws.id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (offset, lemma) = row?;
            push_unique(out.entry(offset).or_default(), lemma);
        }
    }
    Ok(out)
}

fn fetch_related_lemmas(
    conn: &Connection,
    ids: &[i64],
    relation: RelationType,
) -> Result<HashMap<i64, Vec<String>>> {
    let targets = fetch_relation_targets(conn, ids, relation)?;

    let mut offsets: Vec<String> = Vec::new();
    for target in targets.values().flatten() {
        push_unique(&mut offsets, target.clone());
    }
    let lemmas_by_offset = fetch_lemmas_by_offset(conn, &offsets)?;

    let mut out = HashMap::with_capacity(targets.len());
    for (id, target_offsets) in targets {
        let mut lemmas = Vec::new();
        for offset in &target_offsets {
            for lemma in lemmas_by_offset.get(offset).into_iter().flatten() {
                push_unique(&mut lemmas, lemma.clone());
            }
        }
        out.insert(id, lemmas);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::persist_batch;
    use crate::ingest::fixtures::write_dictionary;
    use crate::ingest::{ImportOptions, Importer, SynsetImporter};
    use crate::models::SenseRecord;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    async fn imported_service() -> QueryService {
        let dir = tempdir().unwrap();
        write_dictionary(dir.path());
        let store = Store::open_in_memory().unwrap();
        SynsetImporter::new(store.clone(), dir.path(), ImportOptions::default())
            .run()
            .await
            .unwrap();
        QueryService::new(store)
    }

    fn record(offset: &str, pos: PartOfSpeech, lemma: &str, antonym: Option<&str>) -> SenseRecord {
        let mut relations = BTreeMap::new();
        if let Some(target) = antonym {
            relations.insert(RelationType::Antonym, vec![target.to_string()]);
        }
        SenseRecord {
            offset: offset.to_string(),
            pos,
            definition: format!("{} gloss", lemma),
            examples: Vec::new(),
            lemmas: vec![lemma.to_string()],
            relations,
        }
    }

    #[tokio::test]
    async fn defines_happy() {
        let service = imported_service().await;
        let entries = service.definitions_for("happy").await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.offset, "01148283");
        assert_eq!(entry.pos, PartOfSpeech::A);
        assert_eq!(entry.definition, "enjoying or showing or marked by joy or pleasure; ;");
        assert_eq!(
            entry.examples,
            vec!["a happy smile", "spent many happy days on the beach"]
        );
        assert!(entry.synonyms.is_empty());
        assert_eq!(entry.antonyms, vec!["unhappy"]);
    }

    #[tokio::test]
    async fn antonyms_follow_pointer_direction() {
        let service = imported_service().await;
        let unhappy = service.antonyms_for("unhappy").await.unwrap();
        assert_eq!(unhappy[0].antonyms, vec!["happy"]);

        let light = service.antonyms_for("light").await.unwrap();
        assert_eq!(light[0].antonyms, vec!["dark"]);
        let dark = service.antonyms_for("dark").await.unwrap();
        assert_eq!(dark[0].antonyms, vec!["light"]);
    }

    #[tokio::test]
    async fn one_way_antonym_pointer_is_not_mirrored() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            record("00000100", PartOfSpeech::A, "happy", Some("00000200")),
            record("00000200", PartOfSpeech::A, "sad", None),
        ];
        store
            .call(move |conn| persist_batch(conn, &batch))
            .await
            .unwrap();
        let service = QueryService::new(store);

        let happy = service.antonyms_for("happy").await.unwrap();
        assert_eq!(happy.len(), 1);
        assert_eq!(happy[0].antonyms, vec!["sad"]);

        let sad = service.antonyms_for("sad").await.unwrap();
        assert_eq!(sad.len(), 1);
        assert_eq!(sad[0].offset, "00000200");
        assert!(sad[0].antonyms.is_empty());
    }

    #[tokio::test]
    async fn lookups_fold_case_and_underscores() {
        let service = imported_service().await;
        let lower = service.synonyms_for("glad").await.unwrap();
        let mixed = service.synonyms_for("  Glad ").await.unwrap();
        assert_eq!(lower, mixed);
        assert_eq!(lower[0].pos, PartOfSpeech::S);
        assert_eq!(lower[0].synonyms, vec!["felicitous"]);
    }

    #[tokio::test]
    async fn found_lemma_with_nothing_related_gets_empty_lists() {
        let service = imported_service().await;
        let entries = service.definitions_for("happiness").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].examples.is_empty());
        assert!(entries[0].antonyms.is_empty());
        assert_eq!(entries[0].synonyms, vec!["felicity"]);
    }

    #[tokio::test]
    async fn unknown_and_blank_lemmas() {
        let service = imported_service().await;
        match service.definitions_for("Quark").await {
            Err(WnError::LemmaNotFound(lemma)) => assert_eq!(lemma, "quark"),
            other => panic!("expected not found, got {:?}", other.map(|e| e.len())),
        }
        assert!(matches!(
            service.parts_of_speech_for("   ").await,
            Err(WnError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn parts_of_speech_and_hypernyms() {
        let service = imported_service().await;
        assert_eq!(
            service.parts_of_speech_for("travel").await.unwrap(),
            vec![PartOfSpeech::V]
        );
        let hypernyms = service
            .related_for("go", RelationType::Hypernym)
            .await
            .unwrap();
        assert_eq!(hypernyms[0].lemmas, vec!["move"]);
    }

    #[tokio::test]
    async fn antonym_offset_shared_across_parts_of_speech_yields_union() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            record("00000100", PartOfSpeech::N, "alpha", Some("00000200")),
            record("00000200", PartOfSpeech::N, "beta", None),
            record("00000200", PartOfSpeech::V, "gamma", None),
        ];
        store
            .call(move |conn| persist_batch(conn, &batch))
            .await
            .unwrap();
        let service = QueryService::new(store);

        let antonyms = service.antonyms_for("alpha").await.unwrap();
        assert_eq!(antonyms.len(), 1);
        assert_eq!(antonyms[0].antonyms, vec!["beta", "gamma"]);
    }

    #[tokio::test]
    async fn entries_are_ordered_by_pos_then_offset() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![
            record("00000300", PartOfSpeech::V, "run", None),
            record("00000200", PartOfSpeech::N, "run", None),
            record("00000100", PartOfSpeech::N, "run", None),
        ];
        store
            .call(move |conn| persist_batch(conn, &batch))
            .await
            .unwrap();
        let service = QueryService::new(store);

        let entries = service.definitions_for("run").await.unwrap();
        let keys: Vec<(PartOfSpeech, &str)> =
            entries.iter().map(|e| (e.pos, e.offset.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (PartOfSpeech::N, "00000100"),
                (PartOfSpeech::N, "00000200"),
                (PartOfSpeech::V, "00000300"),
            ]
        );
        assert_eq!(
            service.parts_of_speech_for("run").await.unwrap(),
            vec![PartOfSpeech::N, PartOfSpeech::V]
        );
    }
}
