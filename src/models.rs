use crate::relations::RelationType;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Part of Speech ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfSpeech {
    N, // Noun
    V, // Verb
    A, // Adjective
    S, // Adjective Satellite
    R, // Adverb
}

impl PartOfSpeech {
    /// Order in which data files are imported.
    pub const IMPORT_ORDER: [PartOfSpeech; 4] =
        [PartOfSpeech::N, PartOfSpeech::V, PartOfSpeech::A, PartOfSpeech::R];

    /// Parses the single-letter `ss_type` / `pos` field of a WNDB line.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "n" => Some(PartOfSpeech::N),
            "v" => Some(PartOfSpeech::V),
            "a" => Some(PartOfSpeech::A),
            "s" => Some(PartOfSpeech::S),
            "r" => Some(PartOfSpeech::R),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartOfSpeech::N => "n",
            PartOfSpeech::V => "v",
            PartOfSpeech::A => "a",
            PartOfSpeech::S => "s",
            PartOfSpeech::R => "r",
        }
    }

    /// File name suffix shared by `index.*` and `data.*`. Satellites live in the adjective files.
    pub fn file_suffix(self) -> &'static str {
        match self {
            PartOfSpeech::N => "noun",
            PartOfSpeech::V => "verb",
            PartOfSpeech::A | PartOfSpeech::S => "adj",
            PartOfSpeech::R => "adv",
        }
    }

    pub fn data_file(self) -> String {
        format!("data.{}", self.file_suffix())
    }

    pub fn index_file(self) -> String {
        format!("index.{}", self.file_suffix())
    }
}

// Implement Display for PartOfSpeech for easier printing
impl std::fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PartOfSpeech::N => "noun",
                PartOfSpeech::V => "verb",
                PartOfSpeech::A => "adjective",
                PartOfSpeech::S => "adjective satellite",
                PartOfSpeech::R => "adverb",
            }
        )
    }
}

impl ToSql for PartOfSpeech {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PartOfSpeech {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        PartOfSpeech::from_symbol(text).ok_or_else(|| {
            FromSqlError::Other(format!("Invalid PartOfSpeech string in DB: {}", text).into())
        })
    }
}

// --- Parsed source records ---

/// One synset as read from a `data.*` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenseRecord {
    /// Byte offset of the line in its data file, kept verbatim.
    pub offset: String,
    pub pos: PartOfSpeech,
    pub definition: String,
    pub examples: Vec<String>,
    /// Normalized member lemmas, in file order, without duplicates.
    pub lemmas: Vec<String>,
    /// Target offsets per relation type, in pointer order, without duplicates.
    pub relations: BTreeMap<RelationType, Vec<String>>,
}

/// One lemma as read from an `index.*` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub lemma: String,
    pub pos: PartOfSpeech,
}

// --- Query payloads ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemmaEntry {
    pub offset: String,
    pub pos: PartOfSpeech,
    pub definition: String,
    pub examples: Vec<String>,
    pub synonyms: Vec<String>,
    pub antonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub offset: String,
    pub pos: PartOfSpeech,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntonymEntry {
    pub offset: String,
    pub pos: PartOfSpeech,
    pub antonyms: Vec<String>,
}

/// Lemmas reached from one synset through a single relation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntry {
    pub offset: String,
    pub pos: PartOfSpeech,
    pub lemmas: Vec<String>,
}
