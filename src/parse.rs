//! Parsers for WNDB `data.*` and `index.*` lines.

use crate::models::{IndexEntry, PartOfSpeech, SenseRecord};
use crate::relations::RelationType;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted-substring pattern is valid"));

/// Reasons a source line produced no record. None of these abort an import.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseSkip {
    #[error("license header line")]
    Header,

    #[error("blank line")]
    Blank,

    #[error("missing or non-numeric offset: {0:?}")]
    MissingOffset(String),

    #[error("unknown part of speech: {0:?}")]
    UnknownPos(String),

    #[error("malformed line: {0}")]
    Malformed(String),
}

impl ParseSkip {
    /// Header and blank lines are expected in every file and are not worth reporting.
    pub fn is_noise(&self) -> bool {
        matches!(self, ParseSkip::Header | ParseSkip::Blank)
    }
}

/// Normalizes a lemma for storage and lookup.
///
/// Drops a `%<sense-id>` suffix, lowercases, turns underscores into spaces and
/// trims. Returns `None` when nothing is left.
pub fn normalize_lemma(raw: &str) -> Option<String> {
    let base = raw.split('%').next().unwrap_or_default();
    let normalized = base.to_lowercase().replace('_', " ");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

/// Splits a gloss into its definition and quoted example sentences.
pub fn split_gloss(gloss: &str) -> (String, Vec<String>) {
    let examples = QUOTED
        .captures_iter(gloss)
        .map(|caps| caps[1].trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();
    let definition = QUOTED.replace_all(gloss, "").trim().to_string();
    (definition, examples)
}

fn is_offset(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

// Adjectives may carry a syntactic marker glued to the lemma, e.g. `glad(p)`.
fn strip_syntactic_marker(token: &str) -> &str {
    ["(a)", "(p)", "(ip)"]
        .iter()
        .find_map(|marker| token.strip_suffix(marker))
        .unwrap_or(token)
}

fn check_line(line: &str) -> Result<(), ParseSkip> {
    if line.trim().is_empty() {
        return Err(ParseSkip::Blank);
    }
    if line.starts_with(' ') {
        return Err(ParseSkip::Header);
    }
    Ok(())
}

/// Parses one line of a `data.*` file.
///
/// ```text
/// offset lex_filenum pos w_cnt(hex) {lemma lex_id}×w_cnt p_cnt {sym offset pos src/tgt}×p_cnt [frames] | gloss
/// ```
pub fn parse_data_line(line: &str) -> Result<SenseRecord, ParseSkip> {
    check_line(line)?;

    let (head, gloss) = match line.split_once('|') {
        Some((head, gloss)) => (head, gloss.trim()),
        None => (line, ""),
    };
    let tokens: Vec<&str> = head.split_whitespace().collect();

    let offset = tokens
        .first()
        .copied()
        .filter(|t| is_offset(t))
        .ok_or_else(|| ParseSkip::MissingOffset(tokens.first().copied().unwrap_or_default().to_string()))?;

    if !tokens.get(1).is_some_and(|t| t.parse::<u8>().is_ok()) {
        return Err(ParseSkip::Malformed(format!(
            "bad lex_filenum after offset {}",
            offset
        )));
    }

    let pos_token = tokens.get(2).copied().unwrap_or_default();
    let pos =
        PartOfSpeech::from_symbol(pos_token).ok_or_else(|| ParseSkip::UnknownPos(pos_token.to_string()))?;

    let word_count = tokens
        .get(3)
        .and_then(|t| usize::from_str_radix(t, 16).ok())
        .ok_or_else(|| ParseSkip::Malformed(format!("bad word count in synset {}", offset)))?;

    let words_end = word_count
        .checked_mul(2)
        .and_then(|n| n.checked_add(4))
        .ok_or_else(|| ParseSkip::Malformed(format!("word count overflow in synset {}", offset)))?;
    if tokens.len() <= words_end {
        return Err(ParseSkip::Malformed(format!(
            "word list of synset {} is truncated",
            offset
        )));
    }

    let mut lemmas: Vec<String> = Vec::with_capacity(word_count);
    for raw in tokens[4..words_end].iter().step_by(2) {
        if let Some(lemma) = normalize_lemma(strip_syntactic_marker(raw)) {
            if !lemmas.contains(&lemma) {
                lemmas.push(lemma);
            }
        }
    }

    let pointer_count = tokens[words_end]
        .parse::<usize>()
        .map_err(|_| ParseSkip::Malformed(format!("bad pointer count in synset {}", offset)))?;
    let pointers_start = words_end + 1;
    let pointers_end = pointer_count
        .checked_mul(4)
        .and_then(|n| n.checked_add(pointers_start))
        .ok_or_else(|| ParseSkip::Malformed(format!("pointer count overflow in synset {}", offset)))?;
    if tokens.len() < pointers_end {
        return Err(ParseSkip::Malformed(format!(
            "pointer list of synset {} is truncated",
            offset
        )));
    }

    let mut relations: BTreeMap<RelationType, Vec<String>> = BTreeMap::new();
    for pointer in tokens[pointers_start..pointers_end].chunks_exact(4) {
        let (symbol, target) = (pointer[0], pointer[1]);
        if !is_offset(target) {
            return Err(ParseSkip::Malformed(format!(
                "bad pointer target {:?} in synset {}",
                target, offset
            )));
        }
        let Some(rel) = RelationType::from_symbol(symbol) else {
            continue;
        };
        let targets = relations.entry(rel).or_default();
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }

    let (definition, examples) = split_gloss(gloss);

    Ok(SenseRecord {
        offset: offset.to_string(),
        pos,
        definition,
        examples,
        lemmas,
        relations,
    })
}

/// Parses one line of an `index.*` file.
///
/// ```text
/// lemma pos synset_cnt p_cnt {ptr_symbol}×p_cnt sense_cnt tagsense_cnt {synset_offset}×synset_cnt
/// ```
pub fn parse_index_line(line: &str) -> Result<IndexEntry, ParseSkip> {
    check_line(line)?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let raw_lemma = tokens.first().copied().unwrap_or_default();
    let lemma = normalize_lemma(raw_lemma)
        .ok_or_else(|| ParseSkip::Malformed(format!("bad lemma {:?}", raw_lemma)))?;

    let pos_token = tokens.get(1).copied().unwrap_or_default();
    let pos =
        PartOfSpeech::from_symbol(pos_token).ok_or_else(|| ParseSkip::UnknownPos(pos_token.to_string()))?;

    let count = |idx: usize, what: &str| {
        tokens
            .get(idx)
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| ParseSkip::Malformed(format!("bad {} for lemma {:?}", what, lemma)))
    };
    let synset_count = count(2, "synset count")?;
    let pointer_count = count(3, "pointer count")?;
    let truncated = || ParseSkip::Malformed(format!("offset list of lemma {:?} is truncated", lemma));
    let pointers_end = pointer_count.checked_add(4).ok_or_else(truncated)?;
    // sense_cnt sits between the pointer symbols and tagsense_cnt
    let offsets_start = pointers_end.checked_add(2).ok_or_else(truncated)?;
    count(offsets_start - 1, "tagged sense count")?;
    let offsets_end = offsets_start.checked_add(synset_count).ok_or_else(truncated)?;
    let offsets = tokens.get(offsets_start..offsets_end).ok_or_else(truncated)?;
    if let Some(bad) = offsets.iter().find(|t| !is_offset(t)) {
        return Err(ParseSkip::MissingOffset(bad.to_string()));
    }

    Ok(IndexEntry { lemma, pos })
}
