use std::{collections::HashSet, fs, ops::Range, path::Path, sync::Arc};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::DictionaryError;

/// Medical term with its lay replacement and explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Canonical term, matched case-insensitively as a whole word.
    pub term: String,
    /// Short lay replacement.
    #[serde(rename = "plain")]
    pub plain_synonym: String,
    /// Ordered explanation sentences.
    #[serde(rename = "explanation")]
    pub explanation_lines: Vec<String>,
}

impl DictionaryEntry {
    /// Creates an entry.
    pub fn new<I, S>(term: impl Into<String>, plain_synonym: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            term: term.into(),
            plain_synonym: plain_synonym.into(),
            explanation_lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// A dictionary entry found in a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermMatch<'a> {
    /// Matched entry.
    pub entry: &'a DictionaryEntry,
    /// Byte offset of the first occurrence.
    pub first_position: usize,
    /// Number of whole-word occurrences.
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    entry: DictionaryEntry,
    pattern: Regex,
}

/// Ordered, immutable term dictionary.
///
/// Entries are scanned in declaration order; that order breaks ties when two terms
/// start at the same position.
#[derive(Debug, Clone)]
pub struct TermDictionary {
    entries: Vec<CompiledEntry>,
}

static BUILTIN: Lazy<Arc<TermDictionary>> = Lazy::new(|| {
    let dictionary = TermDictionary::new(builtin_entries()).unwrap_or_else(|err| {
        error!(error = %err, "built-in dictionary rejected, local rewrites disabled");
        TermDictionary {
            entries: Vec::new(),
        }
    });
    Arc::new(dictionary)
});

impl TermDictionary {
    /// Validates and compiles the entries.
    pub fn new(entries: Vec<DictionaryEntry>) -> Result<Self, DictionaryError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let key = normalize_term(&entry.term);
            if key.is_empty() {
                return Err(DictionaryError::EmptyTerm { index });
            }
            if entry.plain_synonym.trim().is_empty() {
                return Err(DictionaryError::EmptySynonym { term: entry.term });
            }
            if entry.explanation_lines.iter().all(|line| line.trim().is_empty()) {
                return Err(DictionaryError::EmptyExplanation { term: entry.term });
            }
            if !has_word_edges(&key) {
                return Err(DictionaryError::NonWordEdge { term: entry.term });
            }
            if !seen.insert(key.clone()) {
                return Err(DictionaryError::DuplicateTerm { term: entry.term });
            }
            let pattern = term_pattern(&entry.term).map_err(|source| DictionaryError::Pattern {
                term: entry.term.clone(),
                source,
            })?;
            // Nested terms would be explained without ever being substituted.
            if let Some(other) = compiled.iter().find(|prior: &&CompiledEntry| {
                pattern.is_match(&normalize_term(&prior.entry.term))
                    || prior.pattern.is_match(&key)
            }) {
                return Err(DictionaryError::OverlappingTerms {
                    term: entry.term,
                    other: other.entry.term.clone(),
                });
            }
            compiled.push(CompiledEntry { entry, pattern });
        }
        Ok(Self { entries: compiled })
    }

    /// Shared built-in glossary.
    #[must_use]
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    /// Parses `[[term]]` tables from TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let document: DictionaryDocument = toml::from_str(raw).context("parsing dictionary")?;
        Ok(Self::new(document.terms)?)
    }

    /// Loads a dictionary file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading dictionary {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    /// Entries in scan order.
    pub fn entries(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.iter().map(|compiled| &compiled.entry)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry occurring in `text`, once each, ordered by first occurrence.
    #[must_use]
    pub fn lookup_all(&self, text: &str) -> Vec<TermMatch<'_>> {
        let mut matches: Vec<TermMatch<'_>> = self
            .entries
            .iter()
            .filter_map(|compiled| {
                let mut found = compiled.pattern.find_iter(text);
                let first = found.next()?;
                Some(TermMatch {
                    entry: &compiled.entry,
                    first_position: first.start(),
                    occurrences: 1 + found.count(),
                })
            })
            .collect();
        matches.sort_by_key(|m| m.first_position);
        matches
    }

    /// Every occurrence span of every entry, ordered by position.
    pub(crate) fn occurrences(&self, text: &str) -> Vec<(Range<usize>, &DictionaryEntry)> {
        let mut spans: Vec<_> = self
            .entries
            .iter()
            .flat_map(|compiled| {
                compiled
                    .pattern
                    .find_iter(text)
                    .map(move |m| (m.range(), &compiled.entry))
            })
            .collect();
        spans.sort_by_key(|(range, _)| range.start);
        spans
    }
}

impl Default for TermDictionary {
    fn default() -> Self {
        BUILTIN.as_ref().clone()
    }
}

#[derive(Debug, Deserialize)]
struct DictionaryDocument {
    #[serde(rename = "term", default)]
    terms: Vec<DictionaryEntry>,
}

fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_word_edges(key: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    key.chars().next().is_some_and(is_word) && key.chars().next_back().is_some_and(is_word)
}

fn term_pattern(term: &str) -> Result<Regex, regex::Error> {
    let body = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!(r"(?i)\b{body}\b"))
}

fn builtin_entries() -> Vec<DictionaryEntry> {
    vec![
        DictionaryEntry::new(
            "myocardial infarction",
            "heart attack",
            [
                "A blockage of blood flow to the heart muscle.",
                "It requires immediate medical attention.",
                "It can damage the heart muscle.",
            ],
        ),
        DictionaryEntry::new(
            "hypertension",
            "high blood pressure",
            [
                "The force of blood against artery walls is too high.",
                "It can lead to heart disease and stroke.",
                "It is often managed with diet and medication.",
            ],
        ),
        DictionaryEntry::new(
            "anesthesia",
            "medicine to make you sleep or numb",
            [
                "You will not feel pain during the procedure.",
                "An anesthesiologist will monitor you.",
                "It can be general (whole body) or local (one area).",
            ],
        ),
        DictionaryEntry::new(
            "consent",
            "agreement",
            [
                "You agree to the procedure after understanding it.",
                "You have the right to ask questions.",
                "You can say no if you choose.",
            ],
        ),
        DictionaryEntry::new(
            "intravenous",
            "through the vein",
            [
                "Medicine or fluids go directly into your blood.",
                "A small tube is placed in a vein, usually in the arm.",
                "It works faster than pills.",
            ],
        ),
        DictionaryEntry::new(
            "adverse effects",
            "side effects",
            [
                "Unwanted reactions to a treatment.",
                "They can range from mild to severe.",
                "Tell your doctor if you feel unwell.",
            ],
        ),
    ]
}
