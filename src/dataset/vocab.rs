//! Token vocabulary construction.
//!
//! Counts tokens across the whole corpus and assigns contiguous ids, starting
//! at 1, to tokens seen strictly more than `min_token_freq` times. Id 0 is the
//! out-of-vocabulary sentinel and is never given to a real token.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::corpus::Corpus;
use super::tokenizer::Tokenizer;
use crate::error::{PipelineError, Result};

/// Id returned for tokens outside the vocabulary.
pub const OOV_ID: u32 = 0;

/// Name under which the sentinel is stored in the snapshot.
pub const OOV_TOKEN: &str = "oov_word";

/// Exact counts in first-seen order.
#[derive(Debug, Clone)]
pub struct FrequencyCounter<K> {
    index: HashMap<K, usize>,
    counts: Vec<(K, u64)>,
}

impl<K: Hash + Eq + Clone> FrequencyCounter<K> {
    pub fn new() -> Self {
        FrequencyCounter {
            index: HashMap::new(),
            counts: Vec::new(),
        }
    }

    pub fn add(&mut self, key: &K) {
        match self.index.get(key) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.index.insert(key.clone(), self.counts.len());
                self.counts.push((key.clone(), 1));
            }
        }
    }

    /// Sort by descending count; equal counts keep first-seen order.
    pub fn into_table(self) -> FrequencyTable<K> {
        let mut entries = self.counts;
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        FrequencyTable { entries }
    }
}

impl<K: Hash + Eq + Clone> Default for FrequencyCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every observed key with its count, most frequent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable<K> {
    entries: Vec<(K, u64)>,
}

impl<K> FrequencyTable<K> {
    pub fn entries(&self) -> &[(K, u64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys whose count is strictly greater than `min_count`, in table order.
    pub fn above(&self, min_count: u64) -> impl Iterator<Item = &K> {
        self.entries
            .iter()
            .filter(move |(_, count)| *count > min_count)
            .map(|(key, _)| key)
    }
}

impl<K: Display> FrequencyTable<K> {
    /// Write one `<key>|<count>` line per entry.
    pub fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for (key, count) in &self.entries {
            writeln!(out, "{key}|{count}")?;
        }
        out.flush()
    }
}

/// Frequency-filtered token to id mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenVocabulary {
    token_to_id: HashMap<String, u32>,
    /// `tokens[i]` has id `i + 1`
    tokens: Vec<String>,
}

impl TokenVocabulary {
    /// Assign ids to every token counted more than `min_token_freq` times.
    pub fn from_frequencies(frequencies: &FrequencyTable<String>, min_token_freq: u64) -> Self {
        let tokens: Vec<String> = frequencies.above(min_token_freq).cloned().collect();
        Self::from_ordered(tokens)
    }

    fn from_ordered(tokens: Vec<String>) -> Self {
        let token_to_id = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i as u32 + 1))
            .collect();
        TokenVocabulary {
            token_to_id,
            tokens,
        }
    }

    /// Id of `token`, or [`OOV_ID`] when it is not in the vocabulary.
    pub fn id(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(OOV_ID)
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        if id == OOV_ID {
            return None;
        }
        self.tokens.get(id as usize - 1).map(String::as_str)
    }

    /// Number of real tokens (sentinel excluded).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Embedding input size: real tokens plus the sentinel.
    pub fn num_features(&self) -> usize {
        self.tokens.len() + 1
    }

    /// Tokens in id order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn snapshot(&self) -> VocabularySnapshot {
        VocabularySnapshot {
            oov_token: OOV_TOKEN.to_string(),
            oov_id: OOV_ID,
            token_to_id: self
                .token_to_id
                .iter()
                .map(|(token, &id)| (token.clone(), id))
                .collect(),
        }
    }

    /// Rebuild a vocabulary from a snapshot, checking the id invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::VocabularyFormat`] if the sentinel is not 0,
    /// a real token has id 0, or ids are not unique and contiguous from 1.
    pub fn from_snapshot(snapshot: VocabularySnapshot) -> Result<Self> {
        if snapshot.oov_id != OOV_ID {
            return Err(PipelineError::VocabularyFormat(format!(
                "sentinel id is {}, expected {OOV_ID}",
                snapshot.oov_id
            )));
        }

        let n = snapshot.token_to_id.len();
        let mut tokens: Vec<Option<String>> = vec![None; n];
        for (token, id) in snapshot.token_to_id {
            if id == OOV_ID || id as usize > n {
                return Err(PipelineError::VocabularyFormat(format!(
                    "token {token:?} has id {id} outside 1..={n}"
                )));
            }
            let slot = &mut tokens[id as usize - 1];
            if let Some(previous) = slot {
                return Err(PipelineError::VocabularyFormat(format!(
                    "id {id} assigned to both {previous:?} and {token:?}"
                )));
            }
            *slot = Some(token);
        }

        // n slots, n distinct ids in 1..=n: every slot is filled
        let tokens = tokens.into_iter().flatten().collect();
        Ok(Self::from_ordered(tokens))
    }

    /// Save the vocabulary snapshot to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| PipelineError::artifact(path, e))?;
        std::fs::write(path, json).map_err(|e| PipelineError::artifact(path, e))
    }

    /// Load a vocabulary snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::artifact(path, e))?;
        let snapshot: VocabularySnapshot =
            serde_json::from_str(&json).map_err(|e| PipelineError::artifact(path, e))?;
        Self::from_snapshot(snapshot)
    }
}

/// Serialized form of a [`TokenVocabulary`].
///
/// The mapping is a `BTreeMap` so the written file is byte-identical across
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySnapshot {
    pub oov_token: String,
    pub oov_id: u32,
    pub token_to_id: BTreeMap<String, u32>,
}

/// Result of a vocabulary pass over the corpus.
#[derive(Debug, Clone)]
pub struct TokenVocabularyBuild {
    /// Every observed token, including those below threshold
    pub frequencies: FrequencyTable<String>,
    /// Shared with every [`Dataset`](super::assemble::Dataset) assembled from this build
    pub vocabulary: Arc<TokenVocabulary>,
    /// Documents examined
    pub documents: usize,
    /// Documents rejected by the length limit
    pub rejected: usize,
}

/// Builds a [`TokenVocabulary`] from a corpus.
#[derive(Debug, Clone, Copy)]
pub struct VocabularyBuilder {
    tokenizer: Tokenizer,
    min_token_freq: u64,
}

impl VocabularyBuilder {
    pub fn new(tokenizer: Tokenizer, min_token_freq: u64) -> Self {
        VocabularyBuilder {
            tokenizer,
            min_token_freq,
        }
    }

    /// Tokenize every document and build the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CorpusRead`] if any document is unreadable.
    pub fn build(&self, corpus: &Corpus) -> Result<TokenVocabularyBuild> {
        let tokenized = corpus.tokenize_all(&self.tokenizer)?;
        Ok(self.build_from_tokens(&tokenized))
    }

    /// Build from documents already tokenized in corpus order.
    pub fn build_from_tokens(&self, tokenized: &[Option<Vec<String>>]) -> TokenVocabularyBuild {
        let mut counter = FrequencyCounter::new();
        let mut rejected = 0;
        for document in tokenized {
            match document {
                Some(tokens) => tokens.iter().for_each(|token| counter.add(token)),
                None => rejected += 1,
            }
        }

        let frequencies = counter.into_table();
        let vocabulary = TokenVocabulary::from_frequencies(&frequencies, self.min_token_freq);
        info!(
            observed = frequencies.len(),
            kept = vocabulary.len(),
            rejected_documents = rejected,
            min_token_freq = self.min_token_freq,
            "token vocabulary built"
        );

        TokenVocabularyBuild {
            frequencies,
            vocabulary: Arc::new(vocabulary),
            documents: tokenized.len(),
            rejected,
        }
    }
}
