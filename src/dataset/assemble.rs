//! Dataset assembly: join documents to subject codes and vectorize both.
//!
//! Every document either becomes an [`Example`] or is skipped for exactly one
//! counted reason (see [`AssemblyStats`]). Skipping is data-quality filtering,
//! not an error; only an assembly that keeps nothing fails.

use std::collections::HashSet;
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::code_vocab::CodeVocabulary;
use super::codes::SubjectCodeSet;
use super::corpus::{Corpus, Document};
use super::tokenizer::Tokenizer;
use super::vocab::TokenVocabulary;
use crate::error::{PipelineError, Result};

/// How a document's tokens become an id sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vectorization {
    /// Keep every token in document order.
    #[default]
    Sequence,
    /// Keep the first occurrence of each distinct token, in document order.
    Set,
}

/// One retained document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    /// Source file name
    pub document: String,
    pub subject: String,
    /// Token ids; unknown tokens are the OOV sentinel
    pub token_ids: Vec<u32>,
    /// Multi-hot vector over the code vocabulary
    pub labels: Vec<u8>,
}

impl Example {
    /// Label column ids with a set bit.
    pub fn label_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &bit)| bit == 1)
            .map(|(id, _)| id)
    }
}

/// Why a document was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// More tokens than `max_tokens_in_file`
    TooLong,
    /// No token survived tokenization
    EmptyDocument,
    /// No code row mentions the subject
    UnknownSubject,
    /// The subject is known but has no codes. Never produced for a
    /// [`SubjectCodeSet`] filled through [`SubjectCodeSet::insert`], which
    /// only creates non-empty sets.
    EmptyCodeSet,
    /// All of the subject's codes are below the frequency threshold
    NoFrequentCode,
}

/// Assembly counters. `retained` plus every skip counter equals `documents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    pub documents: usize,
    pub retained: usize,
    pub too_long: usize,
    pub empty_document: usize,
    pub unknown_subject: usize,
    /// Always 0 when subjects were indexed by
    /// [`CodeIndexer`](super::codes::CodeIndexer)
    pub empty_code_set: usize,
    pub no_frequent_code: usize,
    /// Retained examples shortened by `maxlen`
    pub truncated: usize,
}

impl AssemblyStats {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooLong => self.too_long += 1,
            SkipReason::EmptyDocument => self.empty_document += 1,
            SkipReason::UnknownSubject => self.unknown_subject += 1,
            SkipReason::EmptyCodeSet => self.empty_code_set += 1,
            SkipReason::NoFrequentCode => self.no_frequent_code += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.too_long
            + self.empty_document
            + self.unknown_subject
            + self.empty_code_set
            + self.no_frequent_code
    }
}

/// Retained examples plus the vocabularies that define their coordinates.
#[derive(Debug, Clone)]
pub struct Dataset {
    examples: Vec<Example>,
    token_vocabulary: Arc<TokenVocabulary>,
    code_vocabulary: Arc<CodeVocabulary>,
    stats: AssemblyStats,
}

impl Dataset {
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn token_vocabulary(&self) -> &Arc<TokenVocabulary> {
        &self.token_vocabulary
    }

    pub fn code_vocabulary(&self) -> &Arc<CodeVocabulary> {
        &self.code_vocabulary
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    /// Embedding input size, sentinel included.
    pub fn num_features(&self) -> usize {
        self.token_vocabulary.num_features()
    }

    pub fn num_labels(&self) -> usize {
        self.code_vocabulary.len()
    }

    pub fn max_sequence_len(&self) -> usize {
        self.examples
            .iter()
            .map(|e| e.token_ids.len())
            .max()
            .unwrap_or(0)
    }

    /// Token ids as a `(examples, width)` matrix.
    ///
    /// Short sequences are left-padded with 0 and long ones keep their last
    /// `width` ids. `width` defaults to the longest sequence.
    pub fn token_matrix(&self, maxlen: Option<usize>) -> Array2<u32> {
        let width = maxlen.unwrap_or_else(|| self.max_sequence_len());
        let mut matrix = Array2::zeros((self.examples.len(), width));
        for (row, example) in self.examples.iter().enumerate() {
            let ids = &example.token_ids;
            let kept = &ids[ids.len().saturating_sub(width)..];
            let offset = width - kept.len();
            for (j, &id) in kept.iter().enumerate() {
                matrix[[row, offset + j]] = id;
            }
        }
        matrix
    }

    /// Multi-hot labels as a `(examples, labels)` matrix.
    pub fn label_matrix(&self) -> Array2<u8> {
        let mut matrix = Array2::zeros((self.examples.len(), self.num_labels()));
        for (row, example) in self.examples.iter().enumerate() {
            for (col, &bit) in example.labels.iter().enumerate() {
                matrix[[row, col]] = bit;
            }
        }
        matrix
    }

    /// New dataset holding the examples at `indices`, in that order.
    ///
    /// Vocabularies are shared, not copied. Stats describe the full assembly.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            examples: indices.iter().map(|&i| self.examples[i].clone()).collect(),
            token_vocabulary: Arc::clone(&self.token_vocabulary),
            code_vocabulary: Arc::clone(&self.code_vocabulary),
            stats: self.stats.clone(),
        }
    }
}

/// Turns a corpus into a [`Dataset`] once both vocabularies are fixed.
#[derive(Debug, Clone, Copy)]
pub struct DatasetAssembler {
    tokenizer: Tokenizer,
    vectorization: Vectorization,
    maxlen: Option<usize>,
}

impl DatasetAssembler {
    pub fn new(tokenizer: Tokenizer, vectorization: Vectorization) -> Self {
        DatasetAssembler {
            tokenizer,
            vectorization,
            maxlen: None,
        }
    }

    /// Truncate every assembled sequence to its first `maxlen` ids.
    pub fn with_maxlen(mut self, maxlen: Option<usize>) -> Self {
        self.maxlen = maxlen;
        self
    }

    /// Read, tokenize and vectorize the corpus.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CorpusRead`] if a document is unreadable,
    /// [`PipelineError::EmptyDataset`] if nothing is retained.
    pub fn assemble(
        &self,
        corpus: &Corpus,
        token_vocabulary: &Arc<TokenVocabulary>,
        subjects: &SubjectCodeSet,
        code_vocabulary: &Arc<CodeVocabulary>,
    ) -> Result<Dataset> {
        let tokenized = corpus.tokenize_all(&self.tokenizer)?;
        self.assemble_tokenized(
            corpus.documents(),
            &tokenized,
            token_vocabulary,
            subjects,
            code_vocabulary,
        )
    }

    /// Vectorize documents that were already tokenized in corpus order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyDataset`] if nothing is retained.
    pub fn assemble_tokenized(
        &self,
        documents: &[Document],
        tokenized: &[Option<Vec<String>>],
        token_vocabulary: &Arc<TokenVocabulary>,
        subjects: &SubjectCodeSet,
        code_vocabulary: &Arc<CodeVocabulary>,
    ) -> Result<Dataset> {
        let outcomes: Vec<std::result::Result<(Example, bool), SkipReason>> = documents
            .par_iter()
            .zip(tokenized.par_iter())
            .map(|(document, tokens)| {
                self.vectorize(document, tokens.as_deref(), token_vocabulary, subjects, code_vocabulary)
            })
            .collect();

        let mut stats = AssemblyStats {
            documents: documents.len(),
            ..AssemblyStats::default()
        };
        let mut examples = Vec::with_capacity(outcomes.len());
        for (document, outcome) in documents.iter().zip(outcomes) {
            match outcome {
                Ok((example, truncated)) => {
                    stats.retained += 1;
                    if truncated {
                        stats.truncated += 1;
                    }
                    examples.push(example);
                }
                Err(reason) => {
                    debug!(document = %document.name, ?reason, "document skipped");
                    stats.record(reason);
                }
            }
        }

        info!(
            documents = stats.documents,
            retained = stats.retained,
            too_long = stats.too_long,
            empty_document = stats.empty_document,
            unknown_subject = stats.unknown_subject,
            empty_code_set = stats.empty_code_set,
            no_frequent_code = stats.no_frequent_code,
            "dataset assembled"
        );

        if examples.is_empty() {
            return Err(PipelineError::EmptyDataset {
                considered: stats.documents,
            });
        }

        Ok(Dataset {
            examples,
            token_vocabulary: Arc::clone(token_vocabulary),
            code_vocabulary: Arc::clone(code_vocabulary),
            stats,
        })
    }

    fn vectorize(
        &self,
        document: &Document,
        tokens: Option<&[String]>,
        token_vocabulary: &TokenVocabulary,
        subjects: &SubjectCodeSet,
        code_vocabulary: &CodeVocabulary,
    ) -> std::result::Result<(Example, bool), SkipReason> {
        let tokens = tokens.ok_or(SkipReason::TooLong)?;
        if tokens.is_empty() {
            return Err(SkipReason::EmptyDocument);
        }

        let subject = document.subject_id();
        let codes = subjects.codes(subject).ok_or(SkipReason::UnknownSubject)?;
        if codes.is_empty() {
            return Err(SkipReason::EmptyCodeSet);
        }

        let labels = code_vocabulary.multi_hot(codes);
        if !labels.contains(&1) {
            return Err(SkipReason::NoFrequentCode);
        }

        let mut token_ids: Vec<u32> = match self.vectorization {
            Vectorization::Sequence => tokens.iter().map(|t| token_vocabulary.id(t)).collect(),
            Vectorization::Set => {
                let mut seen = HashSet::new();
                tokens
                    .iter()
                    .filter(|t| seen.insert(t.as_str()))
                    .map(|t| token_vocabulary.id(t))
                    .collect()
            }
        };

        let mut truncated = false;
        if let Some(maxlen) = self.maxlen {
            if token_ids.len() > maxlen {
                token_ids.truncate(maxlen);
                truncated = true;
            }
        }

        Ok((
            Example {
                document: document.name.clone(),
                subject: subject.to_string(),
                token_ids,
                labels,
            },
            truncated,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::codes::Code;
    use crate::dataset::tokenizer::TokenMode;
    use crate::dataset::vocab::{FrequencyCounter, OOV_ID};
    use std::path::PathBuf;

    fn document(name: &str) -> Document {
        Document {
            name: name.to_string(),
            path: PathBuf::from(name),
        }
    }

    fn words(text: &str) -> Option<Vec<String>> {
        Some(text.split_whitespace().map(str::to_string).collect())
    }

    fn token_vocabulary(words: &[&str]) -> Arc<TokenVocabulary> {
        let mut counter = FrequencyCounter::new();
        for word in words {
            counter.add(&word.to_string());
        }
        Arc::new(TokenVocabulary::from_frequencies(&counter.into_table(), 0))
    }

    fn fixture() -> (Arc<TokenVocabulary>, SubjectCodeSet, Arc<CodeVocabulary>) {
        let tokens = token_vocabulary(&["chest", "pain"]);
        let mut subjects = SubjectCodeSet::new();
        subjects.insert("100", Code::new("diag", "414"));
        subjects.insert("100", Code::new("proc", "36"));
        subjects.insert("200", Code::new("cpt", "99999"));
        subjects.insert("300", Code::new("proc", "36"));
        let codes = Arc::new(CodeVocabulary::from(vec![
            Code::new("diag", "414"),
            Code::new("proc", "36"),
        ]));
        (tokens, subjects, codes)
    }

    fn assembler(vectorization: Vectorization) -> DatasetAssembler {
        DatasetAssembler::new(Tokenizer::new(TokenMode::NormalizedWords, 100), vectorization)
    }

    #[test]
    fn test_skip_reasons_are_counted() {
        let (tokens, subjects, codes) = fixture();
        let documents = vec![
            document("100.txt"),
            document("150.txt"),
            document("200.txt"),
            document("300.txt"),
            document("400.txt"),
        ];
        let tokenized = vec![
            words("chest pain"),
            words("chest"),
            words("pain"),
            None,
            words(""),
        ];

        let dataset = assembler(Vectorization::Sequence)
            .assemble_tokenized(&documents, &tokenized, &tokens, &subjects, &codes)
            .expect("assemble");

        let stats = dataset.stats();
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.unknown_subject, 1);
        assert_eq!(stats.no_frequent_code, 1);
        assert_eq!(stats.too_long, 1);
        assert_eq!(stats.empty_document, 1);
        assert_eq!(stats.retained + stats.skipped(), stats.documents);

        let example = &dataset.examples()[0];
        assert_eq!(example.subject, "100");
        assert_eq!(example.labels, vec![1, 1]);
        assert_eq!(example.label_ids().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_retained_examples_have_a_label() {
        let (tokens, subjects, codes) = fixture();
        let documents = vec![document("100.a"), document("200.b"), document("300.c")];
        let tokenized = vec![words("pain"), words("pain"), words("pain")];
        let dataset = assembler(Vectorization::Sequence)
            .assemble_tokenized(&documents, &tokenized, &tokens, &subjects, &codes)
            .expect("assemble");
        assert_eq!(dataset.len(), 2);
        for example in dataset.examples() {
            assert!(example.labels.iter().map(|&b| b as usize).sum::<usize>() >= 1);
        }
    }

    #[test]
    fn test_sequence_keeps_order_and_oov() {
        let (tokens, subjects, codes) = fixture();
        let dataset = assembler(Vectorization::Sequence)
            .assemble_tokenized(
                &[document("100.txt")],
                &[words("pain radiating chest pain")],
                &tokens,
                &subjects,
                &codes,
            )
            .expect("assemble");
        let chest = tokens.id("chest");
        let pain = tokens.id("pain");
        assert_eq!(dataset.examples()[0].token_ids, vec![pain, OOV_ID, chest, pain]);
    }

    #[test]
    fn test_set_collapses_duplicates_in_first_seen_order() {
        let (tokens, subjects, codes) = fixture();
        let dataset = assembler(Vectorization::Set)
            .assemble_tokenized(
                &[document("100.txt")],
                &[words("pain chest pain unknown chest")],
                &tokens,
                &subjects,
                &codes,
            )
            .expect("assemble");
        let expected = vec![tokens.id("pain"), tokens.id("chest"), OOV_ID];
        assert_eq!(dataset.examples()[0].token_ids, expected);
    }

    #[test]
    fn test_maxlen_truncates_instead_of_rejecting() {
        let (tokens, subjects, codes) = fixture();
        let dataset = assembler(Vectorization::Sequence)
            .with_maxlen(Some(2))
            .assemble_tokenized(
                &[document("100.txt")],
                &[words("chest pain chest pain")],
                &tokens,
                &subjects,
                &codes,
            )
            .expect("assemble");
        assert_eq!(dataset.examples()[0].token_ids.len(), 2);
        assert_eq!(dataset.stats().truncated, 1);
    }

    #[test]
    fn test_nothing_retained_is_an_error() {
        let (tokens, subjects, codes) = fixture();
        let result = assembler(Vectorization::Sequence).assemble_tokenized(
            &[document("999.txt")],
            &[words("chest")],
            &tokens,
            &subjects,
            &codes,
        );
        assert!(matches!(
            result,
            Err(PipelineError::EmptyDataset { considered: 1 })
        ));
    }

    #[test]
    fn test_matrices() {
        let (tokens, subjects, codes) = fixture();
        let dataset = assembler(Vectorization::Sequence)
            .assemble_tokenized(
                &[document("100.txt"), document("300.txt")],
                &[words("chest pain chest"), words("pain")],
                &tokens,
                &subjects,
                &codes,
            )
            .expect("assemble");
        let chest = tokens.id("chest");
        let pain = tokens.id("pain");

        let x = dataset.token_matrix(None);
        assert_eq!(x.shape(), &[2, 3]);
        assert_eq!(x.row(0).to_vec(), vec![chest, pain, chest]);
        assert_eq!(x.row(1).to_vec(), vec![0, 0, pain]);

        let clipped = dataset.token_matrix(Some(2));
        assert_eq!(clipped.row(0).to_vec(), vec![pain, chest]);

        let y = dataset.label_matrix();
        assert_eq!(y.shape(), &[2, 2]);
        assert_eq!(y.row(0).to_vec(), vec![1, 1]);
        assert_eq!(y.row(1).to_vec(), vec![0, 1]);
        assert_eq!(dataset.num_features(), 3);
    }

    #[test]
    fn test_subset_shares_vocabularies() {
        let (tokens, subjects, codes) = fixture();
        let dataset = assembler(Vectorization::Sequence)
            .assemble_tokenized(
                &[document("100.txt"), document("300.txt")],
                &[words("chest"), words("pain")],
                &tokens,
                &subjects,
                &codes,
            )
            .expect("assemble");
        let subset = dataset.subset(&[1]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.examples()[0].subject, "300");
        assert!(Arc::ptr_eq(subset.code_vocabulary(), dataset.code_vocabulary()));
    }
}
