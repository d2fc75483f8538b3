//! Code vocabulary: the label columns of the multi-hot matrix.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::codes::{Code, SubjectCodeSet};
use super::vocab::{FrequencyCounter, FrequencyTable};
use crate::error::{PipelineError, Result};

/// Code to label-column mapping, most frequent code first.
///
/// Ids start at 0. There is no sentinel: rare codes are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Code>", into = "Vec<Code>")]
pub struct CodeVocabulary {
    codes: Vec<Code>,
    index: HashMap<Code, usize>,
}

impl CodeVocabulary {
    /// Keep codes held by strictly more than `min_subjects_per_code` subjects.
    pub fn from_frequencies(frequencies: &FrequencyTable<Code>, min_subjects_per_code: u64) -> Self {
        frequencies.above(min_subjects_per_code).cloned().collect::<Vec<_>>().into()
    }

    pub fn id(&self, code: &Code) -> Option<usize> {
        self.index.get(code).copied()
    }

    pub fn code(&self, id: usize) -> Option<&Code> {
        self.codes.get(id)
    }

    /// Codes in label-column order.
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Multi-hot vector over this vocabulary; codes outside it are ignored.
    pub fn multi_hot<'a>(&self, codes: impl IntoIterator<Item = &'a Code>) -> Vec<u8> {
        let mut vector = vec![0u8; self.codes.len()];
        for code in codes {
            if let Some(id) = self.id(code) {
                vector[id] = 1;
            }
        }
        vector
    }

    /// Save the vocabulary as a JSON array of code strings in id order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| PipelineError::artifact(path, e))?;
        std::fs::write(path, json).map_err(|e| PipelineError::artifact(path, e))
    }

    /// Load a vocabulary saved by [`CodeVocabulary::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::artifact(path, e))?;
        let codes: Vec<Code> =
            serde_json::from_str(&json).map_err(|e| PipelineError::artifact(path, e))?;
        let vocabulary = CodeVocabulary::from(codes);
        if vocabulary.index.len() != vocabulary.codes.len() {
            return Err(PipelineError::VocabularyFormat(format!(
                "{} lists a code more than once",
                path.display()
            )));
        }
        Ok(vocabulary)
    }
}

impl From<Vec<Code>> for CodeVocabulary {
    fn from(codes: Vec<Code>) -> Self {
        let index = codes
            .iter()
            .enumerate()
            .map(|(i, code)| (code.clone(), i))
            .collect();
        CodeVocabulary { codes, index }
    }
}

impl From<CodeVocabulary> for Vec<Code> {
    fn from(vocabulary: CodeVocabulary) -> Self {
        vocabulary.codes
    }
}

/// Result of counting codes over subjects.
#[derive(Debug, Clone)]
pub struct CodeVocabularyBuild {
    /// Distinct-subject count for every observed code
    pub frequencies: FrequencyTable<Code>,
    /// Shared with every [`Dataset`](super::assemble::Dataset) assembled from this build
    pub vocabulary: Arc<CodeVocabulary>,
}

/// Builds a [`CodeVocabulary`] from per-subject code sets.
#[derive(Debug, Clone, Copy)]
pub struct CodeVocabularyBuilder {
    min_subjects_per_code: u64,
}

impl CodeVocabularyBuilder {
    pub fn new(min_subjects_per_code: u64) -> Self {
        CodeVocabularyBuilder {
            min_subjects_per_code,
        }
    }

    /// Count distinct subjects per code and keep the frequent codes.
    pub fn build(&self, subjects: &SubjectCodeSet) -> CodeVocabularyBuild {
        let mut counter = FrequencyCounter::new();
        for (_, codes) in subjects.iter() {
            codes.iter().for_each(|code| counter.add(code));
        }

        let frequencies = counter.into_table();
        let vocabulary = CodeVocabulary::from_frequencies(&frequencies, self.min_subjects_per_code);
        info!(
            observed = frequencies.len(),
            kept = vocabulary.len(),
            min_examples_per_code = self.min_subjects_per_code,
            "code vocabulary built"
        );

        CodeVocabularyBuild {
            frequencies,
            vocabulary: Arc::new(vocabulary),
        }
    }
}
