//! Corpus directory listing and document reading.
//!
//! A corpus is a flat directory with one note per file. Documents are always
//! visited in lexicographic file-name order, so frequency tie-breaks and the
//! order of assembled examples do not depend on the filesystem.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use super::tokenizer::Tokenizer;
use crate::error::{PipelineError, Result};

/// One note file in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, e.g. `"103922.txt"`
    pub name: String,
    /// Full path to the file
    pub path: PathBuf,
}

impl Document {
    /// Subject identifier: the file name up to its first `.`.
    pub fn subject_id(&self) -> &str {
        subject_id(&self.name)
    }
}

/// Derive a subject identifier from a document file name.
pub fn subject_id(file_name: &str) -> &str {
    file_name
        .split_once('.')
        .map_or(file_name, |(head, _)| head)
}

/// Sorted listing of the documents under a corpus root.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    documents: Vec<Document>,
}

impl Corpus {
    /// List the documents under `root`, sorted by file name.
    ///
    /// Directories, and symlinks to directories, are skipped. Every other
    /// entry is a document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CorpusRead`] if the directory or one of its
    /// entries cannot be read, including a symlink whose target is missing.
    pub fn open(root: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(root).map_err(|e| PipelineError::corpus(root, e))?;

        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::corpus(root, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| PipelineError::corpus(&path, e))?;
            let is_dir = if file_type.is_symlink() {
                std::fs::metadata(&path)
                    .map_err(|e| PipelineError::corpus(&path, e))?
                    .is_dir()
            } else {
                file_type.is_dir()
            };
            if is_dir {
                debug!(path = %path.display(), "skipping directory in corpus");
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            documents.push(Document { name, path });
        }
        documents.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Corpus {
            root: root.to_path_buf(),
            documents,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Read one document as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CorpusRead`] naming the document on any I/O
    /// or decoding failure.
    pub fn read(&self, document: &Document) -> Result<String> {
        std::fs::read_to_string(&document.path).map_err(|e| PipelineError::corpus(&document.path, e))
    }

    /// Read and tokenize every document.
    ///
    /// Documents are processed in parallel; the result is in corpus order,
    /// one entry per document, `None` for documents the tokenizer rejected.
    ///
    /// # Errors
    ///
    /// If several documents are unreadable, the error names the first of them
    /// in corpus order.
    pub fn tokenize_all(&self, tokenizer: &Tokenizer) -> Result<Vec<Option<Vec<String>>>> {
        let results: Vec<Result<Option<Vec<String>>>> = self
            .documents
            .par_iter()
            .map(|document| self.read(document).map(|text| tokenizer.tokenize(&text)))
            .collect();
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tokenizer::TokenMode;
    use tempfile::TempDir;

    #[test]
    fn test_subject_id_before_first_dot() {
        assert_eq!(subject_id("103922.txt"), "103922");
        assert_eq!(subject_id("103922.discharge.txt"), "103922");
        assert_eq!(subject_id("103922"), "103922");
        assert_eq!(subject_id(".hidden"), "");
    }

    #[test]
    fn test_open_sorts_and_skips_directories() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("20.txt"), "b").expect("write");
        std::fs::write(dir.path().join("100.txt"), "a").expect("write");
        std::fs::write(dir.path().join("3.txt"), "c").expect("write");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");

        let corpus = Corpus::open(dir.path()).expect("open");
        let names: Vec<&str> = corpus.documents().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["100.txt", "20.txt", "3.txt"]);
    }

    #[test]
    fn test_open_missing_root_fails() {
        let dir = TempDir::new().expect("create temp dir");
        let missing = dir.path().join("absent");
        assert!(matches!(
            Corpus::open(&missing),
            Err(PipelineError::CorpusRead { .. })
        ));
    }

    #[test]
    fn test_tokenize_all_keeps_order_and_rejections() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("a.txt"), "one two").expect("write");
        std::fs::write(dir.path().join("b.txt"), "one two three four").expect("write");
        std::fs::write(dir.path().join("c.txt"), "three").expect("write");

        let corpus = Corpus::open(dir.path()).expect("open");
        let tokenizer = Tokenizer::new(TokenMode::NormalizedWords, 2);
        let tokenized = corpus.tokenize_all(&tokenizer).expect("tokenize");
        assert_eq!(tokenized.len(), 3);
        assert_eq!(tokenized[0].as_deref(), Some(&["one".to_string(), "two".to_string()][..]));
        assert!(tokenized[1].is_none());
        assert_eq!(tokenized[2].as_deref(), Some(&["three".to_string()][..]));
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0x00]).expect("write");
        let corpus = Corpus::open(dir.path()).expect("open");
        let tokenizer = Tokenizer::new(TokenMode::NormalizedWords, 10);
        assert!(matches!(
            corpus.tokenize_all(&tokenizer),
            Err(PipelineError::CorpusRead { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_fatal() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("100.txt"), "chest pain").expect("write");
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("101.txt"))
            .expect("symlink");

        match Corpus::open(dir.path()) {
            Err(PipelineError::CorpusRead { path, .. }) => {
                assert_eq!(path, dir.path().join("101.txt"));
            }
            other => panic!("expected corpus read error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_a_document() {
        let dir = TempDir::new().expect("create temp dir");
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).expect("mkdir");
        std::fs::write(dir.path().join("target.txt"), "fever").expect("write");
        std::os::unix::fs::symlink(dir.path().join("target.txt"), notes.join("7.txt"))
            .expect("symlink");
        std::os::unix::fs::symlink(dir.path(), notes.join("loop")).expect("symlink");

        let corpus = Corpus::open(&notes).expect("open");
        let names: Vec<&str> = corpus.documents().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["7.txt"]);
    }

    #[test]
    fn test_first_unreadable_document_reported() {
        let dir = TempDir::new().expect("create temp dir");
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            std::fs::write(dir.path().join(name), "fine").expect("write");
        }
        std::fs::write(dir.path().join("b.txt"), [0xff, 0xfe]).expect("write");
        std::fs::write(dir.path().join("d.txt"), [0xff, 0xfe]).expect("write");

        let corpus = Corpus::open(dir.path()).expect("open");
        let tokenizer = Tokenizer::new(TokenMode::NormalizedWords, 10);
        match corpus.tokenize_all(&tokenizer) {
            Err(PipelineError::CorpusRead { path, .. }) => {
                assert_eq!(path, dir.path().join("b.txt"));
            }
            other => panic!("expected corpus read error, got {other:?}"),
        }
    }
}
