//! Configuration structures for dataset construction.
//!
//! This module provides strongly-typed configuration management using TOML files.
//! The configuration covers data paths, filtering thresholds, coded-table sources,
//! and artifact names. Every recognized option is a field; unknown keys are
//! rejected at load time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::assemble::Vectorization;
use super::codes::ShortCodePolicy;
use super::tokenizer::TokenMode;
use crate::error::{PipelineError, Result};

/// Main configuration structure loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Data location configuration
    pub data: DataConfig,
    /// Filtering thresholds and vectorization options
    pub args: ArgsConfig,
    /// Coded-event tables, indexed in the listed order
    pub sources: Vec<CodeSource>,
    /// Output paths configuration
    pub output: OutputConfig,
}

/// Data location configuration.
///
/// Relative paths are resolved against the data root given to
/// [`Config::corpus_path`] and [`Config::source_path`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Directory holding one note per file, named `<subject>.<anything>`
    pub corpus_dir: PathBuf,
    /// Directory holding the coded-event CSV tables
    pub codes_dir: PathBuf,
}

/// Filtering thresholds and vectorization options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArgsConfig {
    /// Tokens seen this many times or fewer map to the OOV sentinel
    pub min_token_freq: u64,
    /// Documents with more tokens than this are rejected
    pub max_tokens_in_file: usize,
    /// Codes held by this many subjects or fewer get no label column
    pub min_examples_per_code: u64,
    /// How documents are split into tokens
    pub token_mode: TokenMode,
    /// Whether examples keep token order or collapse duplicates
    pub vectorization: Vectorization,
    /// What to do with raw codes shorter than their namespace prefix
    pub short_code_policy: ShortCodePolicy,
    /// Optional truncation of assembled token-id sequences
    pub maxlen: Option<usize>,
    /// Fraction of examples held out for validation
    pub test_size: f64,
    /// Seed for the validation split
    pub seed: u64,
}

/// One coded-event table and the rule used to shorten its codes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeSource {
    /// CSV file name, relative to `data.codes_dir`
    pub file: PathBuf,
    /// Column holding the subject (admission) identifier
    pub subject_column: String,
    /// Column holding the raw code
    pub code_column: String,
    /// Tag prepended to every code from this table
    pub namespace: String,
    /// Number of leading characters kept from each raw code
    pub prefix_length: usize,
}

/// Output paths configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory recreated on every build
    pub model_dir: PathBuf,
    /// Token frequency table
    pub alphabet_file: String,
    /// Token vocabulary snapshot (JSON)
    pub alphabet_snapshot: String,
    /// Code frequency table
    pub code_freq_file: String,
    /// Code vocabulary snapshot (JSON)
    pub code_vocab_file: String,
    /// Assembled dataset (JSON lines)
    pub dataset_file: String,
    /// Validation-split label matrix (headerless CSV)
    pub test_labels_file: String,
    /// Per-label F1 results file
    pub results_file: String,
    /// Full evaluation report (JSON)
    pub report_file: String,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file cannot be read, parsed,
    /// or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field constraint once, so later stages can consume
    /// the options as plain values.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PipelineError::Config(msg));

        if self.args.max_tokens_in_file == 0 {
            return fail("args.max_tokens_in_file must be positive".to_string());
        }
        if self.args.maxlen == Some(0) {
            return fail("args.maxlen must be positive when set".to_string());
        }
        if !(0.0..1.0).contains(&self.args.test_size) {
            return fail(format!(
                "args.test_size must be in [0, 1), got {}",
                self.args.test_size
            ));
        }
        if self.sources.is_empty() {
            return fail("at least one [[sources]] table is required".to_string());
        }

        let mut namespaces = HashSet::new();
        for source in &self.sources {
            if source.namespace.is_empty() {
                return fail(format!("{}: namespace is empty", source.file.display()));
            }
            if source.namespace.contains('_') {
                return fail(format!(
                    "namespace {:?} must not contain '_'",
                    source.namespace
                ));
            }
            if !namespaces.insert(source.namespace.as_str()) {
                return fail(format!("duplicate namespace {:?}", source.namespace));
            }
            if source.prefix_length == 0 {
                return fail(format!(
                    "namespace {:?}: prefix_length must be positive",
                    source.namespace
                ));
            }
            if source.subject_column.is_empty() || source.code_column.is_empty() {
                return fail(format!(
                    "namespace {:?}: column names must not be empty",
                    source.namespace
                ));
            }
        }

        let out = &self.output;
        if out.model_dir.file_name().is_none() {
            return fail(format!(
                "output.model_dir {:?} must name a directory of its own",
                out.model_dir
            ));
        }
        for (key, name) in [
            ("alphabet_file", &out.alphabet_file),
            ("alphabet_snapshot", &out.alphabet_snapshot),
            ("code_freq_file", &out.code_freq_file),
            ("code_vocab_file", &out.code_vocab_file),
            ("dataset_file", &out.dataset_file),
            ("test_labels_file", &out.test_labels_file),
            ("results_file", &out.results_file),
            ("report_file", &out.report_file),
        ] {
            if name.is_empty() {
                return fail(format!("output.{key} must not be empty"));
            }
        }

        Ok(())
    }

    /// Refuse a model directory that holds any build input.
    ///
    /// The model directory is deleted and recreated on every build, so it
    /// must not be, or contain, the corpus, the codes directory or a coded
    /// table. Paths that do not exist yet cannot collide and pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the input inside the model
    /// directory.
    pub fn check_model_dir(&self, data_root: Option<&Path>) -> Result<()> {
        let Ok(model_dir) = self.output.model_dir.canonicalize() else {
            return Ok(());
        };

        let mut inputs = vec![
            ("data.corpus_dir", self.corpus_path(data_root)),
            ("data.codes_dir", resolve(data_root, &self.data.codes_dir)),
        ];
        for source in &self.sources {
            inputs.push(("sources.file", self.source_path(data_root, source)));
        }

        for (key, path) in inputs {
            if let Ok(input) = path.canonicalize() {
                if input.starts_with(&model_dir) {
                    return Err(PipelineError::Config(format!(
                        "output.model_dir {} contains {key} {}",
                        model_dir.display(),
                        input.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Corpus directory, resolved against `data_root` when relative.
    pub fn corpus_path(&self, data_root: Option<&Path>) -> PathBuf {
        resolve(data_root, &self.data.corpus_dir)
    }

    /// Path of one coded table, resolved against `data_root` when relative.
    pub fn source_path(&self, data_root: Option<&Path>, source: &CodeSource) -> PathBuf {
        resolve(data_root, &self.data.codes_dir).join(&source.file)
    }
}

fn resolve(root: Option<&Path>, path: &Path) -> PathBuf {
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

impl Default for Config {
    /// MIMIC-III layout: diagnoses, procedures and CPT events keyed by admission.
    fn default() -> Self {
        Config {
            data: DataConfig::default(),
            args: ArgsConfig::default(),
            sources: vec![
                CodeSource {
                    file: PathBuf::from("DIAGNOSES_ICD.csv"),
                    subject_column: "HADM_ID".to_string(),
                    code_column: "ICD9_CODE".to_string(),
                    namespace: "diag".to_string(),
                    prefix_length: 3,
                },
                CodeSource {
                    file: PathBuf::from("PROCEDURES_ICD.csv"),
                    subject_column: "HADM_ID".to_string(),
                    code_column: "ICD9_CODE".to_string(),
                    namespace: "proc".to_string(),
                    prefix_length: 2,
                },
                CodeSource {
                    file: PathBuf::from("CPTEVENTS.csv"),
                    subject_column: "HADM_ID".to_string(),
                    code_column: "CPT_NUMBER".to_string(),
                    namespace: "cpt".to_string(),
                    prefix_length: 5,
                },
            ],
            output: OutputConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            corpus_dir: PathBuf::from("Train"),
            codes_dir: PathBuf::from("Codes"),
        }
    }
}

impl Default for ArgsConfig {
    fn default() -> Self {
        ArgsConfig {
            min_token_freq: 100,
            max_tokens_in_file: 25_000,
            min_examples_per_code: 1000,
            token_mode: TokenMode::NormalizedWords,
            vectorization: Vectorization::Sequence,
            short_code_policy: ShortCodePolicy::Keep,
            maxlen: None,
            test_size: 0.2,
            seed: 1337,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            model_dir: PathBuf::from("Model"),
            alphabet_file: "alphabet.txt".to_string(),
            alphabet_snapshot: "alphabet.json".to_string(),
            code_freq_file: "codes.txt".to_string(),
            code_vocab_file: "codes.json".to_string(),
            dataset_file: "dataset.jsonl".to_string(),
            test_labels_file: "test_labels.csv".to_string(),
            results_file: "results.txt".to_string(),
            report_file: "report.json".to_string(),
        }
    }
}
