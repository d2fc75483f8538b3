//! Clinical-note dataset construction
//!
//! This module turns a directory of free-text clinical notes and a set of
//! coded billing tables into a multi-label dataset:
//!
//! - **Token vocabulary**: frequent tokens get contiguous ids from 1, id 0 is
//!   the out-of-vocabulary sentinel
//! - **Code index**: each subject's set of truncated billing codes, with a
//!   namespace per source table (`diag_250`, `proc_38`, `cpt_99213`)
//! - **Code vocabulary**: codes held by enough distinct subjects become label
//!   columns, most frequent first
//! - **Assembly**: one example per retained note, token ids plus a multi-hot
//!   label vector
//! - **Evaluation**: per-code and aggregate precision, recall and F1 for
//!   externally produced predictions
//!
//! ## Usage
//!
//! ### Building
//!
//! ```bash
//! ./target/release/notecodes build --config config.toml --data-root /data/mimic
//! ```
//!
//! ### Evaluating predictions
//!
//! ```bash
//! ./target/release/notecodes evaluate --config config.toml \
//!     --labels Model/test_labels.csv --probabilities predictions.csv
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use notecodes::dataset::config::Config;
//! use notecodes::dataset::pipeline::build_dataset;
//! use notecodes::dataset::save::save_build;
//!
//! let config = Config::default();
//! let build = build_dataset(&config, None).expect("build failed");
//! save_build(&build, &config.output).expect("save failed");
//! println!("{}", build.summary());
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [data]
//! corpus_dir = "Train"
//! codes_dir = "Codes"
//!
//! [args]
//! min_token_freq = 100
//! max_tokens_in_file = 25000
//! min_examples_per_code = 1000
//! token_mode = "normalized-words"
//! vectorization = "sequence"
//! short_code_policy = "keep"
//! test_size = 0.2
//! seed = 1337
//!
//! [[sources]]
//! file = "DIAGNOSES_ICD.csv"
//! subject_column = "HADM_ID"
//! code_column = "ICD9_CODE"
//! namespace = "diag"
//! prefix_length = 3
//!
//! [output]
//! model_dir = "Model"
//! ```
//!
//! ## Module Structure
//!
//! - [`config`] - Configuration structures and loading
//! - [`tokenizer`] - Note tokenization
//! - [`corpus`] - Note directory listing and reading
//! - [`vocab`] - Frequency tables and the token vocabulary
//! - [`codes`] - Coded table indexing
//! - [`code_vocab`] - Code vocabulary
//! - [`assemble`] - Dataset assembly and matrices
//! - [`split`] - Train/test split
//! - [`evaluate`] - Multi-label metrics and results file
//! - [`save`] - Artifact persistence and matrix loading
//! - [`pipeline`] - Stage orchestration
//! - `cli` - Command-line interface (feature `cli`)

pub mod assemble;
#[cfg(feature = "cli")]
pub mod cli;
pub mod code_vocab;
pub mod codes;
pub mod config;
pub mod corpus;
pub mod evaluate;
pub mod pipeline;
pub mod save;
pub mod split;
pub mod tokenizer;
pub mod vocab;

pub use assemble::{Dataset, DatasetAssembler, Vectorization};
pub use code_vocab::{CodeVocabulary, CodeVocabularyBuilder};
pub use codes::{Code, CodeIndexer, ShortCodePolicy, SubjectCodeSet};
pub use config::Config;
pub use corpus::Corpus;
pub use evaluate::Report;
pub use pipeline::{build_dataset, evaluate_predictions, BuildOutput};
pub use tokenizer::{TokenMode, Tokenizer};
pub use vocab::{TokenVocabulary, VocabularyBuilder};
