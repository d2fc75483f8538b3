//! # Notecodes - Clinical Note Billing-Code Datasets
//!
//! Builds multi-label training data from free-text clinical notes and the
//! billing codes recorded for the same admissions, and scores the
//! predictions of any model trained on it.
//!
//! ## Features
//!
//! - **Frequency-thresholded vocabularies** for tokens and codes, with
//!   deterministic ids
//! - **Namespaced codes**: diagnosis, procedure and CPT codes truncated to
//!   configurable prefixes
//! - **Parallel tokenization** of large note directories
//! - **Reproducible splits** from a configured seed
//! - **Multi-label reports**: per-code F1 plus macro, micro and weighted
//!   averages
//!
//! ## Quick Start
//!
//! ```no_run
//! use notecodes::dataset::{build_dataset, Config};
//!
//! fn main() -> Result<(), notecodes::PipelineError> {
//!     let config = Config::load("config.toml".as_ref())?;
//!     let build = build_dataset(&config, None)?;
//!
//!     let tokens = build.train.token_matrix(None);
//!     let labels = build.train.label_matrix();
//!     println!("{:?} -> {:?}", tokens.dim(), labels.dim());
//!     Ok(())
//! }
//! ```
//!
//! ## Artifacts
//!
//! `notecodes build` writes into the model directory:
//!
//! | File | Content |
//! |------|---------|
//! | `alphabet.txt` | `token\|count`, every observed token |
//! | `alphabet.json` | token vocabulary snapshot |
//! | `codes.txt` | `code\|subjects`, every observed code |
//! | `codes.json` | code vocabulary in label-column order |
//! | `dataset.jsonl` | one example per line with its split |
//! | `test_labels.csv` | label matrix of the held-out split |

pub mod dataset;
pub mod error;

pub use error::{PipelineError, Result};
