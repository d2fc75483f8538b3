//! End-to-end dataset build and prediction evaluation.
//!
//! The build runs its stages strictly in order: token vocabulary, code
//! index, code vocabulary, assembly, split. Each stage only sees the
//! finished output of the one before it, and nothing is written to disk
//! until the last stage has succeeded.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, info_span};

use super::assemble::{Dataset, DatasetAssembler};
use super::code_vocab::{CodeVocabulary, CodeVocabularyBuild, CodeVocabularyBuilder};
use super::codes::{CodeIndexer, IndexStats, SubjectCodeSet};
use super::config::Config;
use super::corpus::Corpus;
use super::evaluate::{binarize, report, Report};
use super::save::{load_label_matrix, load_probability_matrix, save_report};
use super::split::train_test_split;
use super::tokenizer::Tokenizer;
use super::vocab::{TokenVocabularyBuild, VocabularyBuilder};
use crate::error::Result;

/// Everything a build produces, ready to be saved.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub tokens: TokenVocabularyBuild,
    /// One entry per configured source, in configuration order
    pub index_stats: Vec<IndexStats>,
    pub subjects: usize,
    pub codes: CodeVocabularyBuild,
    /// Full assembled dataset before splitting
    pub dataset: Dataset,
    pub train: Dataset,
    pub test: Dataset,
}

impl BuildOutput {
    /// One-paragraph summary for the terminal.
    pub fn summary(&self) -> String {
        let stats = self.dataset.stats();
        format!(
            "documents: {} | retained: {} | skipped: {}\n\
             tokens: {} observed, {} kept (features: {})\n\
             codes: {} observed over {} subjects, {} kept\n\
             train: {} | test: {}",
            stats.documents,
            stats.retained,
            stats.skipped(),
            self.tokens.frequencies.len(),
            self.tokens.vocabulary.len(),
            self.dataset.num_features(),
            self.codes.frequencies.len(),
            self.subjects,
            self.codes.vocabulary.len(),
            self.train.len(),
            self.test.len(),
        )
    }
}

/// Run every build stage for `config`.
///
/// Relative data paths resolve against `data_root` when one is given.
///
/// # Errors
///
/// Returns [`crate::error::PipelineError::Config`] before any stage runs if
/// the model directory holds a build input; otherwise propagates the first
/// stage error.
pub fn build_dataset(config: &Config, data_root: Option<&Path>) -> Result<BuildOutput> {
    config.check_model_dir(data_root)?;
    let args = &config.args;
    let tokenizer = Tokenizer::new(args.token_mode, args.max_tokens_in_file);

    let corpus = {
        let _span = info_span!("corpus").entered();
        Corpus::open(&config.corpus_path(data_root))?
    };
    let tokenized = corpus.tokenize_all(&tokenizer)?;

    let tokens = {
        let _span = info_span!("token_vocabulary").entered();
        VocabularyBuilder::new(tokenizer, args.min_token_freq).build_from_tokens(&tokenized)
    };

    let mut subjects = SubjectCodeSet::new();
    let mut index_stats = Vec::with_capacity(config.sources.len());
    {
        let _span = info_span!("code_index").entered();
        let indexer = CodeIndexer::new(args.short_code_policy);
        for source in &config.sources {
            let path = config.source_path(data_root, source);
            index_stats.push(indexer.index_path(&path, source, &mut subjects)?);
        }
    }

    let codes = {
        let _span = info_span!("code_vocabulary").entered();
        CodeVocabularyBuilder::new(args.min_examples_per_code).build(&subjects)
    };

    let dataset = {
        let _span = info_span!("assemble").entered();
        DatasetAssembler::new(tokenizer, args.vectorization)
            .with_maxlen(args.maxlen)
            .assemble_tokenized(
                corpus.documents(),
                &tokenized,
                &tokens.vocabulary,
                &subjects,
                &codes.vocabulary,
            )?
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (train, test) = train_test_split(&dataset, args.test_size, &mut rng);
    info!(
        train = train.len(),
        test = test.len(),
        seed = args.seed,
        "dataset split"
    );

    Ok(BuildOutput {
        tokens,
        index_stats,
        subjects: subjects.len(),
        codes,
        dataset,
        train,
        test,
    })
}

/// Score externally produced probabilities against gold labels.
///
/// Label columns follow the code vocabulary saved in the model directory.
/// The results file and JSON report are written next to it.
///
/// # Errors
///
/// Fails if the vocabulary or either matrix cannot be read, or if the
/// matrix shapes disagree.
pub fn evaluate_predictions(config: &Config, labels: &Path, probabilities: &Path) -> Result<Report> {
    let model_dir = &config.output.model_dir;
    let codes = CodeVocabulary::load(&model_dir.join(&config.output.code_vocab_file))?;
    let truth = load_label_matrix(labels)?;
    let predicted = binarize(&load_probability_matrix(probabilities)?);

    let report = report(&truth, &predicted, &codes)?;
    let (results, json) = save_report(&report, &config.output, model_dir)?;
    info!(
        examples = report.examples,
        labels = report.labels.len(),
        macro_f1 = report.macro_avg.f1,
        results = %results.display(),
        report = %json.display(),
        "evaluation written"
    );
    Ok(report)
}
