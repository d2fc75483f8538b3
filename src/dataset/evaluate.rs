//! Multi-label evaluation and results reporting.
//!
//! Scores follow the usual multi-label conventions: macro averages the
//! per-label scores, micro scores the counts pooled over all labels, weighted
//! averages per-label scores by support. Any ratio with a zero denominator is
//! 0, so a label that is never true and never predicted scores 0.

use std::fmt::Write as _;
use std::io::Write;

use ndarray::{Array2, Zip};
use serde::Serialize;

use super::code_vocab::CodeVocabulary;
use crate::error::{PipelineError, Result};

/// Probabilities at or above this value are positive predictions.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Turn a probability matrix into an indicator matrix.
pub fn binarize(probabilities: &Array2<f64>) -> Array2<u8> {
    probabilities.mapv(|p| u8::from(p >= DECISION_THRESHOLD))
}

/// Per-label counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl Confusion {
    /// Number of true positives in the gold labels.
    pub fn support(&self) -> u64 {
        self.true_positives + self.false_negatives
    }

    fn add(&mut self, other: &Confusion) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }

    pub fn scores(&self) -> Scores {
        let tp = self.true_positives as f64;
        let precision = ratio(tp, tp + self.false_positives as f64);
        let recall = ratio(tp, tp + self.false_negatives as f64);
        Scores {
            precision,
            recall,
            f1: ratio(2.0 * precision * recall, precision + recall),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Precision, recall and F1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Scores for one code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelReport {
    pub code: String,
    pub counts: Confusion,
    pub scores: Scores,
}

/// Evaluation of a prediction matrix against gold labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub examples: usize,
    pub labels: Vec<LabelReport>,
    #[serde(rename = "macro")]
    pub macro_avg: Scores,
    #[serde(rename = "micro")]
    pub micro_avg: Scores,
    #[serde(rename = "weighted")]
    pub weighted_avg: Scores,
}

/// Score `predicted` against `truth`; label columns follow `codes`.
///
/// Any non-zero entry counts as a positive.
///
/// # Errors
///
/// Returns [`PipelineError::ShapeMismatch`] if the matrices differ in shape
/// or their column count differs from the vocabulary size.
pub fn report(truth: &Array2<u8>, predicted: &Array2<u8>, codes: &CodeVocabulary) -> Result<Report> {
    if truth.dim() != predicted.dim() {
        return Err(PipelineError::ShapeMismatch {
            what: "predicted labels",
            expected: truth.dim(),
            actual: predicted.dim(),
        });
    }
    if truth.ncols() != codes.len() {
        return Err(PipelineError::ShapeMismatch {
            what: "label columns",
            expected: (truth.nrows(), codes.len()),
            actual: truth.dim(),
        });
    }

    let mut labels = Vec::with_capacity(codes.len());
    let mut pooled = Confusion::default();
    for (column, code) in codes.codes().iter().enumerate() {
        let mut counts = Confusion::default();
        Zip::from(truth.column(column))
            .and(predicted.column(column))
            .for_each(|&t, &p| match (t != 0, p != 0) {
                (true, true) => counts.true_positives += 1,
                (false, true) => counts.false_positives += 1,
                (true, false) => counts.false_negatives += 1,
                (false, false) => {}
            });
        pooled.add(&counts);
        labels.push(LabelReport {
            code: code.to_string(),
            counts,
            scores: counts.scores(),
        });
    }

    Ok(Report {
        examples: truth.nrows(),
        macro_avg: macro_average(&labels),
        micro_avg: pooled.scores(),
        weighted_avg: weighted_average(&labels),
        labels,
    })
}

fn macro_average(labels: &[LabelReport]) -> Scores {
    let n = labels.len() as f64;
    if labels.is_empty() {
        return Scores::default();
    }
    Scores {
        precision: labels.iter().map(|l| l.scores.precision).sum::<f64>() / n,
        recall: labels.iter().map(|l| l.scores.recall).sum::<f64>() / n,
        f1: labels.iter().map(|l| l.scores.f1).sum::<f64>() / n,
    }
}

fn weighted_average(labels: &[LabelReport]) -> Scores {
    let total: u64 = labels.iter().map(|l| l.counts.support()).sum();
    if total == 0 {
        return Scores::default();
    }
    let weigh = |score: fn(&Scores) -> f64| {
        labels
            .iter()
            .map(|l| score(&l.scores) * l.counts.support() as f64)
            .sum::<f64>()
            / total as f64
    };
    Scores {
        precision: weigh(|s| s.precision),
        recall: weigh(|s| s.recall),
        f1: weigh(|s| s.f1),
    }
}

impl Report {
    /// Write the results file: `macro|<f1>` then `<code>|<f1>` per label.
    pub fn write_results<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "macro|{:?}", self.macro_avg.f1)?;
        for label in &self.labels {
            writeln!(out, "{}|{:?}", label.code, label.scores.f1)?;
        }
        out.flush()
    }

    /// Aggregate rows formatted for the terminal.
    pub fn summary(&self) -> String {
        let mut text = String::new();
        for (name, scores) in [
            ("macro", &self.macro_avg),
            ("micro", &self.micro_avg),
            ("weighted", &self.weighted_avg),
        ] {
            let _ = writeln!(
                text,
                "{name:>8}: precision: {:.3} - recall: {:.3} - f1: {:.3}",
                scores.precision, scores.recall, scores.f1
            );
        }
        text
    }
}
