//! Artifact persistence.
//!
//! A build writes every artifact into a staging directory next to the model
//! directory and swaps it into place only when all files were written, so a
//! failed run never leaves a half-updated model directory behind.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use super::assemble::Dataset;
use super::config::OutputConfig;
use super::evaluate::Report;
use super::pipeline::BuildOutput;
use super::vocab::FrequencyTable;
use crate::error::{PipelineError, Result};

/// One line of the dataset export.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    document: &'a str,
    subject: &'a str,
    split: &'a str,
    token_ids: &'a [u32],
    /// Label column ids with a set bit
    labels: Vec<usize>,
}

/// Write every build artifact and replace the model directory.
///
/// # Errors
///
/// Returns [`PipelineError::Artifact`] naming the file that failed. The
/// previous model directory is left untouched in that case. A model
/// directory without a final name (`.`, `..`, `/`) is refused up front.
pub fn save_build(build: &BuildOutput, output: &OutputConfig) -> Result<()> {
    let staging = staging_dir(&output.model_dir)?;
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| PipelineError::artifact(&staging, e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| PipelineError::artifact(&staging, e))?;

    if let Err(e) = write_build(build, output, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if output.model_dir.exists() {
        info!(dir = %output.model_dir.display(), "removing old model directory");
        std::fs::remove_dir_all(&output.model_dir)
            .map_err(|e| PipelineError::artifact(&output.model_dir, e))?;
    }
    std::fs::rename(&staging, &output.model_dir)
        .map_err(|e| PipelineError::artifact(&output.model_dir, e))?;

    info!(dir = %output.model_dir.display(), "artifacts saved");
    Ok(())
}

fn staging_dir(model_dir: &Path) -> Result<PathBuf> {
    let mut name = model_dir
        .file_name()
        .ok_or_else(|| PipelineError::artifact(model_dir, "model directory has no name"))?
        .to_os_string();
    name.push(".partial");
    Ok(model_dir.with_file_name(name))
}

fn write_build(build: &BuildOutput, output: &OutputConfig, dir: &Path) -> Result<()> {
    write_frequency_table(&dir.join(&output.alphabet_file), &build.tokens.frequencies)?;
    build
        .tokens
        .vocabulary
        .save(&dir.join(&output.alphabet_snapshot))?;
    write_frequency_table(&dir.join(&output.code_freq_file), &build.codes.frequencies)?;
    build.codes.vocabulary.save(&dir.join(&output.code_vocab_file))?;
    write_dataset(
        &dir.join(&output.dataset_file),
        &[("train", &build.train), ("test", &build.test)],
    )?;
    write_label_matrix(&dir.join(&output.test_labels_file), &build.test.label_matrix())
}

/// Write a `<key>|<count>` frequency table.
pub fn write_frequency_table<K: Display>(path: &Path, table: &FrequencyTable<K>) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::artifact(path, e))?;
    table
        .write_to(BufWriter::new(file))
        .map_err(|e| PipelineError::artifact(path, e))
}

/// Write labelled dataset parts as JSON lines, one example per line.
pub fn write_dataset(path: &Path, parts: &[(&str, &Dataset)]) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::artifact(path, e))?;
    let mut out = BufWriter::new(file);
    for (split, dataset) in parts {
        for example in dataset.examples() {
            let row = ExportRow {
                document: &example.document,
                subject: &example.subject,
                split,
                token_ids: &example.token_ids,
                labels: example.label_ids().collect(),
            };
            serde_json::to_writer(&mut out, &row).map_err(|e| PipelineError::artifact(path, e))?;
            out.write_all(b"\n")
                .map_err(|e| PipelineError::artifact(path, e))?;
        }
    }
    out.flush().map_err(|e| PipelineError::artifact(path, e))
}

/// Write a 0/1 matrix as headerless CSV.
pub fn write_label_matrix(path: &Path, matrix: &Array2<u8>) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| PipelineError::artifact(path, e))?;
    for row in matrix.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| PipelineError::artifact(path, e))?;
    }
    wtr.flush().map_err(|e| PipelineError::artifact(path, e))
}

/// Write the results file and the JSON report into `dir`.
///
/// Returns the two paths written.
pub fn save_report(report: &Report, output: &OutputConfig, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::artifact(dir, e))?;

    let results_path = dir.join(&output.results_file);
    let file = File::create(&results_path).map_err(|e| PipelineError::artifact(&results_path, e))?;
    report
        .write_results(BufWriter::new(file))
        .map_err(|e| PipelineError::artifact(&results_path, e))?;

    let report_path = dir.join(&output.report_file);
    let json =
        serde_json::to_string_pretty(report).map_err(|e| PipelineError::artifact(&report_path, e))?;
    std::fs::write(&report_path, json).map_err(|e| PipelineError::artifact(&report_path, e))?;

    Ok((results_path, report_path))
}

/// Read a headerless CSV of 0/1 labels.
pub fn load_label_matrix(path: &Path) -> Result<Array2<u8>> {
    load_matrix(path)
}

/// Read a headerless CSV of probabilities.
pub fn load_probability_matrix(path: &Path) -> Result<Array2<f64>> {
    load_matrix(path)
}

fn load_matrix<T>(path: &Path) -> Result<Array2<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let matrix_error = |row: usize, reason: String| PipelineError::Matrix {
        path: path.to_path_buf(),
        row,
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| PipelineError::artifact(path, e))?;

    let mut values = Vec::new();
    let mut ncols = None;
    let mut nrows = 0;
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| matrix_error(row, e.to_string()))?;
        match ncols {
            None => ncols = Some(record.len()),
            Some(n) if n != record.len() => {
                return Err(matrix_error(row, format!("expected {n} columns, got {}", record.len())));
            }
            Some(_) => {}
        }
        for field in record.iter() {
            let value = field
                .trim()
                .parse::<T>()
                .map_err(|e| matrix_error(row, format!("{field:?}: {e}")))?;
            values.push(value);
        }
        nrows += 1;
    }

    let shape = (nrows, ncols.unwrap_or(0));
    Array2::from_shape_vec(shape, values).map_err(|e| PipelineError::artifact(path, e))
}
