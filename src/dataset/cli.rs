//! Command-line interface for the dataset pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::config::Config;
use super::pipeline::{build_dataset, evaluate_predictions};
use super::save::save_build;
use crate::error::Result;

/// Build clinical-note datasets labelled with billing codes
#[derive(Parser, Debug)]
#[command(name = "notecodes", version, about)]
pub struct Cli {
    /// Log stage details and skipped documents
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build vocabularies and the labelled dataset, then save the artifacts
    Build {
        /// Pipeline configuration (TOML)
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Directory that relative corpus and code paths resolve against
        #[arg(long, env = "DATA_ROOT")]
        data_root: Option<PathBuf>,
    },
    /// Score predicted probabilities against true labels
    Evaluate {
        /// Pipeline configuration (TOML)
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Headerless CSV of 0/1 labels, one row per example
        #[arg(long)]
        labels: PathBuf,

        /// Headerless CSV of probabilities, same shape as the labels
        #[arg(long)]
        probabilities: PathBuf,
    },
}

/// Run one parsed command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build { config, data_root } => {
            let config = Config::load(&config)?;
            let build = build_dataset(&config, data_root.as_deref())?;
            save_build(&build, &config.output)?;

            println!("{}", build.summary());
            for stats in &build.index_stats {
                println!(
                    "  {}: {} rows, {} indexed, {} missing subject, {} missing code, {} short kept, {} short skipped",
                    stats.namespace,
                    stats.rows,
                    stats.indexed,
                    stats.missing_subject,
                    stats.missing_code,
                    stats.short_kept,
                    stats.short_skipped
                );
            }
            let skipped = build.dataset.stats();
            println!(
                "  skipped: {} too long, {} empty, {} unknown subject, {} no codes, {} only rare codes",
                skipped.too_long,
                skipped.empty_document,
                skipped.unknown_subject,
                skipped.empty_code_set,
                skipped.no_frequent_code
            );
            println!("Artifacts saved to {}", config.output.model_dir.display());
            Ok(())
        }
        Command::Evaluate {
            config,
            labels,
            probabilities,
        } => {
            let config = Config::load(&config)?;
            let report = evaluate_predictions(&config, &labels, &probabilities)?;
            println!("Evaluated {} examples over {} codes", report.examples, report.labels.len());
            print!("{}", report.summary());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from([
            "notecodes",
            "build",
            "--config",
            "run.toml",
            "--data-root",
            "/data/mimic",
        ])
        .expect("valid args");
        assert!(!cli.verbose);
        match cli.command {
            Command::Build { config, data_root } => {
                assert_eq!(config, PathBuf::from("run.toml"));
                assert_eq!(data_root, Some(PathBuf::from("/data/mimic")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_evaluate_verbose() {
        let cli = Cli::try_parse_from([
            "notecodes",
            "evaluate",
            "--labels",
            "y.csv",
            "--probabilities",
            "p.csv",
            "-v",
        ])
        .expect("valid args");
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Evaluate { .. }));
    }

    #[test]
    fn test_evaluate_requires_inputs() {
        assert!(Cli::try_parse_from(["notecodes", "evaluate", "--labels", "y.csv"]).is_err());
    }
}
