//! Coded-event indexing.
//!
//! Each coded table (diagnoses, procedures, billing events, ...) contributes
//! codes to a shared per-subject set. A raw code is shortened to the
//! namespace's prefix length and tagged with the namespace, so `250.00` from
//! the diagnosis table becomes `diag_250`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::CodeSource;
use crate::error::{PipelineError, Result};

/// Values treated as missing: the default null markers of `pandas.read_csv`.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A namespaced, truncated code such as `diag_250`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Code {
    namespace: String,
    prefix: String,
}

impl Code {
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Code {
            namespace: namespace.into(),
            prefix: prefix.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.prefix)
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.to_string()
    }
}

impl TryFrom<String> for Code {
    type Error = String;

    /// Splits at the first `_`; namespaces never contain one.
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.split_once('_') {
            Some((namespace, prefix)) if !namespace.is_empty() && !prefix.is_empty() => {
                Ok(Code::new(namespace, prefix))
            }
            _ => Err(format!("invalid code {s:?}: expected <namespace>_<prefix>")),
        }
    }
}

/// What to do with a raw code shorter than its namespace prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortCodePolicy {
    /// Keep the whole raw code as the prefix, unpadded.
    #[default]
    Keep,
    /// Drop the row.
    Skip,
    /// Abort with [`PipelineError::MalformedCode`].
    Reject,
}

/// Subject identifier to deduplicated code set.
///
/// Subjects are remembered in first-seen order; this order (with codes sorted
/// inside each subject) is the traversal used for code-frequency tie-breaks.
#[derive(Debug, Clone, Default)]
pub struct SubjectCodeSet {
    subjects: Vec<String>,
    codes: HashMap<String, BTreeSet<Code>>,
    namespaces: Vec<String>,
}

impl SubjectCodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subject: &str, code: Code) {
        match self.codes.get_mut(subject) {
            Some(set) => {
                set.insert(code);
            }
            None => {
                self.subjects.push(subject.to_string());
                self.codes.insert(subject.to_string(), BTreeSet::from([code]));
            }
        }
    }

    pub fn codes(&self, subject: &str) -> Option<&BTreeSet<Code>> {
        self.codes.get(subject)
    }

    /// Subjects and their codes in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<Code>)> {
        self.subjects
            .iter()
            .map(move |subject| (subject.as_str(), &self.codes[subject]))
    }

    /// Namespaces indexed so far, in indexing order.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    fn note_namespace(&mut self, namespace: &str) {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
    }
}

/// Per-table indexing counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub namespace: String,
    /// Data rows read
    pub rows: u64,
    /// Rows that contributed a code
    pub indexed: u64,
    pub missing_subject: u64,
    pub missing_code: u64,
    /// Short codes kept under [`ShortCodePolicy::Keep`]
    pub short_kept: u64,
    /// Short codes dropped under [`ShortCodePolicy::Skip`]
    pub short_skipped: u64,
}

/// Reads coded tables into a [`SubjectCodeSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeIndexer {
    policy: ShortCodePolicy,
}

impl CodeIndexer {
    pub fn new(policy: ShortCodePolicy) -> Self {
        CodeIndexer { policy }
    }

    /// Index one CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CodeTable`] if the file cannot be opened or
    /// parsed or lacks a configured column, and
    /// [`PipelineError::MalformedCode`] under [`ShortCodePolicy::Reject`].
    pub fn index_path(
        &self,
        path: &Path,
        source: &CodeSource,
        codes: &mut SubjectCodeSet,
    ) -> Result<IndexStats> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::CodeTable {
            table: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.index(&path.display().to_string(), file, source, codes)
    }

    /// Index CSV rows from any reader into `codes`.
    ///
    /// Rows with a missing subject or code are skipped and counted. Repeated
    /// calls against the same set merge into it.
    pub fn index<R: Read>(
        &self,
        table: &str,
        reader: R,
        source: &CodeSource,
        codes: &mut SubjectCodeSet,
    ) -> Result<IndexStats> {
        let table_error = |reason: String| PipelineError::CodeTable {
            table: table.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers().map_err(|e| table_error(e.to_string()))?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| table_error(format!("missing column {name:?}")))
        };
        let subject_idx = column(&source.subject_column)?;
        let code_idx = column(&source.code_column)?;

        codes.note_namespace(&source.namespace);
        let mut stats = IndexStats {
            namespace: source.namespace.clone(),
            ..IndexStats::default()
        };

        for (i, record) in rdr.records().enumerate() {
            let row = i as u64 + 1;
            let record = record.map_err(|e| table_error(format!("row {row}: {e}")))?;
            stats.rows += 1;

            let Some(subject) = present(record.get(subject_idx)) else {
                stats.missing_subject += 1;
                continue;
            };
            let Some(raw_code) = present(record.get(code_idx)) else {
                stats.missing_code += 1;
                continue;
            };

            let prefix: String = raw_code.chars().take(source.prefix_length).collect();
            if prefix.chars().count() < source.prefix_length {
                match self.policy {
                    ShortCodePolicy::Keep => {
                        debug!(table, row, code = raw_code, "keeping short code");
                        stats.short_kept += 1;
                    }
                    ShortCodePolicy::Skip => {
                        stats.short_skipped += 1;
                        continue;
                    }
                    ShortCodePolicy::Reject => {
                        return Err(PipelineError::MalformedCode {
                            table: table.to_string(),
                            row,
                            code: raw_code.to_string(),
                            prefix_length: source.prefix_length,
                        });
                    }
                }
            }

            codes.insert(subject, Code::new(source.namespace.as_str(), prefix));
            stats.indexed += 1;
        }

        if stats.short_kept > 0 {
            warn!(
                table,
                count = stats.short_kept,
                prefix_length = source.prefix_length,
                "codes shorter than the prefix length were kept unpadded"
            );
        }
        info!(
            table,
            namespace = %source.namespace,
            rows = stats.rows,
            indexed = stats.indexed,
            missing_subject = stats.missing_subject,
            missing_code = stats.missing_code,
            "coded table indexed"
        );
        Ok(stats)
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !MISSING_MARKERS.contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(namespace: &str, prefix_length: usize) -> CodeSource {
        CodeSource {
            file: PathBuf::from("table.csv"),
            subject_column: "HADM_ID".to_string(),
            code_column: "ICD9_CODE".to_string(),
            namespace: namespace.to_string(),
            prefix_length,
        }
    }

    fn index(
        policy: ShortCodePolicy,
        csv: &str,
        src: &CodeSource,
        codes: &mut SubjectCodeSet,
    ) -> Result<IndexStats> {
        CodeIndexer::new(policy).index("table.csv", csv.as_bytes(), src, codes)
    }

    #[test]
    fn test_diag_prefix_scenario() {
        let mut codes = SubjectCodeSet::new();
        let csv = "ROW_ID,HADM_ID,ICD9_CODE\n1,S1,250.00\n2,S2,401.9\n";
        index(ShortCodePolicy::Keep, csv, &source("diag", 3), &mut codes).expect("index");

        let s1 = codes.codes("S1").expect("S1 indexed");
        assert_eq!(s1.len(), 1);
        assert_eq!(s1.iter().next().map(ToString::to_string), Some("diag_250".to_string()));
        assert_eq!(codes.len(), 2);
    }

    #[test]
    fn test_missing_values_skipped() {
        let mut codes = SubjectCodeSet::new();
        let csv = "HADM_ID,ICD9_CODE\n,4019\nS1,\nS1,NaN\nS2,4280\nS3\n";
        let stats =
            index(ShortCodePolicy::Keep, csv, &source("diag", 3), &mut codes).expect("index");
        assert_eq!(stats.rows, 5);
        assert_eq!(stats.missing_subject, 1);
        assert_eq!(stats.missing_code, 3);
        assert_eq!(stats.indexed, 1);
        assert!(codes.codes("S1").is_none());
    }

    #[test]
    fn test_every_null_marker_is_missing() {
        let mut csv = String::from("HADM_ID,ICD9_CODE\n");
        for marker in MISSING_MARKERS {
            csv.push_str(&format!("S1,\"{marker}\"\n"));
            csv.push_str(&format!("\"{marker}\",4019\n"));
        }
        csv.push_str("S2,#NAB\n");

        let mut codes = SubjectCodeSet::new();
        let stats =
            index(ShortCodePolicy::Keep, &csv, &source("diag", 3), &mut codes).expect("index");
        assert_eq!(stats.missing_code, MISSING_MARKERS.len() as u64);
        assert_eq!(stats.missing_subject, MISSING_MARKERS.len() as u64);
        assert_eq!(stats.indexed, 1);
        assert!(codes.codes("S1").is_none());
        assert!(codes.codes("S2").expect("S2").contains(&Code::new("diag", "#NA")));
    }

    #[test]
    fn test_namespaces_keep_equal_prefixes_distinct() {
        let mut codes = SubjectCodeSet::new();
        index(
            ShortCodePolicy::Keep,
            "HADM_ID,ICD9_CODE\nS1,3893\n",
            &source("diag", 2),
            &mut codes,
        )
        .expect("diag");
        index(
            ShortCodePolicy::Keep,
            "HADM_ID,ICD9_CODE\nS1,3891\nS1,3895\n",
            &source("proc", 2),
            &mut codes,
        )
        .expect("proc");

        let s1: Vec<String> = codes
            .codes("S1")
            .expect("S1")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(s1, vec!["diag_38", "proc_38"]);
        assert_eq!(codes.namespaces(), &["diag".to_string(), "proc".to_string()]);
    }

    #[test]
    fn test_short_code_policies() {
        let csv = "HADM_ID,ICD9_CODE\nS1,25\nS2,2500\n";

        let mut codes = SubjectCodeSet::new();
        let stats =
            index(ShortCodePolicy::Keep, csv, &source("diag", 3), &mut codes).expect("keep");
        assert_eq!(stats.short_kept, 1);
        assert!(codes.codes("S1").expect("S1").contains(&Code::new("diag", "25")));

        let mut codes = SubjectCodeSet::new();
        let stats =
            index(ShortCodePolicy::Skip, csv, &source("diag", 3), &mut codes).expect("skip");
        assert_eq!(stats.short_skipped, 1);
        assert!(codes.codes("S1").is_none());

        let mut codes = SubjectCodeSet::new();
        let err = index(ShortCodePolicy::Reject, csv, &source("diag", 3), &mut codes)
            .expect_err("reject");
        assert!(matches!(err, PipelineError::MalformedCode { row: 1, .. }));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let mut codes = SubjectCodeSet::new();
        let err = index(
            ShortCodePolicy::Keep,
            "SUBJECT_ID,ICD9_CODE\n1,250\n",
            &source("diag", 3),
            &mut codes,
        )
        .expect_err("missing column");
        assert!(matches!(err, PipelineError::CodeTable { .. }));
    }

    #[test]
    fn test_subjects_in_first_seen_order() {
        let mut codes = SubjectCodeSet::new();
        index(
            ShortCodePolicy::Keep,
            "HADM_ID,ICD9_CODE\nS9,4019\nS1,4019\nS9,2500\n",
            &source("diag", 3),
            &mut codes,
        )
        .expect("index");
        let order: Vec<&str> = codes.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["S9", "S1"]);
        assert_eq!(codes.codes("S9").map(BTreeSet::len), Some(2));
    }

    #[test]
    fn test_code_string_round_trip() {
        let code = Code::new("cpt", "99213");
        let json = serde_json::to_string(&code).expect("serialize");
        assert_eq!(json, "\"cpt_99213\"");
        let back: Code = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, code);
        assert!(Code::try_from("nounderscore".to_string()).is_err());
    }
}
