//! Merging outcomes back into the reference manifest

use crate::corpus::{Manifest, ReferenceRow};
use crate::error::{DecodeError, Result};
use crate::outcome::BatchOutcomes;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder written when a row has no usable outcome
pub const SENTINEL: &str = "Null";

/// Columns appended to the manifest header
pub const APPENDED_COLUMNS: [&str; 2] = ["generated_text", "duration"];

/// How a merged row got its values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// A successful transcription
    Transcribed,
    /// A failed attempt: an error marker, or the sentinel for an unusable body
    Errored,
    /// No outcome recorded for the row; both columns hold the sentinel
    Unmatched,
}

/// A reference row extended with the two appended columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub reference: ReferenceRow,
    pub generated_text: String,
    pub duration: String,
    pub kind: MatchKind,
}

impl MergedRow {
    /// Output record: original fields followed by the appended columns
    pub fn record(&self) -> Vec<&str> {
        self.reference
            .fields
            .iter()
            .map(String::as_str)
            .chain([self.generated_text.as_str(), self.duration.as_str()])
            .collect()
    }
}

/// Counts for one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub rows: usize,
    pub transcribed: usize,
    pub errored: usize,
    pub unmatched: usize,
    pub destination: PathBuf,
}

/// Header of the merged dataset
pub fn merged_header(header: &[String]) -> Vec<String> {
    header
        .iter()
        .cloned()
        .chain(APPENDED_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

/// Pair every reference row with its outcome, looked up by filename.
///
/// The output has one row per input row, in input order.
pub fn merge_rows(rows: &[ReferenceRow], outcomes: &BatchOutcomes) -> Vec<MergedRow> {
    rows.iter()
        .map(|row| {
            let sentinel = || (SENTINEL.to_string(), SENTINEL.to_string());
            let (values, kind) = match outcomes.get(&row.filename) {
                None => (sentinel(), MatchKind::Unmatched),
                Some(outcome) => match outcome.merged_values() {
                    Some(values) if outcome.is_success() => (values, MatchKind::Transcribed),
                    Some(values) => (values, MatchKind::Errored),
                    None => (sentinel(), MatchKind::Errored),
                },
            };
            MergedRow {
                reference: row.clone(),
                generated_text: values.0,
                duration: values.1,
                kind,
            }
        })
        .collect()
}

/// Re-reads the manifest, merges outcomes into it and persists the result
#[derive(Debug, Clone)]
pub struct ResultMerger {
    manifest_path: PathBuf,
    output_path: Option<PathBuf>,
}

impl ResultMerger {
    /// Merge back over `manifest_path` itself
    pub fn new<P: Into<PathBuf>>(manifest_path: P) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            output_path: None,
        }
    }

    /// Write the merged dataset to `path` instead of over the manifest
    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn destination(&self) -> &Path {
        self.output_path.as_deref().unwrap_or(&self.manifest_path)
    }

    pub fn merge(&self, outcomes: &BatchOutcomes) -> Result<MergeSummary> {
        let manifest = Manifest::load(&self.manifest_path)?;
        if outcomes.is_empty() {
            warn!("No transcription outcomes to merge; every row gets {}", SENTINEL);
        }
        let merged = merge_rows(&manifest.rows, outcomes);
        let destination = self.destination();

        info!("Writing results to: {}", destination.display());
        write_atomic(destination, &merged_header(&manifest.header), &merged)?;

        let count = |kind: MatchKind| merged.iter().filter(|row| row.kind == kind).count();
        let summary = MergeSummary {
            rows: merged.len(),
            transcribed: count(MatchKind::Transcribed),
            errored: count(MatchKind::Errored),
            unmatched: count(MatchKind::Unmatched),
            destination: destination.to_path_buf(),
        };
        info!(
            "Wrote {} rows ({} transcribed, {} errored, {} without outcome)",
            summary.rows, summary.transcribed, summary.errored, summary.unmatched
        );
        Ok(summary)
    }
}

/// Write header and rows to `target` through a sibling temporary file.
///
/// The rename is the only change readers of `target` can observe; on any failure
/// the temporary file is removed and `target` is left as it was.
pub fn write_atomic(target: &Path, header: &[String], rows: &[MergedRow]) -> Result<()> {
    let temp_path = temp_path_for(target)?;
    debug!("Writing merged dataset to temporary file {:?}", temp_path);

    let result = write_csv(&temp_path, header, rows).and_then(|()| {
        std::fs::rename(&temp_path, target).map_err(|e| persistence(target, e))
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| DecodeError::Persistence {
        path: target.to_path_buf(),
        message: "target has no file name".to_string(),
    })?;
    let mut temp_name = name.to_os_string();
    temp_name.push(".tmp");
    Ok(target.with_file_name(temp_name))
}

fn write_csv(path: &Path, header: &[String], rows: &[MergedRow]) -> Result<()> {
    let file = File::create(path).map_err(|e| persistence(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    writer
        .write_record(header)
        .map_err(|e| persistence(path, e))?;
    for row in rows {
        writer
            .write_record(row.record())
            .map_err(|e| persistence(path, e))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| persistence(path, e.error()))?;
    file.sync_all().map_err(|e| persistence(path, e))
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Persistence {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutcomeError;
    use crate::outcome::{Transcription, TranscriptionOutcome};
    use pretty_assertions::assert_eq;

    fn row(fields: &[&str]) -> ReferenceRow {
        ReferenceRow {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            filename: crate::corpus::base_filename(fields[0]),
        }
    }

    fn success(filename: &str, text: &str, duration: &str) -> TranscriptionOutcome {
        TranscriptionOutcome {
            filename: filename.to_string(),
            result: Ok(Transcription {
                text: text.to_string(),
                duration: duration.to_string(),
            }),
        }
    }

    fn failure(filename: &str, err: OutcomeError) -> TranscriptionOutcome {
        TranscriptionOutcome {
            filename: filename.to_string(),
            result: Err(err),
        }
    }

    #[test]
    fn test_matches_by_filename_not_position() {
        let rows = vec![row(&["cv/a.mp3", "x"]), row(&["cv/b.mp3", "y"])];
        // Completion order is the reverse of manifest order
        let outcomes: BatchOutcomes = vec![
            success("b.mp3", "bee", "2.0"),
            success("a.mp3", "ay", "1.0"),
        ]
        .into_iter()
        .collect();

        let merged = merge_rows(&rows, &outcomes);
        assert_eq!(merged[0].record(), vec!["cv/a.mp3", "x", "ay", "1.0"]);
        assert_eq!(merged[1].record(), vec!["cv/b.mp3", "y", "bee", "2.0"]);
    }

    #[test]
    fn test_sentinels_and_markers() {
        let rows = vec![
            row(&["a.mp3"]),
            row(&["b.mp3"]),
            row(&["c.mp3"]),
            row(&["d.mp3"]),
        ];
        let outcomes: BatchOutcomes = vec![
            failure("a.mp3", OutcomeError::Status(500)),
            failure("b.mp3", OutcomeError::MalformedBody("missing field".into())),
            failure("c.mp3", OutcomeError::Timeout),
        ]
        .into_iter()
        .collect();

        let merged = merge_rows(&rows, &outcomes);
        assert_eq!(merged[0].record(), vec!["a.mp3", "Error: 500", "Error: 500"]);
        assert_eq!(merged[0].kind, MatchKind::Errored);
        assert_eq!(merged[1].record(), vec!["b.mp3", "Null", "Null"]);
        assert_eq!(merged[1].kind, MatchKind::Errored);
        assert_eq!(merged[2].record(), vec!["c.mp3", "Error: timeout", "Error: timeout"]);
        assert_eq!(merged[3].record(), vec!["d.mp3", "Null", "Null"]);
        assert_eq!(merged[3].kind, MatchKind::Unmatched);
    }

    #[test]
    fn test_merged_header() {
        let header = vec!["filename".to_string(), "text".to_string()];
        assert_eq!(
            merged_header(&header),
            vec!["filename", "text", "generated_text", "duration"]
        );
    }

    #[test]
    fn test_temp_path_sits_next_to_target() {
        let temp = temp_path_for(Path::new("/data/cv-valid-dev.csv")).unwrap();
        assert_eq!(temp, PathBuf::from("/data/cv-valid-dev.csv.tmp"));
    }

    #[test]
    fn test_failed_write_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.csv");
        std::fs::write(&manifest, "filename\na.mp3\n").unwrap();

        let merger = ResultMerger::new(&manifest).with_output(dir.path().join("missing/out.csv"));
        let err = merger.merge(&BatchOutcomes::new()).unwrap_err();

        assert!(matches!(err, DecodeError::Persistence { .. }));
        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            "filename\na.mp3\n"
        );
    }

    #[test]
    fn test_in_place_merge_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.csv");
        std::fs::write(&manifest, "filename,text\na.mp3,\"hello, world\"\n").unwrap();

        let outcomes: BatchOutcomes = vec![success("a.mp3", "hello world", "1.5")]
            .into_iter()
            .collect();
        let summary = ResultMerger::new(&manifest).merge(&outcomes).unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(summary.transcribed, 1);
        assert_eq!(summary.destination, manifest);
        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            "filename,text,generated_text,duration\na.mp3,\"hello, world\",hello world,1.5\n"
        );
        assert!(!dir.path().join("m.csv.tmp").exists());
    }

    #[test]
    fn test_summary_counts_unusable_body_as_errored() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.csv");
        std::fs::write(&manifest, "filename\na.mp3\nb.mp3\nc.mp3\n").unwrap();

        let outcomes: BatchOutcomes = vec![
            success("a.mp3", "hi", "1.0"),
            failure("b.mp3", OutcomeError::MalformedBody("expected value".into())),
        ]
        .into_iter()
        .collect();
        let summary = ResultMerger::new(&manifest).merge(&outcomes).unwrap();

        assert_eq!(summary.transcribed, 1);
        assert_eq!(summary.errored, outcomes.failed());
        assert_eq!(summary.unmatched, 1);
        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            "filename,generated_text,duration\na.mp3,hi,1.0\nb.mp3,Null,Null\nc.mp3,Null,Null\n"
        );
    }
}
