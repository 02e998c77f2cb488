//! Corpus validation: the working directory must hold every file the manifest names

use crate::error::{DecodeError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// One audio file scheduled for transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusItem {
    /// Basename of the file, used as the outcome key
    pub filename: String,
    /// Location on disk
    pub path: PathBuf,
}

/// One data row of the reference manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    /// Every column of the row, untouched and in original order
    pub fields: Vec<String>,
    /// Basename derived from the first column
    pub filename: String,
}

/// The reference manifest: a header row followed by data rows
#[derive(Debug, Clone)]
pub struct Manifest {
    pub header: Vec<String>,
    pub rows: Vec<ReferenceRow>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DecodeError::ManifestNotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => {
                return Err(DecodeError::Manifest(format!(
                    "{} has no header row",
                    path.display()
                )))
            }
        };

        let mut rows = Vec::new();
        for record in records {
            let fields: Vec<String> = record?.iter().map(str::to_string).collect();
            let filename = fields.first().map(|f| base_filename(f)).unwrap_or_default();
            rows.push(ReferenceRow { fields, filename });
        }

        debug!("Loaded manifest {:?} with {} rows", path, rows.len());
        Ok(Self { header, rows })
    }

    /// Basenames referenced by the manifest
    pub fn required_files(&self) -> BTreeSet<String> {
        self.rows.iter().map(|row| row.filename.clone()).collect()
    }
}

/// Basename of a manifest value that may be a bare filename or a full path
pub fn base_filename(value: &str) -> String {
    Path::new(value)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| value.to_string())
}

/// Output of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedCorpus {
    /// The parsed manifest, in file order
    pub manifest: Manifest,
    /// Media files present in the working directory, sorted by filename
    pub items: Vec<CorpusItem>,
}

impl ValidatedCorpus {
    /// Names of the media files physically present
    pub fn present_files(&self) -> BTreeSet<String> {
        self.items.iter().map(|item| item.filename.clone()).collect()
    }
}

/// Checks a working directory against a reference manifest
#[derive(Debug, Clone)]
pub struct CorpusValidator {
    audio_dir: PathBuf,
    manifest_path: PathBuf,
    media_extension: String,
}

impl CorpusValidator {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(audio_dir: P, manifest_path: Q) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            manifest_path: manifest_path.into(),
            media_extension: ".mp3".to_string(),
        }
    }

    /// Set the accepted media suffix (case-sensitive)
    pub fn with_media_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.media_extension = extension.into();
        self
    }

    /// Enumerate media files in the working directory
    pub fn scan_directory(&self) -> Result<Vec<CorpusItem>> {
        if !self.audio_dir.is_dir() {
            return Err(DecodeError::DirectoryNotFound(self.audio_dir.clone()));
        }

        let mut items = Vec::new();
        for entry in std::fs::read_dir(&self.audio_dir)? {
            let entry = entry?;
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if filename.ends_with(&self.media_extension) {
                items.push(CorpusItem {
                    filename,
                    path: entry.path(),
                });
            }
        }
        items.sort_by(|a, b| a.filename.cmp(&b.filename));

        info!("Found {} {} files.", items.len(), self.media_extension);
        Ok(items)
    }

    /// Run the full precondition check.
    ///
    /// Fails with [`DecodeError::MissingFiles`] carrying `required - present` when the
    /// manifest names files the directory does not hold.
    pub fn validate(&self) -> Result<ValidatedCorpus> {
        let items = self.scan_directory()?;
        let manifest = Manifest::load(&self.manifest_path)?;

        let present: BTreeSet<&str> = items.iter().map(|item| item.filename.as_str()).collect();
        let missing: BTreeSet<String> = manifest
            .required_files()
            .into_iter()
            .filter(|name| !present.contains(name.as_str()))
            .collect();

        if !missing.is_empty() {
            error!("Missing {} files: {:?}", self.media_extension, missing);
            return Err(DecodeError::MissingFiles(missing));
        }

        info!("No missing {} files", self.media_extension);
        Ok(ValidatedCorpus { manifest, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.mp3", "a.mp3")]
    #[case("cv-valid-dev/sample-000000.mp3", "sample-000000.mp3")]
    #[case("/data/cv/sample-000001.mp3", "sample-000001.mp3")]
    fn test_base_filename(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(base_filename(value), expected);
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp3", "b.MP3", "c.wav", "d.mp3.bak"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let validator = CorpusValidator::new(dir.path(), dir.path().join("unused.csv"));
        let items = validator.scan_directory().unwrap();
        let names: Vec<_> = items.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp3"]);
    }

    #[test]
    fn test_manifest_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("empty.csv");
        std::fs::write(&manifest, "").unwrap();

        assert!(matches!(
            Manifest::load(&manifest),
            Err(DecodeError::Manifest(_))
        ));
    }

    #[test]
    fn test_manifest_keeps_columns() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.csv");
        std::fs::write(
            &manifest,
            "filename,text,up_votes\ncv/a.mp3,\"hello, there\",1\n\ncv/b.mp3,world\n",
        )
        .unwrap();

        let manifest = Manifest::load(&manifest).unwrap();
        assert_eq!(manifest.header, vec!["filename", "text", "up_votes"]);
        assert_eq!(manifest.rows.len(), 2);
        assert_eq!(manifest.rows[0].fields, vec!["cv/a.mp3", "hello, there", "1"]);
        assert_eq!(manifest.rows[0].filename, "a.mp3");
        assert_eq!(manifest.rows[1].fields, vec!["cv/b.mp3", "world"]);
        assert_eq!(
            manifest.required_files(),
            ["a.mp3", "b.mp3"].iter().map(|s| s.to_string()).collect()
        );
    }
}
