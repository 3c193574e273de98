//! Tabular sink: the results CSV.
//!
//! Read once at the start of a run (prior rows + the processed set), written
//! once at the end: prior rows and new rows are merged by file name, sorted,
//! written to a temporary file next to the target and renamed over it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::extraction::ExtractionResult;
use crate::fields::FILENAME_COLUMN;

/// Rows found in an existing sink, keyed by column header.
#[derive(Debug, Default)]
pub struct PriorRows {
    columns: Vec<String>,
    rows: Vec<(String, HashMap<String, String>)>,
}

impl PriorRows {
    /// File names already present; these documents are skipped this run.
    pub fn processed_set(&self) -> HashSet<String> {
        self.rows.iter().map(|(filename, _)| filename.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the existing sink. A missing or zero-byte file is an empty sink;
    /// a file that cannot be parsed is an error, so it is never overwritten.
    pub fn read_prior(&self) -> Result<PriorRows, AppError> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No prior sink at {}", self.path.display());
                return Ok(PriorRows::default());
            }
            Err(e) => return Err(AppError::sink(&self.path, e)),
        };
        if size == 0 {
            debug!("Prior sink {} is empty", self.path.display());
            return Ok(PriorRows::default());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| AppError::sink(&self.path, e))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::sink(&self.path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let filename_idx = headers
            .iter()
            .position(|h| h == FILENAME_COLUMN)
            .ok_or_else(|| {
                AppError::sink(&self.path, format!("missing '{FILENAME_COLUMN}' column"))
            })?;

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| AppError::sink(&self.path, e))?;
            // Kept verbatim: it must compare equal to the document id.
            let filename = record.get(filename_idx).unwrap_or_default().to_string();
            if filename.trim().is_empty() {
                warn!("Skipping prior row without a file name in {}", self.path.display());
                continue;
            }
            if !seen.insert(filename.clone()) {
                warn!("Duplicate prior row for '{}'; keeping the first", filename);
                continue;
            }
            let values = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(idx, _)| *idx != filename_idx)
                .map(|(_, (h, v))| (h.clone(), v.to_string()))
                .collect();
            rows.push((filename, values));
        }

        let columns = headers
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| *idx != filename_idx)
            .map(|(_, h)| h)
            .collect();

        info!("Loaded {} prior rows from {}", rows.len(), self.path.display());
        Ok(PriorRows { columns, rows })
    }

    /// Writes `Filename` + `columns`, merging prior rows with `results`.
    /// Returns the number of data rows written.
    pub fn write(
        &self,
        columns: &[&str],
        prior: PriorRows,
        results: &[ExtractionResult],
    ) -> Result<usize, AppError> {
        for dropped in prior.columns.iter().filter(|c| !columns.contains(&c.as_str())) {
            warn!("Prior column '{}' is no longer configured; dropping it", dropped);
        }

        let mut table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (filename, mut values) in prior.rows {
            let row = columns
                .iter()
                .map(|c| values.remove(*c).unwrap_or_default())
                .collect();
            table.insert(filename, row);
        }
        for result in results {
            if table.contains_key(&result.document_id) {
                warn!("'{}' already has a row; keeping the prior one", result.document_id);
                continue;
            }
            let row = columns
                .iter()
                .map(|c| result.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            table.insert(result.document_id.clone(), row);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| AppError::sink(&self.path, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| AppError::sink(&self.path, e))?;
        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            let header = std::iter::once(FILENAME_COLUMN).chain(columns.iter().copied());
            writer
                .write_record(header)
                .map_err(|e| AppError::sink(&self.path, e))?;
            for (filename, row) in &table {
                writer
                    .write_record(std::iter::once(filename).chain(row.iter()))
                    .map_err(|e| AppError::sink(&self.path, e))?;
            }
            writer.flush().map_err(|e| AppError::sink(&self.path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| AppError::sink(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| AppError::sink(&self.path, e.error))?;

        info!("Wrote {} rows to {}", table.len(), self.path.display());
        Ok(table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::FieldStats;
    use crate::fields::FieldValue;

    fn result(id: &str, fields: &[(&str, FieldValue)]) -> ExtractionResult {
        ExtractionResult {
            document_id: id.to_string(),
            fields: fields
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
            stats: FieldStats::default(),
        }
    }

    fn text(v: &str) -> FieldValue {
        FieldValue::Text(v.to_string())
    }

    #[test]
    fn test_missing_sink_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prior = CsvSink::new(dir.path().join("out.csv")).read_prior().unwrap();
        assert_eq!(prior.len(), 0);
        assert!(prior.processed_set().is_empty());
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        let results = vec![
            result("b.pdf", &[("Name", text("Bob")), ("Score", FieldValue::Score(0))]),
            result("a.pdf", &[("Name", text("Jane Doe")), ("Score", FieldValue::Score(87))]),
        ];

        let written = sink
            .write(&["Name", "Score"], PriorRows::default(), &results)
            .unwrap();
        assert_eq!(written, 2);

        let raw = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(raw, "Filename,Name,Score\na.pdf,Jane Doe,87\nb.pdf,Bob,0\n");

        let prior = sink.read_prior().unwrap();
        assert_eq!(prior.columns, ["Name", "Score"]);
        let processed = prior.processed_set();
        assert!(processed.contains("a.pdf") && processed.contains("b.pdf"));
    }

    #[test]
    fn test_merge_matches_columns_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "Location,Filename,Legacy\n\"Austin, TX\",old.pdf,x\n").unwrap();
        let sink = CsvSink::new(&path);

        let prior = sink.read_prior().unwrap();
        let results = vec![result(
            "new.pdf",
            &[("Name", text("Jane Doe")), ("Location", text("Paris"))],
        )];
        sink.write(&["Name", "Location"], prior, &results).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            "Filename,Name,Location\nnew.pdf,Jane Doe,Paris\nold.pdf,,\"Austin, TX\"\n"
        );
    }

    #[test]
    fn test_duplicate_prior_rows_keep_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "Filename,Name\na.pdf,First\na.pdf,Second\n").unwrap();
        let sink = CsvSink::new(&path);

        let prior = sink.read_prior().unwrap();
        assert_eq!(prior.len(), 1);
        sink.write(&["Name"], prior, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Filename,Name\na.pdf,First\n"
        );
    }

    #[test]
    fn test_new_result_never_duplicates_prior_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "Filename,Name\na.pdf,Jane\n").unwrap();
        let sink = CsvSink::new(&path);

        let prior = sink.read_prior().unwrap();
        let written = sink
            .write(&["Name"], prior, &[result("a.pdf", &[("Name", text("Other"))])])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Filename,Name\na.pdf,Jane\n"
        );
    }

    #[test]
    fn test_zero_byte_sink_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "").unwrap();
        let sink = CsvSink::new(&path);

        let prior = sink.read_prior().unwrap();
        assert_eq!(prior.len(), 0);
        sink.write(&["Name"], prior, &[result("a.pdf", &[("Name", text("Jane"))])])
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Filename,Name\na.pdf,Jane\n"
        );
    }

    #[test]
    fn test_file_names_with_surrounding_spaces_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        sink.write(
            &["Name"],
            PriorRows::default(),
            &[result(" alice.txt ", &[("Name", text("Alice"))])],
        )
        .unwrap();

        let processed = sink.read_prior().unwrap().processed_set();
        assert!(processed.contains(" alice.txt "));
        assert!(!processed.contains("alice.txt"));
    }

    #[test]
    fn test_sink_without_filename_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "Name,Location\nJane,Austin\n").unwrap();
        let err = CsvSink::new(&path).read_prior().unwrap_err();
        assert!(matches!(err, AppError::Sink { .. }));
    }

    #[test]
    fn test_ragged_sink_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "Filename,Name\na.pdf,Jane,extra\n").unwrap();
        assert!(CsvSink::new(&path).read_prior().is_err());
    }

    #[test]
    fn test_write_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("nested").join("out.csv"));
        sink.write(&["Name"], PriorRows::default(), &[]).unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "Filename,Name\n");
    }
}
