//! CSV persistence for the reference proposition database.
//!
//! File format: one header row, then one row per reference proposition.
//!
//! Columns (looked up by name, order does not matter):
//! - `id`: optional, rows get `db_row_{n}` when the column is missing
//! - `text` | `cleanText` | `Text`: proposition text, first one present wins
//! - `file_name`: optional source document
//! - `embeddings`: vector written as `[0.1, -0.2, ...]`
//!
//! Bad rows are skipped and counted, a missing required column fails the
//! whole load.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::semantic::embeddings::{Embedder, Embedding, EmbeddingError};
use crate::semantic::matcher::{MatchError, ReferenceCollection, ReferenceEntry};
use crate::semantic::preprocess::prepare_input;

const TEXT_COLUMNS: [&str; 3] = ["text", "cleanText", "Text"];
const ID_COLUMN: &str = "id";
const FILE_NAME_COLUMN: &str = "file_name";
const EMBEDDINGS_COLUMN: &str = "embeddings";

const DB_HEADERS: [&str; 4] = [ID_COLUMN, "text", FILE_NAME_COLUMN, EMBEDDINGS_COLUMN];

#[derive(Debug, thiserror::Error)]
pub enum ReferenceDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Reference set error: {0}")]
    Collection(#[from] MatchError),
}

/// Why a single row was left out of the collection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("empty cell in column '{0}'")]
    EmptyCell(&'static str),

    #[error("unparseable vector component '{0}'")]
    BadComponent(String),

    #[error("{0}")]
    BadVector(String),

    #[error("expected {expected} dimensions, row has {got}")]
    Dimensions { expected: usize, got: usize },
}

/// Counters reported after a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

/// Parse a serialized vector such as `"[0.123, -0.045]"`.
///
/// Surrounding brackets are optional. Does not normalize.
pub fn parse_vector(raw: &str) -> Result<Vec<f32>, RowError> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Err(RowError::EmptyCell(EMBEDDINGS_COLUMN));
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .map_err(|_| RowError::BadComponent(part.to_string()))
        })
        .collect()
}

/// Serialize a vector in the form [`parse_vector`] reads.
pub fn format_vector(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Resolved column positions for one CSV header.
struct Columns {
    id: Option<usize>,
    text: usize,
    file_name: Option<usize>,
    embeddings: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, ReferenceDbError> {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);

        let text = TEXT_COLUMNS
            .iter()
            .find_map(|name| position(name))
            .ok_or_else(|| ReferenceDbError::MissingColumn(TEXT_COLUMNS.join(" | ")))?;

        Ok(Self {
            id: position(ID_COLUMN),
            text,
            file_name: position(FILE_NAME_COLUMN),
            embeddings: position(EMBEDDINGS_COLUMN),
        })
    }

    fn entry(&self, record: &csv::StringRecord, row: usize) -> Result<ReferenceEntry, RowError> {
        let id = match self.id {
            Some(col) => {
                let id = record.get(col).unwrap_or_default().trim();
                if id.is_empty() {
                    return Err(RowError::EmptyCell(ID_COLUMN));
                }
                id.to_string()
            }
            None => format!("db_row_{row}"),
        };

        let text = record.get(self.text).unwrap_or_default().trim();
        if text.is_empty() {
            return Err(RowError::EmptyCell("text"));
        }

        let file_name = self
            .file_name
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(ReferenceEntry {
            id,
            text: text.to_string(),
            file_name,
        })
    }
}

/// Undecodable records (e.g. invalid UTF-8) are skipped, I/O failures abort.
fn readable(
    record: Result<csv::StringRecord, csv::Error>,
    row: usize,
) -> Result<Option<csv::StringRecord>, ReferenceDbError> {
    match record {
        Ok(record) => Ok(Some(record)),
        Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => Err(err.into()),
        Err(err) => {
            log::warn!("Skipping unreadable row {}: {}", row + 1, err);
            Ok(None)
        }
    }
}

/// Load a reference collection from a CSV file.
pub fn load_reference_db(
    path: &Path,
) -> Result<(ReferenceCollection, LoadReport), ReferenceDbError> {
    let file = std::fs::File::open(path)?;
    let now = Instant::now();
    let loaded = read_reference_db(file)?;

    log::info!(
        "Loaded {} of {} reference rows from {} ({} skipped) in {}ms",
        loaded.1.rows_loaded,
        loaded.1.rows_read,
        path.display(),
        loaded.1.rows_skipped,
        now.elapsed().as_millis()
    );

    Ok(loaded)
}

/// Load a reference collection from any CSV source.
pub fn read_reference_db<R: Read>(
    reader: R,
) -> Result<(ReferenceCollection, LoadReport), ReferenceDbError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = Columns::resolve(csv_reader.headers()?)?;
    let embeddings_col = columns
        .embeddings
        .ok_or_else(|| ReferenceDbError::MissingColumn(EMBEDDINGS_COLUMN.to_string()))?;

    let mut report = LoadReport::default();
    let mut dimensions: Option<usize> = None;
    let mut items = Vec::new();

    for (row, record) in csv_reader.records().enumerate() {
        report.rows_read += 1;
        let record = match readable(record, row)? {
            Some(record) => record,
            None => {
                report.rows_skipped += 1;
                continue;
            }
        };

        let parsed = columns.entry(&record, row).and_then(|entry| {
            let raw = parse_vector(record.get(embeddings_col).unwrap_or_default())?;
            if let Some(expected) = dimensions {
                if raw.len() != expected {
                    return Err(RowError::Dimensions {
                        expected,
                        got: raw.len(),
                    });
                }
            }
            let embedding =
                Embedding::normalized(raw).map_err(|e| RowError::BadVector(e.to_string()))?;
            Ok((entry, embedding))
        });

        match parsed {
            Ok((entry, embedding)) => {
                dimensions.get_or_insert(embedding.dimensions());
                items.push((entry, embedding));
                report.rows_loaded += 1;
            }
            Err(err) => {
                log::warn!("Skipping reference row {}: {}", row + 1, err);
                report.rows_skipped += 1;
            }
        }
    }

    Ok((ReferenceCollection::new(items)?, report))
}

/// One row to write into a reference database.
#[derive(Debug, Clone)]
pub struct ReferenceRow {
    pub entry: ReferenceEntry,
    pub embedding: Embedding,
}

/// Write a reference database, replacing `path` atomically.
pub fn write_reference_db(path: &Path, rows: &[ReferenceRow]) -> Result<(), ReferenceDbError> {
    let temp_path = path.with_extension("csv-tmp");

    let result = (|| -> Result<(), ReferenceDbError> {
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(DB_HEADERS)?;
        for row in rows {
            csv_wrt.write_record([
                row.entry.id.as_str(),
                row.entry.text.as_str(),
                row.entry.file_name.as_deref().unwrap_or_default(),
                format_vector(row.embedding.as_slice()).as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err);
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read source propositions (`id`, text, optional `file_name`) from CSV.
///
/// Rows with empty text are skipped. An `embeddings` column, if present, is
/// ignored.
pub fn read_source_rows<R: Read>(reader: R) -> Result<Vec<ReferenceEntry>, ReferenceDbError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = Columns::resolve(csv_reader.headers()?)?;

    let mut entries = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let Some(record) = readable(record, row)? else {
            continue;
        };
        match columns.entry(&record, row) {
            Ok(entry) => entries.push(entry),
            Err(err) => log::warn!("Skipping source row {}: {}", row + 1, err),
        }
    }

    Ok(entries)
}

/// Embed every source proposition in `input` and write a reference database
/// to `output`.
pub fn build_reference_db(
    input: &Path,
    output: &Path,
    embedder: &dyn Embedder,
    prefix: &str,
    max_input_chars: usize,
    batch_size: usize,
) -> Result<usize, ReferenceDbError> {
    let entries = read_source_rows(std::fs::File::open(input)?)?;
    log::info!(
        "Embedding {} source propositions with '{}'",
        entries.len(),
        embedder.name()
    );

    let progress = ProgressBar::new(entries.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        progress.set_style(style);
    }

    let mut rows = Vec::with_capacity(entries.len());
    for chunk in entries.chunks(batch_size.max(1)) {
        let inputs: Vec<String> = chunk
            .iter()
            .map(|entry| prepare_input(prefix, &entry.text, max_input_chars))
            .collect();
        let embeddings = embedder.embed_batch(&inputs)?;
        if embeddings.len() != chunk.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "'{}' returned {} embeddings for {} inputs",
                embedder.name(),
                embeddings.len(),
                chunk.len()
            ))
            .into());
        }

        for (entry, embedding) in chunk.iter().zip(embeddings) {
            rows.push(ReferenceRow {
                entry: entry.clone(),
                embedding,
            });
        }
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();

    write_reference_db(output, &rows)?;
    log::info!("Wrote {} reference rows to {}", rows.len(), output.display());

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector_with_brackets() {
        assert_eq!(
            parse_vector("[0.5, -0.25, 1e-3]").unwrap(),
            vec![0.5, -0.25, 0.001]
        );
    }

    #[test]
    fn test_parse_vector_without_brackets() {
        assert_eq!(parse_vector(" 1,2 ,3 ").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_vector_rejects_garbage() {
        assert_eq!(
            parse_vector("[0.1, abc]"),
            Err(RowError::BadComponent("abc".to_string()))
        );
        assert_eq!(parse_vector("[]"), Err(RowError::EmptyCell("embeddings")));
        assert!(parse_vector("[0.1,,0.2]").is_err());
    }

    #[test]
    fn test_format_vector_reads_back() {
        let values = vec![0.125_f32, -0.5, 0.0];
        assert_eq!(format_vector(&values), "[0.125, -0.5, 0]");
        assert_eq!(parse_vector(&format_vector(&values)).unwrap(), values);
    }

    #[test]
    fn test_missing_text_column_is_fatal() {
        let csv = "id,embeddings\n1,\"[1, 0]\"\n";
        let result = read_reference_db(csv.as_bytes());
        assert!(matches!(result, Err(ReferenceDbError::MissingColumn(_))));
    }

    #[test]
    fn test_missing_embeddings_column_is_fatal() {
        let csv = "id,text\n1,hello\n";
        let result = read_reference_db(csv.as_bytes());
        assert!(matches!(result, Err(ReferenceDbError::MissingColumn(c)) if c == "embeddings"));
    }

    #[test]
    fn test_alternate_text_column() {
        let csv = "id,cleanText,embeddings\np1,Spruce is light,\"[0, 2]\"\n";
        let (collection, _) = read_reference_db(csv.as_bytes()).unwrap();
        assert_eq!(collection.entries()[0].text, "Spruce is light");
        assert_eq!(collection.embeddings()[0].as_slice(), &[0.0, 1.0]);
    }
}
