//! Chunked reading of tab-delimited source files.
//!
//! A [`ChunkReader`] yields fixed-size [`Chunk`]s lazily so that files with
//! millions of rows are never held in memory at once. Every cell is kept as
//! text; a missing cell is an empty string. The sequence can only be restarted
//! by opening the file again.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LoaderError, Result};

/// Default number of rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 3000;

/// Reserved column carrying the entity type of every row.
pub const TYPE_COLUMN: &str = "type";

/// Separator between parent type and parent property in a relationship column.
pub const RELATIONSHIP_SEPARATOR: char = '.';

const UTF8_BOM: char = '\u{feff}';

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Text encodings a source file may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    Windows1252,
}

impl Encoding {
    /// Canonical label of the encoding.
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "windows-1252",
        }
    }

    /// Strictly decode `bytes`; `None` when they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let encoding = match self {
            Self::Utf8 => encoding_rs::UTF_8,
            Self::Windows1252 => encoding_rs::WINDOWS_1252,
        };
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the encoding of the file at `path`.
///
/// The file is validated as UTF-8 line by line (a newline byte never occurs
/// inside a multi-byte UTF-8 sequence, so memory stays bounded by the longest
/// line). The first invalid line makes the file Windows-1252.
pub fn detect_encoding(path: impl AsRef<Path>) -> Result<Encoding> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let mut line_no: u64 = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(Encoding::Utf8);
        }
        line_no += 1;
        if std::str::from_utf8(&line).is_err() {
            debug!(file = %path.display(), line = line_no, "not utf-8, falling back to windows-1252");
            return Ok(Encoding::Windows1252);
        }
    }
}

// ── Chunk / Row ───────────────────────────────────────────────────────────────

/// A batch of consecutive rows sharing the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    columns: Arc<[String]>,
    rows: Vec<Vec<String>>,
}

impl Chunk {
    /// Build a chunk from a header and its rows. Rows shorter than the header
    /// read as empty strings in the missing positions.
    pub fn new(columns: impl Into<Arc<[String]>>, rows: Vec<Vec<String>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    /// Column names in header order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<Row<'_>> {
        self.rows().next()
    }

    /// Entity type declared by the first row's `type` column.
    pub fn entity_type(&self) -> Result<&str> {
        if self.column_index(TYPE_COLUMN).is_none() {
            return Err(LoaderError::MissingColumn(TYPE_COLUMN.to_string()));
        }
        Ok(self.first().map(|row| row.get_or_empty(TYPE_COLUMN)).unwrap_or(""))
    }

    /// Columns whose name encodes a reference to a parent entity.
    pub fn relationship_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| is_relationship_column(c))
    }
}

/// One row of a [`Chunk`], addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// Value of `column`, or `None` when the header has no such column.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let (columns, values) = (self.columns, self.values);
        let idx = columns.iter().position(|c| c == column)?;
        Some(values.get(idx).map(String::as_str).unwrap_or(""))
    }

    /// Value at header position `idx`.
    pub fn value_at(&self, idx: usize) -> &'a str {
        let values = self.values;
        values.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn get_or_empty(&self, column: &str) -> &'a str {
        self.get(column).unwrap_or("")
    }

    /// `(column, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let (columns, values) = (self.columns, self.values);
        columns
            .iter()
            .enumerate()
            .map(move |(i, c)| (c.as_str(), values.get(i).map(String::as_str).unwrap_or("")))
    }
}

/// `true` for `<parent-type>.<parent-prop>` columns.
pub fn is_relationship_column(column: &str) -> bool {
    column.contains(RELATIONSHIP_SEPARATOR)
}

// ── ChunkReader ───────────────────────────────────────────────────────────────

/// Lazy, finite iterator of [`Chunk`]s over a tab-delimited source.
///
/// The first error ends the sequence; no partial chunk is yielded after it.
pub struct ChunkReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Arc<[String]>,
    encoding: Encoding,
    chunk_size: usize,
    path: PathBuf,
    record: csv::ByteRecord,
    done: bool,
}

impl ChunkReader<File> {
    /// Open `path` and read its header line.
    pub fn open(path: impl AsRef<Path>, encoding: Encoding, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(file, path, encoding, chunk_size)
    }
}

impl<R: Read> ChunkReader<R> {
    /// Wrap an arbitrary byte source. `path` only labels errors.
    pub fn from_reader(
        source: R,
        path: impl Into<PathBuf>,
        encoding: Encoding,
        chunk_size: usize,
    ) -> Result<Self> {
        let path = path.into();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quote(b'"')
            .double_quote(true)
            .has_headers(true)
            .flexible(false)
            .from_reader(source);

        let headers = reader
            .byte_headers()
            .map_err(|e| map_csv_error(&path, e))?
            .clone();
        let mut columns = headers
            .iter()
            .map(|field| decode_field(&path, encoding, field))
            .collect::<Result<Vec<_>>>()?;
        if let Some(first) = columns.first_mut() {
            if let Some(stripped) = first.strip_prefix(UTF8_BOM) {
                *first = stripped.to_string();
            }
        }

        Ok(Self {
            reader,
            columns: columns.into(),
            encoding,
            chunk_size: chunk_size.max(1),
            path,
            record: csv::ByteRecord::new(),
            done: false,
        })
    }

    /// Header columns of the source.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut rows = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            let more = match self.reader.read_byte_record(&mut self.record) {
                Ok(more) => more,
                Err(e) => return Err(map_csv_error(&self.path, e)),
            };
            if !more {
                self.done = true;
                break;
            }
            let row = self
                .record
                .iter()
                .map(|field| decode_field(&self.path, self.encoding, field))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Chunk::new(Arc::clone(&self.columns), rows)))
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn decode_field(path: &Path, encoding: Encoding, field: &[u8]) -> Result<String> {
    encoding.decode(field).ok_or_else(|| LoaderError::Decode {
        path: path.to_path_buf(),
        encoding: encoding.name().to_string(),
    })
}

fn map_csv_error(path: &Path, err: csv::Error) -> LoaderError {
    match err.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => LoaderError::MalformedRow {
            path: path.to_path_buf(),
            line: pos.as_ref().map(|p| p.line()).unwrap_or(0),
            expected: *expected_len,
            found: *len,
        },
        _ => LoaderError::Csv(err),
    }
}
