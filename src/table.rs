//! Tab-separated tables, plain or gzip-compressed.
//!
//! The first non-comment line is the header unless the caller supplies
//! column names up front. Lines starting with `#` are comments; they are
//! kept so callers can read version lines back. Every data line must have
//! exactly as many fields as the header.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;

use crate::error::SizeError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Column names for files whose header is missing or commented out.
    pub columns: Option<Vec<String>>,
}

impl TableOptions {
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    path: PathBuf,
    columns: Vec<String>,
}

impl Header {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self, column: &str) -> Result<usize, SizeError> {
        self.columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| SizeError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    values: Vec<String>,
}

impl Row {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn value(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn field<'a>(&'a self, header: &Header, column: &str) -> Result<&'a str, SizeError> {
        Ok(self.value(header.index(column)?))
    }

    pub fn parse_u64(&self, header: &Header, column: &str) -> Result<u64, SizeError> {
        let raw = self.field(header, column)?;
        raw.trim().parse().map_err(|_| SizeError::InvalidNumber {
            path: header.path.clone(),
            column: column.to_string(),
            value: raw.to_string(),
        })
    }
}

/// Opens `path`, decompressing on the fly when it starts with the gzip
/// magic bytes.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, SizeError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => SizeError::MissingFile(path.to_path_buf()),
        _ => SizeError::Filesystem(format!("open {}: {err}", path.display())),
    })?;
    let mut reader = BufReader::new(file);
    let magic = reader
        .fill_buf()
        .map_err(|err| SizeError::Filesystem(format!("read {}: {err}", path.display())))?;
    if magic.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Streams rows from a table without holding the whole file in memory.
pub struct TableReader<R> {
    reader: R,
    header: Header,
    comments: Vec<String>,
    line_no: usize,
    buf: String,
}

impl TableReader<Box<dyn BufRead>> {
    pub fn open(path: &Path, options: TableOptions) -> Result<Self, SizeError> {
        let reader = open_text(path)?;
        Self::from_reader(reader, path, options)
    }
}

impl<R: BufRead> TableReader<R> {
    pub fn from_reader(reader: R, path: &Path, options: TableOptions) -> Result<Self, SizeError> {
        let mut table = Self {
            reader,
            header: Header {
                path: path.to_path_buf(),
                columns: Vec::new(),
            },
            comments: Vec::new(),
            line_no: 0,
            buf: String::new(),
        };
        match options.columns {
            Some(columns) => table.header.columns = columns,
            None => {
                if let Some(line) = table.next_data_line()? {
                    table.header.columns = split_fields(&line);
                }
            }
        }
        Ok(table)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Comment lines seen so far, without the leading `#`.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    fn next_data_line(&mut self) -> Result<Option<String>, SizeError> {
        loop {
            self.buf.clear();
            let read = self.reader.read_line(&mut self.buf).map_err(|err| {
                SizeError::Filesystem(format!("read {}: {err}", self.header.path.display()))
            })?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                self.comments.push(comment.trim().to_string());
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }

    fn next_row(&mut self) -> Result<Option<Row>, SizeError> {
        let Some(line) = self.next_data_line()? else {
            return Ok(None);
        };
        let values = split_fields(&line);
        if values.len() != self.header.len() {
            return Err(SizeError::MalformedRow {
                path: self.header.path.clone(),
                line: self.line_no,
                expected: self.header.len(),
                found: values.len(),
            });
        }
        Ok(Some(Row {
            line: self.line_no,
            values,
        }))
    }
}

impl<R: BufRead> Iterator for TableReader<R> {
    type Item = Result<Row, SizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// A whole table indexed by one column, in first-seen key order. A repeated
/// key replaces the earlier row.
#[derive(Debug, Clone)]
pub struct KeyedTable {
    pub header: Header,
    pub comments: Vec<String>,
    pub rows: IndexMap<String, Row>,
}

impl KeyedTable {
    pub fn get(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn parse_keyed(
    path: &Path,
    key_column: &str,
    options: TableOptions,
) -> Result<KeyedTable, SizeError> {
    let reader = TableReader::open(path, options)?;
    collect_keyed(reader, key_column)
}

pub fn collect_keyed<R: BufRead>(
    mut reader: TableReader<R>,
    key_column: &str,
) -> Result<KeyedTable, SizeError> {
    let key_index = reader.header().index(key_column)?;
    let mut rows = IndexMap::new();
    for row in reader.by_ref() {
        let row = row?;
        rows.insert(row.value(key_index).to_string(), row);
    }
    Ok(KeyedTable {
        header: reader.header.clone(),
        comments: reader.comments.clone(),
        rows,
    })
}

fn split_fields(line: &str) -> Vec<String> {
    line.split('\t').map(str::to_string).collect()
}
