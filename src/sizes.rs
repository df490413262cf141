//! The persisted sizes table: a version comment, a header, then one
//! record per line.

use std::path::Path;
use std::sync::LazyLock;

use camino::Utf8Path;
use chrono::NaiveDate;
use regex::Regex;

use crate::domain::{GenomeSizeRecord, SizeSource, TableLayout, TaxId};
use crate::error::SizeError;
use crate::store::Store;
use crate::table::{TableOptions, TableReader};

pub const VERSION_TAG: &str = "sizemeup-build";

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{VERSION_TAG}\s+(\S+)")).expect("version pattern is valid")
});

#[derive(Debug, Clone)]
pub struct SizesTable {
    pub version: Option<String>,
    pub layout: TableLayout,
    pub records: Vec<GenomeSizeRecord>,
}

pub fn build_version(date: NaiveDate) -> String {
    date.format("%Y.%m.%d").to_string()
}

pub fn render<'a, I>(records: I, layout: TableLayout, version: &str) -> String
where
    I: IntoIterator<Item = &'a GenomeSizeRecord>,
{
    let mut out = format!("# {VERSION_TAG} {version}\n");
    out.push_str(&layout.columns().join("\t"));
    out.push('\n');
    for record in records {
        out.push_str(&record.fields(layout).join("\t"));
        out.push('\n');
    }
    out
}

pub fn write_sizes<'a, I>(
    path: &Utf8Path,
    records: I,
    layout: TableLayout,
    version: &str,
) -> Result<(), SizeError>
where
    I: IntoIterator<Item = &'a GenomeSizeRecord>,
{
    Store::write_bytes_atomic(path, render(records, layout, version).as_bytes())
}

pub fn read_sizes(path: &Path) -> Result<SizesTable, SizeError> {
    if !path.is_file() {
        return Err(SizeError::MissingTable(path.to_path_buf()));
    }
    let reader = TableReader::open(path, TableOptions::default())?;
    let header = reader.header().clone();
    let layout = TableLayout::from_header(header.columns()).unwrap_or(if header.contains("category") {
        TableLayout::Extended
    } else {
        TableLayout::Basic
    });
    let name_idx = header.index("name")?;
    let tax_id_idx = header.index("tax_id")?;
    let category_idx = match layout {
        TableLayout::Extended => Some(header.index("category")?),
        TableLayout::Basic => None,
    };
    let source_idx = header.index("source")?;
    let method_idx = header.index("method")?;

    let mut records = Vec::new();
    let mut rows = reader;
    for row in rows.by_ref() {
        let row = row?;
        records.push(GenomeSizeRecord {
            name: row.value(name_idx).to_string(),
            tax_id: TaxId::from(row.value(tax_id_idx)),
            category: category_idx.map(|idx| row.value(idx).to_string()),
            size: row.parse_u64(&header, "size")?,
            source: row.value(source_idx).parse::<SizeSource>()?,
            method: row.value(method_idx).to_string(),
        });
    }

    Ok(SizesTable {
        version: rows.comments().iter().find_map(|c| parse_version(c)),
        layout,
        records,
    })
}

/// Extracts the build date from a `sizemeup-build <version>` comment.
pub fn parse_version(comment: &str) -> Option<String> {
    VERSION_LINE
        .captures(comment.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
