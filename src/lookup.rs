use std::collections::HashMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::domain::{GenomeSizeRecord, TableLayout, TaxId};
use crate::error::SizeError;
use crate::sizes::{SizesTable, read_sizes};
use crate::store::Store;

pub const UNKNOWN_ROW: [(&str, &str); 6] = [
    ("name", "UNKNOWN_SPECIES"),
    ("tax_id", "UNKNOWN_TAXID"),
    ("category", "UNKNOWN_CATEGORY"),
    ("size", "0"),
    ("source", "UNKNOWN_SOURCE"),
    ("method", "UNKNOWN_METHOD"),
];

/// A loaded sizes table indexed by lowercased name and by taxid. When two
/// records share a name, the later one wins the name index.
#[derive(Debug, Clone)]
pub struct SizeIndex {
    table: SizesTable,
    by_name: HashMap<String, usize>,
    name_by_tax_id: HashMap<TaxId, String>,
}

impl SizeIndex {
    pub fn load(path: &Path) -> Result<Self, SizeError> {
        info!("Reading genome sizes from {}", path.display());
        Ok(Self::from_table(read_sizes(path)?))
    }

    pub fn from_table(table: SizesTable) -> Self {
        let mut by_name = HashMap::new();
        let mut name_by_tax_id = HashMap::new();
        for (i, record) in table.records.iter().enumerate() {
            by_name.insert(record.name.to_lowercase(), i);
            name_by_tax_id.insert(record.tax_id.clone(), record.name.clone());
        }
        Self {
            table,
            by_name,
            name_by_tax_id,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.table.version.as_deref()
    }

    pub fn layout(&self) -> TableLayout {
        self.table.layout
    }

    pub fn len(&self) -> usize {
        self.table.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.records.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&GenomeSizeRecord> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.table.records[i])
    }

    pub fn name_for_tax_id(&self, tax_id: &str) -> Option<&str> {
        self.name_by_tax_id
            .get(&TaxId::from(tax_id))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(GenomeSizeRecord),
    NotFound {
        /// The query as given.
        query: String,
        /// The species name the query turned into, if it got that far.
        effective: Option<String>,
    },
}

impl LookupOutcome {
    pub fn record(&self) -> Option<&GenomeSizeRecord> {
        match self {
            LookupOutcome::Found(record) => Some(record),
            LookupOutcome::NotFound { .. } => None,
        }
    }
}

/// Answers one query: a numeric taxid, a path to a two-line classification
/// file, or a species name. A miss is an outcome, not an error.
pub fn lookup(query: &str, index: &SizeIndex) -> Result<LookupOutcome, SizeError> {
    let effective = if TaxId::looks_numeric(query) {
        index.name_for_tax_id(query).map(str::to_string)
    } else if Path::new(query).is_file() {
        debug!("Extracting query from {query}");
        Some(read_classification(Path::new(query))?)
    } else {
        Some(query.to_string())
    };

    let Some(name) = effective else {
        return Ok(LookupOutcome::NotFound {
            query: query.to_string(),
            effective: None,
        });
    };

    debug!("Querying for {}", name.to_lowercase());
    match index.by_name(&name) {
        Some(record) => {
            info!("Found the size of {} in the sizes file", record.name);
            Ok(LookupOutcome::Found(record.clone()))
        }
        None => Ok(LookupOutcome::NotFound {
            query: query.to_string(),
            effective: Some(name),
        }),
    }
}

/// Reads the species from a classifier summary: a header line, then a
/// data line whose second column is the species name.
pub fn read_classification(path: &Path) -> Result<String, SizeError> {
    let content = fs::read_to_string(path).map_err(|err| SizeError::ClassificationFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let line = content
        .lines()
        .nth(1)
        .ok_or_else(|| SizeError::ClassificationFile {
            path: path.to_path_buf(),
            message: "expected a header line followed by a data line".to_string(),
        })?;
    line.trim_end_matches('\r')
        .split('\t')
        .nth(1)
        .map(|value| value.trim().to_string())
        .ok_or_else(|| SizeError::ClassificationFile {
            path: path.to_path_buf(),
            message: "data line has no classification column".to_string(),
        })
}

pub fn result_path(out_dir: &Utf8Path, prefix: &str) -> Utf8PathBuf {
    out_dir.join(format!("{prefix}-sizemeup.txt"))
}

/// Header and single row of the point-query artifact; a miss gets the
/// `UNKNOWN_*` placeholders.
pub fn render_result(outcome: &LookupOutcome, layout: TableLayout) -> String {
    let values = result_fields(outcome.record(), layout);
    format!("{}\n{}\n", layout.columns().join("\t"), values.join("\t"))
}

pub fn result_fields(record: Option<&GenomeSizeRecord>, layout: TableLayout) -> Vec<String> {
    match record {
        Some(record) => record.fields(layout),
        None => {
            let columns = layout.columns();
            UNKNOWN_ROW
                .iter()
                .filter(|(column, _)| columns.contains(column))
                .map(|(_, value)| value.to_string())
                .collect()
        }
    }
}

pub fn write_result(
    path: &Utf8Path,
    outcome: &LookupOutcome,
    layout: TableLayout,
) -> Result<(), SizeError> {
    Store::write_bytes_atomic(path, render_result(outcome, layout).as_bytes())
}
