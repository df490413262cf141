//! Source loading and merge rules for the sizes table.
//!
//! Precedence is NCBI, then user overrides, then ATB estimates. NCBI and
//! user records collide on taxid; ATB estimates collide on species name.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::atb::AtbEstimate;
use crate::domain::{GenomeSizeRecord, SizeSource, TaxId};
use crate::error::SizeError;
use crate::table::{TableOptions, TableReader, open_text, parse_keyed};
use crate::taxonomy::ResolvedTaxon;

pub const NCBI_COLUMNS: &[&str] = &[
    "species_taxid",
    "min_ungapped_length",
    "max_ungapped_length",
    "expected_ungapped_length",
    "number_of_genomes",
    "method_determined",
];

const USER_BASIC_COLUMNS: &[&str] = &["name", "tax_id", "expected_ungapped_length", "method_determined"];
const USER_EXTENDED_COLUMNS: &[&str] = &[
    "name",
    "tax_id",
    "category",
    "expected_ungapped_length",
    "method_determined",
];

/// ATB only ever contributes bacterial assemblies.
pub const ATB_CATEGORY: &str = "bacteria";

/// A row from the NCBI or user table before it joins the merged table.
/// NCBI rows get their name and category from the taxonomy lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub tax_id: TaxId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub size: u64,
    pub source: SizeSource,
    pub method: String,
}

impl SourceRecord {
    fn into_record(self) -> Option<GenomeSizeRecord> {
        let name = self.name?;
        Some(GenomeSizeRecord {
            name,
            tax_id: self.tax_id,
            category: self.category,
            size: self.size,
            source: self.source,
            method: self.method,
        })
    }
}

pub type SourceTable = IndexMap<TaxId, SourceRecord>;

/// Reads NCBI's `species_genome_size.txt.gz`. Its header line is a comment,
/// so the columns are fixed here.
pub fn load_ncbi_sizes(path: &Path) -> Result<SourceTable, SizeError> {
    let table = parse_keyed(
        path,
        "species_taxid",
        TableOptions::with_columns(NCBI_COLUMNS),
    )?;
    let mut sizes = SourceTable::new();
    for (key, row) in &table.rows {
        let tax_id = TaxId::from(key.as_str());
        sizes.insert(
            tax_id.clone(),
            SourceRecord {
                tax_id,
                name: None,
                category: None,
                size: row.parse_u64(&table.header, "expected_ungapped_length")?,
                source: SizeSource::Ncbi,
                method: row.field(&table.header, "method_determined")?.to_string(),
            },
        );
    }
    info!("Found {} genome sizes from NCBI", sizes.len());
    Ok(sizes)
}

/// Reads a user-provided sizes file. Four columns (`name, tax_id,
/// expected_ungapped_length, method_determined`) or five with `category`
/// after `tax_id`; the width of the first data line decides. An optional
/// header line starting with `name` is skipped.
pub fn load_user_sizes(path: &Path) -> Result<SourceTable, SizeError> {
    let Some(first) = first_data_line(path)? else {
        return Ok(SourceTable::new());
    };
    let width = first.split('\t').count();
    let columns = match width {
        4 => USER_BASIC_COLUMNS,
        5 => USER_EXTENDED_COLUMNS,
        found => {
            return Err(SizeError::MalformedRow {
                path: path.to_path_buf(),
                line: 1,
                expected: USER_EXTENDED_COLUMNS.len(),
                found,
            });
        }
    };
    let has_header = first.split('\t').next() == Some("name");

    let reader = TableReader::open(path, TableOptions::with_columns(columns))?;
    let header = reader.header().clone();
    let mut sizes = SourceTable::new();
    let mut skipped_header = false;
    for row in reader {
        let row = row?;
        if has_header && !skipped_header {
            skipped_header = true;
            continue;
        }
        let tax_id = TaxId::from(row.field(&header, "tax_id")?);
        let category = if header.contains("category") {
            Some(row.field(&header, "category")?.to_string())
        } else {
            None
        };
        sizes.insert(
            tax_id.clone(),
            SourceRecord {
                tax_id,
                name: Some(row.field(&header, "name")?.to_string()),
                category,
                size: row.parse_u64(&header, "expected_ungapped_length")?,
                source: SizeSource::User,
                method: row.field(&header, "method_determined")?.to_string(),
            },
        );
    }
    info!("Found {} user-provided genome sizes", sizes.len());
    Ok(sizes)
}

fn first_data_line(path: &Path) -> Result<Option<String>, SizeError> {
    let reader = open_text(path)?;
    for line in reader.lines() {
        let line = line
            .map_err(|err| SizeError::Filesystem(format!("read {}: {err}", path.display())))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        return Ok(Some(line.to_string()));
    }
    Ok(None)
}

/// Copies resolved names and categories onto NCBI rows. Returns the taxids
/// NCBI could not name; those rows keep `name: None`.
pub fn apply_names(
    sizes: &mut SourceTable,
    names: &HashMap<TaxId, ResolvedTaxon>,
) -> Vec<TaxId> {
    let mut unresolved = Vec::new();
    for (tax_id, record) in sizes.iter_mut() {
        match names.get(tax_id) {
            Some(resolved) => {
                record.name = Some(resolved.name.clone());
                record.category = Some(resolved.category.clone());
            }
            None => unresolved.push(tax_id.clone()),
        }
    }
    unresolved
}

/// The merged table, keyed by taxid in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    records: IndexMap<TaxId, GenomeSizeRecord>,
}

impl MergedTable {
    pub fn records(&self) -> impl Iterator<Item = &GenomeSizeRecord> {
        self.records.values()
    }

    pub fn get(&self, tax_id: &TaxId) -> Option<&GenomeSizeRecord> {
        self.records.get(tax_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_tax_id(&self, tax_id: &TaxId) -> bool {
        self.records.contains_key(tax_id)
    }

    /// Species names already sized, compared case-sensitively.
    pub fn known_names(&self) -> HashSet<String> {
        self.records.values().map(|record| record.name.clone()).collect()
    }

    fn push(&mut self, record: GenomeSizeRecord) {
        self.records.insert(record.tax_id.clone(), record);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub ncbi: usize,
    pub user_added: usize,
    pub user_shadowed: usize,
    pub unresolved: Vec<TaxId>,
}

/// NCBI rows first, then user rows whose taxid has no named NCBI row.
/// NCBI rows without a resolved name are left out and reported; a user row
/// for the same taxid takes their place.
pub fn merge_sources(ncbi: SourceTable, user: SourceTable) -> (MergedTable, MergeStats) {
    let mut merged = MergedTable::default();
    let mut stats = MergeStats::default();

    for (tax_id, record) in &ncbi {
        match record.clone().into_record() {
            Some(record) => {
                merged.push(record);
                stats.ncbi += 1;
            }
            None => stats.unresolved.push(tax_id.clone()),
        }
    }
    if !stats.unresolved.is_empty() {
        warn!(
            "{} NCBI TaxIDs could not be resolved to a species name and were left out",
            stats.unresolved.len()
        );
    }

    for (tax_id, record) in user {
        if merged.contains_tax_id(&tax_id) {
            debug!("NCBI size for {tax_id} takes precedence over the user-provided size");
            stats.user_shadowed += 1;
            continue;
        }
        if let Some(record) = record.into_record() {
            if ncbi.contains_key(&tax_id) {
                warn!("NCBI could not name TaxID {tax_id}, using the user-provided size");
            }
            merged.push(record);
            stats.user_added += 1;
        }
    }

    (merged, stats)
}

/// Appends ATB estimates whose species name resolved to a taxid that is not
/// in the table yet. Returns how many were added.
pub fn add_atb_estimates(
    merged: &mut MergedTable,
    estimates: &IndexMap<String, AtbEstimate>,
    tax_ids: &HashMap<String, TaxId>,
) -> usize {
    let mut added = 0;
    for (name, estimate) in estimates {
        let Some(tax_id) = tax_ids.get(name) else {
            debug!("No TaxID found for {name}, skipping");
            continue;
        };
        if merged.contains_tax_id(tax_id) {
            debug!("TaxID {tax_id} for {name} is already sized, skipping");
            continue;
        }
        merged.push(GenomeSizeRecord {
            name: name.clone(),
            tax_id: tax_id.clone(),
            category: Some(ATB_CATEGORY.to_string()),
            size: estimate.size,
            source: SizeSource::Atb,
            method: estimate.method(),
        });
        added += 1;
    }
    info!("Added {added} genome sizes from ATB assembly statistics");
    added
}
