//! Genome size estimates from AllTheBacteria (ATB) assembly statistics.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::SizeError;
use crate::table::{TableOptions, TableReader};

pub const TOTAL_LENGTH_COLUMN: &str = "total_length";
pub const STATS_SAMPLE_COLUMN: &str = "sample";

/// Sample identifiers grouped by species name, in first-seen order.
pub type SpeciesSamples = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtbEstimate {
    pub name: String,
    pub samples: usize,
    pub size: u64,
}

impl AtbEstimate {
    pub fn method(&self) -> String {
        format!("Average assembly size of {} samples", self.samples)
    }
}

pub fn group_samples_by_species(
    path: &Path,
    sample_column: &str,
    species_column: &str,
) -> Result<SpeciesSamples, SizeError> {
    let reader = TableReader::open(path, TableOptions::default())?;
    let sample_idx = reader.header().index(sample_column)?;
    let species_idx = reader.header().index(species_column)?;

    let mut groups = SpeciesSamples::new();
    for row in reader {
        let row = row?;
        let species = row.value(species_idx).trim();
        if species.is_empty() {
            continue;
        }
        groups
            .entry(species.to_string())
            .or_default()
            .push(row.value(sample_idx).to_string());
    }
    info!("Found {} species in the ATB file list", groups.len());
    Ok(groups)
}

/// True for names that look like strain or placeholder identifiers, which
/// carry both an underscore and a digit.
pub fn is_strain_like(name: &str) -> bool {
    name.contains('_') && name.chars().any(|ch| ch.is_ascii_digit())
}

/// Species worth estimating: not already sized, at least `min_genomes`
/// samples, and not strain-like.
pub fn select_candidates(
    groups: &SpeciesSamples,
    known_names: &HashSet<String>,
    min_genomes: usize,
) -> Vec<String> {
    groups
        .iter()
        .filter(|(name, _)| !known_names.contains(name.as_str()))
        .filter(|(_, samples)| samples.len() >= min_genomes)
        .filter(|(name, _)| !is_strain_like(name))
        .map(|(name, _)| name.clone())
        .collect()
}

/// `total_length` per sample, restricted to `wanted` samples.
pub fn read_assembly_lengths(
    path: &Path,
    wanted: &HashSet<&str>,
) -> Result<HashMap<String, u64>, SizeError> {
    let reader = TableReader::open(path, TableOptions::default())?;
    let header = reader.header().clone();
    let sample_idx = header.index(STATS_SAMPLE_COLUMN)?;
    header.index(TOTAL_LENGTH_COLUMN)?;

    let mut lengths = HashMap::new();
    for row in reader {
        let row = row?;
        let sample = row.value(sample_idx);
        if !wanted.contains(sample) {
            continue;
        }
        let length = row.parse_u64(&header, TOTAL_LENGTH_COLUMN)?;
        lengths.insert(sample.to_string(), length);
    }
    debug!("Read assembly lengths for {} samples", lengths.len());
    Ok(lengths)
}

/// Arithmetic mean rounded down.
pub fn mean_length(lengths: &[u64]) -> Option<u64> {
    if lengths.is_empty() {
        return None;
    }
    let total: u128 = lengths.iter().map(|&len| u128::from(len)).sum();
    u64::try_from(total / lengths.len() as u128).ok()
}

/// Averages the assembly lengths of each candidate's samples. Samples with
/// no statistics row are left out, and a species with none at all is
/// dropped.
pub fn estimate_sizes(
    groups: &SpeciesSamples,
    candidates: &[String],
    lengths: &HashMap<String, u64>,
) -> IndexMap<String, AtbEstimate> {
    let mut estimates = IndexMap::new();
    for name in candidates {
        let Some(samples) = groups.get(name) else {
            continue;
        };
        let observed: Vec<u64> = samples
            .iter()
            .filter_map(|sample| lengths.get(sample).copied())
            .collect();
        match mean_length(&observed) {
            Some(size) => {
                estimates.insert(
                    name.clone(),
                    AtbEstimate {
                        name: name.clone(),
                        samples: observed.len(),
                        size,
                    },
                );
            }
            None => debug!("No assembly statistics for {name}, skipping"),
        }
    }
    estimates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(entries: &[(&str, usize)]) -> SpeciesSamples {
        entries
            .iter()
            .map(|(name, count)| {
                let samples: Vec<String> = (0..*count).map(|i| format!("{name}-{i}")).collect();
                (name.to_string(), samples)
            })
            .collect()
    }

    #[test]
    fn strain_names() {
        assert!(!is_strain_like("Escherichia coli"));
        assert!(is_strain_like("E_coli_123"));
        assert!(!is_strain_like("strain_X"));
        assert!(!is_strain_like("Streptococcus 12"));
    }

    #[test]
    fn mean_rounds_down() {
        assert_eq!(mean_length(&[100, 200, 300]), Some(200));
        assert_eq!(mean_length(&[100, 101]), Some(100));
        assert_eq!(mean_length(&[100, 201]), Some(150));
        assert_eq!(mean_length(&[]), None);
    }

    #[test]
    fn minimum_genomes_is_inclusive() {
        let groups = groups(&[("Listeria monocytogenes", 5), ("Listeria innocua", 4)]);
        let selected = select_candidates(&groups, &HashSet::new(), 5);
        assert_eq!(selected, vec!["Listeria monocytogenes".to_string()]);
    }

    #[test]
    fn known_names_are_excluded() {
        let groups = groups(&[("Escherichia coli", 10), ("Klebsiella pneumoniae", 10)]);
        let known: HashSet<String> = ["Escherichia coli".to_string()].into();
        let selected = select_candidates(&groups, &known, 1);
        assert_eq!(selected, vec!["Klebsiella pneumoniae".to_string()]);
    }

    #[test]
    fn strain_like_species_are_excluded() {
        let groups = groups(&[("Bacillus_A sp_123", 10), ("strain_X", 10)]);
        let selected = select_candidates(&groups, &HashSet::new(), 1);
        assert_eq!(selected, vec!["strain_X".to_string()]);
    }

    #[test]
    fn estimates_skip_samples_without_stats() {
        let groups = groups(&[("Vibrio cholerae", 3)]);
        let lengths: HashMap<String, u64> = [
            ("Vibrio cholerae-0".to_string(), 100),
            ("Vibrio cholerae-1".to_string(), 200),
        ]
        .into();
        let estimates = estimate_sizes(&groups, &["Vibrio cholerae".to_string()], &lengths);
        let estimate = &estimates["Vibrio cholerae"];
        assert_eq!(estimate.size, 150);
        assert_eq!(estimate.samples, 2);
        assert_eq!(estimate.method(), "Average assembly size of 2 samples");
    }
}
