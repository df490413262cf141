use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SizeError;

pub const DEFAULT_CONFIG_FILE: &str = "sizemeup.json";

pub const NCBI_GENOME_SIZE_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/genomes/ASSEMBLY_REPORTS/species_genome_size.txt.gz";
pub const NCBI_TAXONOMY_URL: &str = "https://api.ncbi.nlm.nih.gov/datasets/v2alpha/taxonomy";

/// The taxonomy endpoint refuses more than this many taxons per request.
pub const NCBI_MAX_TAXONS_PER_REQUEST: usize = 1000;

/// On-disk build configuration (`sizemeup.json`). Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ncbi_sizes_url: Option<String>,
    #[serde(default)]
    pub taxonomy_url: Option<String>,
    #[serde(default)]
    pub atb_file_list_url: Option<String>,
    #[serde(default)]
    pub atb_assembly_stats_url: Option<String>,
    #[serde(default)]
    pub atb_species_column: Option<String>,
    #[serde(default)]
    pub atb_sample_column: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub max_chunk_size: Option<usize>,
    #[serde(default)]
    pub min_genomes: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub chunk_size: Option<usize>,
    pub min_genomes: Option<usize>,
    pub atb_file_list_url: Option<String>,
    pub atb_assembly_stats_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub ncbi_sizes_url: String,
    pub taxonomy_url: String,
    pub atb_file_list_url: Option<String>,
    pub atb_assembly_stats_url: Option<String>,
    pub atb_species_column: String,
    pub atb_sample_column: String,
    pub chunk_size: usize,
    pub max_chunk_size: usize,
    pub min_genomes: usize,
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            ncbi_sizes_url: NCBI_GENOME_SIZE_URL.to_string(),
            taxonomy_url: NCBI_TAXONOMY_URL.to_string(),
            atb_file_list_url: None,
            atb_assembly_stats_url: None,
            atb_species_column: "sylph_species".to_string(),
            atb_sample_column: "sample".to_string(),
            chunk_size: 200,
            max_chunk_size: NCBI_MAX_TAXONS_PER_REQUEST,
            min_genomes: 100,
            timeout_secs: 3600,
        }
    }
}

impl BuildConfig {
    pub fn with_overrides(mut self, overrides: &BuildOverrides) -> Self {
        if let Some(chunk_size) = overrides.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(min_genomes) = overrides.min_genomes {
            self.min_genomes = min_genomes;
        }
        if let Some(url) = &overrides.atb_file_list_url {
            self.atb_file_list_url = Some(url.clone());
        }
        if let Some(url) = &overrides.atb_assembly_stats_url {
            self.atb_assembly_stats_url = Some(url.clone());
        }
        self
    }

    /// Both assembly-stats URLs, required by an extended build.
    pub fn atb_urls(&self) -> Result<(&str, &str), SizeError> {
        let file_list = self
            .atb_file_list_url
            .as_deref()
            .ok_or_else(|| SizeError::MissingSetting("atb_file_list_url".to_string()))?;
        let stats = self
            .atb_assembly_stats_url
            .as_deref()
            .ok_or_else(|| SizeError::MissingSetting("atb_assembly_stats_url".to_string()))?;
        Ok((file_list, stats))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `sizemeup.json` from the current directory when no
    /// path is given. Only an explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<BuildConfig, SizeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(BuildConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SizeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SizeError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> BuildConfig {
        let defaults = BuildConfig::default();
        BuildConfig {
            ncbi_sizes_url: config.ncbi_sizes_url.unwrap_or(defaults.ncbi_sizes_url),
            taxonomy_url: config.taxonomy_url.unwrap_or(defaults.taxonomy_url),
            atb_file_list_url: config.atb_file_list_url.or(defaults.atb_file_list_url),
            atb_assembly_stats_url: config
                .atb_assembly_stats_url
                .or(defaults.atb_assembly_stats_url),
            atb_species_column: config
                .atb_species_column
                .unwrap_or(defaults.atb_species_column),
            atb_sample_column: config.atb_sample_column.unwrap_or(defaults.atb_sample_column),
            chunk_size: config.chunk_size.unwrap_or(defaults.chunk_size),
            max_chunk_size: config.max_chunk_size.unwrap_or(defaults.max_chunk_size),
            min_genomes: config.min_genomes.unwrap_or(defaults.min_genomes),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default());
        assert_eq!(resolved, BuildConfig::default());
        assert_eq!(resolved.chunk_size, 200);
        assert_eq!(resolved.max_chunk_size, NCBI_MAX_TAXONS_PER_REQUEST);
    }

    #[test]
    fn overrides_win_over_file() {
        let config = Config {
            chunk_size: Some(500),
            min_genomes: Some(10),
            ..Config::default()
        };
        let overrides = BuildOverrides {
            chunk_size: Some(50),
            ..BuildOverrides::default()
        };
        let resolved = ConfigLoader::resolve_config(config).with_overrides(&overrides);
        assert_eq!(resolved.chunk_size, 50);
        assert_eq!(resolved.min_genomes, 10);
    }

    #[test]
    fn extended_build_needs_both_urls() {
        let mut config = BuildConfig::default();
        assert!(config.atb_urls().is_err());
        config.atb_file_list_url = Some("https://example.org/list.tsv.gz".to_string());
        assert!(config.atb_urls().is_err());
        config.atb_assembly_stats_url = Some("https://example.org/stats.tsv.gz".to_string());
        assert!(config.atb_urls().is_ok());
    }
}
