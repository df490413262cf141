use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::error::SizeError;

pub const SIZES_FILE_NAME: &str = "sizemeup-sizes.txt";
pub const NCBI_SIZES_FILE_NAME: &str = "species_genome_size.txt.gz";
pub const ATB_FILE_LIST_NAME: &str = "atb-file-list.tsv.gz";
pub const ATB_ASSEMBLY_STATS_NAME: &str = "atb-assembly-stats.tsv.gz";

/// Where a build keeps its downloads and writes its table.
#[derive(Debug, Clone)]
pub struct Store {
    out_dir: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    /// Downloads go to `cache_dir` when given, otherwise to
    /// `~/.cache/sizemeup`.
    pub fn new(out_dir: Utf8PathBuf, cache_dir: Option<Utf8PathBuf>) -> Result<Self, SizeError> {
        let cache_root = match cache_dir {
            Some(dir) => dir,
            None => BaseDirs::new()
                .and_then(|dirs| {
                    Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("sizemeup"))
                        .ok()
                })
                .ok_or_else(|| {
                    SizeError::Filesystem("unable to resolve cache directory".to_string())
                })?,
        };
        Ok(Self {
            out_dir,
            cache_root,
        })
    }

    pub fn new_with_paths(out_dir: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            out_dir,
            cache_root,
        }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn sizes_path(&self) -> Utf8PathBuf {
        self.out_dir.join(SIZES_FILE_NAME)
    }

    pub fn ncbi_sizes_path(&self) -> Utf8PathBuf {
        self.cache_root.join(NCBI_SIZES_FILE_NAME)
    }

    pub fn atb_file_list_path(&self) -> Utf8PathBuf {
        self.cache_root.join(ATB_FILE_LIST_NAME)
    }

    pub fn atb_assembly_stats_path(&self) -> Utf8PathBuf {
        self.cache_root.join(ATB_ASSEMBLY_STATS_NAME)
    }

    pub fn ensure_out_dir(&self) -> Result<(), SizeError> {
        fs::create_dir_all(self.out_dir.as_std_path())
            .map_err(|err| SizeError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), SizeError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| SizeError::Filesystem(err.to_string()))
    }

    /// Writes `content` next to `path` and renames it into place, so
    /// readers never see a half-written file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SizeError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SizeError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".sizemeup-")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SizeError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| SizeError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| SizeError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
