use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::atb;
use crate::builder::{self, MergedTable, SourceTable};
use crate::config::BuildConfig;
use crate::domain::{GenomeSizeRecord, TableLayout};
use crate::error::SizeError;
use crate::fetch::{self, RemoteClient};
use crate::lookup::{self, LookupOutcome, SizeIndex};
use crate::sizes;
use crate::store::Store;
use crate::taxonomy::{TaxonomyClient, TaxonomyResolver};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub force: bool,
    /// Also estimate sizes from ATB assembly statistics.
    pub extended: bool,
    pub user_sizes: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub sizes_path: String,
    pub version: String,
    pub layout: TableLayout,
    pub total: usize,
    pub ncbi: usize,
    pub user_added: usize,
    pub user_shadowed: usize,
    pub atb_added: usize,
    pub unresolved_tax_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub out_dir: Utf8PathBuf,
    pub prefix: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from("./"),
            prefix: "sizemeup".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub found: bool,
    pub version: Option<String>,
    pub layout: TableLayout,
    pub record: Option<GenomeSizeRecord>,
    pub effective_query: Option<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Build,
    Query,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: RemoteClient, T: TaxonomyClient> {
    store: Store,
    config: BuildConfig,
    remote: C,
    resolver: TaxonomyResolver<T>,
}

impl<C: RemoteClient, T: TaxonomyClient> App<C, T> {
    pub fn new(store: Store, config: BuildConfig, remote: C, taxonomy: T) -> Result<Self, SizeError> {
        let resolver = TaxonomyResolver::new(taxonomy, config.chunk_size, config.max_chunk_size)?;
        Ok(Self {
            store,
            config,
            remote,
            resolver,
        })
    }

    /// Builds the sizes table and writes it to the output directory. Any
    /// failure aborts before the table is written.
    pub fn build(
        &self,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, SizeError> {
        let started = Instant::now();
        self.store.ensure_out_dir()?;
        self.store.ensure_cache_root()?;
        let atb_urls = if options.extended {
            Some(self.config.atb_urls()?)
        } else {
            None
        };

        let user = match &options.user_sizes {
            Some(path) => {
                emit(sink, format!("phase=Prepare; reading user sizes {}", path.display()));
                builder::load_user_sizes(path)?
            }
            None => SourceTable::new(),
        };

        let ncbi_path = fetch::fetch(
            &self.remote,
            &self.config.ncbi_sizes_url,
            self.store.ncbi_sizes_path().as_std_path(),
            options.force,
            sink,
        )?;
        let mut ncbi = builder::load_ncbi_sizes(&ncbi_path)?;

        emit(
            sink,
            format!("phase=Resolve; naming {} NCBI TaxIDs", ncbi.len()),
        );
        let tax_ids: Vec<_> = ncbi.keys().cloned().collect();
        let names = self.resolver.resolve_names(&tax_ids)?;
        let unnamed = builder::apply_names(&mut ncbi, &names);
        for tax_id in &unnamed {
            debug!("NCBI returned no species for TaxID {tax_id}");
        }

        emit(sink, "phase=Merge; applying source precedence".to_string());
        let (mut merged, stats) = builder::merge_sources(ncbi, user);
        info!(
            "Merged {} NCBI and {} user-provided genome sizes ({} user sizes shadowed by NCBI)",
            stats.ncbi, stats.user_added, stats.user_shadowed
        );

        let atb_added = match atb_urls {
            Some((file_list_url, stats_url)) => {
                self.add_atb(&mut merged, file_list_url, stats_url, options.force, sink)?
            }
            None => 0,
        };

        let layout = if options.extended {
            TableLayout::Extended
        } else {
            TableLayout::Basic
        };
        let version = sizes::build_version(chrono::Local::now().date_naive());
        let sizes_path = self.store.sizes_path();
        if merged.is_empty() {
            warn!("No genome sizes were collected, {sizes_path} will only hold a header");
        }
        emit(sink, format!("phase=Store; writing {sizes_path}"));
        info!("Writing genome sizes to {sizes_path}");
        sizes::write_sizes(&sizes_path, merged.records(), layout, &version)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; wrote {} genome sizes", merged.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(BuildResult {
            sizes_path: sizes_path.to_string(),
            version,
            layout,
            total: merged.len(),
            ncbi: stats.ncbi,
            user_added: stats.user_added,
            user_shadowed: stats.user_shadowed,
            atb_added,
            unresolved_tax_ids: stats.unresolved.iter().map(|id| id.to_string()).collect(),
        })
    }

    fn add_atb(
        &self,
        merged: &mut MergedTable,
        file_list_url: &str,
        stats_url: &str,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<usize, SizeError> {
        let known = merged.known_names();

        let file_list = fetch::fetch(
            &self.remote,
            file_list_url,
            self.store.atb_file_list_path().as_std_path(),
            force,
            sink,
        )?;
        let stats_path = fetch::fetch(
            &self.remote,
            stats_url,
            self.store.atb_assembly_stats_path().as_std_path(),
            force,
            sink,
        )?;

        emit(sink, "phase=Prepare; grouping ATB samples by species".to_string());
        let groups = atb::group_samples_by_species(
            &file_list,
            &self.config.atb_sample_column,
            &self.config.atb_species_column,
        )?;
        let candidates = atb::select_candidates(&groups, &known, self.config.min_genomes);
        info!(
            "{} ATB species with at least {} samples need a size",
            candidates.len(),
            self.config.min_genomes
        );
        if candidates.is_empty() {
            return Ok(0);
        }

        emit(
            sink,
            format!("phase=Resolve; looking up {} ATB species", candidates.len()),
        );
        let tax_ids = self.resolver.resolve_tax_ids(&candidates)?;

        let wanted: HashSet<&str> = candidates
            .iter()
            .filter(|name| tax_ids.contains_key(name.as_str()))
            .filter_map(|name| groups.get(name))
            .flatten()
            .map(String::as_str)
            .collect();
        emit(sink, "phase=Prepare; reading ATB assembly statistics".to_string());
        let lengths = atb::read_assembly_lengths(&stats_path, &wanted)?;
        let estimates = atb::estimate_sizes(&groups, &candidates, &lengths);
        Ok(builder::add_atb_estimates(merged, &estimates, &tax_ids))
    }
}

/// Looks up `query` in the table at `sizes_path` and writes the one-row
/// result file, found or not.
pub fn query(
    query: &str,
    sizes_path: &Path,
    options: &QueryOptions,
    sink: &dyn ProgressSink,
) -> Result<QueryResult, SizeError> {
    emit(sink, format!("phase=Prepare; loading {}", sizes_path.display()));
    let index = SizeIndex::load(sizes_path)?;
    if index.is_empty() {
        warn!("{} holds no genome sizes", sizes_path.display());
    } else {
        debug!("Loaded {} genome sizes from {}", index.len(), sizes_path.display());
    }
    emit(sink, format!("phase=Resolve; looking up {query}"));
    let outcome = lookup::lookup(query, &index)?;

    let output_path = lookup::result_path(&options.out_dir, &options.prefix);
    emit(sink, format!("phase=Store; writing {output_path}"));
    lookup::write_result(&output_path, &outcome, index.layout())?;

    let effective_query = match &outcome {
        LookupOutcome::Found(record) => Some(record.name.clone()),
        LookupOutcome::NotFound { effective, .. } => effective.clone(),
    };
    Ok(QueryResult {
        query: query.to_string(),
        found: outcome.record().is_some(),
        version: index.version().map(str::to_string),
        layout: index.layout(),
        record: outcome.record().cloned(),
        effective_query,
        output_path: output_path.to_string(),
    })
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}
