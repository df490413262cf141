use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use sizemeup::app::{App, BuildOptions};
use sizemeup::config::BuildConfig;
use sizemeup::domain::{SizeSource, TableLayout, TaxId};
use sizemeup::error::SizeError;
use sizemeup::fetch::RemoteClient;
use sizemeup::output::JsonOutput;
use sizemeup::sizes::read_sizes;
use sizemeup::store::Store;
use sizemeup::taxonomy::{TaxonomyClient, TaxonomyEntry, TaxonomyNode};

const NCBI_URL: &str = "https://sizes.test/species_genome_size.txt.gz";
const FILE_LIST_URL: &str = "https://sizes.test/file_list.tsv.gz";
const STATS_URL: &str = "https://sizes.test/assembly_stats.tsv.gz";

const NCBI_SIZES: &str = "\
#species_taxid\tmin_ungapped_length\tmax_ungapped_length\texpected_ungapped_length\tnumber_of_genomes\tmethod_determined
7\t4800000\t6000000\t5369772\t3\tautomatic
9\t500000\t700000\t559368\t10\tautomatic
99999\t1\t2\t3\t1\tautomatic
";

const FILE_LIST: &str = "\
sample\tsylph_species\tfilename
S1\tEscherichia coli\tS1.fa.gz
S2\tEscherichia coli\tS2.fa.gz
S3\tEscherichia coli\tS3.fa.gz
S4\tAzorhizobium caulinodans\tS4.fa.gz
S5\tAzorhizobium caulinodans\tS5.fa.gz
S6\tSalmonella_A 12345 sp\tS6.fa.gz
S7\tSalmonella_A 12345 sp\tS7.fa.gz
S8\tRare bacterium\tS8.fa.gz
S9\tUnnamed bacterium\tS9.fa.gz
S10\tUnnamed bacterium\tS10.fa.gz
";

const ASSEMBLY_STATS: &str = "\
sample\ttotal_length\tnumber
S1\t5000000\t80
S2\t5000001\t75
S4\t5400000\t12
S9\t3000000\t40
S10\t3000000\t40
";

struct MockRemote {
    files: HashMap<&'static str, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl MockRemote {
    fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(NCBI_URL, gzip(NCBI_SIZES));
        files.insert(FILE_LIST_URL, FILE_LIST.as_bytes().to_vec());
        files.insert(STATS_URL, gzip(ASSEMBLY_STATS));
        Self {
            files,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteClient for MockRemote {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        _sink: &dyn sizemeup::app::ProgressSink,
    ) -> Result<u64, SizeError> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = self.files.get(url).ok_or_else(|| SizeError::FetchStatus {
            url: url.to_string(),
            status: 404,
            message: "not found".to_string(),
        })?;
        fs::write(destination, body).unwrap();
        Ok(body.len() as u64)
    }
}

impl RemoteClient for &MockRemote {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn sizemeup::app::ProgressSink,
    ) -> Result<u64, SizeError> {
        (*self).download(url, destination, sink)
    }
}

/// Answers taxids and names from a fixed table. Unknown queries are
/// silently dropped, the way the taxonomy service reports them.
struct MockTaxonomy;

impl MockTaxonomy {
    fn entry(query: &str) -> Option<TaxonomyEntry> {
        let (tax_id, name, lineage): (u64, &str, Vec<u64>) = match query {
            "7" | "Azorhizobium caulinodans" => (7, "Azorhizobium caulinodans", vec![1, 131567, 2]),
            "9" | "Buchnera aphidicola" => (9, "Buchnera aphidicola", vec![1, 131567, 2]),
            "Escherichia coli" => (562, "Escherichia coli", vec![1, 131567, 2]),
            _ => return None,
        };
        Some(TaxonomyEntry {
            tax_id,
            organism_name: name.to_string(),
            lineage,
        })
    }
}

impl TaxonomyClient for MockTaxonomy {
    fn query(&self, taxons: &[String]) -> Result<Vec<TaxonomyNode>, SizeError> {
        Ok(taxons
            .iter()
            .map(|taxon| TaxonomyNode {
                taxonomy: Self::entry(taxon),
            })
            .collect())
    }
}

/// Answers like [`MockTaxonomy`] until the request numbered `fail_on`, or
/// any name lookup when `fail_on_names` is set, then reports the service
/// as unavailable.
struct FailingTaxonomy {
    calls: Mutex<usize>,
    fail_on: Option<usize>,
    fail_on_names: bool,
}

impl FailingTaxonomy {
    fn on_request(fail_on: usize) -> Self {
        Self {
            calls: Mutex::new(0),
            fail_on: Some(fail_on),
            fail_on_names: false,
        }
    }

    fn on_names() -> Self {
        Self {
            calls: Mutex::new(0),
            fail_on: None,
            fail_on_names: true,
        }
    }
}

impl TaxonomyClient for FailingTaxonomy {
    fn query(&self, taxons: &[String]) -> Result<Vec<TaxonomyNode>, SizeError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let is_names = taxons
            .iter()
            .any(|taxon| taxon.parse::<u64>().is_err());
        if self.fail_on == Some(*calls) || (self.fail_on_names && is_names) {
            return Err(SizeError::TaxonomyStatus {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        MockTaxonomy.query(taxons)
    }
}

/// Resolves nothing.
struct EmptyTaxonomy;

impl TaxonomyClient for EmptyTaxonomy {
    fn query(&self, _taxons: &[String]) -> Result<Vec<TaxonomyNode>, SizeError> {
        Ok(Vec::new())
    }
}

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn config() -> BuildConfig {
    BuildConfig {
        ncbi_sizes_url: NCBI_URL.to_string(),
        atb_file_list_url: Some(FILE_LIST_URL.to_string()),
        atb_assembly_stats_url: Some(STATS_URL.to_string()),
        chunk_size: 2,
        min_genomes: 2,
        ..BuildConfig::default()
    }
}

fn store(root: &Path) -> Store {
    let out_dir = Utf8PathBuf::from_path_buf(root.join("out")).unwrap();
    let cache_root = Utf8PathBuf::from_path_buf(root.join("cache")).unwrap();
    Store::new_with_paths(out_dir, cache_root)
}

#[test]
fn basic_build_names_ncbi_sizes() {
    let temp = tempfile::tempdir().unwrap();
    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config(), &remote, MockTaxonomy).unwrap();

    let result = app.build(&BuildOptions::default(), &JsonOutput).unwrap();

    assert_eq!(result.layout, TableLayout::Basic);
    assert_eq!(result.ncbi, 2);
    assert_eq!(result.total, 2);
    assert_eq!(result.unresolved_tax_ids, vec!["99999".to_string()]);
    assert_eq!(remote.calls(), vec![NCBI_URL.to_string()]);

    let table = read_sizes(Path::new(&result.sizes_path)).unwrap();
    assert_eq!(table.layout, TableLayout::Basic);
    assert_eq!(table.version.as_deref(), Some(result.version.as_str()));
    let first = &table.records[0];
    assert_eq!(first.name, "Azorhizobium caulinodans");
    assert_eq!(first.tax_id, TaxId::from("7"));
    assert_eq!(first.size, 5369772);
    assert_eq!(first.source, SizeSource::Ncbi);
    assert_eq!(first.category, None);
}

#[test]
fn unnamed_taxids_leave_a_header_only_table() {
    let temp = tempfile::tempdir().unwrap();
    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config(), &remote, EmptyTaxonomy).unwrap();

    let result = app.build(&BuildOptions::default(), &JsonOutput).unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(
        result.unresolved_tax_ids,
        vec!["7".to_string(), "9".to_string(), "99999".to_string()]
    );
    let table = read_sizes(Path::new(&result.sizes_path)).unwrap();
    assert!(table.records.is_empty());
    assert_eq!(table.version.as_deref(), Some(result.version.as_str()));
}

#[test]
fn cached_downloads_are_reused_unless_forced() {
    let temp = tempfile::tempdir().unwrap();
    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config(), &remote, MockTaxonomy).unwrap();

    app.build(&BuildOptions::default(), &JsonOutput).unwrap();
    app.build(&BuildOptions::default(), &JsonOutput).unwrap();
    assert_eq!(remote.calls().len(), 1);

    let forced = BuildOptions {
        force: true,
        ..BuildOptions::default()
    };
    app.build(&forced, &JsonOutput).unwrap();
    assert_eq!(remote.calls().len(), 2);
}

#[test]
fn user_sizes_fill_gaps_but_never_replace_named_ncbi_rows() {
    let temp = tempfile::tempdir().unwrap();
    let user_path = temp.path().join("user.tsv");
    fs::write(
        &user_path,
        "name\ttax_id\texpected_ungapped_length\tmethod_determined\n\
         Buchnera override\t9\t1\tmanual\n\
         Unresolved override\t99999\t2\tmanual\n\
         Homo sapiens\t9606\t3100000000\tmanual\n",
    )
    .unwrap();

    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config(), &remote, MockTaxonomy).unwrap();
    let options = BuildOptions {
        user_sizes: Some(user_path),
        ..BuildOptions::default()
    };
    let result = app.build(&options, &JsonOutput).unwrap();

    assert_eq!(result.user_added, 2);
    assert_eq!(result.user_shadowed, 1);
    assert_eq!(result.unresolved_tax_ids, vec!["99999".to_string()]);
    let table = read_sizes(Path::new(&result.sizes_path)).unwrap();
    let names: Vec<&str> = table.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Azorhizobium caulinodans",
            "Buchnera aphidicola",
            "Unresolved override",
            "Homo sapiens"
        ]
    );
    let unresolved = &table.records[2];
    assert_eq!(unresolved.tax_id, TaxId::from("99999"));
    assert_eq!(unresolved.source, SizeSource::User);
    assert_eq!(unresolved.size, 2);
    let human = &table.records[3];
    assert_eq!(human.source, SizeSource::User);
    assert_eq!(human.size, 3100000000);
}

#[test]
fn extended_build_adds_atb_estimates() {
    let temp = tempfile::tempdir().unwrap();
    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config(), &remote, MockTaxonomy).unwrap();
    let options = BuildOptions {
        extended: true,
        ..BuildOptions::default()
    };

    let result = app.build(&options, &JsonOutput).unwrap();

    assert_eq!(result.layout, TableLayout::Extended);
    assert_eq!(result.atb_added, 1);
    let table = read_sizes(Path::new(&result.sizes_path)).unwrap();
    assert_eq!(table.layout, TableLayout::Extended);
    assert_eq!(table.records.len(), 3);

    let azorhizobium = &table.records[0];
    assert_eq!(azorhizobium.source, SizeSource::Ncbi);
    assert_eq!(azorhizobium.category.as_deref(), Some("bacteria"));

    let ecoli = &table.records[2];
    assert_eq!(ecoli.name, "Escherichia coli");
    assert_eq!(ecoli.tax_id, TaxId::from("562"));
    assert_eq!(ecoli.category.as_deref(), Some("bacteria"));
    assert_eq!(ecoli.size, 5000000);
    assert_eq!(ecoli.source, SizeSource::Atb);
    assert_eq!(ecoli.method, "Average assembly size of 2 samples");
}

#[test]
fn extended_build_needs_atb_urls() {
    let temp = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        atb_assembly_stats_url: None,
        ..config()
    };
    let remote = MockRemote::new();
    let app = App::new(store(temp.path()), config, &remote, MockTaxonomy).unwrap();
    let options = BuildOptions {
        extended: true,
        ..BuildOptions::default()
    };

    let err = app.build(&options, &JsonOutput).unwrap_err();
    assert_matches!(err, SizeError::MissingSetting(ref name) if name == "atb_assembly_stats_url");
    assert!(remote.calls().is_empty());
}

#[test]
fn failed_download_leaves_no_table() {
    let temp = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        ncbi_sizes_url: "https://sizes.test/missing.txt.gz".to_string(),
        ..config()
    };
    let store = store(temp.path());
    let sizes_path = store.sizes_path();
    let remote = MockRemote::new();
    let app = App::new(store, config, &remote, MockTaxonomy).unwrap();

    let err = app.build(&BuildOptions::default(), &JsonOutput).unwrap_err();
    assert_matches!(err, SizeError::FetchStatus { status: 404, .. });
    assert!(!sizes_path.exists());
}

#[test]
fn taxonomy_failure_on_later_chunk_leaves_no_table() {
    let temp = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        chunk_size: 1,
        ..config()
    };
    let store = store(temp.path());
    let sizes_path = store.sizes_path();
    let remote = MockRemote::new();
    let app = App::new(store, config, &remote, FailingTaxonomy::on_request(2)).unwrap();

    let err = app.build(&BuildOptions::default(), &JsonOutput).unwrap_err();
    assert_matches!(err, SizeError::TaxonomyStatus { status: 503, .. });
    assert!(!sizes_path.exists());
}

#[test]
fn atb_name_lookup_failure_leaves_no_table() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(temp.path());
    let sizes_path = store.sizes_path();
    let remote = MockRemote::new();
    let app = App::new(store, config(), &remote, FailingTaxonomy::on_names()).unwrap();
    let options = BuildOptions {
        extended: true,
        ..BuildOptions::default()
    };

    let err = app.build(&options, &JsonOutput).unwrap_err();
    assert_matches!(err, SizeError::TaxonomyStatus { status: 503, .. });
    assert!(!sizes_path.exists());
    assert_eq!(remote.calls().len(), 3);
}

#[test]
fn oversized_chunks_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        chunk_size: 1001,
        ..config()
    };
    let remote = MockRemote::new();
    let err = App::new(store(temp.path()), config, &remote, MockTaxonomy)
        .err()
        .unwrap();
    assert_matches!(
        err,
        SizeError::InvalidChunkSize {
            requested: 1001,
            max: 1000
        }
    );
}
