use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::domain::{TaxId, UNKNOWN_CATEGORY};
use crate::error::SizeError;

/// Top-level lineage nodes used to tag a species, in reporting order.
pub const CATEGORY_IDS: [(u64, &str); 7] = [
    (2, "bacteria"),
    (2157, "archaea"),
    (2759, "eukaryota"),
    (4751, "fungi"),
    (10239, "virus"),
    (12908, "unclassified"),
    (28384, "other"),
];

#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyRequest<'a> {
    pub taxons: &'a [String],
    pub returned_content: &'static str,
    pub page_size: usize,
    pub include_tabular_header: &'static str,
    pub table_format: &'static str,
    pub children: bool,
    pub ranks: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
}

impl<'a> TaxonomyRequest<'a> {
    pub fn species_summary(taxons: &'a [String], page_size: usize) -> Self {
        Self {
            taxons,
            returned_content: "METADATA",
            page_size,
            include_tabular_header: "INCLUDE_TABULAR_HEADER_FIRST_PAGE_ONLY",
            table_format: "SUMMARY",
            children: false,
            ranks: ["SPECIES"],
            page_token: None,
        }
    }

    pub fn with_page_token(mut self, page_token: Option<&'a str>) -> Self {
        self.page_token = page_token;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomyResponse {
    #[serde(default)]
    pub taxonomy_nodes: Vec<TaxonomyNode>,
    /// Set while more nodes remain for the same request.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomyNode {
    /// Absent when the queried identifier did not resolve.
    #[serde(default)]
    pub taxonomy: Option<TaxonomyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyEntry {
    pub tax_id: u64,
    pub organism_name: String,
    #[serde(default)]
    pub lineage: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTaxon {
    pub name: String,
    pub category: String,
}

pub trait TaxonomyClient: Send + Sync {
    /// Sends one batch of taxids or names and returns the nodes NCBI
    /// reports for it.
    fn query(&self, taxons: &[String]) -> Result<Vec<TaxonomyNode>, SizeError>;
}

#[derive(Clone)]
pub struct NcbiTaxonomyClient {
    client: Client,
    url: String,
    page_size: usize,
}

impl NcbiTaxonomyClient {
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self, SizeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sizemeup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SizeError::Filesystem(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(api_key)
                    .map_err(|err| SizeError::TaxonomyHttp(err.to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SizeError::TaxonomyHttp(err.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            page_size,
        })
    }

    /// Client for `config.taxonomy_url` asking for pages as large as the
    /// API allows.
    pub fn from_config(config: &BuildConfig, api_key: Option<&str>) -> Result<Self, SizeError> {
        Self::new(
            &config.taxonomy_url,
            api_key,
            config.max_chunk_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn query_page(
        &self,
        taxons: &[String],
        page_token: Option<&str>,
    ) -> Result<TaxonomyResponse, SizeError> {
        let payload =
            TaxonomyRequest::species_summary(taxons, self.page_size).with_page_token(page_token);
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|err| SizeError::TaxonomyHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI taxonomy request failed".to_string());
            return Err(SizeError::TaxonomyStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| SizeError::TaxonomyHttp(err.to_string()))?;
        parse_page(&body)
    }
}

impl TaxonomyClient for NcbiTaxonomyClient {
    fn query(&self, taxons: &[String]) -> Result<Vec<TaxonomyNode>, SizeError> {
        let mut nodes = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.query_page(taxons, page_token.as_deref())?;
            nodes.extend(page.taxonomy_nodes);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) if page_token.as_deref() != Some(token.as_str()) => {
                    debug!("Following next page of {} taxons", taxons.len());
                    page_token = Some(token);
                }
                _ => break,
            }
        }
        Ok(nodes)
    }
}

pub fn parse_page(body: &str) -> Result<TaxonomyResponse, SizeError> {
    serde_json::from_str(body).map_err(|err| SizeError::TaxonomyParse(err.to_string()))
}

pub fn parse_response(body: &str) -> Result<Vec<TaxonomyNode>, SizeError> {
    Ok(parse_page(body)?.taxonomy_nodes)
}

/// Comma-joined category tags for a lineage, or `unknown` when none of
/// the known top-level nodes appear in it.
pub fn derive_category(lineage: &[u64]) -> String {
    let matches: Vec<&str> = CATEGORY_IDS
        .iter()
        .filter(|(id, _)| lineage.contains(id))
        .map(|(_, name)| *name)
        .collect();
    if matches.is_empty() {
        UNKNOWN_CATEGORY.to_string()
    } else {
        matches.join(",")
    }
}

/// Batches lookups against a [`TaxonomyClient`], one request per chunk.
pub struct TaxonomyResolver<T: TaxonomyClient> {
    client: T,
    chunk_size: usize,
}

impl<T: TaxonomyClient> TaxonomyResolver<T> {
    /// `chunk_size` must be at least 1 and no larger than `max_chunk_size`,
    /// the per-request cap of the remote API.
    pub fn new(client: T, chunk_size: usize, max_chunk_size: usize) -> Result<Self, SizeError> {
        if chunk_size == 0 || chunk_size > max_chunk_size {
            return Err(SizeError::InvalidChunkSize {
                requested: chunk_size,
                max: max_chunk_size,
            });
        }
        Ok(Self { client, chunk_size })
    }

    pub fn client(&self) -> &T {
        &self.client
    }

    pub fn resolve_names(
        &self,
        tax_ids: &[TaxId],
    ) -> Result<HashMap<TaxId, ResolvedTaxon>, SizeError> {
        info!("Converting {} TaxIDs to species names", tax_ids.len());
        let queries: Vec<String> = tax_ids.iter().map(|id| id.to_string()).collect();
        let mut resolved = HashMap::new();
        for entry in self.query_chunks(&queries)? {
            resolved.insert(
                TaxId::from(entry.tax_id),
                ResolvedTaxon {
                    category: derive_category(&entry.lineage),
                    name: entry.organism_name,
                },
            );
        }
        info!("Converted {} TaxIDs to species names", resolved.len());
        Ok(resolved)
    }

    /// Maps NCBI's organism name for each resolved query to its taxid.
    pub fn resolve_tax_ids(&self, names: &[String]) -> Result<HashMap<String, TaxId>, SizeError> {
        info!("Converting {} species names to TaxIDs", names.len());
        let mut resolved = HashMap::new();
        for entry in self.query_chunks(names)? {
            resolved.insert(entry.organism_name, TaxId::from(entry.tax_id));
        }
        info!("Converted {} species names to TaxIDs", resolved.len());
        Ok(resolved)
    }

    fn query_chunks(&self, queries: &[String]) -> Result<Vec<TaxonomyEntry>, SizeError> {
        let total = queries.len().div_ceil(self.chunk_size);
        let mut entries = Vec::new();
        for (i, chunk) in queries.chunks(self.chunk_size).enumerate() {
            debug!("Processing chunk {} of {total} ({} taxons)", i + 1, chunk.len());
            let nodes = self.client.query(chunk)?;
            entries.extend(nodes.into_iter().filter_map(|node| node.taxonomy));
        }
        Ok(entries)
    }
}
