//! NCBI taxonomy summaries.
//!
//! Calls the E-utilities `esummary` endpoint, paced by a shared [`Pacer`]
//! on every attempt and cached per taxon id.

use crate::rate_limit::{PacedTransport, Pacer};
use crate::transport::{
    ApiRequest, HttpTransport, RetryPolicy, Telemetry, Transport, send_with_retry,
};
use crate::{Error, Result};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const NCBI_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Taxon ids per `esummary` request.
pub const SUMMARY_BATCH: usize = 200;

/// Summary of one NCBI taxon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaxonSummary {
    #[serde(rename = "uid")]
    pub taxon_id: String,
    #[serde(rename = "scientificname")]
    pub name: String,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub genus: String,
    #[serde(default)]
    pub species: String,
}

pub struct TaxonomyClient<T: Transport = HttpTransport> {
    transport: PacedTransport<T>,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    telemetry: Arc<Telemetry>,
    cache: Cache<String, Arc<TaxonSummary>>,
}

impl<T: Transport> TaxonomyClient<T> {
    pub fn new(transport: T, pacer: Arc<Pacer>, api_key: Option<String>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600)) // Cache for 1 hour
            .max_capacity(10_000)
            .build();

        Self {
            transport: PacedTransport::new(transport, pacer),
            base_url: NCBI_EUTILS_URL.to_string(),
            api_key,
            retry: RetryPolicy::default(),
            telemetry: Arc::new(Telemetry::default()),
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Summaries for `taxon_ids`, in input order. Unknown ids are skipped.
    pub async fn summaries(&self, taxon_ids: &[&str]) -> Result<Vec<Arc<TaxonSummary>>> {
        let mut missing = Vec::new();
        for id in taxon_ids {
            if self.cache.get(*id).await.is_none() && !missing.contains(id) {
                missing.push(*id);
            }
        }
        for chunk in missing.chunks(SUMMARY_BATCH) {
            for summary in self.fetch(chunk).await? {
                self.cache
                    .insert(summary.taxon_id.clone(), Arc::new(summary))
                    .await;
            }
        }

        let mut found = Vec::with_capacity(taxon_ids.len());
        for id in taxon_ids {
            match self.cache.get(*id).await {
                Some(summary) => found.push(summary),
                None => tracing::warn!("taxon {} not found at NCBI", id),
            }
        }
        Ok(found)
    }

    pub async fn summary(&self, taxon_id: &str) -> Result<Option<Arc<TaxonSummary>>> {
        Ok(self.summaries(&[taxon_id]).await?.pop())
    }

    async fn fetch(&self, taxon_ids: &[&str]) -> Result<Vec<TaxonSummary>> {
        let mut url = url::Url::parse(&format!("{}/esummary.fcgi", self.base_url))
            .map_err(|e| Error::Internal(format!("invalid NCBI URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("db", "taxonomy")
                .append_pair("retmode", "json")
                .append_pair("id", &taxon_ids.join(","));
            if let Some(key) = &self.api_key {
                query.append_pair("api_key", key);
            }
        }

        tracing::debug!("fetching {} taxonomy summaries", taxon_ids.len());
        let response = send_with_retry(
            &self.transport,
            &self.retry,
            &self.telemetry,
            &ApiRequest::get(url.as_str()),
        )
        .await?;
        parse_summaries(&response.body)
    }
}

fn parse_summaries(body: &[u8]) -> Result<Vec<TaxonSummary>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        Error::MalformedResponse(format!(
            "invalid esummary response: {}: {}",
            e,
            crate::error::abbreviate(&String::from_utf8_lossy(body), 200)
        ))
    })?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(Error::MalformedResponse(format!("esummary error: {}", message)));
    }
    let Some(result) = value.get("result") else {
        return Ok(Vec::new());
    };
    let uids = result
        .get("uids")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut summaries = Vec::with_capacity(uids.len());
    for uid in uids.iter().filter_map(Value::as_str) {
        let Some(entry) = result.get(uid) else {
            continue;
        };
        if entry.get("error").is_some() {
            tracing::debug!("esummary has no record for taxon {}", uid);
            continue;
        }
        summaries.push(serde_json::from_value(entry.clone())?);
    }
    Ok(summaries)
}
