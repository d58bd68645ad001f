//! Paginated, field-mapped query engine.
//!
//! A [`Connection`] turns "records of table X matching these filters" into a
//! sequence of HTTP requests against the BV-BRC data API:
//!
//! 1. the [`DataMap`] resolves table and field names ([`QueryPlan`])
//! 2. a [`PageCursor`] drives range or cursor-mark paging
//! 3. derived fields are joined in from their target tables page by page
//! 4. internal field names are mapped back before records reach the caller
//!
//! Large key sets go through the batching methods in [`batch`], which split
//! them into bounded `IN` queries.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> bvbrc_query::Result<()> {
//! use bvbrc_query::{Connection, DataMap, SolrFilter, transport::HttpTransport};
//! use std::{sync::Arc, time::Duration};
//!
//! let transport = HttpTransport::new(Duration::from_secs(180))?;
//! let conn = Connection::new(transport, Arc::new(DataMap::default()), "https://www.bv-brc.org/api/");
//! let records = conn
//!     .get_records("feature", "patric_id,product", &[SolrFilter::eq("genome_id", "83333.1")], 100_000)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
mod cursor;
mod derived;
mod plan;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{KeyBatches, KeyLookup};
pub use cursor::{DEFAULT_CHUNK_SIZE, PageCursor};
pub use plan::{MATCH_ALL, QueryPlan, split_fields};

use crate::filter::SolrFilter;
use crate::registry::DataMap;
use crate::transport::{
    ApiRequest, ApiResponse, HttpTransport, RetryPolicy, Telemetry, TelemetrySnapshot, Transport,
    send_with_retry,
};
use crate::types::{Paging, Record};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Query client for one BV-BRC API endpoint.
///
/// All query progress lives in caller-owned [`PageCursor`] values, so a
/// connection can serve several queries at once.
pub struct Connection<T: Transport = HttpTransport> {
    transport: T,
    data_map: Arc<DataMap>,
    base_url: String,
    token: Option<String>,
    paging: Paging,
    chunk_size: u64,
    retry: RetryPolicy,
    telemetry: Arc<Telemetry>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, data_map: Arc<DataMap>, base_url: &str) -> Self {
        Self {
            transport,
            data_map,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            paging: Paging::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    /// Attach an authorization token to every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn data_map(&self) -> &DataMap {
        &self.data_map
    }

    pub fn paging(&self) -> Paging {
        self.paging
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Send a request with authentication, retries and telemetry.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = match &self.token {
            Some(token) => request.header("Authorization", token.clone()),
            None => request,
        };
        send_with_retry(&self.transport, &self.retry, &self.telemetry, &request).await
    }

    /// Start paging through `plan`, delivering at most `limit` records.
    pub fn open_cursor(&self, plan: &QueryPlan<'_>, limit: u64) -> PageCursor {
        let url = format!("{}/{}/", self.base_url, plan.table().internal_name());
        PageCursor::new(url, self.paging, plan.params(), limit, self.chunk_size)
    }

    /// Fetch and decode the next page of `cursor`. Records keep their
    /// internal field names.
    pub async fn fetch_page(&self, cursor: &mut PageCursor) -> Result<Vec<Record>> {
        let response = self.send(cursor.next_request()).await?;
        cursor.advance(&response)
    }

    /// Stream every matching record to `consumer`. Returns the number of
    /// records delivered.
    ///
    /// Records already handed to the consumer stay delivered if a later page
    /// fails.
    pub async fn stream_records<F>(
        &self,
        table: &str,
        fields: &str,
        filters: &[SolrFilter],
        limit: u64,
        mut consumer: F,
    ) -> Result<u64>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let table = self.data_map.table(table)?;
        let plan = QueryPlan::build(table, &split_fields(fields), filters)?;
        self.run_plan(&plan, limit, &mut consumer).await
    }

    /// Collect every matching record.
    pub async fn get_records(
        &self,
        table: &str,
        fields: &str,
        filters: &[SolrFilter],
        limit: u64,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.stream_records(table, fields, filters, limit, |record| {
            records.push(record);
            Ok(())
        })
        .await?;
        Ok(records)
    }

    /// Look up one record by its key value.
    pub async fn get_record(&self, table: &str, key: &str, fields: &str) -> Result<Option<Record>> {
        let descriptor = self.data_map.table(table)?;
        let key_field = descriptor.user_field_name(descriptor.key());
        let filters = [SolrFilter::eq(key_field, key)];
        let mut records = self.get_records(table, fields, &filters, 1).await?;
        Ok(records.pop())
    }

    pub(crate) async fn run_plan<F>(
        &self,
        plan: &QueryPlan<'_>,
        limit: u64,
        consumer: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let mut cursor = self.open_cursor(plan, limit);
        let mut delivered = 0;
        while !cursor.is_done() {
            let mut page = self.fetch_page(&mut cursor).await?;
            if !plan.derived().is_empty() {
                self.resolve_derived(plan, &mut page).await?;
            }
            for record in page {
                consumer(plan.present(record))?;
                delivered += 1;
            }
        }
        debug!(
            table = plan.table().name(),
            delivered,
            total = ?cursor.total(),
            "query complete"
        );
        Ok(delivered)
    }
}
