//! Pagination state for one query.
//!
//! A [`PageCursor`] is an explicit value owned by the caller: it builds the
//! request for the next page and consumes the response, so independent
//! queries can run over one shared connection.

use crate::error::abbreviate;
use crate::transport::{ApiRequest, ApiResponse};
use crate::types::{ContentRange, Paging, Record, SolrResponse};
use crate::{Error, Result};
use tracing::debug;

/// Default rows requested per page.
pub const DEFAULT_CHUNK_SIZE: u64 = 25_000;

/// Payload characters quoted in a decode error.
const PAYLOAD_EXCERPT: usize = 200;

/// Initial cursor mark for SOLR deep paging.
const FIRST_MARK: &str = "*";

#[derive(Debug, Clone)]
pub struct PageCursor {
    url: String,
    paging: Paging,
    params: Vec<(String, String)>,
    chunk_size: u64,
    limit: u64,
    returned: u64,
    position: u64,
    mark: String,
    total: Option<u64>,
    done: bool,
}

impl PageCursor {
    pub fn new(
        url: String,
        paging: Paging,
        params: Vec<(String, String)>,
        limit: u64,
        chunk_size: u64,
    ) -> Self {
        Self {
            url,
            paging,
            params,
            chunk_size: chunk_size.max(1),
            limit,
            returned: 0,
            position: 0,
            mark: FIRST_MARK.to_string(),
            total: None,
            done: limit == 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Records delivered so far.
    pub fn returned(&self) -> u64 {
        self.returned
    }

    /// Total matches reported by the server on the last page.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.returned)
    }

    fn rows(&self) -> u64 {
        self.chunk_size.min(self.remaining())
    }

    /// Request for the next page. Authentication is added by the connection.
    pub fn next_request(&self) -> ApiRequest {
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.params {
            body.append_pair(name, value);
        }
        match self.paging {
            Paging::Range => {
                body.append_pair("start", &self.position.to_string());
            }
            Paging::Cursor => {
                body.append_pair("cursorMark", &self.mark);
            }
        }
        body.append_pair("rows", &self.rows().to_string());

        ApiRequest::post(self.url.clone(), body.finish())
            .header("Accept", self.paging.accept())
            .header("Content-Type", "application/solrquery+x-www-form-urlencoded")
    }

    /// Decode a page and advance. Records beyond the row limit are dropped.
    pub fn advance(&mut self, response: &ApiResponse) -> Result<Vec<Record>> {
        match self.paging {
            Paging::Range => self.advance_range(response),
            Paging::Cursor => self.advance_cursor(response),
        }
    }

    fn advance_range(&mut self, response: &ApiResponse) -> Result<Vec<Record>> {
        let mut docs: Vec<Record> = decode(&response.body)?;
        docs.truncate(self.remaining() as usize);
        self.returned += docs.len() as u64;

        match response.header("content-range") {
            None => self.done = true,
            Some(header) => {
                let range = ContentRange::parse(header).ok_or_else(|| {
                    Error::MalformedResponse(format!("invalid content-range header: {}", header))
                })?;
                let stalled = range.end <= self.position;
                self.position = range.end;
                self.total = Some(range.total);
                self.done = self.position >= range.total || stalled;
            }
        }
        self.done = self.done || self.returned >= self.limit || docs.is_empty();

        debug!(
            returned = self.returned,
            position = self.position,
            total = ?self.total,
            "range page received"
        );
        Ok(docs)
    }

    fn advance_cursor(&mut self, response: &ApiResponse) -> Result<Vec<Record>> {
        let parsed: SolrResponse = decode(&response.body)?;
        let mut docs = parsed.response.docs;
        docs.truncate(self.remaining() as usize);
        self.returned += docs.len() as u64;
        self.total = Some(parsed.response.num_found);

        let next = parsed
            .next_cursor_mark
            .filter(|mark| !mark.is_empty() && *mark != self.mark);
        let no_token = next.is_none();
        let limit_reached = self.returned >= self.limit;
        let all_found = self.returned >= parsed.response.num_found;
        self.done = no_token || limit_reached || all_found;
        if let Some(mark) = next {
            self.mark = mark;
        }

        debug!(
            returned = self.returned,
            total = parsed.response.num_found,
            no_token,
            limit_reached,
            all_found,
            "cursor page received"
        );
        Ok(docs)
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        Error::MalformedResponse(format!(
            "{}: {}",
            e,
            abbreviate(&String::from_utf8_lossy(body), PAYLOAD_EXCERPT)
        ))
    })
}
