use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result document, keyed by field name.
pub type Record = Map<String, Value>;

/// Continuation protocol used to page through a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Paging {
    /// Offset paging: bare JSON array plus a `content-range` header.
    Range,
    /// SOLR cursor-mark paging.
    #[default]
    Cursor,
}

impl Paging {
    pub fn accept(&self) -> &'static str {
        match self {
            Paging::Range => "application/json",
            Paging::Cursor => "application/solr+json",
        }
    }
}

/// Cursor-mark response envelope (`application/solr+json`).
#[derive(Debug, Deserialize)]
pub struct SolrResponse {
    pub response: SolrResponseBody,
    #[serde(rename = "nextCursorMark")]
    pub next_cursor_mark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SolrResponseBody {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<Record>,
}

/// Parsed `content-range: items <first>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn parse(header: &str) -> Option<Self> {
        let rest = header.trim().strip_prefix("items")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (first, end) = span.split_once('-')?;
        Some(Self {
            first: first.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
            total: total.trim().parse().ok()?,
        })
    }
}

/// Read a field of a record as text, rendering numbers the way the service
/// prints them. Empty strings and nulls count as absent.
pub fn field_text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
