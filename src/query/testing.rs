//! In-process fake of the BV-BRC data API for engine tests.
//!
//! Understands the query subset the engine emits: `*:*`, `field:value`,
//! `field:"quoted"` and `field:(a OR b)` clauses joined by ` AND `, plus both
//! paging protocols.

use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{Record, field_text};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub authorization: Option<String>,
}

impl SeenRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
pub(crate) struct FakeService {
    tables: HashMap<String, Vec<Record>>,
    cursor_marks: bool,
    reported_total: Option<u64>,
    raw_body: Option<String>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            cursor_marks: true,
            ..Default::default()
        }
    }

    pub fn with_table(mut self, internal: &str, records: Vec<Record>) -> Self {
        self.tables.insert(internal.to_string(), records);
        self
    }

    pub fn without_cursor_marks(mut self) -> Self {
        self.cursor_marks = false;
        self
    }

    pub fn reporting_total(mut self, total: u64) -> Self {
        self.reported_total = Some(total);
        self
    }

    pub fn with_raw_body(mut self, body: &str) -> Self {
        self.raw_body = Some(body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Requests made against one internal table.
    pub fn requests_for(&self, internal: &str) -> Vec<SeenRequest> {
        let path = format!("/{}/", internal);
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(&path))
            .collect()
    }

    fn respond(&self, request: &SeenRequest, accept: &str) -> ApiResponse {
        if let Some(body) = &self.raw_body {
            return ApiResponse::new(200, body.clone());
        }
        let internal = request
            .path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let Some(rows) = self.tables.get(internal) else {
            return ApiResponse::new(404, "");
        };

        let query = request.param("q").unwrap_or("*:*");
        let matching: Vec<&Record> = rows.iter().filter(|r| matches_query(r, query)).collect();
        let fields: Vec<&str> = request
            .param("fl")
            .map(|fl| fl.split(',').collect())
            .unwrap_or_default();
        let rows_wanted: usize = request
            .param("rows")
            .and_then(|r| r.parse().ok())
            .unwrap_or(matching.len());

        let start: usize = if accept == "application/solr+json" {
            match request.param("cursorMark") {
                Some("*") | None => 0,
                Some(mark) => mark.parse().unwrap_or(0),
            }
        } else {
            request
                .param("start")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        };
        let end = (start + rows_wanted).min(matching.len());
        let start = start.min(end);
        let docs: Vec<Record> = matching[start..end]
            .iter()
            .map(|r| project(r, &fields))
            .collect();

        if accept == "application/solr+json" {
            let total = self.reported_total.unwrap_or(matching.len() as u64);
            let mut body = json!({
                "responseHeader": {"status": 0},
                "response": {"numFound": total, "start": start, "docs": docs},
            });
            if self.cursor_marks {
                let mark = if docs.is_empty() {
                    request.param("cursorMark").unwrap_or("*").to_string()
                } else {
                    end.to_string()
                };
                body["nextCursorMark"] = json!(mark);
            }
            ApiResponse::new(200, body.to_string())
        } else {
            ApiResponse::new(200, json!(docs).to_string()).with_header(
                "Content-Range",
                format!("items {}-{}/{}", start, end, matching.len()),
            )
        }
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        let seen = SeenRequest {
            path: url::Url::parse(&request.url)
                .map(|u| u.path().to_string())
                .unwrap_or_default(),
            params: url::form_urlencoded::parse(request.body.as_deref().unwrap_or("").as_bytes())
                .into_owned()
                .collect(),
            authorization: header("Authorization"),
        };
        let accept = header("Accept").unwrap_or_default();
        let response = self.respond(&seen, &accept);
        self.seen.lock().unwrap().push(seen);
        Ok(response)
    }
}

fn project(record: &Record, fields: &[&str]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(name, _)| fields.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn matches_query(record: &Record, query: &str) -> bool {
    if query == "*:*" {
        return true;
    }
    query
        .split(" AND ")
        .all(|clause| matches_clause(record, clause))
}

fn matches_clause(record: &Record, clause: &str) -> bool {
    let (negated, clause) = match clause.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, clause),
    };
    let Some((field, operand)) = clause.split_once(':') else {
        return false;
    };
    let values: Vec<String> = match operand.strip_prefix('(').and_then(|o| o.strip_suffix(')')) {
        Some(list) => list.split(" OR ").map(unquote).collect(),
        None => vec![unquote(operand)],
    };
    let actual = field_text(record, field);
    let hit = actual.is_some_and(|a| values.contains(&a));
    hit != negated
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Feature rows `fig|<genome>.peg.<i>` for `i` in `0..n`.
pub(crate) fn feature_records(n: usize, genome: &str) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let value = json!({
                "patric_id": format!("fig|{}.peg.{}", genome, i),
                "genome_id": genome,
                "product": format!("product {}", i),
                "feature_type": "CDS",
                "aa_sequence_md5": format!("md5-{}", i % 3),
            });
            serde_json::from_value(value).unwrap()
        })
        .collect()
}
