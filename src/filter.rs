//! SOLR filter clauses.
//!
//! A [`SolrFilter`] holds a user-friendly field name and its operand(s); the
//! internal field name is only looked up when the filter is serialized
//! against a [`TableDescriptor`].

use crate::registry::{DataMap, TableDescriptor};
use crate::{Error, Result};

/// Characters that must be backslash-escaped inside a quoted value.
const SPECIAL_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '?', ':', '\\',
];

/// One end of a range filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Open,
    Inclusive(String),
    Exclusive(String),
}

impl Bound {
    fn is_open(&self) -> bool {
        matches!(self, Bound::Open)
    }
}

/// Both ends of a range filter; exactly one of them is open.
///
/// Only built through [`SolrFilter::range`] and the relational constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBounds {
    low: Bound,
    high: Bound,
}

impl RangeBounds {
    pub fn low(&self) -> &Bound {
        &self.low
    }

    pub fn high(&self) -> &Bound {
        &self.high
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolrFilter {
    Eq { field: String, value: String },
    Ne { field: String, value: String },
    In { field: String, values: Vec<String> },
    Range { field: String, bounds: RangeBounds },
}

impl SolrFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        SolrFilter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> Self {
        SolrFilter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_set<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SolrFilter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::half_open(field, Bound::Exclusive(value.into()), Bound::Open)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::half_open(field, Bound::Inclusive(value.into()), Bound::Open)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::half_open(field, Bound::Open, Bound::Exclusive(value.into()))
    }

    pub fn le(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::half_open(field, Bound::Open, Bound::Inclusive(value.into()))
    }

    /// Build a range filter. Exactly one bound must be open.
    pub fn range(field: impl Into<String>, low: Bound, high: Bound) -> Result<Self> {
        let field = field.into();
        check_range(&field, &low, &high)?;
        Ok(SolrFilter::Range {
            field,
            bounds: RangeBounds { low, high },
        })
    }

    fn half_open(field: impl Into<String>, low: Bound, high: Bound) -> Self {
        SolrFilter::Range {
            field: field.into(),
            bounds: RangeBounds { low, high },
        }
    }

    /// The user-friendly field this filter constrains.
    pub fn field(&self) -> &str {
        match self {
            SolrFilter::Eq { field, .. }
            | SolrFilter::Ne { field, .. }
            | SolrFilter::In { field, .. }
            | SolrFilter::Range { field, .. } => field,
        }
    }

    /// Serialize to a query clause, resolving the field through `table`.
    pub fn to_clause(&self, table: &TableDescriptor) -> Result<String> {
        let name = table.internal_field_name(self.field())?;
        match self {
            SolrFilter::Eq { value, .. } => Ok(format!("{}:{}", name, format_value(value))),
            SolrFilter::Ne { value, .. } => Ok(format!("-{}:{}", name, format_value(value))),
            SolrFilter::In { field, values } => {
                if values.is_empty() {
                    return Err(Error::InvalidFilter(format!("empty value set for {}", field)));
                }
                let list: Vec<String> = values.iter().map(|v| format_value(v)).collect();
                Ok(format!("{}:({})", name, list.join(" OR ")))
            }
            SolrFilter::Range { bounds, .. } => {
                let low = match &bounds.low {
                    Bound::Open => "[*".to_string(),
                    Bound::Inclusive(v) => format!("[{}", format_value(v)),
                    Bound::Exclusive(v) => format!("{{{}", format_value(v)),
                };
                let high = match &bounds.high {
                    Bound::Open => "*]".to_string(),
                    Bound::Inclusive(v) => format!("{}]", format_value(v)),
                    Bound::Exclusive(v) => format!("{}}}", format_value(v)),
                };
                Ok(format!("{}:{} TO {}", name, low, high))
            }
        }
    }
}

fn check_range(field: &str, low: &Bound, high: &Bound) -> Result<()> {
    if low.is_open() == high.is_open() {
        return Err(Error::InvalidFilter(format!(
            "range on {} must have exactly one open bound",
            field
        )));
    }
    Ok(())
}

/// Serialize `filters` for `table`, preserving order.
pub fn to_strings(map: &DataMap, table: &str, filters: &[SolrFilter]) -> Result<Vec<String>> {
    let table = map.table(table)?;
    filters.iter().map(|f| f.to_clause(table)).collect()
}

/// Emit numeric-looking values bare and quote everything else.
pub fn format_value(value: &str) -> String {
    if is_numeric(value) {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Wrap a value in double quotes, backslash-escaping SOLR special characters.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if SPECIAL_CHARS.contains(&c) {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Unsigned decimal: digits with at most one interior dot.
fn is_numeric(value: &str) -> bool {
    let mut parts = value.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match parts.next() {
        Some(frac) => digits(whole) && digits(frac),
        None => digits(whole),
    }
}
