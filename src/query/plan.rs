use crate::filter::SolrFilter;
use crate::registry::{DerivedField, FieldDescriptor, TableDescriptor};
use crate::types::Record;
use crate::Result;

/// Clause sent when a query has no filters.
pub const MATCH_ALL: &str = "*:*";

/// A derived output field requested by the caller.
#[derive(Debug, Clone)]
pub(crate) struct DerivedRequest<'a> {
    pub output: String,
    pub spec: &'a DerivedField,
}

/// One table-scoped query with every name resolved to its wire form.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    table: &'a TableDescriptor,
    fields: Vec<String>,
    clauses: Vec<String>,
    derived: Vec<DerivedRequest<'a>>,
}

impl<'a> QueryPlan<'a> {
    /// Resolve user-friendly `fields` and `filters` against `table`.
    ///
    /// The key field is always fetched. Derived fields contribute their
    /// linking field to the field list and are resolved after each page.
    pub fn build<S: AsRef<str>>(
        table: &'a TableDescriptor,
        fields: &[S],
        filters: &[SolrFilter],
    ) -> Result<Self> {
        let mut plan = Self {
            table,
            fields: vec![table.key().to_string()],
            clauses: filters
                .iter()
                .map(|f| f.to_clause(table))
                .collect::<Result<Vec<_>>>()?,
            derived: Vec::new(),
        };
        for field in fields {
            let field = field.as_ref();
            match table.field(field) {
                Some(FieldDescriptor::Derived(spec)) => {
                    plan.add_field(&spec.link);
                    plan.derived.push(DerivedRequest {
                        output: field.to_string(),
                        spec,
                    });
                }
                _ => {
                    let internal = table.internal_field_name(field)?;
                    plan.add_field(&internal);
                }
            }
        }
        Ok(plan)
    }

    fn add_field(&mut self, internal: &str) {
        if !self.fields.iter().any(|f| f == internal) {
            self.fields.push(internal.to_string());
        }
    }

    pub fn table(&self) -> &'a TableDescriptor {
        self.table
    }

    /// Internal field names, in request order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn query(&self) -> String {
        if self.clauses.is_empty() {
            MATCH_ALL.to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// Sort on the table's sort field, tie-broken by the key so cursor
    /// paging sees a total order.
    pub fn sort(&self) -> String {
        let sort = self.table.sort();
        let key = self.table.key();
        if sort == key {
            format!("{} asc", key)
        } else {
            format!("{} asc,{} asc", sort, key)
        }
    }

    /// Parameters that stay constant for every page of this query.
    pub fn params(&self) -> Vec<(String, String)> {
        vec![
            ("q".to_string(), self.query()),
            ("fl".to_string(), self.fields.join(",")),
            ("sort".to_string(), self.sort()),
        ]
    }

    pub(crate) fn derived(&self) -> &[DerivedRequest<'a>] {
        &self.derived
    }

    /// Rename internal field names to their user-friendly aliases.
    pub fn present(&self, record: Record) -> Record {
        record
            .into_iter()
            .map(|(name, value)| {
                let user = self.table.user_field_name(&name);
                if user == name {
                    (name, value)
                } else {
                    (user.to_string(), value)
                }
            })
            .collect()
    }
}

/// Split a comma-delimited field list.
pub fn split_fields(fields: &str) -> Vec<&str> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect()
}
