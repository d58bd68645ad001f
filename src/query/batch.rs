//! Bounded-size `IN` queries over large key sets.
//!
//! A request such as "every feature of these 5,000 genomes" is split into
//! batches of at most `batch_size` keys. Each batch runs as its own paginated
//! query with an `IN` clause added to a copy of the caller's filters, and all
//! batches share one row limit.

use super::{Connection, QueryPlan, split_fields};
use crate::filter::SolrFilter;
use crate::transport::Transport;
use crate::types::Record;
use crate::Result;
use std::slice::Chunks;
use tracing::debug;

/// A key field plus the values to look up in it.
#[derive(Debug, Clone)]
pub struct KeyLookup {
    field: String,
    keys: Vec<String>,
    batch_size: usize,
}

impl KeyLookup {
    /// Look up `keys` in the user-friendly `field`, `batch_size` keys per query.
    pub fn new<I, S>(field: &str, keys: I, batch_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.to_string(),
            keys: keys.into_iter().map(Into::into).collect(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Per-batch filter lists: `base` plus one `IN` clause each.
    pub fn batches<'a>(&'a self, base: &'a [SolrFilter]) -> KeyBatches<'a> {
        KeyBatches {
            field: &self.field,
            chunks: self.keys.chunks(self.batch_size),
            base,
        }
    }
}

/// Iterator over the filter list of each key batch. The caller's filters are
/// copied, never modified.
pub struct KeyBatches<'a> {
    field: &'a str,
    chunks: Chunks<'a, String>,
    base: &'a [SolrFilter],
}

impl Iterator for KeyBatches<'_> {
    type Item = Vec<SolrFilter>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.chunks.next()?;
        let mut filters = Vec::with_capacity(self.base.len() + 1);
        filters.extend_from_slice(self.base);
        filters.push(SolrFilter::in_set(self.field, batch.iter().cloned()));
        Some(filters)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<T: Transport> Connection<T> {
    /// Stream the records matching `filters` whose `lookup` field holds one
    /// of the lookup keys. Stops once `limit` records have been delivered,
    /// even if keys remain.
    pub async fn stream_records_by_keys<F>(
        &self,
        table: &str,
        fields: &str,
        filters: &[SolrFilter],
        lookup: &KeyLookup,
        limit: u64,
        mut consumer: F,
    ) -> Result<u64>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let descriptor = self.data_map.table(table)?;
        let fields = split_fields(fields);
        let mut delivered = 0;

        for (index, batch_filters) in lookup.batches(filters).enumerate() {
            let remaining = limit.saturating_sub(delivered);
            if remaining == 0 {
                debug!(batch = index, "row limit reached, skipping remaining keys");
                break;
            }
            let plan = QueryPlan::build(descriptor, &fields, &batch_filters)?;
            delivered += self.run_plan(&plan, remaining, &mut consumer).await?;
            debug!(batch = index, delivered, "key batch complete");
        }
        Ok(delivered)
    }

    /// Collect the records for a batched key lookup.
    pub async fn get_records_by_keys(
        &self,
        table: &str,
        fields: &str,
        filters: &[SolrFilter],
        lookup: &KeyLookup,
        limit: u64,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.stream_records_by_keys(table, fields, filters, lookup, limit, |record| {
            records.push(record);
            Ok(())
        })
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::{FakeService, feature_records};
    use crate::registry::DataMap;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn service(genomes: &[&str], per_genome: usize) -> Arc<FakeService> {
        let records = genomes
            .iter()
            .flat_map(|g| feature_records(per_genome, g))
            .collect();
        Arc::new(FakeService::new().with_table("genome_feature", records))
    }

    fn ids(records: &[Record]) -> BTreeSet<String> {
        records
            .iter()
            .map(|r| r["patric_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_batches_split_keys() {
        let lookup = KeyLookup::new("genome_id", ["a", "b", "c", "d", "e"], 2);
        let base = vec![SolrFilter::eq("type", "CDS")];
        let batches: Vec<Vec<SolrFilter>> = lookup.batches(&base).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0], base[0]);
        assert_eq!(batches[2][1], SolrFilter::in_set("genome_id", ["e"]));
    }

    #[tokio::test]
    async fn test_one_query_per_batch_and_same_union() {
        let genomes = ["83333.1", "511145.12", "562.100", "1280.5", "1313.7", "727.10", "90371.3"];
        let service = service(&genomes, 4);
        let conn = Connection::new(service.clone(), Arc::new(DataMap::default()), "http://fake/api")
            .with_chunk_size(1000);

        let filters = vec![SolrFilter::eq("type", "CDS")];
        let before = filters.clone();
        let lookup = KeyLookup::new("genome_id", genomes, 3);
        let batched = conn
            .get_records_by_keys("feature", "product", &filters, &lookup, u64::MAX)
            .await
            .unwrap();

        // ceil(7 / 3) = 3 queries, one page each
        assert_eq!(service.requests().len(), 3);
        assert_eq!(filters, before);

        let single = conn
            .get_records("feature", "product", &filters, u64::MAX)
            .await
            .unwrap();
        assert_eq!(ids(&batched), ids(&single));
        assert_eq!(batched.len(), 28);
    }

    #[tokio::test]
    async fn test_shared_limit_stops_early() {
        let genomes = ["1.1", "2.1", "3.1", "4.1"];
        let service = service(&genomes, 5);
        let conn = Connection::new(service.clone(), Arc::new(DataMap::default()), "http://fake/api");
        let lookup = KeyLookup::new("genome_id", genomes, 1);
        let records = conn
            .get_records_by_keys("feature", "product", &[], &lookup, 7)
            .await
            .unwrap();
        assert_eq!(records.len(), 7);
        // two batches reach the limit; the last two keys are never queried
        assert_eq!(service.requests().len(), 2);
        assert_eq!(service.requests()[1].param("rows").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_empty_lookup_issues_no_queries() {
        let service = service(&["1.1"], 2);
        let conn = Connection::new(service.clone(), Arc::new(DataMap::default()), "http://fake/api");
        let lookup = KeyLookup::new("genome_id", Vec::<String>::new(), 10);
        assert!(lookup.is_empty());
        let records = conn
            .get_records_by_keys("feature", "product", &[], &lookup, 100)
            .await
            .unwrap();
        assert!(records.is_empty());
        assert!(service.requests().is_empty());
    }
}
