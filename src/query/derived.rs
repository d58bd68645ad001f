//! Derived-field resolution.
//!
//! A derived field lives in another table and is found through a linking
//! value in the current record (for example a protein sequence found through
//! `aa_sequence_md5`). Resolution runs on a page of records that still carry
//! internal field names, so the linking fields are addressable.

use super::batch::KeyLookup;
use super::plan::DerivedRequest;
use super::{Connection, QueryPlan};
use crate::registry::TableDescriptor;
use crate::transport::Transport;
use crate::types::{Record, field_text};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

impl<T: Transport> Connection<T> {
    /// Fill every derived field `plan` requests into `records`. Records with
    /// a blank linking value, or one with no match, are left without it.
    pub(crate) async fn resolve_derived(
        &self,
        plan: &QueryPlan<'_>,
        records: &mut [Record],
    ) -> Result<()> {
        for request in plan.derived() {
            self.resolve_one(request, records).await?;
        }
        Ok(())
    }

    async fn resolve_one(&self, request: &DerivedRequest<'_>, records: &mut [Record]) -> Result<()> {
        let spec = request.spec;
        let target = self.data_map.table(&spec.table)?;

        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if let Some(link) = field_text(record, &spec.link) {
                groups.entry(link).or_default().push(index);
            }
        }
        if groups.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = groups.keys().cloned().collect();
        let found = self
            .lookup_values(target, &spec.field, keys, spec.batch_size)
            .await?;

        let mut missing = 0;
        for (link, indices) in groups {
            match found.get(&link) {
                Some(value) => {
                    for index in indices {
                        records[index].insert(request.output.clone(), value.clone());
                    }
                }
                None => {
                    missing += 1;
                    debug!(link = %link, table = target.name(), "no match for derived field key");
                }
            }
        }
        if missing > 0 {
            warn!(
                "{} {} value(s) had no match in {} for {}",
                missing,
                spec.link,
                target.name(),
                request.output
            );
        }
        Ok(())
    }

    /// Map each key of `target` to the value of `field`, in batches.
    async fn lookup_values(
        &self,
        target: &TableDescriptor,
        field: &str,
        keys: Vec<String>,
        batch_size: usize,
    ) -> Result<HashMap<String, Value>> {
        let key_internal = target.key();
        let value_internal = target.internal_field_name(field)?;
        let lookup = KeyLookup::new(target.user_field_name(key_internal), keys, batch_size);
        let fields = [field];

        let mut found = HashMap::with_capacity(lookup.len());
        for batch_filters in lookup.batches(&[]) {
            let plan = QueryPlan::build(target, &fields, &batch_filters)?;
            let mut cursor = self.open_cursor(&plan, u64::MAX);
            while !cursor.is_done() {
                for record in self.fetch_page(&mut cursor).await? {
                    if let (Some(key), Some(value)) =
                        (field_text(&record, key_internal), record.get(&value_internal))
                    {
                        found.insert(key, value.clone());
                    }
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use crate::query::Connection;
    use crate::query::testing::{FakeService, feature_records};
    use crate::registry::{DataMap, DerivedField, TableDescriptor};
    use crate::types::Record;
    use serde_json::json;
    use std::sync::Arc;

    fn sequences() -> Vec<Record> {
        ["md5-0", "md5-1"]
            .iter()
            .map(|md5| {
                serde_json::from_value(json!({
                    "md5": md5,
                    "sequence": format!("MKV-{}", md5),
                    "sequence_type": "aa",
                }))
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_backfill_shared_link() {
        // features link to md5-0, md5-1 and md5-2; md5-2 has no sequence
        let mut features = feature_records(9, "83333.1");
        features[4].insert("aa_sequence_md5".into(), json!(""));
        features[5].remove("aa_sequence_md5");
        let service = Arc::new(
            FakeService::new()
                .with_table("genome_feature", features)
                .with_table("feature_sequence", sequences()),
        );
        let conn = Connection::new(service.clone(), Arc::new(DataMap::default()), "http://fake/api");

        let records = conn
            .get_records("feature", "product,aa_sequence", &[], 1000)
            .await
            .unwrap();
        assert_eq!(records.len(), 9);

        for (index, record) in records.iter().enumerate() {
            match index {
                0 | 3 | 6 => assert_eq!(record["aa_sequence"], "MKV-md5-0"),
                1 | 7 => assert_eq!(record["aa_sequence"], "MKV-md5-1"),
                // blank and missing links are untouched
                4 | 5 => assert!(!record.contains_key("aa_sequence")),
                // md5-2 has no match
                2 | 8 => assert!(!record.contains_key("aa_sequence")),
                _ => unreachable!(),
            }
        }

        let lookups = service.requests_for("feature_sequence");
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].param("fl").unwrap(), "md5,sequence");
    }

    #[tokio::test]
    async fn test_lookup_batch_size() {
        let map = DataMap::from_tables([
            TableDescriptor::new("sequence", "feature_sequence", "md5"),
            TableDescriptor::new("feature", "genome_feature", "patric_id").derive_field(
                "protein",
                DerivedField::new("sequence", "aa_sequence_md5", "sequence").with_batch_size(1),
            ),
        ]);
        let service = Arc::new(
            FakeService::new()
                .with_table("genome_feature", feature_records(6, "83333.1"))
                .with_table("feature_sequence", sequences()),
        );
        let conn = Connection::new(service.clone(), Arc::new(map), "http://fake/api");
        let records = conn.get_records("feature", "protein", &[], 1000).await.unwrap();

        // three distinct links, one lookup each
        assert_eq!(service.requests_for("feature_sequence").len(), 3);
        assert_eq!(records[0]["protein"], "MKV-md5-0");
        assert_eq!(records[1]["protein"], "MKV-md5-1");
        assert!(!records[2].contains_key("protein"));
    }

    #[tokio::test]
    async fn test_no_links_no_lookup() {
        let mut features = feature_records(3, "83333.1");
        for record in &mut features {
            record.remove("aa_sequence_md5");
        }
        let service = Arc::new(
            FakeService::new()
                .with_table("genome_feature", features)
                .with_table("feature_sequence", sequences()),
        );
        let conn = Connection::new(service.clone(), Arc::new(DataMap::default()), "http://fake/api");
        let records = conn.get_records("feature", "aa_sequence", &[], 1000).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(service.requests_for("feature_sequence").is_empty());
    }
}
