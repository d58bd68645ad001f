//! Field and table mapping registry.
//!
//! Translates the user-friendly table and field names callers use into the
//! names the remote service stores, and back again. A field is either a plain
//! rename ([`FieldDescriptor::Mapped`]) or a value that lives in another table
//! and must be joined in after the primary query ([`FieldDescriptor::Derived`]).
//!
//! The registry ships with a default set of tables (see [`DataMap::default`])
//! and can be replaced or augmented from a JSON document:
//!
//! ```json
//! {"tables": [{
//!     "name": "feature", "internal": "genome_feature", "key": "patric_id",
//!     "fields": {
//!         "type": "feature_type",
//!         "aa_sequence": {"table": "sequence", "link": "aa_sequence_md5", "field": "sequence"}
//!     }
//! }]}
//! ```

mod defaults;

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Keys per request for derived-field lookups when the map does not say.
pub const DEFAULT_DERIVED_BATCH: usize = 500;

/// A field whose value is found by looking up a linking value in another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedField {
    /// User-friendly name of the target table.
    pub table: String,
    /// Internal name of the linking field in the source table.
    pub link: String,
    /// Field to copy out of the target table (user-friendly or internal).
    pub field: String,
    /// Linking values per lookup request.
    pub batch_size: usize,
}

impl DerivedField {
    pub fn new(table: &str, link: &str, field: &str) -> Self {
        Self {
            table: table.to_string(),
            link: link.to_string(),
            field: field.to_string(),
            batch_size: DEFAULT_DERIVED_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDescriptor {
    /// Plain rename to an internal column.
    Mapped(String),
    /// Join against another table.
    Derived(DerivedField),
}

/// How a user-friendly field name resolves for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef<'a> {
    /// A column of this table, under its internal name.
    Column(&'a str),
    Derived(&'a DerivedField),
}

#[derive(Debug, Clone)]
pub struct TableDescriptor {
    name: String,
    internal: String,
    key: String,
    sort: String,
    fields: BTreeMap<String, FieldDescriptor>,
    reverse: HashMap<String, String>,
}

impl TableDescriptor {
    /// Describe a table keyed (and sorted) by the internal field `key`.
    pub fn new(name: &str, internal: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            internal: internal.to_string(),
            key: key.to_string(),
            sort: key.to_string(),
            fields: BTreeMap::new(),
            reverse: HashMap::new(),
        }
    }

    pub fn with_sort(mut self, sort: &str) -> Self {
        self.sort = sort.to_string();
        self
    }

    pub fn map_field(mut self, user: &str, internal: &str) -> Self {
        self.reverse
            .entry(internal.to_string())
            .or_insert_with(|| user.to_string());
        self.fields
            .insert(user.to_string(), FieldDescriptor::Mapped(internal.to_string()));
        self
    }

    pub fn derive_field(mut self, user: &str, derived: DerivedField) -> Self {
        self.fields
            .insert(user.to_string(), FieldDescriptor::Derived(derived));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name on the wire.
    pub fn internal_name(&self) -> &str {
        &self.internal
    }

    /// Internal name of the key field.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Internal name of the sort field.
    pub fn sort(&self) -> &str {
        &self.sort
    }

    pub fn field(&self, user: &str) -> Option<&FieldDescriptor> {
        self.fields.get(user)
    }

    /// Resolve a user-friendly field name. Unmapped names pass through.
    pub fn resolve<'a>(&'a self, user: &'a str) -> FieldRef<'a> {
        match self.fields.get(user) {
            Some(FieldDescriptor::Mapped(internal)) => FieldRef::Column(internal),
            Some(FieldDescriptor::Derived(derived)) => FieldRef::Derived(derived),
            None => FieldRef::Column(user),
        }
    }

    /// Internal column name for a user-friendly field. Derived fields have no
    /// column in this table and are rejected.
    pub fn internal_field_name(&self, user: &str) -> Result<String> {
        match self.resolve(user) {
            FieldRef::Column(internal) => Ok(internal.to_string()),
            FieldRef::Derived(_) => Err(Error::InvalidField(format!(
                "{} in table {} is derived and cannot be queried directly",
                user, self.name
            ))),
        }
    }

    /// User-friendly name for an internal column, or the internal name itself
    /// when no alias exists.
    pub fn user_field_name<'a>(&'a self, internal: &'a str) -> &'a str {
        self.reverse.get(internal).map(String::as_str).unwrap_or(internal)
    }

    /// The key field's user name followed by every mapped and derived name.
    pub fn all_fields(&self) -> Vec<String> {
        let key = self.user_field_name(&self.key).to_string();
        let mut fields = vec![key.clone()];
        fields.extend(self.fields.keys().filter(|f| **f != key).cloned());
        fields
    }

    fn derived_fields(&self) -> impl Iterator<Item = (&String, &DerivedField)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            FieldDescriptor::Derived(derived) => Some((name, derived)),
            FieldDescriptor::Mapped(_) => None,
        })
    }
}

/// Registry of every known table, by user-friendly name.
#[derive(Debug, Clone)]
pub struct DataMap {
    tables: HashMap<String, TableDescriptor>,
}

impl Default for DataMap {
    fn default() -> Self {
        Self::from_tables(defaults::default_tables())
    }
}

impl DataMap {
    /// Build a registry from descriptors without validation.
    pub fn from_tables(tables: impl IntoIterator<Item = TableDescriptor>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    /// Parse and validate a JSON data map.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let spec: DataMapSpec = serde_json::from_str(text)
            .map_err(|e| Error::InvalidDataMap(format!("failed to parse data map: {}", e)))?;
        let tables = spec
            .tables
            .into_iter()
            .map(TableSpec::into_descriptor)
            .collect::<Result<Vec<_>>>()?;
        let map = Self::from_tables(tables);
        map.validate()?;
        Ok(map)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Add the tables of `other`, replacing any table with the same name.
    pub fn merge(&mut self, other: DataMap) -> Result<()> {
        for (name, table) in other.tables {
            if self.tables.insert(name.clone(), table).is_some() {
                tracing::debug!("data map replaces table {}", name);
            }
        }
        self.validate()
    }

    pub fn table(&self, name: &str) -> Result<&TableDescriptor> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn internal_field_name(&self, table: &str, user: &str) -> Result<String> {
        self.table(table)?.internal_field_name(user)
    }

    pub fn user_field_name(&self, table: &str, internal: &str) -> Result<String> {
        Ok(self.table(table)?.user_field_name(internal).to_string())
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check every table has a key and every derived field names a known table.
    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            if table.key.is_empty() || table.internal.is_empty() {
                return Err(Error::InvalidDataMap(format!(
                    "table {} needs an internal name and a key field",
                    table.name
                )));
            }
            for (name, derived) in table.derived_fields() {
                if derived.link.is_empty() || derived.field.is_empty() {
                    return Err(Error::InvalidDataMap(format!(
                        "derived field {}.{} needs a link and a target field",
                        table.name, name
                    )));
                }
                if !self.tables.contains_key(&derived.table) {
                    return Err(Error::InvalidDataMap(format!(
                        "derived field {}.{} targets unknown table {}",
                        table.name, name, derived.table
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DataMapSpec {
    tables: Vec<TableSpec>,
}

#[derive(Debug, Deserialize)]
struct TableSpec {
    name: String,
    internal: Option<String>,
    key: String,
    sort: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldSpec {
    Mapped(String),
    Derived {
        table: String,
        link: String,
        field: String,
        batch_size: Option<usize>,
    },
}

impl TableSpec {
    fn into_descriptor(self) -> Result<TableDescriptor> {
        if self.name.is_empty() {
            return Err(Error::InvalidDataMap("table with empty name".to_string()));
        }
        let internal = self.internal.unwrap_or_else(|| self.name.clone());
        let mut table = TableDescriptor::new(&self.name, &internal, &self.key);
        if let Some(sort) = &self.sort {
            table = table.with_sort(sort);
        }
        for (user, spec) in self.fields {
            table = match spec {
                FieldSpec::Mapped(internal) => table.map_field(&user, &internal),
                FieldSpec::Derived {
                    table: target,
                    link,
                    field,
                    batch_size,
                } => {
                    let derived = DerivedField::new(&target, &link, &field)
                        .with_batch_size(batch_size.unwrap_or(DEFAULT_DERIVED_BATCH));
                    table.derive_field(&user, derived)
                }
            };
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_tables_validate() {
        let map = DataMap::default();
        map.validate().unwrap();
        for name in ["genome", "feature", "taxonomy", "contig", "sequence", "subsystem", "family"] {
            assert!(map.table(name).is_ok(), "missing default table {}", name);
        }
    }

    #[test]
    fn test_table_not_found() {
        let map = DataMap::default();
        assert!(matches!(map.table("plasmid"), Err(Error::TableNotFound(t)) if t == "plasmid"));
    }

    #[test]
    fn test_internal_field_name() {
        let map = DataMap::default();
        assert_eq!(map.table("feature").unwrap().internal_name(), "genome_feature");
        assert_eq!(map.internal_field_name("feature", "type").unwrap(), "feature_type");
        // unmapped names pass through
        assert_eq!(map.internal_field_name("feature", "product").unwrap(), "product");
        assert_eq!(map.internal_field_name("feature", "genome_id").unwrap(), "genome_id");
        assert!(matches!(
            map.internal_field_name("feature", "aa_sequence"),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn test_user_field_name() {
        let map = DataMap::default();
        assert_eq!(map.user_field_name("contig", "sequence_id").unwrap(), "contig_id");
        assert_eq!(map.user_field_name("feature", "aa_sequence_md5").unwrap(), "aa_sequence_md5");
    }

    #[test]
    fn test_sort_defaults_to_key() {
        let table = TableDescriptor::new("t", "t_internal", "id");
        assert_eq!(table.sort(), "id");
        let table = table.with_sort("name");
        assert_eq!(table.sort(), "name");
        assert_eq!(table.key(), "id");
    }

    #[test]
    fn test_all_fields_includes_key() {
        let map = DataMap::default();
        let fields = map.table("contig").unwrap().all_fields();
        assert_eq!(fields[0], "contig_id");
        assert_eq!(fields.iter().filter(|f| *f == "contig_id").count(), 1);
        assert!(fields.contains(&"dna".to_string()));
    }

    #[test]
    fn test_from_json_str() {
        let map = DataMap::from_json_str(
            r#"{"tables": [
                {"name": "seq", "internal": "feature_sequence", "key": "md5"},
                {"name": "gene", "internal": "genome_feature", "key": "patric_id", "sort": "start",
                 "fields": {
                    "kind": "feature_type",
                    "protein": {"table": "seq", "link": "aa_sequence_md5", "field": "sequence", "batch_size": 250}
                 }}
            ]}"#,
        )
        .unwrap();
        let gene = map.table("gene").unwrap();
        assert_eq!(gene.sort(), "start");
        assert_eq!(gene.internal_field_name("kind").unwrap(), "feature_type");
        match gene.field("protein") {
            Some(FieldDescriptor::Derived(derived)) => {
                assert_eq!(derived.table, "seq");
                assert_eq!(derived.batch_size, 250);
            }
            other => panic!("unexpected field: {other:?}"),
        }
        // internal name defaults to the table name
        let seq = DataMap::from_json_str(r#"{"tables": [{"name": "seq", "key": "md5"}]}"#).unwrap();
        assert_eq!(seq.table("seq").unwrap().internal_name(), "seq");
    }

    #[test]
    fn test_from_json_rejects_unknown_derived_target() {
        let err = DataMap::from_json_str(
            r#"{"tables": [{"name": "gene", "key": "id",
                "fields": {"protein": {"table": "nowhere", "link": "md5", "field": "sequence"}}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDataMap(_)));
    }

    #[test]
    fn test_from_json_rejects_empty_key() {
        let err = DataMap::from_json_str(r#"{"tables": [{"name": "gene", "key": ""}]}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidDataMap(_)));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(matches!(
            DataMap::from_json_str("{\"tables\": 3}"),
            Err(Error::InvalidDataMap(_))
        ));
    }

    #[test]
    fn test_merge_augments_and_replaces() {
        let mut map = DataMap::default();
        let extra = DataMap::from_json_str(
            r#"{"tables": [
                {"name": "genome", "internal": "genome_v2", "key": "genome_id"},
                {"name": "plasmid", "internal": "plasmid_sequence", "key": "plasmid_id"}
            ]}"#,
        )
        .unwrap();
        map.merge(extra).unwrap();
        assert_eq!(map.table("genome").unwrap().internal_name(), "genome_v2");
        assert!(map.table("plasmid").is_ok());
        assert!(map.table("feature").is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tables": [{{"name": "drug", "internal": "antibiotics", "key": "pubchem_cid"}}]}}"#)
            .unwrap();
        let map = DataMap::from_json_file(file.path()).unwrap();
        assert_eq!(map.table_names(), vec!["drug"]);
    }
}
