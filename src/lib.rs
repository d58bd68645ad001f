pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod rate_limit;
pub mod registry;
pub mod taxonomy;
pub mod transport;
pub mod types;

#[cfg(feature = "fasta")]
pub mod fasta;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::{Bound, RangeBounds, SolrFilter};
pub use query::{Connection, KeyLookup, PageCursor, QueryPlan};
pub use registry::{DataMap, DerivedField, FieldDescriptor, TableDescriptor};
pub use types::{Paging, Record};
