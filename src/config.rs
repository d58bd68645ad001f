use crate::query::{Connection, DEFAULT_CHUNK_SIZE};
use crate::rate_limit::Pacer;
use crate::registry::DataMap;
use crate::taxonomy::TaxonomyClient;
use crate::transport::{DEFAULT_TIMEOUT, HttpTransport};
use crate::types::Paging;
use crate::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://www.bv-brc.org/api/";

/// Token file name in the user's home directory.
pub const TOKEN_FILE_NAME: &str = ".patric_token";

#[derive(Debug, Clone, Parser)]
#[command(name = "bvbrc-query")]
#[command(about = "Query genomes, features and taxonomy from the BV-BRC data API")]
pub struct Config {
    /// Base URL of the data API
    #[arg(long, env = "P3API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Authorization token file (default ~/.patric_token)
    #[arg(long, env = "P3_TOKEN_FILE", global = true)]
    pub token_file: Option<PathBuf>,

    /// JSON data map replacing or adding table definitions
    #[arg(long, env = "P3_DATA_MAP", global = true)]
    pub data_map: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs(), global = true)]
    pub timeout: u64,

    /// Rows requested per page
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, global = true)]
    pub chunk_size: u64,

    /// Paging protocol
    #[arg(long, value_enum, default_value = "cursor", global = true)]
    pub paging: Paging,

    /// NCBI E-utilities API key (allows faster taxonomy lookups)
    #[arg(long, env = "NCBI_API_KEY", global = true)]
    pub ncbi_api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print matching records as JSON lines
    Query {
        /// Table name (genome, feature, contig, taxonomy, ...)
        table: String,

        /// Comma-delimited field list
        #[arg(short, long, default_value = "")]
        fields: String,

        /// Equality filter, FIELD=VALUE (repeatable)
        #[arg(short, long = "eq", value_parser = parse_pair)]
        eq: Vec<(String, String)>,

        /// Batched key lookup, FIELD=KEY1,KEY2,...
        #[arg(long = "in", value_parser = parse_pair)]
        keys: Option<(String, String)>,

        /// Keys per batched query
        #[arg(long, default_value = "200")]
        batch_size: usize,

        /// Maximum records to return
        #[arg(short, long, default_value = "100000")]
        limit: u64,
    },

    /// Write the feature sequences of a genome as FASTA
    #[cfg(feature = "fasta")]
    Fasta {
        genome_id: String,

        #[arg(long, value_enum, default_value = "protein")]
        kind: crate::fasta::SequenceKind,

        /// Output file (default stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print NCBI taxonomy summaries
    Taxonomy {
        #[arg(required = true)]
        taxon_ids: Vec<String>,
    },

    /// List known tables, or the fields of one table
    Tables { table: Option<String> },
}

fn parse_pair(text: &str) -> std::result::Result<(String, String), String> {
    match text.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got {}", text)),
    }
}

impl Config {
    pub fn token_path(&self) -> Option<PathBuf> {
        self.token_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(TOKEN_FILE_NAME)))
    }

    /// Read the authorization token. A missing or empty file means anonymous
    /// access.
    pub fn read_token(&self) -> Option<String> {
        let path = self.token_path()?;
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let token = text.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) => {
                tracing::debug!("no token read from {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn load_data_map(&self) -> Result<DataMap> {
        let mut map = DataMap::default();
        if let Some(path) = &self.data_map {
            tracing::info!("Loading data map from {:?}", path);
            map.merge(DataMap::from_json_file(path)?)?;
        }
        Ok(map)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn connect(&self) -> Result<Connection> {
        let transport = HttpTransport::new(self.timeout())?;
        Ok(
            Connection::new(transport, Arc::new(self.load_data_map()?), &self.api_url)
                .with_token(self.read_token())
                .with_paging(self.paging)
                .with_chunk_size(self.chunk_size),
        )
    }

    /// Taxonomy client paced by `pacer`; share the pacer between clients.
    pub fn taxonomy_client(&self, pacer: Arc<Pacer>) -> Result<TaxonomyClient> {
        let transport = HttpTransport::new(self.timeout())?;
        Ok(TaxonomyClient::new(transport, pacer, self.ncbi_api_key.clone()))
    }
}
