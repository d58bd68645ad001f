use clap::Parser;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bvbrc_query::{
    Config, KeyLookup, SolrFilter,
    config::Command,
    rate_limit::Pacer,
    registry::FieldDescriptor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &config.command {
        Command::Query {
            table,
            fields,
            eq,
            keys,
            batch_size,
            limit,
        } => {
            let conn = config.connect()?;
            let filters: Vec<SolrFilter> = eq
                .iter()
                .map(|(field, value)| SolrFilter::eq(field.as_str(), value.as_str()))
                .collect();

            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let mut emit = |record: bvbrc_query::Record| -> bvbrc_query::Result<()> {
                serde_json::to_writer(&mut out, &record)?;
                out.write_all(b"\n")?;
                Ok(())
            };

            let count = match keys {
                Some((field, values)) => {
                    let lookup = KeyLookup::new(field, values.split(','), *batch_size);
                    conn.stream_records_by_keys(table, fields, &filters, &lookup, *limit, &mut emit)
                        .await?
                }
                None => {
                    conn.stream_records(table, fields, &filters, *limit, &mut emit)
                        .await?
                }
            };
            out.flush()?;

            let stats = conn.telemetry();
            tracing::info!(
                "{} records from {} in {} requests ({} retries)",
                count,
                table,
                stats.requests,
                stats.retries
            );
        }

        #[cfg(feature = "fasta")]
        Command::Fasta {
            genome_id,
            kind,
            output,
        } => {
            let conn = config.connect()?;
            let written = match output {
                Some(path) => {
                    let file = BufWriter::new(std::fs::File::create(path)?);
                    bvbrc_query::fasta::write_genome_fasta(&conn, genome_id, *kind, file).await?
                }
                None => {
                    let stdout = std::io::stdout();
                    let out = BufWriter::new(stdout.lock());
                    bvbrc_query::fasta::write_genome_fasta(&conn, genome_id, *kind, out).await?
                }
            };
            tracing::info!("{} sequences written for {}", written, genome_id);
        }

        Command::Taxonomy { taxon_ids } => {
            let pacer = Arc::new(Pacer::for_ncbi(config.ncbi_api_key.is_some()));
            let client = config.taxonomy_client(pacer)?;
            let ids: Vec<&str> = taxon_ids.iter().map(String::as_str).collect();
            for summary in client.summaries(&ids).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    summary.taxon_id, summary.name, summary.rank, summary.division
                );
            }
        }

        Command::Tables { table } => {
            let map = config.load_data_map()?;
            match table {
                Some(name) => {
                    let descriptor = map.table(name)?;
                    println!("{}\t{}\tkey={}", descriptor.name(), descriptor.internal_name(), descriptor.key());
                    for field in descriptor.all_fields() {
                        match descriptor.field(&field) {
                            Some(FieldDescriptor::Mapped(internal)) => println!("  {}\t{}", field, internal),
                            Some(FieldDescriptor::Derived(derived)) => println!(
                                "  {}\t{}.{} via {}",
                                field, derived.table, derived.field, derived.link
                            ),
                            None => println!("  {}", field),
                        }
                    }
                }
                None => {
                    for name in map.table_names() {
                        println!("{}", name);
                    }
                }
            }
        }
    }

    Ok(())
}
