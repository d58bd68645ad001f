//! FASTA export of feature sequences.

use crate::filter::SolrFilter;
use crate::query::Connection;
use crate::transport::Transport;
use crate::types::{Record, field_text};
use crate::Result;
use noodles::fasta::{self, record::Definition, record::Sequence};
use std::io::Write;

/// Which derived sequence of a feature to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SequenceKind {
    Protein,
    Dna,
}

impl SequenceKind {
    /// Derived field holding the sequence.
    pub fn field(&self) -> &'static str {
        match self {
            SequenceKind::Protein => "aa_sequence",
            SequenceKind::Dna => "na_sequence",
        }
    }
}

/// Build a FASTA record named by `patric_id` and described by `product`.
/// Returns `None` when the record has no id or no sequence.
pub fn to_fasta_record(record: &Record, sequence_field: &str) -> Option<fasta::Record> {
    let id = field_text(record, "patric_id")?;
    let sequence = field_text(record, sequence_field)?;
    let description = field_text(record, "product");
    let definition = Definition::new(id.as_str(), description.map(|d| d.as_str().into()));
    Some(fasta::Record::new(
        definition,
        Sequence::from(sequence.into_bytes()),
    ))
}

/// Write the features of `genome_id` as FASTA. Protein output is limited to
/// CDS features. Returns the number of records written.
pub async fn write_genome_fasta<T, W>(
    conn: &Connection<T>,
    genome_id: &str,
    kind: SequenceKind,
    writer: W,
) -> Result<u64>
where
    T: Transport,
    W: Write,
{
    let mut writer = fasta::io::Writer::new(writer);
    let mut filters = vec![SolrFilter::eq("genome_id", genome_id)];
    if kind == SequenceKind::Protein {
        filters.push(SolrFilter::eq("type", "CDS"));
    }
    let fields = format!("patric_id,product,{}", kind.field());

    let mut written = 0;
    let mut skipped = 0;
    conn.stream_records("feature", &fields, &filters, u64::MAX, |record| {
        match to_fasta_record(&record, kind.field()) {
            Some(fasta_record) => {
                writer.write_record(&fasta_record)?;
                written += 1;
            }
            None => skipped += 1,
        }
        Ok(())
    })
    .await?;

    if skipped > 0 {
        tracing::warn!("{} features of {} had no {}", skipped, genome_id, kind.field());
    }
    Ok(written)
}
