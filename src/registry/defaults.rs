use super::{DerivedField, TableDescriptor};

/// Well-known BV-BRC tables.
pub(super) fn default_tables() -> Vec<TableDescriptor> {
    vec![
        TableDescriptor::new("genome", "genome", "genome_id")
            .map_field("name", "genome_name")
            .map_field("domain", "kingdom")
            .map_field("length", "genome_length")
            .map_field("gc", "gc_content")
            .map_field("lineage", "taxon_lineage_ids"),
        TableDescriptor::new("feature", "genome_feature", "patric_id")
            .map_field("type", "feature_type")
            .map_field("contig", "sequence_id")
            .map_field("gene_name", "gene")
            .map_field("pgfam", "pgfam_id")
            .map_field("plfam", "plfam_id")
            .derive_field(
                "aa_sequence",
                DerivedField::new("sequence", "aa_sequence_md5", "sequence"),
            )
            .derive_field(
                "na_sequence",
                DerivedField::new("sequence", "na_sequence_md5", "sequence").with_batch_size(200),
            ),
        TableDescriptor::new("sequence", "feature_sequence", "md5")
            .map_field("type", "sequence_type"),
        TableDescriptor::new("contig", "genome_sequence", "sequence_id")
            .map_field("contig_id", "sequence_id")
            .map_field("dna", "sequence")
            .map_field("contig_name", "accession"),
        TableDescriptor::new("taxonomy", "taxonomy", "taxon_id")
            .map_field("name", "taxon_name")
            .map_field("rank", "taxon_rank")
            .map_field("lineage", "lineage_ids")
            .map_field("lineage_names", "lineage_names"),
        TableDescriptor::new("subsystem", "subsystem_item", "id")
            .map_field("subsystem", "subsystem_name")
            .map_field("role", "role_name")
            .map_field("variant", "active"),
        TableDescriptor::new("subsystem_ref", "subsystem_ref", "subsystem_id")
            .map_field("name", "subsystem_name"),
        TableDescriptor::new("family", "protein_family_ref", "family_id")
            .map_field("function", "family_product")
            .map_field("type", "family_type"),
        TableDescriptor::new("sp_gene", "sp_gene", "id")
            .map_field("property", "property")
            .map_field("gene_name", "gene"),
        TableDescriptor::new("genome_amr", "genome_amr", "id")
            .map_field("phenotype", "resistant_phenotype")
            .map_field("method", "laboratory_typing_method"),
    ]
}
