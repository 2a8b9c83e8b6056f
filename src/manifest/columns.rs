//! Expected column sets per manifest type.
//!
//! Each entry maps an internal snake_case field name to the normalized header
//! the partner writes in the CSV. Header normalization is lossy on purpose:
//! lower-cased, whitespace and BOM stripped, spaces removed, so the match is
//! insensitive to the cosmetic variation GCs produce.

use crate::jobs::{GenomeType, GenomicJob};

pub type ColumnMap = &'static [(&'static str, &'static str)];

/// (internal field, normalized CSV header)
const AW1_COLUMNS: ColumnMap = &[
    ("package_id", "packageid"),
    ("biobank_id_sample_id", "biobankidsampleid"),
    ("box_storageunit_id", "boxstorageunitid"),
    ("box_plate_id", "boxid/plateid"),
    ("well_position", "wellposition"),
    ("sample_id", "sampleid"),
    ("parent_sample_id", "parentsampleid"),
    ("collection_tube_id", "collectiontubeid"),
    ("matrix_id", "matrixid"),
    ("collection_date", "collectiondate"),
    ("biobank_id", "biobankid"),
    ("sex_at_birth", "sexatbirth"),
    ("age", "age"),
    ("ny_flag", "nystate(y/n)"),
    ("sample_type", "sampletype"),
    ("treatments", "treatments"),
    ("quantity_ul", "quantity(ul)"),
    ("total_concentration_ng_per_ul", "totalconcentration(ng/ul)"),
    ("total_dna_ng", "totaldna(ng)"),
    ("visit_description", "visitdescription"),
    ("sample_source", "samplesource"),
    ("study", "study"),
    ("tracking_number", "trackingnumber"),
    ("contact", "contact"),
    ("email", "email"),
    ("study_pi", "studypi"),
    ("site_name", "sitename"),
    ("genome_type", "genometype"),
    ("failure_mode", "failuremode"),
    ("failure_mode_desc", "failuremodedesc"),
];

const AW2_ARRAY_COLUMNS: ColumnMap = &[
    ("biobank_id", "biobankid"),
    ("sample_id", "sampleid"),
    ("biobank_id_sample_id", "biobankidsampleid"),
    ("lims_id", "limsid"),
    ("chipwellbarcode", "chipwellbarcode"),
    ("call_rate", "callrate"),
    ("sex_concordance", "sexconcordance"),
    ("contamination", "contamination"),
    ("processing_status", "processingstatus"),
    ("notes", "notes"),
    ("pipeline_id", "pipelineid"),
    ("site_id", "siteid"),
];

const AW2_WGS_COLUMNS: ColumnMap = &[
    ("biobank_id", "biobankid"),
    ("sample_id", "sampleid"),
    ("biobank_id_sample_id", "biobankidsampleid"),
    ("lims_id", "limsid"),
    ("mean_coverage", "meancoverage"),
    ("genome_coverage", "genomecoverage"),
    ("contamination", "contamination"),
    ("sex_concordance", "sexconcordance"),
    ("sex_ploidy", "sexploidy"),
    ("aligned_q30_bases", "alignedq30bases"),
    ("array_concordance", "arrayconcordance"),
    ("processing_status", "processingstatus"),
    ("notes", "notes"),
    ("mapped_reads_pct", "mappedreadspct"),
    ("sample_source", "samplesource"),
    ("pipeline_id", "pipelineid"),
];

const GEM_A2_COLUMNS: ColumnMap = &[
    ("biobank_id", "biobankid"),
    ("sample_id", "sampleid"),
    ("success", "success"),
];

const AW4_COLUMNS: ColumnMap = &[
    ("biobank_id", "biobankid"),
    ("sample_id", "sampleid"),
    ("qc_status", "qcstatus"),
    ("drc_sex_concordance", "drcsexconcordance"),
    ("drc_contamination", "drccontamination"),
    ("drc_call_rate", "drccallrate"),
    ("drc_fp_concordance", "drcfpconcordance"),
];

const AW5_COLUMNS: ColumnMap = &[
    ("biobank_id", "biobankid"),
    ("sample_id", "sampleid"),
    ("idat_red_deleted", "redidatdeleted"),
    ("idat_green_deleted", "greenidatdeleted"),
    ("vcf_deleted", "vcfdeleted"),
    ("cram_deleted", "cramdeleted"),
    ("crai_deleted", "craideleted"),
    ("hf_vcf_deleted", "hfvcfdeleted"),
];

/// Column set for an ingestion job; `None` for jobs that do not read files.
/// Metrics ingestion needs the genome type resolved from the filename first.
pub fn expected_columns(job: GenomicJob, genome_type: Option<GenomeType>) -> Option<ColumnMap> {
    use GenomicJob::*;
    match job {
        Aw1Manifest | Aw1fManifest => Some(AW1_COLUMNS),
        MetricsIngestion => match genome_type {
            Some(gt) if gt.is_array() => Some(AW2_ARRAY_COLUMNS),
            Some(_) => Some(AW2_WGS_COLUMNS),
            None => None,
        },
        GemA2Manifest => Some(GEM_A2_COLUMNS),
        Aw4ArrayManifest | Aw4WgsManifest => Some(AW4_COLUMNS),
        Aw5ArrayManifest | Aw5WgsManifest => Some(AW5_COLUMNS),
        _ => None,
    }
}

/// Lower-case, trim, drop the BOM, and remove embedded spaces.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace(' ', "")
}

pub fn internal_field(columns: ColumnMap, normalized_header: &str) -> Option<&'static str> {
    columns
        .iter()
        .find(|(_, header)| *header == normalized_header)
        .map(|(internal, _)| *internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("\u{feff}Biobank Id"), "biobankid");
        assert_eq!(normalize_header("  SAMPLE ID  "), "sampleid");
        assert_eq!(normalize_header("NY State (Y/N)"), "nystate(y/n)");
    }

    #[test]
    fn aw1_header_mapping() {
        let columns = expected_columns(GenomicJob::Aw1Manifest, None).unwrap();
        assert_eq!(
            internal_field(columns, "collectiontubeid"),
            Some("collection_tube_id")
        );
        assert_eq!(internal_field(columns, "genometype"), Some("genome_type"));
        assert_eq!(internal_field(columns, "bogus"), None);
    }

    #[test]
    fn metrics_columns_depend_on_genome_type() {
        let array = expected_columns(GenomicJob::MetricsIngestion, Some(GenomeType::AouArray));
        let wgs = expected_columns(GenomicJob::MetricsIngestion, Some(GenomeType::AouWgs));
        assert!(array.unwrap().iter().any(|(f, _)| *f == "chipwellbarcode"));
        assert!(wgs.unwrap().iter().any(|(f, _)| *f == "mean_coverage"));
        assert!(expected_columns(GenomicJob::MetricsIngestion, None).is_none());
        assert!(expected_columns(GenomicJob::Aw3ArrayManifest, None).is_none());
    }
}
