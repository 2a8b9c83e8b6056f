//! File-level validation before any row is processed: genome type and GC site
//! come from the filename, the header set is compared against the column map,
//! and enumerated fields are checked against their accepted values.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::jobs::{GenomeType, GenomicJob};

use super::columns::{normalize_header, ColumnMap};

/// Pipeline ids a WGS metrics manifest may carry. Anything else is a contract
/// break with the GC.
pub const WGS_PIPELINE_IDS: [&str; 2] = ["dragen_3.4.12", "dragen_3.7.8"];

/// Legacy WGS manifests predate the pipeline id column.
pub const DEFAULT_WGS_PIPELINE_ID: &str = "dragen_3.4.12";

pub const QC_STATUSES: [&str; 2] = ["pass", "fail"];

/// Genome type is only inferable from the filename for metrics ingestion,
/// where the GC encodes it as a `_GEN_`/`_SEQ_` token. AW1 rows carry it
/// explicitly instead.
pub fn genome_type_from_filename(job: GenomicJob, file_name: &str) -> Option<GenomeType> {
    if job != GenomicJob::MetricsIngestion {
        return None;
    }
    let upper = file_name.to_uppercase();
    if upper.contains("_GEN_") {
        Some(GenomeType::AouArray)
    } else if upper.contains("_SEQ_") {
        Some(GenomeType::AouWgs)
    } else {
        None
    }
}

/// GC site id is the first underscore-delimited token of the basename.
pub fn gc_site_from_filename(file_name: &str) -> Option<String> {
    let basename = file_name.rsplit('/').next()?;
    let site = basename.split('_').next()?.trim().to_lowercase();
    (!site.is_empty()).then_some(site)
}

/// Manifest filenames embed their creation instant in US/Central time.
pub fn timestamp_from_filename(file_name: &str) -> Option<NaiveDateTime> {
    let re = Regex::new(r"(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2})").ok()?;
    let captured = re.captures(file_name)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(captured, "%Y-%m-%d-%H-%M-%S").ok()
}

#[derive(Debug, PartialEq, Eq)]
pub enum StructureCheck {
    Valid,
    /// Unknown columns present: tolerated after an incident, the extra keys
    /// are stripped before row processing.
    Extra(Vec<String>),
    /// Expected columns absent: fatal to the whole file.
    Missing(Vec<String>),
}

pub fn check_structure(columns: ColumnMap, raw_headers: &[String]) -> StructureCheck {
    let present: Vec<String> = raw_headers.iter().map(|h| normalize_header(h)).collect();

    let missing: Vec<String> = columns
        .iter()
        .filter(|(_, header)| !present.iter().any(|p| p == header))
        .map(|(_, header)| header.to_string())
        .collect();
    if !missing.is_empty() {
        return StructureCheck::Missing(missing);
    }

    let extra: Vec<String> = present
        .iter()
        .filter(|p| !columns.iter().any(|(_, header)| header == p))
        .cloned()
        .collect();
    if !extra.is_empty() {
        return StructureCheck::Extra(extra);
    }

    StructureCheck::Valid
}

/// Per-row check of enumerated fields. An error here is file-fatal and always
/// notified: it means the lab changed the contract, not that a row is noisy.
pub fn check_enumerated_values(
    job: GenomicJob,
    genome_type: Option<GenomeType>,
    row: &BTreeMap<String, String>,
) -> Result<(), String> {
    use GenomicJob::*;
    match job {
        MetricsIngestion => {
            let is_wgs = genome_type.is_some_and(|gt| !gt.is_array());
            if let Some(pipeline) = row.get("pipeline_id").filter(|v| !v.is_empty()) {
                if is_wgs && !WGS_PIPELINE_IDS.contains(&pipeline.as_str()) {
                    return Err(format!("unrecognized pipeline id: {pipeline}"));
                }
            }
        }
        Aw4ArrayManifest | Aw4WgsManifest => {
            if let Some(status) = row.get("qc_status").filter(|v| !v.is_empty()) {
                if !QC_STATUSES.contains(&status.to_lowercase().as_str()) {
                    return Err(format!("unrecognized qc status: {status}"));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::columns::expected_columns;

    #[test]
    fn genome_type_only_for_metrics() {
        assert_eq!(
            genome_type_from_filename(GenomicJob::MetricsIngestion, "RDR_AoU_GEN_file.csv"),
            Some(GenomeType::AouArray)
        );
        assert_eq!(
            genome_type_from_filename(GenomicJob::MetricsIngestion, "rdr_aou_seq_file.csv"),
            Some(GenomeType::AouWgs)
        );
        assert_eq!(
            genome_type_from_filename(GenomicJob::Aw1Manifest, "RDR_AoU_GEN_file.csv"),
            None
        );
    }

    #[test]
    fn gc_site_is_first_token() {
        assert_eq!(
            gc_site_from_filename("JH_AoU_GEN_PKG-1234.csv"),
            Some("jh".to_string())
        );
        assert_eq!(
            gc_site_from_filename("genotyping/BCM_AoU_SEQ_x.csv"),
            Some("bcm".to_string())
        );
    }

    #[test]
    fn filename_timestamps_parse() {
        let ts = timestamp_from_filename("AoU_GEN_Manifest_2024-06-11-15-03-22.csv").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-06-11 15:03:22");
        assert_eq!(timestamp_from_filename("no_timestamp.csv"), None);
    }

    #[test]
    fn missing_columns_detected() {
        let columns = expected_columns(GenomicJob::GemA2Manifest, None).unwrap();
        let headers = vec!["Biobank Id".to_string(), "Sample Id".to_string()];
        assert_eq!(
            check_structure(columns, &headers),
            StructureCheck::Missing(vec!["success".to_string()])
        );
    }

    #[test]
    fn extra_columns_detected() {
        let columns = expected_columns(GenomicJob::GemA2Manifest, None).unwrap();
        let headers = ["biobankid", "sampleid", "success", "surprise"]
            .map(String::from)
            .to_vec();
        assert_eq!(
            check_structure(columns, &headers),
            StructureCheck::Extra(vec!["surprise".to_string()])
        );
    }

    #[test]
    fn exact_headers_are_valid() {
        let columns = expected_columns(GenomicJob::GemA2Manifest, None).unwrap();
        let headers = ["BiobankId", "SampleId", "Success"].map(String::from).to_vec();
        assert_eq!(check_structure(columns, &headers), StructureCheck::Valid);
    }

    #[test]
    fn wgs_pipeline_id_values() {
        let mut row = BTreeMap::new();
        row.insert("pipeline_id".to_string(), "dragen_3.7.8".to_string());
        assert!(check_enumerated_values(
            GenomicJob::MetricsIngestion,
            Some(GenomeType::AouWgs),
            &row
        )
        .is_ok());

        row.insert("pipeline_id".to_string(), "dragen_9.9.9".to_string());
        assert!(check_enumerated_values(
            GenomicJob::MetricsIngestion,
            Some(GenomeType::AouWgs),
            &row
        )
        .is_err());
    }
}
