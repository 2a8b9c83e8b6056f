//! AW5 ingestion: GC storage-deletion notices, flagged per data file on the
//! member's metrics record.

use std::collections::BTreeMap;

use diesel::PgConnection;

use crate::{
    controller::{IncidentSpec, JobController},
    db::{self, member, metrics, metrics::DataFileKind},
    jobs::{IncidentCode, RunResult},
};

use super::{row_is_blank, row_value, IngestionContext};

const DELETION_COLUMNS: [(&str, DataFileKind); 6] = [
    ("idat_red_deleted", DataFileKind::IdatRed),
    ("idat_green_deleted", DataFileKind::IdatGreen),
    ("vcf_deleted", DataFileKind::Vcf),
    ("cram_deleted", DataFileKind::Cram),
    ("crai_deleted", DataFileKind::Crai),
    ("hf_vcf_deleted", DataFileKind::HfVcf),
];

pub fn ingest(
    conn: &mut PgConnection,
    controller: &mut JobController,
    context: &IngestionContext,
    rows: &[BTreeMap<String, String>],
) -> db::Result<RunResult> {
    let sample_ids: Vec<String> = rows
        .iter()
        .filter_map(|row| row_value(row, "sample_id"))
        .map(str::to_string)
        .collect();
    let members = member::by_sample_ids(conn, &sample_ids)?;

    for row in rows {
        if row_is_blank(row) {
            continue;
        }
        let Some(sample_id) = row_value(row, "sample_id") else {
            continue;
        };

        let Some(found) = members
            .iter()
            .find(|m| m.sample_id.as_deref() == Some(sample_id))
        else {
            controller.create_incident(
                conn,
                IncidentCode::UnableToFindMember,
                IncidentSpec {
                    message: format!("no genomic set member for aw5 sample {sample_id}"),
                    source_file_processed_id: Some(context.file_processed_id),
                    sample_id: Some(sample_id.to_string()),
                    biobank_id: row.get("biobank_id").cloned(),
                    ..Default::default()
                },
            )?;
            continue;
        };

        for (column, kind) in DELETION_COLUMNS {
            if row_value(row, column).is_some_and(|v| v.eq_ignore_ascii_case("y")) {
                metrics::mark_file_deleted(conn, found.id, kind)?;
            }
        }
    }

    Ok(RunResult::Success)
}
