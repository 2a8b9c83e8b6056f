//! AW4 ingestion: DRC post-processing QC results copied back onto the
//! member's metrics record.

use std::collections::BTreeMap;

use chrono::Utc;
use diesel::PgConnection;

use crate::{
    controller::{IncidentSpec, JobController},
    db::{self, member, metrics, metrics::DrcQcUpdate},
    jobs::{IncidentCode, RunResult},
};

use super::{row_is_blank, row_value, IngestionContext};

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
                    message: format!("no genomic set member for aw4 sample {sample_id}"),
                    source_file_processed_id: Some(context.file_processed_id),
                    sample_id: Some(sample_id.to_string()),
                    biobank_id: row.get("biobank_id").cloned(),
                    ..Default::default()
                },
            )?;
            continue;
        };

        let owned = |key: &str| row_value(row, key).map(str::to_string);
        let update = DrcQcUpdate {
            drc_sex_concordance: owned("drc_sex_concordance"),
            drc_contamination: owned("drc_contamination"),
            drc_call_rate: owned("drc_call_rate"),
            drc_fp_concordance: owned("drc_fp_concordance"),
            qc_status: row_value(row, "qc_status").map(|v| v.to_lowercase()),
            modified: Some(Utc::now().naive_utc()),
        };
        metrics::apply_drc_qc(conn, found.id, &update)?;
        member::set_aw4_run(conn, found.id, controller.run_id)?;
    }

    Ok(RunResult::Success)
}
