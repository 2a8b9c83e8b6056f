//! GEM A2 ingestion: the array product's pass/fail verdict per member.

use std::collections::BTreeMap;

use diesel::PgConnection;

use crate::{
    controller::{IncidentSpec, JobController},
    db::{self, member},
    jobs::{IncidentCode, RunResult},
    state::{next_state, WorkflowSignal},
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
                    message: format!("no genomic set member for gem a2 sample {sample_id}"),
                    source_file_processed_id: Some(context.file_processed_id),
                    sample_id: Some(sample_id.to_string()),
                    biobank_id: row.get("biobank_id").cloned(),
                    ..Default::default()
                },
            )?;
            continue;
        };

        let passed = row_value(row, "success").is_some_and(|v| v.eq_ignore_ascii_case("y"));
        member::set_gem_a2_result(conn, found.id, controller.run_id, if passed { "Y" } else { "N" })?;

        let signal = if passed {
            WorkflowSignal::GemPass
        } else {
            WorkflowSignal::GemFail
        };
        if let Some(new_state) = next_state(found.workflow_state(), signal) {
            member::update_state(conn, found.id, new_state)?;
        }
    }

    Ok(RunResult::Success)
}
