//! Reconciliation sweeps that run on a schedule rather than on file arrival.

use diesel::PgConnection;

use crate::{
    controller::{IncidentSpec, JobController},
    db::{self, member, metrics, participant},
    jobs::{IncidentCode, RunResult},
    state::{next_state, GenomicWorkflowState, WorkflowSignal},
};

/// Cross-check members against their delivered GC data files: members missing
/// a required file are parked in GC_DATA_FILES_MISSING, and previously parked
/// members whose files have since arrived are released.
pub fn reconcile_gc_data_files(
    conn: &mut PgConnection,
    controller: &mut JobController,
) -> db::Result<RunResult> {
    let watched_codes: Vec<i32> = WorkflowSignal::DataFilesMissing
        .allowed_predecessors()
        .iter()
        .map(|s| s.code())
        .collect();
    let watched = member::in_states(conn, &watched_codes)?;
    let watched_ids: Vec<i64> = watched.iter().map(|m| m.id).collect();
    let watched_metrics = metrics::by_member_ids(conn, &watched_ids)?;

    let mut parked = 0usize;
    for member_row in &watched {
        let Some(genome_type) = member_row.parsed_genome_type() else {
            continue;
        };
        // Members with no metrics record yet have nothing to check files
        // against.
        let Some(metric) = watched_metrics
            .iter()
            .find(|m| m.genomic_set_member_id == member_row.id)
        else {
            continue;
        };
        if metric.has_required_files(genome_type) {
            continue;
        }
        let Some(state) = next_state(member_row.workflow_state(), WorkflowSignal::DataFilesMissing)
        else {
            continue;
        };
        member::update_state(conn, member_row.id, state)?;
        controller.create_incident(
            conn,
            IncidentCode::DataValidationFailed,
            IncidentSpec {
                message: format!(
                    "member {} is missing required gc data files for {genome_type}",
                    member_row.id
                ),
                biobank_id: Some(member_row.biobank_id.clone()),
                sample_id: member_row.sample_id.clone(),
                ..Default::default()
            },
        )?;
        parked += 1;
    }

    let missing = member::in_states(conn, &[GenomicWorkflowState::GcDataFilesMissing.code()])?;
    let missing_ids: Vec<i64> = missing.iter().map(|m| m.id).collect();
    let missing_metrics = metrics::by_member_ids(conn, &missing_ids)?;

    let mut released = 0usize;
    for member_row in &missing {
        let Some(genome_type) = member_row.parsed_genome_type() else {
            continue;
        };
        let complete = missing_metrics
            .iter()
            .find(|m| m.genomic_set_member_id == member_row.id)
            .is_some_and(|m| m.has_required_files(genome_type));
        if !complete {
            continue;
        }
        if let Some(state) = next_state(
            member_row.workflow_state(),
            WorkflowSignal::DataFilesResolved(genome_type),
        ) {
            member::update_state(conn, member_row.id, state)?;
            released += 1;
        }
    }

    tracing::info!(parked, released, "gc data file reconciliation complete");
    Ok(RunResult::Success)
}

/// Withdrawn participants with a ready report have the report retracted.
pub fn reconcile_report_states(
    conn: &mut PgConnection,
    controller: &mut JobController,
) -> db::Result<RunResult> {
    let withdrawn = participant::withdrawn_biobank_ids(conn)?;
    if withdrawn.is_empty() {
        return Ok(RunResult::NoFiles);
    }

    let affected = member::by_biobank_ids_in_state(
        conn,
        &withdrawn,
        GenomicWorkflowState::GemRptReady.code(),
    )?;

    let mut retracted = 0usize;
    for member_row in &affected {
        if let Some(state) = next_state(member_row.workflow_state(), WorkflowSignal::ConsentWithdrawn)
        {
            member::update_state(conn, member_row.id, state)?;
            retracted += 1;
        }
    }

    tracing::info!(
        run_id = controller.run_id,
        withdrawn = withdrawn.len(),
        retracted,
        "report state reconciliation complete"
    );
    Ok(RunResult::Success)
}
