//! AW1 accessioning workflow: reconcile each manifest row against the member
//! that is waiting on it.
//!
//! Every row runs in its own transaction with the member row locked, so a
//! failure partway through the file leaves earlier rows committed and later
//! rows untouched. Rows that cannot be matched raise an incident and move on.

use std::collections::BTreeMap;

use chrono::Utc;
use diesel::{Connection, PgConnection};

use crate::{
    controller::{IncidentSpec, JobController},
    db::{
        self, contamination, genomic_set,
        genomic_set::CONTROL_SET_NAME,
        member::{self, Aw1Update, GenomicSetMember, NewMember},
        stored_sample,
    },
    jobs::{GenomeType, GenomicJob, IncidentCode, RunResult},
    state::{next_state, GenomicWorkflowState, WorkflowSignal},
};

use super::{row_is_blank, row_value, IngestionContext};

/// States a member may be in when its row arrives. An AW1F failure manifest
/// also reaches members parked awaiting a replate.
fn reconcilable_state_codes(job: GenomicJob) -> Vec<i32> {
    match job {
        GenomicJob::Aw1fManifest => vec![
            GenomicWorkflowState::Aw0.code(),
            GenomicWorkflowState::ExtractRequested.code(),
        ],
        _ => vec![GenomicWorkflowState::Aw0.code()],
    }
}

pub fn ingest(
    conn: &mut PgConnection,
    controller: &mut JobController,
    context: &IngestionContext,
    rows: &[BTreeMap<String, String>],
) -> db::Result<RunResult> {
    let mut reconciled = 0usize;
    for row in rows {
        if row_is_blank(row) {
            continue;
        }
        let row_result =
            conn.transaction::<_, db::Error, _>(|conn| process_row(conn, controller, context, row));
        match row_result {
            Ok(true) => reconciled += 1,
            Ok(false) => {}
            // The row's transaction has rolled back; the rest of the file
            // continues.
            Err(err) => {
                controller.create_incident(
                    conn,
                    IncidentCode::DataValidationFailed,
                    IncidentSpec {
                        message: format!("aw1 row failed to process: {err}"),
                        source_file_processed_id: Some(context.file_processed_id),
                        biobank_id: row_value(row, "biobank_id").map(member::strip_biobank_prefix),
                        collection_tube_id: row_value(row, "collection_tube_id")
                            .map(str::to_string),
                        ..Default::default()
                    },
                )?;
            }
        }
    }

    tracing::info!(
        rows = rows.len(),
        reconciled,
        "aw1 manifest rows reconciled"
    );
    Ok(RunResult::Success)
}

/// Returns true when the row was reconciled against a member.
fn process_row(
    conn: &mut PgConnection,
    controller: &mut JobController,
    context: &IngestionContext,
    row: &BTreeMap<String, String>,
) -> db::Result<bool> {
    let Some(genome_type) = row_value(row, "genome_type").and_then(|v| v.parse::<GenomeType>().ok())
    else {
        controller.create_incident(
            conn,
            IncidentCode::DataValidationFailed,
            IncidentSpec {
                message: format!(
                    "aw1 row has missing or unrecognized genome type: {:?}",
                    row.get("genome_type")
                ),
                source_file_processed_id: Some(context.file_processed_id),
                biobank_id: row.get("biobank_id").cloned(),
                ..Default::default()
            },
        )?;
        return Ok(false);
    };

    let Some(tube_id) = row_value(row, "collection_tube_id") else {
        controller.create_incident(
            conn,
            IncidentCode::DataValidationFailed,
            IncidentSpec {
                message: "aw1 row has no collection tube id".to_string(),
                source_file_processed_id: Some(context.file_processed_id),
                biobank_id: row.get("biobank_id").cloned(),
                ..Default::default()
            },
        )?;
        return Ok(false);
    };

    // Research-only genome types never belong to an AW0 cohort; the row
    // creates its member on arrival, blocked from the result pathways.
    if genome_type.is_investigation() {
        insert_investigation_member(conn, context, row, genome_type, tube_id)?;
        return Ok(true);
    }

    // Calibration samples are recognized by their parent sample living in the
    // control set. They get a member per site, outside the state machine.
    if let Some(parent) = row_value(row, "parent_sample_id") {
        if member::control_parent_exists(conn, genome_type, parent)? {
            insert_control_member(conn, context, row, genome_type, tube_id)?;
            return Ok(true);
        }
    }

    let bare_biobank_id = member::strip_biobank_prefix(row_value(row, "biobank_id").unwrap_or(""));
    let Some(found) = find_member(conn, context.job, tube_id, &bare_biobank_id, genome_type)?
    else {
        controller.create_incident(
            conn,
            IncidentCode::UnableToFindMember,
            IncidentSpec {
                message: format!(
                    "no genomic set member awaiting aw1 for tube {tube_id} ({genome_type})"
                ),
                source_file_processed_id: Some(context.file_processed_id),
                biobank_id: (!bare_biobank_id.is_empty()).then(|| bare_biobank_id.clone()),
                collection_tube_id: Some(tube_id.to_string()),
                ..Default::default()
            },
        )?;
        return Ok(false);
    };

    // A biobank-id hit with a different tube means the Biobank swapped the
    // physical sample. The original tube is retired into the contamination
    // log before the member takes the new one.
    if let Some(old_tube) = found
        .member
        .collection_tube_id
        .as_deref()
        .filter(|old| found.matched_by_biobank_id && *old != tube_id)
    {
        contamination::record_failure(conn, old_tube, controller.job)?;
        tracing::info!(
            member_id = found.member.id,
            old_tube,
            new_tube = tube_id,
            "biobank replated sample, retiring original tube"
        );
    }

    let update = aw1_update_from_row(conn, context, row, tube_id)?;
    member::apply_aw1_update(conn, found.member.id, &update)?;

    let signal = if row_value(row, "failure_mode").is_some() {
        WorkflowSignal::Aw1Failed
    } else {
        WorkflowSignal::Aw1Reconciled
    };
    if let Some(new_state) = next_state(found.member.workflow_state(), signal) {
        member::update_state(conn, found.member.id, new_state)?;
    }

    Ok(true)
}

struct FoundMember {
    member: GenomicSetMember,
    matched_by_biobank_id: bool,
}

/// Tube id first, bare biobank id as the replate fallback. Both lookups lock
/// the row for the remainder of the transaction.
fn find_member(
    conn: &mut PgConnection,
    job: GenomicJob,
    tube_id: &str,
    bare_biobank_id: &str,
    genome_type: GenomeType,
) -> db::Result<Option<FoundMember>> {
    let states = reconcilable_state_codes(job);

    if let Some(member) = member::find_for_update_by_tube(conn, tube_id, genome_type, &states)? {
        return Ok(Some(FoundMember {
            member,
            matched_by_biobank_id: false,
        }));
    }

    if bare_biobank_id.is_empty() {
        return Ok(None);
    }
    Ok(
        member::find_for_update_by_biobank_id(conn, bare_biobank_id, genome_type, &states)?.map(
            |member| FoundMember {
                member,
                matched_by_biobank_id: true,
            },
        ),
    )
}

fn aw1_update_from_row(
    conn: &mut PgConnection,
    context: &IngestionContext,
    row: &BTreeMap<String, String>,
    tube_id: &str,
) -> db::Result<Aw1Update> {
    let owned = |key: &str| row_value(row, key).map(str::to_string);

    Ok(Aw1Update {
        package_id: owned("package_id"),
        box_storageunit_id: owned("box_storageunit_id"),
        box_plate_id: owned("box_plate_id"),
        well_position: owned("well_position"),
        sample_id: owned("sample_id"),
        parent_sample_id: owned("parent_sample_id"),
        collection_tube_id: Some(tube_id.to_string()),
        sex_at_birth: owned("sex_at_birth"),
        ny_flag: row_value(row, "ny_flag").map(|v| v.eq_ignore_ascii_case("y")),
        sample_type: owned("sample_type"),
        treatments: owned("treatments"),
        quantity_ul: owned("quantity_ul"),
        total_concentration_ng_per_ul: owned("total_concentration_ng_per_ul"),
        total_dna_ng: owned("total_dna_ng"),
        visit_description: owned("visit_description"),
        sample_source: owned("sample_source"),
        study: owned("study"),
        tracking_number: owned("tracking_number"),
        contact: owned("contact"),
        email: owned("email"),
        study_pi: owned("study_pi"),
        site_name: owned("site_name"),
        failure_mode: owned("failure_mode"),
        failure_mode_desc: owned("failure_mode_desc"),
        gc_site_id: context.gc_site_id.clone(),
        diversion_pouch: Some(stored_sample::is_diversion_pouch(conn, tube_id)?),
        aw1_file_processed_id: Some(context.file_processed_id),
        modified: Some(Utc::now().naive_utc()),
    })
}

/// One synthetic set per manifest file collects its investigation members.
fn investigation_set_id(conn: &mut PgConnection, context: &IngestionContext) -> db::Result<i64> {
    let set_name = format!("aw1_investigation_{}", context.file_processed_id);
    if let Some(set) = genomic_set::find_by_name(conn, &set_name)? {
        return Ok(set.id);
    }
    Ok(genomic_set::NewGenomicSet {
        name: set_name,
        version: 1,
    }
    .create(conn)?
    .id)
}

fn insert_investigation_member(
    conn: &mut PgConnection,
    context: &IngestionContext,
    row: &BTreeMap<String, String>,
    genome_type: GenomeType,
    tube_id: &str,
) -> db::Result<()> {
    let bare_biobank_id = member::strip_biobank_prefix(row_value(row, "biobank_id").unwrap_or(""));
    let participant_id = bare_biobank_id.parse::<i64>().unwrap_or(0);
    let set_id = investigation_set_id(conn, context)?;

    let mut new_member = NewMember::new(
        set_id,
        participant_id,
        bare_biobank_id,
        genome_type,
        GenomicWorkflowState::Aw1,
    );
    new_member.block_research = true;
    new_member.block_research_reason = Some("aw1_investigation_genome_type".to_string());
    new_member.block_results = true;
    new_member.block_results_reason = Some("aw1_investigation_genome_type".to_string());
    new_member.gc_site_id = context.gc_site_id.clone();
    new_member.aw1_file_processed_id = Some(context.file_processed_id);
    let created = new_member.create(conn)?;

    let update = aw1_update_from_row(conn, context, row, tube_id)?;
    member::apply_aw1_update(conn, created.id, &update)?;
    tracing::info!(member_id = created.id, %genome_type, "created investigation member");

    Ok(())
}

fn insert_control_member(
    conn: &mut PgConnection,
    context: &IngestionContext,
    row: &BTreeMap<String, String>,
    genome_type: GenomeType,
    tube_id: &str,
) -> db::Result<()> {
    let site = context.gc_site_id.clone().unwrap_or_default();
    let bare_biobank_id = member::strip_biobank_prefix(row_value(row, "biobank_id").unwrap_or(""));
    let sample_id = row_value(row, "sample_id").unwrap_or_default();

    if member::control_member_exists(conn, &site, genome_type, &bare_biobank_id, tube_id, sample_id)?
    {
        return Ok(());
    }

    let control_set = genomic_set::find_by_name(conn, CONTROL_SET_NAME)?
        .ok_or_else(|| db::Error::Other(format!("{CONTROL_SET_NAME} set is missing")))?;

    let mut new_member = NewMember::new(
        control_set.id,
        0,
        bare_biobank_id,
        genome_type,
        GenomicWorkflowState::Aw1,
    );
    new_member.gc_site_id = context.gc_site_id.clone();
    new_member.aw1_file_processed_id = Some(context.file_processed_id);
    let created = new_member.create(conn)?;

    let update = aw1_update_from_row(conn, context, row, tube_id)?;
    member::apply_aw1_update(conn, created.id, &update)?;
    tracing::info!(member_id = created.id, site, "created control sample member");

    Ok(())
}
