//! AW2 metrics ingestion: GC validation metrics per sample, contamination
//! triage, and the staged state advance to GEM_READY / CVL_READY.
//!
//! Metric values ride to the database as queued upsert tasks, so reingesting
//! a corrected manifest overwrites rather than duplicates. State changes are
//! collected during the row loop and applied in one transaction afterwards.

use std::collections::{BTreeMap, BTreeSet};

use diesel::{Connection, PgConnection};

use crate::{
    contamination::{calculate_contamination_category, ContaminationCategory},
    controller::{IncidentSpec, JobController},
    db::{
        self, file_processed, manifest as manifest_dao, member,
        member::GenomicSetMember,
        metrics::{self, MetricsUpsert},
    },
    jobs::{GenomeType, IncidentCode, RunResult},
    manifest::validate::DEFAULT_WGS_PIPELINE_ID,
    state::{next_state, GenomicWorkflowState, WorkflowSignal},
    tasks::CloudTask,
};

use super::{row_is_blank, row_value, IngestionContext};

/// Varchar width of the free-text metric columns.
const METRIC_TEXT_WIDTH: usize = 10;

pub fn ingest(
    conn: &mut PgConnection,
    controller: &mut JobController,
    context: &IngestionContext,
    rows: &[BTreeMap<String, String>],
) -> db::Result<RunResult> {
    let genome_type = context.genome_type.ok_or_else(|| {
        db::Error::manifest_file("metrics manifest filename does not encode a genome type")
    })?;

    let sample_ids: Vec<String> = rows
        .iter()
        .filter_map(|row| row_value(row, "sample_id"))
        .map(str::to_string)
        .collect();
    let members = member::by_sample_ids(conn, &sample_ids)?;

    // One idempotence query for the whole file instead of one per row.
    let member_ids: Vec<i64> = members.iter().map(|m| m.id).collect();
    let existing_metrics: BTreeSet<(i64, Option<String>)> =
        metrics::existing_member_pipelines(conn, &member_ids)?
            .into_iter()
            .collect();

    let mut state_updates: Vec<(i64, GenomicWorkflowState)> = Vec::new();
    for row in rows {
        if row_is_blank(row) {
            continue;
        }
        let Some(sample_id) = row_value(row, "sample_id") else {
            continue;
        };

        let Some(member) = members
            .iter()
            .find(|m| m.sample_id.as_deref() == Some(sample_id))
        else {
            controller.create_incident(
                conn,
                IncidentCode::UnableToFindMember,
                IncidentSpec {
                    message: format!("no genomic set member for aw2 sample {sample_id}"),
                    source_file_processed_id: Some(context.file_processed_id),
                    sample_id: Some(sample_id.to_string()),
                    biobank_id: row_value(row, "biobank_id").map(member::strip_biobank_prefix),
                    ..Default::default()
                },
            )?;
            continue;
        };

        conn.transaction::<_, db::Error, _>(|conn| {
            if let Some(staged) = process_row(
                conn,
                controller,
                context,
                genome_type,
                row,
                member,
                &existing_metrics,
            )? {
                state_updates.push(staged);
            }
            Ok(())
        })?;
    }

    if !state_updates.is_empty() {
        member::bulk_update_states(conn, &state_updates, context.file_processed_id)?;
    }

    tracing::info!(
        rows = rows.len(),
        advanced = state_updates.len(),
        %genome_type,
        "aw2 metrics manifest processed"
    );
    Ok(RunResult::Success)
}

fn process_row(
    conn: &mut PgConnection,
    controller: &mut JobController,
    context: &IngestionContext,
    genome_type: GenomeType,
    row: &BTreeMap<String, String>,
    member: &GenomicSetMember,
    existing_metrics: &BTreeSet<(i64, Option<String>)>,
) -> db::Result<Option<(i64, GenomicWorkflowState)>> {
    let pipeline_id = effective_pipeline_id(genome_type, row);
    let had_existing_metrics = existing_metrics.contains(&(member.id, pipeline_id.clone()));

    let processing_passed = row_value(row, "processing_status")
        .is_some_and(|s| s.eq_ignore_ascii_case("pass"));

    let contamination_value = match row_value(row, "contamination").map(str::parse::<f64>) {
        Some(Ok(value)) => Some(value),
        Some(Err(_)) | None if processing_passed => {
            // A passing sample with no usable contamination value breaks the
            // triage contract.
            controller.create_incident(
                conn,
                IncidentCode::DataValidationFailed,
                IncidentSpec {
                    message: format!(
                        "aw2 row for sample {} passed processing but has no parseable contamination value",
                        member.sample_id.as_deref().unwrap_or("?")
                    ),
                    source_file_processed_id: Some(context.file_processed_id),
                    sample_id: member.sample_id.clone(),
                    biobank_id: Some(member.biobank_id.clone()),
                    ..Default::default()
                },
            )?;
            return Ok(None);
        }
        _ => None,
    };

    let contamination_category = match contamination_value {
        Some(value) if processing_passed => {
            let tube_id = member.collection_tube_id.clone().unwrap_or_default();
            Some(calculate_contamination_category(
                conn,
                &tube_id,
                value,
                member,
                controller.job,
            )?)
        }
        _ => None,
    };

    let upsert = build_upsert(context, row, member, pipeline_id, contamination_value, contamination_category);
    controller.enqueue_task(CloudTask::GcMetricsUpsert(upsert));

    match contamination_category {
        Some(ContaminationCategory::ExtractWgs | ContaminationCategory::ExtractBoth)
            if !had_existing_metrics =>
        {
            controller.enqueue_task(CloudTask::ReplateMember {
                member_id: member.id,
            });
        }
        _ => {}
    }

    // First metrics row for this member closes one slot of the AW1 feedback
    // loop.
    if !had_existing_metrics {
        increment_source_feedback(conn, member)?;
    }

    let signal = match contamination_category {
        Some(
            ContaminationCategory::ExtractWgs
            | ContaminationCategory::ExtractBoth
            | ContaminationCategory::TerminalNoExtract,
        ) => WorkflowSignal::MetricsIngested,
        _ if genome_type.is_array() => WorkflowSignal::GemReady,
        _ => WorkflowSignal::CvlReady,
    };

    Ok(next_state(member.workflow_state(), signal).map(|state| (member.id, state)))
}

/// WGS manifests that predate the pipeline id column get the legacy default;
/// array manifests are keyed by whatever the GC sent, possibly nothing.
fn effective_pipeline_id(
    genome_type: GenomeType,
    row: &BTreeMap<String, String>,
) -> Option<String> {
    match row_value(row, "pipeline_id") {
        Some(pipeline) => Some(pipeline.to_string()),
        None if !genome_type.is_array() => Some(DEFAULT_WGS_PIPELINE_ID.to_string()),
        None => None,
    }
}

fn build_upsert(
    context: &IngestionContext,
    row: &BTreeMap<String, String>,
    member: &GenomicSetMember,
    pipeline_id: Option<String>,
    contamination_value: Option<f64>,
    contamination_category: Option<ContaminationCategory>,
) -> MetricsUpsert {
    let owned = |key: &str| row_value(row, key).map(str::to_string);
    let truncated = |key: &str| {
        row_value(row, key).map(|v| v.chars().take(METRIC_TEXT_WIDTH).collect::<String>())
    };
    let parse_f64 = |key: &str| row_value(row, key).and_then(|v| v.parse::<f64>().ok());

    MetricsUpsert {
        genomic_set_member_id: member.id,
        genomic_file_processed_id: Some(context.file_processed_id),
        pipeline_id,
        chipwellbarcode: owned("chipwellbarcode"),
        lims_id: owned("lims_id"),
        call_rate: truncated("call_rate"),
        mapped_reads_pct: truncated("mapped_reads_pct"),
        mean_coverage: parse_f64("mean_coverage"),
        genome_coverage: parse_f64("genome_coverage"),
        aligned_q30_bases: row_value(row, "aligned_q30_bases").and_then(|v| v.parse::<i64>().ok()),
        contamination: contamination_value.map(|v| v.max(0.0)),
        contamination_category: contamination_category.map(|c| c.to_string()),
        sex_concordance: owned("sex_concordance"),
        sex_ploidy: owned("sex_ploidy"),
        array_concordance: owned("array_concordance"),
        processing_status: owned("processing_status"),
        notes: owned("notes"),
        site_id: owned("site_id").or_else(|| context.gc_site_id.clone()),
    }
}

/// Walk member -> aw1 file -> manifest file and bump its feedback count.
fn increment_source_feedback(
    conn: &mut PgConnection,
    member: &GenomicSetMember,
) -> db::Result<()> {
    let Some(aw1_file_id) = member.aw1_file_processed_id else {
        return Ok(());
    };
    let aw1_file = file_processed::find(conn, aw1_file_id)?;
    if let Some(manifest_file_id) = aw1_file.genomic_manifest_file_id {
        manifest_dao::increment_feedback_count(conn, manifest_file_id)?;
    }
    Ok(())
}
