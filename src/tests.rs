//! Database-backed scenario tests covering the manifest lifecycle end to end.
//!
//! All tests share one containerized Postgres; each works on its own
//! participants, tubes, and buckets so they can run concurrently.

use std::collections::BTreeMap;

use diesel::connection::SimpleConnection;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::{
    contamination::{calculate_contamination_category, ContaminationCategory},
    controller::run_job,
    db::{
        contamination as contamination_dao, file_processed,
        genomic_set::{self, CONTROL_SET_NAME},
        incident, manifest as manifest_dao, member, metrics,
        metrics::DataFileKind,
        participant::NewParticipantSummary,
        stored_sample::NewStoredSample,
        test_utils::db_conn,
        PgPooledConnection,
    },
    export, ingest,
    ingest::FileInput,
    intake,
    jobs::{GenomeType, GenomicJob, IncidentCode, RunResult},
    manifest::columns::expected_columns,
    reconcile,
    state::GenomicWorkflowState,
    storage::{LocalBucket, ManifestStore},
    tasks,
    tasks::CloudTask,
};

const TEST_WINDOW_DAYS: i64 = 7;

fn seed_set(conn: &mut PgPooledConnection, name: &str) -> i64 {
    genomic_set::NewGenomicSet {
        name: name.to_string(),
        version: 1,
    }
    .create(conn)
    .unwrap()
    .id
}

fn seed_metric(conn: &mut PgPooledConnection, member_id: i64, pipeline: &str) -> i64 {
    metrics::upsert(
        conn,
        &metrics::MetricsUpsert {
            genomic_set_member_id: member_id,
            genomic_file_processed_id: None,
            pipeline_id: Some(pipeline.to_string()),
            chipwellbarcode: None,
            lims_id: None,
            call_rate: None,
            mapped_reads_pct: None,
            mean_coverage: Some(31.0),
            genome_coverage: None,
            aligned_q30_bases: None,
            contamination: Some(0.0),
            contamination_category: Some("NO_EXTRACT".to_string()),
            sex_concordance: None,
            sex_ploidy: None,
            array_concordance: None,
            processing_status: Some("pass".to_string()),
            notes: None,
            site_id: Some("bcm".to_string()),
        },
    )
    .unwrap()
}

fn seed_member(
    conn: &mut PgPooledConnection,
    set_id: i64,
    participant_id: i64,
    genome_type: GenomeType,
    state: GenomicWorkflowState,
    tube: Option<&str>,
    sample: Option<&str>,
) -> i64 {
    let mut new_member = member::NewMember::new(
        set_id,
        participant_id,
        participant_id.to_string(),
        genome_type,
        state,
    );
    new_member.collection_tube_id = tube.map(str::to_string);
    new_member.sample_id = sample.map(str::to_string);
    new_member.create(conn).unwrap().id
}

/// CSV in the partner's wire format for the given job, rows keyed by internal
/// field name.
fn manifest_csv(
    job: GenomicJob,
    genome_type: Option<GenomeType>,
    rows: &[BTreeMap<&str, &str>],
) -> String {
    let columns = expected_columns(job, genome_type).unwrap();
    let mut out = columns
        .iter()
        .map(|(_, header)| *header)
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        let line = columns
            .iter()
            .map(|(field, _)| row.get(field).copied().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn run_ingestion(
    conn: &mut PgPooledConnection,
    store: &LocalBucket,
    input: &FileInput,
) -> crate::controller::JobOutcome {
    run_job(conn, input.job, TEST_WINDOW_DAYS, |controller, conn| {
        ingest::ingest_manifest_file(conn, store, controller, input)
    })
    .unwrap()
}

#[rstest]
fn new_participant_intake_builds_aw0_cohort(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    for participant_id in [910001, 910002] {
        NewParticipantSummary {
            participant_id,
            biobank_id: participant_id.to_string(),
            sex_at_birth: Some("F".to_string()),
            cohort: 3,
            consent_for_genomics_ror: 1,
            withdrawal_status: 1,
        }
        .create(conn)
        .unwrap();
        NewStoredSample {
            biobank_stored_sample_id: format!("T{participant_id}"),
            biobank_id: participant_id.to_string(),
            test: "1ED04".to_string(),
            status: "received".to_string(),
            collection_method: None,
            confirmed_date: Some(chrono::Utc::now().naive_utc()),
        }
        .create(conn)
        .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    let outcome = run_job(
        conn,
        GenomicJob::NewParticipantWorkflow,
        TEST_WINDOW_DAYS,
        |controller, conn| intake::new_participant_workflow(conn, &store, controller, "biobank-out"),
    )
    .unwrap();
    assert_eq!(outcome.result, RunResult::Success);

    // One array member and one wgs member per participant, all in AW0.
    let members = member::by_biobank_ids_in_state(
        conn,
        &["910001".to_string(), "910002".to_string()],
        GenomicWorkflowState::Aw0.code(),
    )
    .unwrap();
    assert_eq!(members.len(), 4);
    for m in &members {
        assert!(m.collection_tube_id.is_some());
        assert!(m.aw0_manifest_file_id.is_some());
    }

    let manifest = manifest_dao::find(conn, members[0].aw0_manifest_file_id.unwrap()).unwrap();
    assert_eq!(manifest.manifest_type, "AW0");
    assert_eq!(manifest.record_count, 4);
    assert_eq!(store.list("biobank-out", "AoU_AW0_").unwrap().len(), 1);
}

#[rstest]
fn aw1_reconciles_member_and_opens_feedback(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw1_reconcile_test");
    let member_id = seed_member(
        conn,
        set_id,
        920001,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw0,
        Some("T920001"),
        None,
    );

    let row = BTreeMap::from([
        ("package_id", "PKG-2000"),
        ("biobank_id", "A920001"),
        ("sample_id", "S920001"),
        ("collection_tube_id", "T920001"),
        ("sex_at_birth", "F"),
        ("ny_flag", "N"),
        ("genome_type", "aou_array"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t2", "JH_AoU_AW1_2024-05-01-12-00-00.csv", csv.as_bytes())
        .unwrap();

    let input = FileInput {
        job: GenomicJob::Aw1Manifest,
        bucket: "aw1-in-t2".to_string(),
        file_path: "JH_AoU_AW1_2024-05-01-12-00-00.csv".to_string(),
        upload_date: None,
        create_feedback_record: true,
    };
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 0);

    let reconciled = member::find(conn, member_id).unwrap();
    assert_eq!(reconciled.workflow_state(), GenomicWorkflowState::Aw1);
    assert_eq!(reconciled.package_id.as_deref(), Some("PKG-2000"));
    assert_eq!(reconciled.sample_id.as_deref(), Some("S920001"));
    assert_eq!(reconciled.gc_site_id.as_deref(), Some("jh"));

    // The AW1 file opened a feedback record against its manifest.
    let aw1_file = file_processed::find(conn, reconciled.aw1_file_processed_id.unwrap()).unwrap();
    let feedback =
        manifest_dao::find_feedback(conn, aw1_file.genomic_manifest_file_id.unwrap()).unwrap();
    assert_eq!(feedback.unwrap().feedback_record_count, 0);

    // Resubmitting the identical file is a no-op.
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::NoFiles);
}

#[rstest]
fn aw1_failure_mode_parks_member(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw1_failure_test");
    let member_id = seed_member(
        conn,
        set_id,
        930001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw0,
        Some("T930001"),
        None,
    );

    let row = BTreeMap::from([
        ("biobank_id", "A930001"),
        ("collection_tube_id", "T930001"),
        ("genome_type", "aou_wgs"),
        ("failure_mode", "damaged"),
        ("failure_mode_desc", "tube cracked in transit"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t3", "BCM_AoU_AW1_failed.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t3".to_string(),
            file_path: "BCM_AoU_AW1_failed.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);

    let parked = member::find(conn, member_id).unwrap();
    assert_eq!(parked.workflow_state(), GenomicWorkflowState::Aw1fPost);
    assert_eq!(parked.failure_mode.as_deref(), Some("damaged"));
}

#[rstest]
fn aw1_unknown_tube_raises_incident_without_aborting(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let row = BTreeMap::from([
        ("biobank_id", "A940404"),
        ("collection_tube_id", "T940404"),
        ("genome_type", "aou_array"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t4", "JH_AoU_AW1_orphan.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t4".to_string(),
            file_path: "JH_AoU_AW1_orphan.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );

    // Row-scoped failure: the file still succeeds.
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 1);

    let incidents = incident::find_by_code(conn, &IncidentCode::UnableToFindMember.to_string())
        .unwrap();
    assert!(incidents
        .iter()
        .any(|i| i.collection_tube_id.as_deref() == Some("T940404")));
}

#[rstest]
fn aw1_biobank_id_fallback_retires_swapped_tube(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw1_swap_test");
    let member_id = seed_member(
        conn,
        set_id,
        941111,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw0,
        Some("T941111-old"),
        None,
    );

    let row = BTreeMap::from([
        ("biobank_id", "A941111"),
        ("collection_tube_id", "T941111-new"),
        ("genome_type", "aou_array"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t5", "JH_AoU_AW1_swap.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t5".to_string(),
            file_path: "JH_AoU_AW1_swap.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 0);

    let swapped = member::find(conn, member_id).unwrap();
    assert_eq!(swapped.collection_tube_id.as_deref(), Some("T941111-new"));
    assert_eq!(swapped.workflow_state(), GenomicWorkflowState::Aw1);

    // The replaced tube is retired into the contamination log.
    let log = contamination_dao::find_by_sample(conn, "T941111-old").unwrap();
    assert_eq!(log.len(), 1);
}

#[rstest]
fn aw2_wgs_metrics_advance_member_and_are_idempotent(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw2_wgs_test");
    let member_id = seed_member(
        conn,
        set_id,
        950001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw1,
        Some("T950001"),
        Some("S950001"),
    );

    let row = BTreeMap::from([
        ("biobank_id", "A950001"),
        ("sample_id", "S950001"),
        ("contamination", "0.001"),
        ("processing_status", "Pass"),
        ("pipeline_id", "dragen_3.4.12"),
        ("mean_coverage", "30.5"),
        ("mapped_reads_pct", "99.12345678901"),
    ]);
    let csv = manifest_csv(GenomicJob::MetricsIngestion, Some(GenomeType::AouWgs), &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    let file_path = "BCM_AoU_SEQ_DataManifest_2024-06-01-01-02-03.csv";
    store.write("aw2-in-t6", file_path, csv.as_bytes()).unwrap();

    let input = FileInput {
        job: GenomicJob::MetricsIngestion,
        bucket: "aw2-in-t6".to_string(),
        file_path: file_path.to_string(),
        upload_date: None,
        create_feedback_record: false,
    };
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::Success);
    tasks::drain(conn, &outcome.tasks).unwrap();
    for kind in [DataFileKind::Cram, DataFileKind::Crai, DataFileKind::HfVcf] {
        let metric = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.4.12"))
            .unwrap()
            .unwrap();
        metrics::mark_file_received(conn, metric.id, kind, "gs://seq/path").unwrap();
    }

    let advanced = member::find(conn, member_id).unwrap();
    assert_eq!(advanced.workflow_state(), GenomicWorkflowState::CvlReady);
    assert!(advanced.aw2_file_processed_id.is_some());

    let metric = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.4.12"))
        .unwrap()
        .unwrap();
    assert_eq!(metric.contamination_category.as_deref(), Some("NO_EXTRACT"));
    assert_eq!(metric.mean_coverage, Some(30.5));
    // Free-text metric columns are truncated to their column width.
    assert_eq!(metric.mapped_reads_pct.as_deref(), Some("99.1234567"));

    // Reingesting a corrected manifest overwrites instead of duplicating.
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::Success);
    tasks::drain(conn, &outcome.tasks).unwrap();
    assert_eq!(metrics::by_member_ids(conn, &[member_id]).unwrap().len(), 1);
    let unchanged = member::find(conn, member_id).unwrap();
    assert_eq!(unchanged.workflow_state(), GenomicWorkflowState::CvlReady);
}

#[rstest]
fn contamination_triage(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "contamination_test");

    // Negative lab noise clamps to zero and stays extractable.
    let clean_id = seed_member(
        conn,
        set_id,
        960001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw1,
        Some("T960001"),
        Some("S960001"),
    );
    let clean = member::find(conn, clean_id).unwrap();
    let category = calculate_contamination_category(
        conn,
        "T960001",
        -0.5,
        &clean,
        GenomicJob::MetricsIngestion,
    )
    .unwrap();
    assert_eq!(category, ContaminationCategory::NoExtract);

    // Contaminated with no viable sibling sample: terminal, and logged.
    let category = calculate_contamination_category(
        conn,
        "T960001",
        0.05,
        &clean,
        GenomicJob::MetricsIngestion,
    )
    .unwrap();
    assert_eq!(category, ContaminationCategory::TerminalNoExtract);
    assert_eq!(
        contamination_dao::find_by_sample(conn, "T960001").unwrap().len(),
        1
    );

    // Contaminated with a viable sibling: replate, scope depends on product.
    let sibling_member_id = seed_member(
        conn,
        set_id,
        961001,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw1,
        Some("T961001a"),
        Some("S961001"),
    );
    for sample in ["T961001a", "T961001b"] {
        NewStoredSample {
            biobank_stored_sample_id: sample.to_string(),
            biobank_id: "961001".to_string(),
            test: "1ED10".to_string(),
            status: "received".to_string(),
            collection_method: None,
            confirmed_date: Some(chrono::Utc::now().naive_utc()),
        }
        .create(conn)
        .unwrap();
    }
    let with_sibling = member::find(conn, sibling_member_id).unwrap();
    let category = calculate_contamination_category(
        conn,
        "T961001a",
        0.02,
        &with_sibling,
        GenomicJob::MetricsIngestion,
    )
    .unwrap();
    assert_eq!(category, ContaminationCategory::ExtractBoth);
}

#[rstest]
fn stale_aw1_cannot_regress_member(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw1_regress_test");
    let member_id = seed_member(
        conn,
        set_id,
        970001,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw2,
        Some("T970001"),
        Some("S970001"),
    );

    let row = BTreeMap::from([
        ("biobank_id", "A970001"),
        ("collection_tube_id", "T970001"),
        ("genome_type", "aou_array"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t8", "JH_AoU_AW1_stale.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t8".to_string(),
            file_path: "JH_AoU_AW1_stale.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );

    // A member past AW1 no longer matches the reconciliation lookup, so the
    // stale row raises an incident instead of rewinding state.
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 1);
    let untouched = member::find(conn, member_id).unwrap();
    assert_eq!(untouched.workflow_state(), GenomicWorkflowState::Aw2);
}

#[rstest]
fn missing_columns_fail_the_whole_file(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write(
            "gem-in-t9",
            "gem_a2_truncated.csv",
            b"biobank_id,sample_id\nA1,S1\n",
        )
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::GemA2Manifest,
            bucket: "gem-in-t9".to_string(),
            file_path: "gem_a2_truncated.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );

    assert_eq!(outcome.result, RunResult::Error);
    let incidents = incident::find_by_code(
        conn,
        &IncidentCode::FileValidationFailedStructure.to_string(),
    )
    .unwrap();
    assert!(incidents
        .iter()
        .any(|i| i.message.contains("gem_a2_truncated.csv")));
}

#[rstest]
fn gem_a1_export_then_a2_verdict(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "gem_flow_test");
    let member_id = seed_member(
        conn,
        set_id,
        980001,
        GenomeType::AouArray,
        GenomicWorkflowState::GemReady,
        Some("T980001"),
        Some("S980001"),
    );

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    let outcome = run_job(
        conn,
        GenomicJob::GemA1Manifest,
        TEST_WINDOW_DAYS,
        |controller, conn| export::generate_gem_a1(conn, &store, controller, "gem-out-t10"),
    )
    .unwrap();
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(store.list("gem-out-t10", "AoU_GEM_A1_").unwrap().len(), 1);

    let exported = member::find(conn, member_id).unwrap();
    assert_eq!(exported.workflow_state(), GenomicWorkflowState::A1);
    assert!(exported.gem_a1_manifest_job_run_id.is_some());

    let row = BTreeMap::from([
        ("biobank_id", "A980001"),
        ("sample_id", "S980001"),
        ("success", "N"),
    ]);
    let csv = manifest_csv(GenomicJob::GemA2Manifest, None, &[row]);
    store
        .write("gem-in-t10", "gem_a2_results.csv", csv.as_bytes())
        .unwrap();
    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::GemA2Manifest,
            bucket: "gem-in-t10".to_string(),
            file_path: "gem_a2_results.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);

    let failed = member::find(conn, member_id).unwrap();
    assert_eq!(failed.workflow_state(), GenomicWorkflowState::A2f);
    assert_eq!(failed.gem_pass.as_deref(), Some("N"));
}

#[rstest]
fn repeated_incidents_notify_once_inside_window(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let message = "duplicate incident window test t11";

    let outcome = run_job(
        conn,
        GenomicJob::MetricsIngestion,
        TEST_WINDOW_DAYS,
        |controller, conn| {
            for _ in 0..2 {
                controller.create_incident(
                    conn,
                    IncidentCode::DataValidationFailed,
                    crate::controller::IncidentSpec {
                        message: message.to_string(),
                        ..Default::default()
                    },
                )?;
            }
            Ok(RunResult::Success)
        },
    )
    .unwrap();
    assert_eq!(outcome.incidents_created, 2);

    let matching: Vec<_> =
        incident::find_by_code(conn, &IncidentCode::DataValidationFailed.to_string())
            .unwrap()
            .into_iter()
            .filter(|i| i.message == message)
            .collect();
    assert_eq!(matching.len(), 2);
    assert!(matching[0].slack_notification);
    assert!(!matching[1].slack_notification);
}

#[rstest]
fn withdrawn_participants_have_reports_retracted(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    NewParticipantSummary {
        participant_id: 990001,
        biobank_id: "990001".to_string(),
        sex_at_birth: None,
        cohort: 1,
        consent_for_genomics_ror: 1,
        withdrawal_status: 2,
    }
    .create(conn)
    .unwrap();

    let set_id = seed_set(conn, "withdrawal_test");
    let member_id = seed_member(
        conn,
        set_id,
        990001,
        GenomeType::AouArray,
        GenomicWorkflowState::GemRptReady,
        None,
        Some("S990001"),
    );

    let outcome = run_job(
        conn,
        GenomicJob::ReconcileReportStates,
        TEST_WINDOW_DAYS,
        |controller, conn| reconcile::reconcile_report_states(conn, controller),
    )
    .unwrap();
    assert_eq!(outcome.result, RunResult::Success);

    let retracted = member::find(conn, member_id).unwrap();
    assert_eq!(retracted.workflow_state(), GenomicWorkflowState::GemRptDeleted);
}

#[rstest]
fn arrived_data_files_release_parked_member(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "data_files_test");
    let member_id = seed_member(
        conn,
        set_id,
        991001,
        GenomeType::AouWgs,
        GenomicWorkflowState::GcDataFilesMissing,
        Some("T991001"),
        Some("S991001"),
    );

    let metric_id = seed_metric(conn, member_id, "dragen_3.7.8");
    for kind in [DataFileKind::Cram, DataFileKind::Crai, DataFileKind::HfVcf] {
        metrics::mark_file_received(conn, metric_id, kind, "gs://seq/991001").unwrap();
    }

    let outcome = run_job(
        conn,
        GenomicJob::ReconcileGcDataFiles,
        TEST_WINDOW_DAYS,
        |controller, conn| reconcile::reconcile_gc_data_files(conn, controller),
    )
    .unwrap();
    assert_eq!(outcome.result, RunResult::Success);

    let released = member::find(conn, member_id).unwrap();
    assert_eq!(released.workflow_state(), GenomicWorkflowState::CvlReady);
}

#[rstest]
fn aw1_investigation_rows_create_blocked_members(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let row = BTreeMap::from([
        ("biobank_id", "A951001"),
        ("sample_id", "S951001"),
        ("collection_tube_id", "T951001"),
        ("genome_type", "aou_array_investigation"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t12", "JH_AoU_AW1_invest.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t12".to_string(),
            file_path: "JH_AoU_AW1_invest.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 0);

    // No AW0 cohort existed for this row; the member is created on arrival,
    // blocked from the result pathways.
    let members = member::by_sample_ids(conn, &["S951001".to_string()]).unwrap();
    assert_eq!(members.len(), 1);
    let created = &members[0];
    assert_eq!(created.workflow_state(), GenomicWorkflowState::Aw1);
    assert_eq!(created.genome_type, "aou_array_investigation");
    assert_eq!(created.participant_id, 951001);
    assert_eq!(created.collection_tube_id.as_deref(), Some("T951001"));
    assert_eq!(created.gc_site_id.as_deref(), Some("jh"));
    assert!(created.block_research);
    assert!(created.block_results);
    assert_eq!(
        created.block_research_reason.as_deref(),
        Some("aw1_investigation_genome_type")
    );

    // Investigation members collect in one synthetic set per manifest file.
    let set = genomic_set::find_by_name(
        conn,
        &format!(
            "aw1_investigation_{}",
            created.aw1_file_processed_id.unwrap()
        ),
    )
    .unwrap()
    .unwrap();
    assert_eq!(set.id, created.genomic_set_id);
}

#[rstest]
fn control_samples_insert_once_per_site(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let control_set_id = seed_set(conn, CONTROL_SET_NAME);
    seed_member(
        conn,
        control_set_id,
        952000,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw1,
        None,
        Some("SCTRL952001"),
    );

    let row = BTreeMap::from([
        ("biobank_id", "A952001"),
        ("sample_id", "S952001"),
        ("parent_sample_id", "SCTRL952001"),
        ("collection_tube_id", "T952001"),
        ("genome_type", "aou_array"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    for file in [
        "JH_AoU_AW1_ctrl_a.csv",
        "JH_AoU_AW1_ctrl_b.csv",
        "BCM_AoU_AW1_ctrl_c.csv",
    ] {
        store.write("aw1-in-t13", file, csv.as_bytes()).unwrap();
        let outcome = run_ingestion(
            conn,
            &store,
            &FileInput {
                job: GenomicJob::Aw1Manifest,
                bucket: "aw1-in-t13".to_string(),
                file_path: file.to_string(),
                upload_date: None,
                create_feedback_record: false,
            },
        );
        assert_eq!(outcome.result, RunResult::Success);
        assert_eq!(outcome.incidents_created, 0);
    }

    // The repeat JH submission is recognized; the BCM one gets its own member.
    let members = member::by_sample_ids(conn, &["S952001".to_string()]).unwrap();
    assert_eq!(members.len(), 2);
    let mut sites: Vec<_> = members
        .iter()
        .map(|m| m.gc_site_id.as_deref().unwrap_or(""))
        .collect();
    sites.sort();
    assert_eq!(sites, ["bcm", "jh"]);
    for m in &members {
        assert_eq!(m.genomic_set_id, control_set_id);
        assert_eq!(m.workflow_state(), GenomicWorkflowState::Aw1);
    }
}

#[rstest]
fn aw2_contaminated_extractable_sample_requests_replate(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw2_replate_test");
    let member_id = seed_member(
        conn,
        set_id,
        953001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw1,
        Some("T953001a"),
        Some("S953001"),
    );
    for sample in ["T953001a", "T953001b"] {
        NewStoredSample {
            biobank_stored_sample_id: sample.to_string(),
            biobank_id: "953001".to_string(),
            test: "1ED10".to_string(),
            status: "received".to_string(),
            collection_method: None,
            confirmed_date: Some(chrono::Utc::now().naive_utc()),
        }
        .create(conn)
        .unwrap();
    }

    let contaminated = BTreeMap::from([
        ("biobank_id", "A953001"),
        ("sample_id", "S953001"),
        ("contamination", "0.02"),
        ("processing_status", "Pass"),
        ("pipeline_id", "dragen_3.7.8"),
    ]);
    let orphan = BTreeMap::from([
        ("biobank_id", "A953999"),
        ("sample_id", "S953999"),
        ("contamination", "0.001"),
        ("processing_status", "Pass"),
    ]);
    let csv = manifest_csv(
        GenomicJob::MetricsIngestion,
        Some(GenomeType::AouWgs),
        &[contaminated, orphan],
    );

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    let file_path = "BCM_AoU_SEQ_DataManifest_2024-07-02-08-00-00.csv";
    store.write("aw2-in-t14", file_path, csv.as_bytes()).unwrap();

    let input = FileInput {
        job: GenomicJob::MetricsIngestion,
        bucket: "aw2-in-t14".to_string(),
        file_path: file_path.to_string(),
        upload_date: None,
        create_feedback_record: false,
    };
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 1);

    // Contaminated but extractable, with no prior metrics: a replate request
    // rides out with the metrics upsert.
    let replates = outcome
        .tasks
        .iter()
        .filter(|t| matches!(t, CloudTask::ReplateMember { .. }))
        .count();
    assert_eq!(replates, 1);
    tasks::drain(conn, &outcome.tasks).unwrap();

    let metric = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.7.8"))
        .unwrap()
        .unwrap();
    assert_eq!(metric.contamination, Some(0.02));
    assert_eq!(metric.contamination_category.as_deref(), Some("EXTRACT_WGS"));
    for kind in [DataFileKind::Cram, DataFileKind::Crai, DataFileKind::HfVcf] {
        metrics::mark_file_received(conn, metric.id, kind, "gs://seq/953001").unwrap();
    }

    let advanced = member::find(conn, member_id).unwrap();
    assert_eq!(advanced.workflow_state(), GenomicWorkflowState::Aw2);
    assert_eq!(
        member::by_biobank_ids_in_state(
            conn,
            &["953001".to_string()],
            GenomicWorkflowState::ExtractRequested.code(),
        )
        .unwrap()
        .len(),
        1
    );

    // The orphan row's incident carries the bare biobank id.
    let incidents =
        incident::find_by_code(conn, &IncidentCode::UnableToFindMember.to_string()).unwrap();
    assert!(incidents
        .iter()
        .any(|i| i.sample_id.as_deref() == Some("S953999")
            && i.biobank_id.as_deref() == Some("953999")));

    // Reingestion finds the existing metrics row and does not replate again.
    let outcome = run_ingestion(conn, &store, &input);
    assert_eq!(outcome.result, RunResult::Success);
    assert!(!outcome
        .tasks
        .iter()
        .any(|t| matches!(t, CloudTask::ReplateMember { .. })));
    tasks::drain(conn, &outcome.tasks).unwrap();
    assert_eq!(metrics::by_member_ids(conn, &[member_id]).unwrap().len(), 1);
    assert_eq!(
        member::by_biobank_ids_in_state(
            conn,
            &["953001".to_string()],
            GenomicWorkflowState::ExtractRequested.code(),
        )
        .unwrap()
        .len(),
        1
    );
}

#[rstest]
fn aw4_qc_results_copy_onto_metrics(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw4_qc_test");
    let member_id = seed_member(
        conn,
        set_id,
        954001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw2,
        Some("T954001"),
        Some("S954001"),
    );
    seed_metric(conn, member_id, "dragen_3.7.8");

    let row = BTreeMap::from([
        ("biobank_id", "A954001"),
        ("sample_id", "S954001"),
        ("qc_status", "Pass"),
        ("drc_sex_concordance", "true"),
        ("drc_contamination", "0.001"),
        ("drc_call_rate", "0.999"),
        ("drc_fp_concordance", "true"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw4WgsManifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw4-in-t15", "DRC_AoU_AW4_wgs_1.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw4WgsManifest,
            bucket: "aw4-in-t15".to_string(),
            file_path: "DRC_AoU_AW4_wgs_1.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);

    let metric = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.7.8"))
        .unwrap()
        .unwrap();
    assert_eq!(metric.qc_status.as_deref(), Some("pass"));
    assert_eq!(metric.drc_call_rate.as_deref(), Some("0.999"));
    assert_eq!(metric.drc_sex_concordance.as_deref(), Some("true"));
    let member = member::find(conn, member_id).unwrap();
    assert_eq!(member.aw4_manifest_job_run_id, Some(outcome.run_id));

    // A qc status outside the accepted vocabulary fails the whole file.
    let bad_row = BTreeMap::from([
        ("biobank_id", "A954001"),
        ("sample_id", "S954001"),
        ("qc_status", "maybe"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw4WgsManifest, None, &[bad_row]);
    store
        .write("aw4-in-t15", "DRC_AoU_AW4_wgs_2.csv", csv.as_bytes())
        .unwrap();
    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw4WgsManifest,
            bucket: "aw4-in-t15".to_string(),
            file_path: "DRC_AoU_AW4_wgs_2.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Error);

    let unchanged = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.7.8"))
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.qc_status.as_deref(), Some("pass"));
}

#[rstest]
fn aw5_deletion_notices_flag_data_files(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw5_deletion_test");
    let member_id = seed_member(
        conn,
        set_id,
        955001,
        GenomeType::AouWgs,
        GenomicWorkflowState::Aw1,
        Some("T955001"),
        Some("S955001"),
    );
    let metric_id = seed_metric(conn, member_id, "dragen_3.4.12");
    for kind in [DataFileKind::Cram, DataFileKind::Crai, DataFileKind::HfVcf] {
        metrics::mark_file_received(conn, metric_id, kind, "gs://seq/955001").unwrap();
    }

    let row = BTreeMap::from([
        ("biobank_id", "A955001"),
        ("sample_id", "S955001"),
        ("cram_deleted", "Y"),
        ("hf_vcf_deleted", "y"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw5WgsManifest, None, &[row]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw5-in-t16", "BCM_AoU_AW5_wgs.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw5WgsManifest,
            bucket: "aw5-in-t16".to_string(),
            file_path: "BCM_AoU_AW5_wgs.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );
    assert_eq!(outcome.result, RunResult::Success);

    let metric = metrics::find_by_member_and_pipeline(conn, member_id, Some("dragen_3.4.12"))
        .unwrap()
        .unwrap();
    assert!(metric.cram_deleted);
    assert!(metric.hf_vcf_deleted);
    assert!(!metric.crai_deleted);
    assert!(!metric.vcf_deleted);
}

#[rstest]
fn aw3_wgs_manifest_exports_complete_members(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    let set_id = seed_set(conn, "aw3_export_test");
    let complete_id = seed_member(
        conn,
        set_id,
        956001,
        GenomeType::AouWgs,
        GenomicWorkflowState::CvlReady,
        Some("T956001"),
        Some("S956001"),
    );
    let metric_id = seed_metric(conn, complete_id, "dragen_3.7.8");
    for kind in [DataFileKind::Cram, DataFileKind::Crai, DataFileKind::HfVcf] {
        metrics::mark_file_received(conn, metric_id, kind, "gs://seq/956001.cram").unwrap();
    }
    let incomplete_id = seed_member(
        conn,
        set_id,
        956002,
        GenomeType::AouWgs,
        GenomicWorkflowState::CvlReady,
        Some("T956002"),
        Some("S956002"),
    );
    seed_metric(conn, incomplete_id, "dragen_3.7.8");

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    let outcome = run_job(
        conn,
        GenomicJob::Aw3WgsManifest,
        TEST_WINDOW_DAYS,
        |controller, conn| {
            export::generate_aw3(conn, &store, controller, "aw3-out-t17", GenomeType::AouWgs)
        },
    )
    .unwrap();
    assert_eq!(outcome.result, RunResult::Success);

    let files = store.list("aw3-out-t17", "AoU_DRCV_SEQ_").unwrap();
    assert_eq!(files.len(), 1);
    let contents = store.read("aw3-out-t17", &files[0]).unwrap();
    assert!(contents.contains("S956001"));
    assert!(contents.contains("gs://seq/956001.cram"));
    // Members still waiting on data files stay home.
    assert!(!contents.contains("S956002"));

    let exported = member::find(conn, complete_id).unwrap();
    assert_eq!(exported.aw3_manifest_job_run_id, Some(outcome.run_id));
    let held_back = member::find(conn, incomplete_id).unwrap();
    assert_eq!(held_back.aw3_manifest_job_run_id, None);
}

#[rstest]
fn aw1_row_fault_is_contained_to_the_row(mut db_conn: PgPooledConnection) {
    let conn = &mut db_conn;
    // Simulated storage fault, scoped to one package id so concurrent tests
    // never trip it.
    conn.batch_execute(
        "CREATE OR REPLACE FUNCTION reject_faulted_package() RETURNS trigger AS $$
         BEGIN
             IF NEW.package_id = 'PKG-FAULT-965001' THEN
                 RAISE EXCEPTION 'simulated write fault';
             END IF;
             RETURN NEW;
         END;
         $$ LANGUAGE plpgsql;
         DROP TRIGGER IF EXISTS reject_faulted_package ON genomic_set_member;
         CREATE TRIGGER reject_faulted_package BEFORE UPDATE ON genomic_set_member
         FOR EACH ROW EXECUTE FUNCTION reject_faulted_package();",
    )
    .unwrap();

    let set_id = seed_set(conn, "aw1_fault_test");
    let faulted_id = seed_member(
        conn,
        set_id,
        965001,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw0,
        Some("T965001"),
        None,
    );
    let healthy_id = seed_member(
        conn,
        set_id,
        965002,
        GenomeType::AouArray,
        GenomicWorkflowState::Aw0,
        Some("T965002"),
        None,
    );

    let faulted = BTreeMap::from([
        ("biobank_id", "A965001"),
        ("collection_tube_id", "T965001"),
        ("genome_type", "aou_array"),
        ("package_id", "PKG-FAULT-965001"),
    ]);
    let healthy = BTreeMap::from([
        ("biobank_id", "A965002"),
        ("collection_tube_id", "T965002"),
        ("genome_type", "aou_array"),
        ("package_id", "PKG-2002"),
    ]);
    let csv = manifest_csv(GenomicJob::Aw1Manifest, None, &[faulted, healthy]);

    let dir = tempfile::tempdir().unwrap();
    let store = LocalBucket::new(dir.path());
    store
        .write("aw1-in-t18", "JH_AoU_AW1_fault.csv", csv.as_bytes())
        .unwrap();

    let outcome = run_ingestion(
        conn,
        &store,
        &FileInput {
            job: GenomicJob::Aw1Manifest,
            bucket: "aw1-in-t18".to_string(),
            file_path: "JH_AoU_AW1_fault.csv".to_string(),
            upload_date: None,
            create_feedback_record: false,
        },
    );

    // The faulted row rolls back and raises an incident; the rest of the file
    // still lands.
    assert_eq!(outcome.result, RunResult::Success);
    assert_eq!(outcome.incidents_created, 1);

    let untouched = member::find(conn, faulted_id).unwrap();
    assert_eq!(untouched.workflow_state(), GenomicWorkflowState::Aw0);
    assert_eq!(untouched.package_id, None);
    let reconciled = member::find(conn, healthy_id).unwrap();
    assert_eq!(reconciled.workflow_state(), GenomicWorkflowState::Aw1);
    assert_eq!(reconciled.package_id.as_deref(), Some("PKG-2002"));

    let incidents =
        incident::find_by_code(conn, &IncidentCode::DataValidationFailed.to_string()).unwrap();
    assert!(incidents
        .iter()
        .any(|i| i.collection_tube_id.as_deref() == Some("T965001")));
}
