use anyhow::{bail, Context};
use clap::Parser;
use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};
use diesel_migrations::MigrationHarness;
use genopipe::{
    config::{Cli, Command},
    controller::run_job,
    db, export, ingest,
    ingest::FileInput,
    intake,
    jobs::{GenomeType, GenomicJob},
    reconcile,
    storage::LocalBucket,
    tasks,
};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().unwrap_or_default();
    let Cli { config, command } = Cli::parse();
    genopipe::initialize_logging(config.log_dir.as_deref());

    let manager = ConnectionManager::<PgConnection>::new(&config.db_url);
    let pool = Pool::builder()
        .build(manager)
        .context("failed to build database pool")?;
    let mut pooled = pool.get().context("failed to get database connection")?;
    let conn: &mut PgConnection = &mut pooled;

    conn.run_pending_migrations(db::MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run database migrations: {e}"))?;
    tracing::info!("ran database migrations");

    let store = LocalBucket::new(&config.bucket_root);
    let window = config.incident_window_days;

    let outcome = match command {
        Command::Ingest {
            job,
            bucket,
            file_path,
            skip_feedback,
        } => {
            if !job.is_ingestion() {
                bail!("{job} is not a manifest ingestion job");
            }
            let input = FileInput {
                job,
                bucket,
                file_path,
                upload_date: None,
                create_feedback_record: !skip_feedback,
            };
            run_job(&mut *conn, job, window, |controller, conn| {
                ingest::ingest_manifest_file(conn, &store, controller, &input)
            })?
        }
        Command::NewParticipants { bucket } => run_job(
            &mut *conn,
            GenomicJob::NewParticipantWorkflow,
            window,
            |controller, conn| intake::new_participant_workflow(conn, &store, controller, &bucket),
        )?,
        Command::Generate { job, bucket } => run_job(&mut *conn, job, window, |controller, conn| {
            match job {
                GenomicJob::GemA1Manifest => {
                    export::generate_gem_a1(conn, &store, controller, &bucket)
                }
                GenomicJob::Aw3ArrayManifest => {
                    export::generate_aw3(conn, &store, controller, &bucket, GenomeType::AouArray)
                }
                GenomicJob::Aw3WgsManifest => {
                    export::generate_aw3(conn, &store, controller, &bucket, GenomeType::AouWgs)
                }
                other => Err(db::Error::Other(format!(
                    "{other} is not an outbound manifest job"
                ))),
            }
        })?,
        Command::Reconcile { job } => run_job(&mut *conn, job, window, |controller, conn| {
            match job {
                GenomicJob::ReconcileGcDataFiles => {
                    reconcile::reconcile_gc_data_files(conn, controller)
                }
                GenomicJob::ReconcileReportStates => {
                    reconcile::reconcile_report_states(conn, controller)
                }
                other => Err(db::Error::Other(format!(
                    "{other} is not a reconciliation job"
                ))),
            }
        })?,
        Command::DispatchTask { payload } => {
            let task: tasks::CloudTask =
                serde_json::from_str(&payload).context("failed to parse task payload")?;
            tasks::execute(&mut *conn, &task).context("failed to execute task")?;
            tracing::info!("dispatched task finished");
            return Ok(());
        }
    };

    let executed = tasks::drain(&mut *conn, &outcome.tasks)
        .context("failed to execute queued follow-up tasks")?;

    tracing::info!(
        run_id = outcome.run_id,
        result = %outcome.result,
        incidents = outcome.incidents_created,
        tasks = executed,
        "pipeline run finished"
    );

    Ok(())
}
