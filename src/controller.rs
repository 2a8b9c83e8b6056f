//! Scoped coordinator for one pipeline execution.
//!
//! [`run_job`] opens a `genomic_job_run` row, hands a [`JobController`] to the
//! job body, and finalizes the run on both the success and the error path, so
//! a failed ingestion still leaves a completed run record behind.

use diesel::PgConnection;

use crate::{
    db::{self, incident, job_run},
    jobs::{GenomicJob, IncidentCode, RunResult},
    tasks::CloudTask,
};

/// Identical incidents recurring inside this many days do not re-notify.
pub const DEFAULT_INCIDENT_WINDOW_DAYS: i64 = 7;

pub struct JobController {
    pub job: GenomicJob,
    pub run_id: i64,
    incident_window_days: i64,
    incidents_created: usize,
    pending_tasks: Vec<CloudTask>,
}

/// Everything the caller needs once the scope has closed: the run record id,
/// the final result, and the follow-up tasks to dispatch.
pub struct JobOutcome {
    pub run_id: i64,
    pub result: RunResult,
    pub incidents_created: usize,
    pub tasks: Vec<CloudTask>,
}

#[derive(Default)]
pub struct IncidentSpec {
    pub message: String,
    pub source_file_processed_id: Option<i64>,
    pub participant_id: Option<i64>,
    pub biobank_id: Option<String>,
    pub sample_id: Option<String>,
    pub collection_tube_id: Option<String>,
    /// Contract-break incidents skip the de-duplication window.
    pub always_notify: bool,
}

impl JobController {
    pub fn incidents_created(&self) -> usize {
        self.incidents_created
    }

    pub fn enqueue_task(&mut self, task: CloudTask) {
        self.pending_tasks.push(task);
    }

    /// Record the incident; notify unless an identical one was already
    /// notified within the window.
    pub fn create_incident(
        &mut self,
        conn: &mut PgConnection,
        code: IncidentCode,
        spec: IncidentSpec,
    ) -> db::Result<()> {
        let code_str = code.to_string();
        let notify = spec.always_notify
            || !incident::notified_within(conn, &code_str, &spec.message, self.incident_window_days)?;

        let new_incident = incident::NewIncident {
            code: code_str,
            message: spec.message,
            source_job_run_id: Some(self.run_id),
            source_file_processed_id: spec.source_file_processed_id,
            participant_id: spec.participant_id,
            biobank_id: spec.biobank_id,
            sample_id: spec.sample_id,
            collection_tube_id: spec.collection_tube_id,
            slack_notification: notify,
            slack_notification_date: notify.then(|| chrono::Utc::now().naive_utc()),
        };
        let created = new_incident.create(conn)?;

        tracing::warn!(
            run_id = self.run_id,
            incident_id = created.id,
            code = %created.code,
            notified = notify,
            "{}",
            created.message
        );
        self.incidents_created += 1;

        Ok(())
    }
}

pub fn run_job<F>(
    conn: &mut PgConnection,
    job: GenomicJob,
    incident_window_days: i64,
    body: F,
) -> db::Result<JobOutcome>
where
    F: FnOnce(&mut JobController, &mut PgConnection) -> db::Result<RunResult>,
{
    let run_id = job_run::start(conn, job)?;
    tracing::info!(%job, run_id, "starting genomic job run");

    let mut controller = JobController {
        job,
        run_id,
        incident_window_days,
        incidents_created: 0,
        pending_tasks: Vec::new(),
    };

    match body(&mut controller, conn) {
        Ok(result) => {
            job_run::finish(conn, run_id, result)?;
            tracing::info!(%job, run_id, result = %result, "genomic job run complete");
            Ok(JobOutcome {
                run_id,
                result,
                incidents_created: controller.incidents_created,
                tasks: controller.pending_tasks,
            })
        }
        Err(err) => {
            // Guaranteed-release: the run record is finalized before the
            // error propagates.
            job_run::finish(conn, run_id, RunResult::Error)?;
            tracing::error!(%job, run_id, error = %err, "genomic job run failed");
            Err(err)
        }
    }
}
