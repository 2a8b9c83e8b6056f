use chrono::{NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::{
    jobs::{GenomicJob, RunResult, RunStatus},
    schema::genomic_job_run,
};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_job_run, check_for_backend(Pg))]
pub struct GenomicJobRun {
    pub id: i64,
    pub job: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub run_status: String,
    pub run_result: Option<String>,
}

pub fn start(conn: &mut PgConnection, job: GenomicJob) -> super::Result<i64> {
    use crate::schema::genomic_job_run::dsl;

    Ok(diesel::insert_into(dsl::genomic_job_run)
        .values((
            dsl::job.eq(job.to_string()),
            dsl::run_status.eq(RunStatus::Running.to_string()),
        ))
        .returning(dsl::id)
        .get_result(conn)?)
}

pub fn finish(conn: &mut PgConnection, run_id: i64, result: RunResult) -> super::Result<()> {
    use crate::schema::genomic_job_run::dsl;

    diesel::update(dsl::genomic_job_run.find(run_id))
        .set((
            dsl::run_status.eq(RunStatus::Completed.to_string()),
            dsl::run_result.eq(result.to_string()),
            dsl::end_time.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn find(conn: &mut PgConnection, run_id: i64) -> super::Result<GenomicJobRun> {
    use crate::schema::genomic_job_run::dsl;

    Ok(dsl::genomic_job_run
        .find(run_id)
        .select(GenomicJobRun::as_select())
        .first(conn)?)
}
