use chrono::NaiveDateTime;
use diesel::{pg::Pg, prelude::*};

use crate::{jobs::GenomicJob, schema::genomic_sample_contamination};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_sample_contamination, check_for_backend(Pg))]
pub struct SampleContamination {
    pub id: i64,
    pub sample_id: String,
    pub failed_in_job: String,
    pub created: NaiveDateTime,
}

/// Append-only: a sample that lands here stays here.
pub fn record_failure(
    conn: &mut PgConnection,
    failed_sample_id: &str,
    job: GenomicJob,
) -> super::Result<()> {
    use crate::schema::genomic_sample_contamination::dsl::*;

    diesel::insert_into(genomic_sample_contamination)
        .values((
            sample_id.eq(failed_sample_id),
            failed_in_job.eq(job.to_string()),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn contaminated_sample_ids(
    conn: &mut PgConnection,
    candidate_ids: &[String],
) -> super::Result<Vec<String>> {
    use crate::schema::genomic_sample_contamination::dsl::*;

    Ok(genomic_sample_contamination
        .filter(sample_id.eq_any(candidate_ids))
        .select(sample_id)
        .get_results(conn)?)
}

pub fn find_by_sample(
    conn: &mut PgConnection,
    failed_sample_id: &str,
) -> super::Result<Vec<SampleContamination>> {
    use crate::schema::genomic_sample_contamination::dsl::*;

    Ok(genomic_sample_contamination
        .filter(sample_id.eq(failed_sample_id))
        .select(SampleContamination::as_select())
        .get_results(conn)?)
}
