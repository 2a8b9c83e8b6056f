use diesel::{pg::Pg, prelude::*};

use crate::schema::participant_summary;

pub const CONSENT_YES: i32 = 1;
pub const WITHDRAWAL_NOT_WITHDRAWN: i32 = 1;
pub const WITHDRAWAL_NO_USE: i32 = 2;

#[derive(Insertable)]
#[diesel(table_name = participant_summary, check_for_backend(Pg))]
pub struct NewParticipantSummary {
    pub participant_id: i64,
    pub biobank_id: String,
    pub sex_at_birth: Option<String>,
    pub cohort: i32,
    pub consent_for_genomics_ror: i32,
    pub withdrawal_status: i32,
}

impl NewParticipantSummary {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<ParticipantSummary> {
        Ok(diesel::insert_into(participant_summary::table)
            .values(self)
            .returning(ParticipantSummary::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = participant_summary, check_for_backend(Pg))]
pub struct ParticipantSummary {
    pub participant_id: i64,
    pub biobank_id: String,
    pub sex_at_birth: Option<String>,
    pub cohort: i32,
    pub consent_for_genomics_ror: i32,
    pub withdrawal_status: i32,
}

/// Cohort-3 participants with genomics consent who have not withdrawn.
pub fn consented_cohort3(conn: &mut PgConnection) -> super::Result<Vec<ParticipantSummary>> {
    use crate::schema::participant_summary::dsl::*;

    Ok(participant_summary
        .filter(cohort.eq(3))
        .filter(consent_for_genomics_ror.eq(CONSENT_YES))
        .filter(withdrawal_status.eq(WITHDRAWAL_NOT_WITHDRAWN))
        .select(ParticipantSummary::as_select())
        .get_results(conn)?)
}

pub fn withdrawn_biobank_ids(conn: &mut PgConnection) -> super::Result<Vec<String>> {
    use crate::schema::participant_summary::dsl::*;

    Ok(participant_summary
        .filter(withdrawal_status.eq(WITHDRAWAL_NO_USE))
        .select(biobank_id)
        .get_results(conn)?)
}
