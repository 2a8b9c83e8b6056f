use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::schema::genomic_incident;

pub const STATUS_OPEN: &str = "open";
pub const STATUS_RESOLVED: &str = "resolved";

#[derive(Insertable, Default)]
#[diesel(table_name = genomic_incident, check_for_backend(Pg))]
pub struct NewIncident {
    pub code: String,
    pub message: String,
    pub source_job_run_id: Option<i64>,
    pub source_file_processed_id: Option<i64>,
    pub participant_id: Option<i64>,
    pub biobank_id: Option<String>,
    pub sample_id: Option<String>,
    pub collection_tube_id: Option<String>,
    pub slack_notification: bool,
    pub slack_notification_date: Option<NaiveDateTime>,
}

impl NewIncident {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<Incident> {
        Ok(diesel::insert_into(genomic_incident::table)
            .values(self)
            .returning(Incident::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_incident, check_for_backend(Pg))]
pub struct Incident {
    pub id: i64,
    pub code: String,
    pub message: String,
    pub status: String,
    pub source_job_run_id: Option<i64>,
    pub source_file_processed_id: Option<i64>,
    pub participant_id: Option<i64>,
    pub biobank_id: Option<String>,
    pub sample_id: Option<String>,
    pub collection_tube_id: Option<String>,
    pub slack_notification: bool,
    pub slack_notification_date: Option<NaiveDateTime>,
    pub created: NaiveDateTime,
}

/// True when an identical incident was already notified inside the window.
/// Recording still happens; only the repeat notification is suppressed.
pub fn notified_within(
    conn: &mut PgConnection,
    incident_code: &str,
    incident_message: &str,
    window_days: i64,
) -> super::Result<bool> {
    use crate::schema::genomic_incident::dsl::*;

    let cutoff = Utc::now().naive_utc() - Duration::days(window_days);

    Ok(diesel::select(diesel::dsl::exists(
        genomic_incident
            .filter(code.eq(incident_code))
            .filter(message.eq(incident_message))
            .filter(slack_notification.eq(true))
            .filter(slack_notification_date.gt(cutoff)),
    ))
    .get_result(conn)?)
}

pub fn find_by_code(conn: &mut PgConnection, incident_code: &str) -> super::Result<Vec<Incident>> {
    use crate::schema::genomic_incident::dsl::*;

    Ok(genomic_incident
        .filter(code.eq(incident_code))
        .order(id.asc())
        .select(Incident::as_select())
        .get_results(conn)?)
}

pub fn resolve(conn: &mut PgConnection, incident_id: i64) -> super::Result<()> {
    use crate::schema::genomic_incident::dsl::*;

    diesel::update(genomic_incident.find(incident_id))
        .set(status.eq(STATUS_RESOLVED))
        .execute(conn)?;

    Ok(())
}
