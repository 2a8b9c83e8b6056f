use chrono::NaiveDateTime;
use diesel::{pg::Pg, prelude::*};

use crate::schema::biobank_stored_sample;

/// Biobank test codes for DNA-bearing samples.
pub const DNA_TESTS: [&str; 3] = ["1ED04", "1ED10", "1SAL2"];

pub const COLLECTION_METHOD_DIVERSION_POUCH: &str = "diversion_pouch";

#[derive(Insertable)]
#[diesel(table_name = biobank_stored_sample, check_for_backend(Pg))]
pub struct NewStoredSample {
    pub biobank_stored_sample_id: String,
    pub biobank_id: String,
    pub test: String,
    pub status: String,
    pub collection_method: Option<String>,
    pub confirmed_date: Option<NaiveDateTime>,
}

impl NewStoredSample {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<StoredSample> {
        Ok(diesel::insert_into(biobank_stored_sample::table)
            .values(self)
            .returning(StoredSample::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = biobank_stored_sample, check_for_backend(Pg))]
pub struct StoredSample {
    pub id: i64,
    pub biobank_stored_sample_id: String,
    pub biobank_id: String,
    pub test: String,
    pub status: String,
    pub collection_method: Option<String>,
    pub confirmed_date: Option<NaiveDateTime>,
}

/// DNA samples held by the Biobank for a participant, excluding the one
/// currently under consideration.
pub fn other_dna_samples(
    conn: &mut PgConnection,
    participant_biobank_id: &str,
    exclude_sample_id: &str,
) -> super::Result<Vec<StoredSample>> {
    use crate::schema::biobank_stored_sample::dsl::*;

    Ok(biobank_stored_sample
        .filter(biobank_id.eq(participant_biobank_id))
        .filter(test.eq_any(DNA_TESTS))
        .filter(biobank_stored_sample_id.ne(exclude_sample_id))
        .select(StoredSample::as_select())
        .get_results(conn)?)
}

pub fn confirmed_dna_samples(
    conn: &mut PgConnection,
    biobank_ids: &[String],
) -> super::Result<Vec<StoredSample>> {
    use crate::schema::biobank_stored_sample::dsl::*;

    Ok(biobank_stored_sample
        .filter(biobank_id.eq_any(biobank_ids))
        .filter(test.eq_any(DNA_TESTS))
        .filter(confirmed_date.is_not_null())
        .select(StoredSample::as_select())
        .get_results(conn)?)
}

pub fn is_diversion_pouch(conn: &mut PgConnection, tube_id: &str) -> super::Result<bool> {
    use crate::schema::biobank_stored_sample::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        biobank_stored_sample
            .filter(biobank_stored_sample_id.eq(tube_id))
            .filter(collection_method.eq(COLLECTION_METHOD_DIVERSION_POUCH)),
    ))
    .get_result(conn)?)
}
