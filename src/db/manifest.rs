use chrono::{NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::schema::{genomic_manifest_feedback, genomic_manifest_file};

#[derive(Insertable)]
#[diesel(table_name = genomic_manifest_file, check_for_backend(Pg))]
pub struct NewManifestFile {
    pub manifest_type: String,
    pub bucket_name: String,
    pub file_path: String,
    pub record_count: i32,
    pub upload_date: Option<NaiveDateTime>,
}

impl NewManifestFile {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<ManifestFile> {
        Ok(diesel::insert_into(genomic_manifest_file::table)
            .values(self)
            .returning(ManifestFile::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_manifest_file, check_for_backend(Pg))]
pub struct ManifestFile {
    pub id: i64,
    pub manifest_type: String,
    pub bucket_name: String,
    pub file_path: String,
    pub record_count: i32,
    pub upload_date: Option<NaiveDateTime>,
    pub created: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_manifest_feedback, check_for_backend(Pg))]
pub struct ManifestFeedback {
    pub id: i64,
    pub input_manifest_file_id: i64,
    pub feedback_record_count: i32,
    pub feedback_complete: bool,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

pub fn create_feedback(
    conn: &mut PgConnection,
    manifest_file_id: i64,
) -> super::Result<ManifestFeedback> {
    use crate::schema::genomic_manifest_feedback::dsl;

    Ok(diesel::insert_into(dsl::genomic_manifest_feedback)
        .values(dsl::input_manifest_file_id.eq(manifest_file_id))
        .returning(ManifestFeedback::as_returning())
        .get_result(conn)?)
}

pub fn find_feedback(
    conn: &mut PgConnection,
    manifest_file_id: i64,
) -> super::Result<Option<ManifestFeedback>> {
    use crate::schema::genomic_manifest_feedback::dsl;

    Ok(dsl::genomic_manifest_feedback
        .filter(dsl::input_manifest_file_id.eq(manifest_file_id))
        .select(ManifestFeedback::as_select())
        .first(conn)
        .optional()?)
}

/// Keeps the AW1 <-> AW2F reconciliation count accurate without a rescan:
/// called once per newly created metric row.
pub fn increment_feedback_count(
    conn: &mut PgConnection,
    manifest_file_id: i64,
) -> super::Result<()> {
    use crate::schema::genomic_manifest_feedback::dsl;

    diesel::update(
        dsl::genomic_manifest_feedback.filter(dsl::input_manifest_file_id.eq(manifest_file_id)),
    )
    .set((
        dsl::feedback_record_count.eq(dsl::feedback_record_count + 1),
        dsl::modified.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    Ok(())
}

pub fn find(conn: &mut PgConnection, manifest_file_id: i64) -> super::Result<ManifestFile> {
    use crate::schema::genomic_manifest_file::dsl;

    Ok(dsl::genomic_manifest_file
        .find(manifest_file_id)
        .select(ManifestFile::as_select())
        .first(conn)?)
}
