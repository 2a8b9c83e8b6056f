use chrono::NaiveDateTime;
use diesel::{pg::Pg, prelude::*};

use crate::schema::genomic_file_processed;

pub const STATUS_RECEIVED: &str = "received";
pub const STATUS_PROCESSED: &str = "processed";

#[derive(Insertable)]
#[diesel(table_name = genomic_file_processed, check_for_backend(Pg))]
pub struct NewFileProcessed {
    pub run_id: i64,
    pub bucket_name: String,
    pub file_path: String,
    pub file_name: String,
    pub upload_date: Option<NaiveDateTime>,
}

impl NewFileProcessed {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<FileProcessed> {
        Ok(diesel::insert_into(genomic_file_processed::table)
            .values(self)
            .returning(FileProcessed::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_file_processed, check_for_backend(Pg))]
pub struct FileProcessed {
    pub id: i64,
    pub run_id: i64,
    pub genomic_manifest_file_id: Option<i64>,
    pub bucket_name: String,
    pub file_path: String,
    pub file_name: String,
    pub upload_date: Option<NaiveDateTime>,
    pub file_status: String,
    pub file_result: Option<String>,
}

/// The duplicate-submission guard only counts fully processed files, so a
/// crash mid-file leaves the file eligible for a clean retry.
pub fn already_processed(
    conn: &mut PgConnection,
    bucket: &str,
    path: &str,
) -> super::Result<bool> {
    use crate::schema::genomic_file_processed::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        genomic_file_processed
            .filter(bucket_name.eq(bucket))
            .filter(file_path.eq(path))
            .filter(file_status.eq(STATUS_PROCESSED)),
    ))
    .get_result(conn)?)
}

pub fn mark_processed(
    conn: &mut PgConnection,
    file_id: i64,
    result: &str,
) -> super::Result<()> {
    use crate::schema::genomic_file_processed::dsl::*;

    diesel::update(genomic_file_processed.find(file_id))
        .set((
            file_status.eq(STATUS_PROCESSED),
            file_result.eq(result),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn set_manifest_file(
    conn: &mut PgConnection,
    file_id: i64,
    manifest_file_id: i64,
) -> super::Result<()> {
    use crate::schema::genomic_file_processed::dsl::*;

    diesel::update(genomic_file_processed.find(file_id))
        .set(genomic_manifest_file_id.eq(manifest_file_id))
        .execute(conn)?;

    Ok(())
}

pub fn find(conn: &mut PgConnection, file_id: i64) -> super::Result<FileProcessed> {
    use crate::schema::genomic_file_processed::dsl::*;

    Ok(genomic_file_processed
        .find(file_id)
        .select(FileProcessed::as_select())
        .first(conn)?)
}
