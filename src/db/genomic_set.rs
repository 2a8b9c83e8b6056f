use chrono::NaiveDateTime;
use diesel::{pg::Pg, prelude::*};

use crate::schema::genomic_set;

#[derive(Insertable)]
#[diesel(table_name = genomic_set, check_for_backend(Pg))]
pub struct NewGenomicSet {
    pub name: String,
    pub version: i32,
}

impl NewGenomicSet {
    pub fn create(&self, conn: &mut PgConnection) -> super::Result<GenomicSet> {
        Ok(diesel::insert_into(genomic_set::table)
            .values(self)
            .returning(GenomicSet::as_returning())
            .get_result(conn)?)
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = genomic_set, check_for_backend(Pg))]
pub struct GenomicSet {
    pub id: i64,
    pub name: String,
    pub version: i32,
    pub created: NaiveDateTime,
}

/// Set holding the control-sample parents every GC reuses for calibration.
pub const CONTROL_SET_NAME: &str = "aou_control_samples";

pub fn find_by_name(conn: &mut PgConnection, set_name: &str) -> super::Result<Option<GenomicSet>> {
    use crate::schema::genomic_set::dsl::*;

    Ok(genomic_set
        .filter(name.eq(set_name))
        .select(GenomicSet::as_select())
        .first(conn)
        .optional()?)
}
