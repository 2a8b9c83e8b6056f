use chrono::{NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::{
    jobs::GenomeType,
    schema::{genomic_set, genomic_set_member},
    state::GenomicWorkflowState,
};

use super::genomic_set::CONTROL_SET_NAME;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = genomic_set_member, check_for_backend(Pg))]
pub struct GenomicSetMember {
    pub id: i64,
    pub genomic_set_id: i64,
    pub participant_id: i64,
    pub biobank_id: String,
    pub collection_tube_id: Option<String>,
    pub sample_id: Option<String>,
    pub parent_sample_id: Option<String>,
    pub genome_type: String,
    pub sex_at_birth: Option<String>,
    pub ny_flag: bool,
    pub genomic_workflow_state: i32,
    pub genomic_workflow_state_str: String,
    pub genomic_workflow_state_modified: NaiveDateTime,
    pub gc_site_id: Option<String>,
    pub package_id: Option<String>,
    pub box_storageunit_id: Option<String>,
    pub box_plate_id: Option<String>,
    pub well_position: Option<String>,
    pub sample_type: Option<String>,
    pub treatments: Option<String>,
    pub quantity_ul: Option<String>,
    pub total_concentration_ng_per_ul: Option<String>,
    pub total_dna_ng: Option<String>,
    pub visit_description: Option<String>,
    pub sample_source: Option<String>,
    pub study: Option<String>,
    pub tracking_number: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub study_pi: Option<String>,
    pub site_name: Option<String>,
    pub failure_mode: Option<String>,
    pub failure_mode_desc: Option<String>,
    pub gem_pass: Option<String>,
    pub block_research: bool,
    pub block_research_reason: Option<String>,
    pub block_results: bool,
    pub block_results_reason: Option<String>,
    pub diversion_pouch: bool,
    pub aw0_manifest_file_id: Option<i64>,
    pub aw1_file_processed_id: Option<i64>,
    pub aw2_file_processed_id: Option<i64>,
    pub gem_a1_manifest_job_run_id: Option<i64>,
    pub gem_a2_manifest_job_run_id: Option<i64>,
    pub aw3_manifest_job_run_id: Option<i64>,
    pub aw4_manifest_job_run_id: Option<i64>,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

impl GenomicSetMember {
    pub fn workflow_state(&self) -> GenomicWorkflowState {
        GenomicWorkflowState::from_code(self.genomic_workflow_state)
            .unwrap_or(GenomicWorkflowState::Unset)
    }

    pub fn parsed_genome_type(&self) -> Option<GenomeType> {
        self.genome_type.parse().ok()
    }
}

#[derive(Insertable)]
#[diesel(table_name = genomic_set_member, check_for_backend(Pg))]
pub struct NewMember {
    pub genomic_set_id: i64,
    pub participant_id: i64,
    pub biobank_id: String,
    pub collection_tube_id: Option<String>,
    pub sample_id: Option<String>,
    pub parent_sample_id: Option<String>,
    pub genome_type: String,
    pub sex_at_birth: Option<String>,
    pub ny_flag: bool,
    pub genomic_workflow_state: i32,
    pub genomic_workflow_state_str: String,
    pub gc_site_id: Option<String>,
    pub block_research: bool,
    pub block_research_reason: Option<String>,
    pub block_results: bool,
    pub block_results_reason: Option<String>,
    pub aw0_manifest_file_id: Option<i64>,
    pub aw1_file_processed_id: Option<i64>,
}

impl NewMember {
    pub fn new(
        genomic_set_id: i64,
        participant_id: i64,
        biobank_id: impl Into<String>,
        genome_type: GenomeType,
        state: GenomicWorkflowState,
    ) -> Self {
        Self {
            genomic_set_id,
            participant_id,
            biobank_id: biobank_id.into(),
            collection_tube_id: None,
            sample_id: None,
            parent_sample_id: None,
            genome_type: genome_type.to_string(),
            sex_at_birth: None,
            ny_flag: false,
            genomic_workflow_state: state.code(),
            genomic_workflow_state_str: state.to_string(),
            gc_site_id: None,
            block_research: false,
            block_research_reason: None,
            block_results: false,
            block_results_reason: None,
            aw0_manifest_file_id: None,
            aw1_file_processed_id: None,
        }
    }

    pub fn create(&self, conn: &mut PgConnection) -> super::Result<GenomicSetMember> {
        Ok(diesel::insert_into(genomic_set_member::table)
            .values(self)
            .returning(GenomicSetMember::as_returning())
            .get_result(conn)?)
    }
}

/// Column values an AW1 row stamps onto the member it reconciles against.
#[derive(AsChangeset, Default)]
#[diesel(table_name = genomic_set_member, check_for_backend(Pg))]
pub struct Aw1Update {
    pub package_id: Option<String>,
    pub box_storageunit_id: Option<String>,
    pub box_plate_id: Option<String>,
    pub well_position: Option<String>,
    pub sample_id: Option<String>,
    pub parent_sample_id: Option<String>,
    pub collection_tube_id: Option<String>,
    pub sex_at_birth: Option<String>,
    pub ny_flag: Option<bool>,
    pub sample_type: Option<String>,
    pub treatments: Option<String>,
    pub quantity_ul: Option<String>,
    pub total_concentration_ng_per_ul: Option<String>,
    pub total_dna_ng: Option<String>,
    pub visit_description: Option<String>,
    pub sample_source: Option<String>,
    pub study: Option<String>,
    pub tracking_number: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub study_pi: Option<String>,
    pub site_name: Option<String>,
    pub failure_mode: Option<String>,
    pub failure_mode_desc: Option<String>,
    pub gc_site_id: Option<String>,
    pub diversion_pouch: Option<bool>,
    pub aw1_file_processed_id: Option<i64>,
    pub modified: Option<NaiveDateTime>,
}

pub fn apply_aw1_update(
    conn: &mut PgConnection,
    member_id: i64,
    update: &Aw1Update,
) -> super::Result<()> {
    diesel::update(genomic_set_member::table.find(member_id))
        .set(update)
        .execute(conn)?;

    Ok(())
}

/// Biobank ids arrive prefixed with an environment character; member rows hold
/// the bare digits.
pub fn strip_biobank_prefix(raw: &str) -> String {
    raw.trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .collect()
}

/// Row-locked lookup, first choice for AW1: the tube the GC reports receiving.
pub fn find_for_update_by_tube(
    conn: &mut PgConnection,
    tube_id: &str,
    member_genome_type: GenomeType,
    state_codes: &[i32],
) -> super::Result<Option<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(collection_tube_id.eq(tube_id))
        .filter(genome_type.eq(member_genome_type.to_string()))
        .filter(genomic_workflow_state.eq_any(state_codes.to_vec()))
        .select(GenomicSetMember::as_select())
        .for_update()
        .first(conn)
        .optional()?)
}

/// Fallback lookup by bare biobank id: a hit here with a different tube means
/// the Biobank replated the sample.
pub fn find_for_update_by_biobank_id(
    conn: &mut PgConnection,
    bare_biobank_id: &str,
    member_genome_type: GenomeType,
    state_codes: &[i32],
) -> super::Result<Option<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(biobank_id.eq(bare_biobank_id))
        .filter(genome_type.eq(member_genome_type.to_string()))
        .filter(genomic_workflow_state.eq_any(state_codes.to_vec()))
        .select(GenomicSetMember::as_select())
        .for_update()
        .first(conn)
        .optional()?)
}

pub fn by_sample_ids(
    conn: &mut PgConnection,
    ids: &[String],
) -> super::Result<Vec<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(sample_id.eq_any(ids))
        .select(GenomicSetMember::as_select())
        .get_results(conn)?)
}

pub fn find(conn: &mut PgConnection, member_id: i64) -> super::Result<GenomicSetMember> {
    Ok(genomic_set_member::table
        .find(member_id)
        .select(GenomicSetMember::as_select())
        .first(conn)?)
}

pub fn exists_for_biobank_id(
    conn: &mut PgConnection,
    bare_biobank_id: &str,
) -> super::Result<bool> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        genomic_set_member.filter(biobank_id.eq(bare_biobank_id)),
    ))
    .get_result(conn)?)
}

/// Control-sample parents live in a dedicated genomic set; a match means the
/// row is a calibration sample, not a participant sample.
pub fn control_parent_exists(
    conn: &mut PgConnection,
    member_genome_type: GenomeType,
    parent: &str,
) -> super::Result<bool> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        genomic_set_member
            .inner_join(genomic_set::table)
            .filter(genomic_set::name.eq(CONTROL_SET_NAME))
            .filter(sample_id.eq(parent))
            .filter(genome_type.eq(member_genome_type.to_string())),
    ))
    .get_result(conn)?)
}

/// Control samples are reused by every GC, so existence checks are scoped to
/// the site rather than global.
pub fn control_member_exists(
    conn: &mut PgConnection,
    site: &str,
    member_genome_type: GenomeType,
    member_biobank_id: &str,
    tube_id: &str,
    member_sample_id: &str,
) -> super::Result<bool> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        genomic_set_member
            .filter(gc_site_id.eq(site))
            .filter(genome_type.eq(member_genome_type.to_string()))
            .filter(biobank_id.eq(member_biobank_id))
            .filter(collection_tube_id.eq(tube_id))
            .filter(sample_id.eq(member_sample_id)),
    ))
    .get_result(conn)?)
}

pub fn update_state(
    conn: &mut PgConnection,
    member_id: i64,
    new_state: GenomicWorkflowState,
) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    let now = Utc::now().naive_utc();
    diesel::update(genomic_set_member.find(member_id))
        .set((
            genomic_workflow_state.eq(new_state.code()),
            genomic_workflow_state_str.eq(new_state.to_string()),
            genomic_workflow_state_modified.eq(now),
            modified.eq(now),
        ))
        .execute(conn)?;

    Ok(())
}

/// Staged post-loop state write for AW2: one transaction, applied after every
/// row has been processed so a late row failure cannot undo earlier rows.
pub fn bulk_update_states(
    conn: &mut PgConnection,
    updates: &[(i64, GenomicWorkflowState)],
    aw2_file_id: i64,
) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    conn.transaction::<_, super::Error, _>(|conn| {
        let now = Utc::now().naive_utc();
        for (member_id, new_state) in updates {
            diesel::update(genomic_set_member.find(*member_id))
                .set((
                    genomic_workflow_state.eq(new_state.code()),
                    genomic_workflow_state_str.eq(new_state.to_string()),
                    genomic_workflow_state_modified.eq(now),
                    aw2_file_processed_id.eq(aw2_file_id),
                    modified.eq(now),
                ))
                .execute(conn)?;
        }
        Ok(())
    })
}

pub fn set_gem_a2_result(
    conn: &mut PgConnection,
    member_id: i64,
    run_id: i64,
    pass: &str,
) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    diesel::update(genomic_set_member.find(member_id))
        .set((
            gem_a2_manifest_job_run_id.eq(run_id),
            gem_pass.eq(pass),
            modified.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn set_aw4_run(conn: &mut PgConnection, member_id: i64, run_id: i64) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    diesel::update(genomic_set_member.find(member_id))
        .set((
            aw4_manifest_job_run_id.eq(run_id),
            modified.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    Ok(())
}

/// Claim exported members so the next generator run does not re-export them.
pub fn stamp_aw3_run(conn: &mut PgConnection, ids: &[i64], run_id: i64) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    diesel::update(genomic_set_member.filter(id.eq_any(ids.to_vec())))
        .set((
            aw3_manifest_job_run_id.eq(run_id),
            modified.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn stamp_a1_run(conn: &mut PgConnection, ids: &[i64], run_id: i64) -> super::Result<()> {
    use crate::schema::genomic_set_member::dsl::*;

    diesel::update(genomic_set_member.filter(id.eq_any(ids.to_vec())))
        .set((
            gem_a1_manifest_job_run_id.eq(run_id),
            modified.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    Ok(())
}

/// Batched fetch of GEM A1 export candidates: array members that reached
/// GEM_READY and have not been claimed by an A1 manifest.
pub fn gem_a1_candidates(
    conn: &mut PgConnection,
    batch_size: i64,
    offset: i64,
) -> super::Result<Vec<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(genomic_workflow_state.eq(GenomicWorkflowState::GemReady.code()))
        .filter(genome_type.eq(GenomeType::AouArray.to_string()))
        .filter(gem_a1_manifest_job_run_id.is_null())
        .order(id.asc())
        .limit(batch_size)
        .offset(offset)
        .select(GenomicSetMember::as_select())
        .get_results(conn)?)
}

/// Batched fetch of AW3 export candidates for one genome product: unclaimed,
/// research-eligible members in the given states.
pub fn aw3_candidates(
    conn: &mut PgConnection,
    member_genome_type: GenomeType,
    state_codes: &[i32],
    batch_size: i64,
    offset: i64,
) -> super::Result<Vec<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(genome_type.eq(member_genome_type.to_string()))
        .filter(genomic_workflow_state.eq_any(state_codes.to_vec()))
        .filter(aw3_manifest_job_run_id.is_null())
        .filter(block_research.eq(false))
        .order(id.asc())
        .limit(batch_size)
        .offset(offset)
        .select(GenomicSetMember::as_select())
        .get_results(conn)?)
}

pub fn in_states(
    conn: &mut PgConnection,
    state_codes: &[i32],
) -> super::Result<Vec<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(genomic_workflow_state.eq_any(state_codes.to_vec()))
        .order(id.asc())
        .select(GenomicSetMember::as_select())
        .get_results(conn)?)
}

pub fn by_biobank_ids_in_state(
    conn: &mut PgConnection,
    ids: &[String],
    state_code: i32,
) -> super::Result<Vec<GenomicSetMember>> {
    use crate::schema::genomic_set_member::dsl::*;

    Ok(genomic_set_member
        .filter(biobank_id.eq_any(ids))
        .filter(genomic_workflow_state.eq(state_code))
        .select(GenomicSetMember::as_select())
        .get_results(conn)?)
}
