use chrono::{NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{jobs::GenomeType, schema::genomic_gc_validation_metrics};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = genomic_gc_validation_metrics, check_for_backend(Pg))]
pub struct GcValidationMetrics {
    pub id: i64,
    pub genomic_set_member_id: i64,
    pub genomic_file_processed_id: Option<i64>,
    pub pipeline_id: Option<String>,
    pub chipwellbarcode: Option<String>,
    pub lims_id: Option<String>,
    pub call_rate: Option<String>,
    pub mapped_reads_pct: Option<String>,
    pub mean_coverage: Option<f64>,
    pub genome_coverage: Option<f64>,
    pub aligned_q30_bases: Option<i64>,
    pub contamination: Option<f64>,
    pub contamination_category: Option<String>,
    pub sex_concordance: Option<String>,
    pub sex_ploidy: Option<String>,
    pub array_concordance: Option<String>,
    pub processing_status: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<String>,
    pub idat_red_received: bool,
    pub idat_red_path: Option<String>,
    pub idat_red_deleted: bool,
    pub idat_green_received: bool,
    pub idat_green_path: Option<String>,
    pub idat_green_deleted: bool,
    pub vcf_received: bool,
    pub vcf_path: Option<String>,
    pub vcf_deleted: bool,
    pub cram_received: bool,
    pub cram_path: Option<String>,
    pub cram_deleted: bool,
    pub crai_received: bool,
    pub crai_path: Option<String>,
    pub crai_deleted: bool,
    pub hf_vcf_received: bool,
    pub hf_vcf_path: Option<String>,
    pub hf_vcf_deleted: bool,
    pub drc_sex_concordance: Option<String>,
    pub drc_contamination: Option<String>,
    pub drc_call_rate: Option<String>,
    pub drc_fp_concordance: Option<String>,
    pub qc_status: Option<String>,
    pub ignore_flag: bool,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

/// Data files a GC delivers alongside an AW2 row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFileKind {
    IdatRed,
    IdatGreen,
    Vcf,
    Cram,
    Crai,
    HfVcf,
}

impl DataFileKind {
    pub fn required_for(genome_type: GenomeType) -> &'static [DataFileKind] {
        use DataFileKind::*;
        if genome_type.is_array() {
            &[IdatRed, IdatGreen, Vcf]
        } else {
            &[Cram, Crai, HfVcf]
        }
    }
}

impl GcValidationMetrics {
    fn file_received(&self, kind: DataFileKind) -> bool {
        use DataFileKind::*;
        match kind {
            IdatRed => self.idat_red_received,
            IdatGreen => self.idat_green_received,
            Vcf => self.vcf_received,
            Cram => self.cram_received,
            Crai => self.crai_received,
            HfVcf => self.hf_vcf_received,
        }
    }

    pub fn has_required_files(&self, genome_type: GenomeType) -> bool {
        DataFileKind::required_for(genome_type)
            .iter()
            .all(|kind| self.file_received(*kind))
    }
}

/// The values an AW2 row contributes to a metrics record. Serializable so the
/// upsert can ride in a cloud-task payload.
#[derive(Debug, Clone, Serialize, Deserialize, Insertable, AsChangeset)]
#[diesel(table_name = genomic_gc_validation_metrics, check_for_backend(Pg))]
pub struct MetricsUpsert {
    pub genomic_set_member_id: i64,
    pub genomic_file_processed_id: Option<i64>,
    pub pipeline_id: Option<String>,
    pub chipwellbarcode: Option<String>,
    pub lims_id: Option<String>,
    pub call_rate: Option<String>,
    pub mapped_reads_pct: Option<String>,
    pub mean_coverage: Option<f64>,
    pub genome_coverage: Option<f64>,
    pub aligned_q30_bases: Option<i64>,
    pub contamination: Option<f64>,
    pub contamination_category: Option<String>,
    pub sex_concordance: Option<String>,
    pub sex_ploidy: Option<String>,
    pub array_concordance: Option<String>,
    pub processing_status: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<String>,
}

/// Reingestion-safe write: metric rows are matched by (member, pipeline) and
/// updated in place rather than re-inserted.
pub fn upsert(conn: &mut PgConnection, values: &MetricsUpsert) -> super::Result<i64> {
    let existing = find_by_member_and_pipeline(
        conn,
        values.genomic_set_member_id,
        values.pipeline_id.as_deref(),
    )?;

    match existing {
        Some(metrics) => {
            use crate::schema::genomic_gc_validation_metrics::dsl::*;

            diesel::update(genomic_gc_validation_metrics.find(metrics.id))
                .set((values, modified.eq(Utc::now().naive_utc())))
                .execute(conn)?;
            Ok(metrics.id)
        }
        None => {
            use crate::schema::genomic_gc_validation_metrics::dsl::*;

            Ok(diesel::insert_into(genomic_gc_validation_metrics)
                .values(values)
                .returning(id)
                .get_result(conn)?)
        }
    }
}

pub fn find_by_member_and_pipeline(
    conn: &mut PgConnection,
    member_id: i64,
    pipeline: Option<&str>,
) -> super::Result<Option<GcValidationMetrics>> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;

    let mut query = genomic_gc_validation_metrics
        .filter(genomic_set_member_id.eq(member_id))
        .select(GcValidationMetrics::as_select())
        .into_boxed();

    query = match pipeline {
        Some(p) => query.filter(pipeline_id.eq(p.to_string())),
        None => query.filter(pipeline_id.is_null()),
    };

    Ok(query.first(conn).optional()?)
}

/// Bulk idempotence check for AW2: the (member id, pipeline id) pairs that
/// already hold a metrics row.
pub fn existing_member_pipelines(
    conn: &mut PgConnection,
    member_ids: &[i64],
) -> super::Result<Vec<(i64, Option<String>)>> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;

    Ok(genomic_gc_validation_metrics
        .filter(genomic_set_member_id.eq_any(member_ids.to_vec()))
        .select((genomic_set_member_id, pipeline_id))
        .get_results(conn)?)
}

pub fn by_member_ids(
    conn: &mut PgConnection,
    member_ids: &[i64],
) -> super::Result<Vec<GcValidationMetrics>> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;

    Ok(genomic_gc_validation_metrics
        .filter(genomic_set_member_id.eq_any(member_ids.to_vec()))
        .select(GcValidationMetrics::as_select())
        .get_results(conn)?)
}

pub fn count(conn: &mut PgConnection) -> super::Result<i64> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;

    Ok(genomic_gc_validation_metrics.count().get_result(conn)?)
}

pub fn mark_file_received(
    conn: &mut PgConnection,
    metric_id: i64,
    kind: DataFileKind,
    path: &str,
) -> super::Result<()> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;
    use DataFileKind::*;

    let query = diesel::update(genomic_gc_validation_metrics.find(metric_id));
    match kind {
        IdatRed => query
            .set((idat_red_received.eq(true), idat_red_path.eq(path)))
            .execute(conn)?,
        IdatGreen => query
            .set((idat_green_received.eq(true), idat_green_path.eq(path)))
            .execute(conn)?,
        Vcf => query
            .set((vcf_received.eq(true), vcf_path.eq(path)))
            .execute(conn)?,
        Cram => query
            .set((cram_received.eq(true), cram_path.eq(path)))
            .execute(conn)?,
        Crai => query
            .set((crai_received.eq(true), crai_path.eq(path)))
            .execute(conn)?,
        HfVcf => query
            .set((hf_vcf_received.eq(true), hf_vcf_path.eq(path)))
            .execute(conn)?,
    };

    Ok(())
}

pub fn mark_file_deleted(
    conn: &mut PgConnection,
    member_id: i64,
    kind: DataFileKind,
) -> super::Result<()> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;
    use DataFileKind::*;

    let query =
        diesel::update(genomic_gc_validation_metrics.filter(genomic_set_member_id.eq(member_id)));
    match kind {
        IdatRed => query.set(idat_red_deleted.eq(true)).execute(conn)?,
        IdatGreen => query.set(idat_green_deleted.eq(true)).execute(conn)?,
        Vcf => query.set(vcf_deleted.eq(true)).execute(conn)?,
        Cram => query.set(cram_deleted.eq(true)).execute(conn)?,
        Crai => query.set(crai_deleted.eq(true)).execute(conn)?,
        HfVcf => query.set(hf_vcf_deleted.eq(true)).execute(conn)?,
    };

    Ok(())
}

/// DRC QC values copied from an AW4 manifest row.
#[derive(AsChangeset, Default)]
#[diesel(table_name = genomic_gc_validation_metrics, check_for_backend(Pg))]
pub struct DrcQcUpdate {
    pub drc_sex_concordance: Option<String>,
    pub drc_contamination: Option<String>,
    pub drc_call_rate: Option<String>,
    pub drc_fp_concordance: Option<String>,
    pub qc_status: Option<String>,
    pub modified: Option<NaiveDateTime>,
}

pub fn apply_drc_qc(
    conn: &mut PgConnection,
    member_id: i64,
    update: &DrcQcUpdate,
) -> super::Result<()> {
    use crate::schema::genomic_gc_validation_metrics::dsl::*;

    diesel::update(genomic_gc_validation_metrics.filter(genomic_set_member_id.eq(member_id)))
        .set(update)
        .execute(conn)?;

    Ok(())
}
