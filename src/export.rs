//! Outbound manifest generators: GEM A1 and the AW3 research manifests.
//!
//! Each generator drains its candidate query in batches, writes one CSV to
//! the outbound bucket under a Central-time timestamped name, records the
//! manifest, and claims the exported members so the next run skips them.

use chrono::Utc;
use chrono_tz::US::Central;
use diesel::PgConnection;

use crate::{
    controller::JobController,
    db::{self, manifest as manifest_dao, member, member::GenomicSetMember, metrics},
    jobs::{GenomeType, RunResult},
    state::{next_state, GenomicWorkflowState, WorkflowSignal},
    storage::ManifestStore,
};

pub const EXPORT_BATCH_SIZE: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundManifest {
    GemA1,
    Aw3Array,
    Aw3Wgs,
}

impl OutboundManifest {
    pub fn manifest_type(&self) -> &'static str {
        match self {
            OutboundManifest::GemA1 => "GEM_A1",
            OutboundManifest::Aw3Array => "AW3_ARRAY",
            OutboundManifest::Aw3Wgs => "AW3_WGS",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            OutboundManifest::GemA1 => "AoU_GEM_A1",
            OutboundManifest::Aw3Array => "AoU_DRCV_GEN",
            OutboundManifest::Aw3Wgs => "AoU_DRCV_SEQ",
        }
    }
}

/// Manifest filenames carry their creation instant in US Central time,
/// matching what the downstream consumers parse.
pub fn timestamped_filename(manifest: OutboundManifest) -> String {
    let stamp = Utc::now().with_timezone(&Central).format("%Y-%m-%d-%H-%M-%S");
    format!("{}_{stamp}.csv", manifest.file_prefix())
}

pub fn generate_gem_a1(
    conn: &mut PgConnection,
    store: &dyn ManifestStore,
    controller: &mut JobController,
    bucket: &str,
) -> db::Result<RunResult> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["biobank_id", "sample_id", "sex_at_birth", "ny_flag"])?;

    // Each batch is written out as it arrives; only the ids and states needed
    // for the post-write claim are retained.
    let mut exported: Vec<(i64, GenomicWorkflowState)> = Vec::new();
    let mut offset = 0;
    loop {
        let batch = member::gem_a1_candidates(conn, EXPORT_BATCH_SIZE, offset)?;
        let exhausted = (batch.len() as i64) < EXPORT_BATCH_SIZE;
        for candidate in &batch {
            writer.write_record([
                candidate.biobank_id.as_str(),
                candidate.sample_id.as_deref().unwrap_or(""),
                candidate.sex_at_birth.as_deref().unwrap_or(""),
                if candidate.ny_flag { "Y" } else { "N" },
            ])?;
            exported.push((candidate.id, candidate.workflow_state()));
        }
        if exhausted {
            break;
        }
        offset += EXPORT_BATCH_SIZE;
    }

    if exported.is_empty() {
        tracing::info!("no gem a1 candidates, skipping manifest");
        return Ok(RunResult::NoFiles);
    }

    let contents = writer
        .into_inner()
        .map_err(|e| db::Error::Other(e.to_string()))?;

    let file_path = finalize_manifest(
        conn,
        store,
        bucket,
        OutboundManifest::GemA1,
        &contents,
        exported.len(),
    )?;

    let ids: Vec<i64> = exported.iter().map(|(member_id, _)| *member_id).collect();
    member::stamp_a1_run(conn, &ids, controller.run_id)?;
    for (member_id, state) in &exported {
        if let Some(new_state) = next_state(*state, WorkflowSignal::A1ManifestSent) {
            member::update_state(conn, *member_id, new_state)?;
        }
    }

    tracing::info!(
        file = %file_path,
        members = exported.len(),
        "gem a1 manifest generated"
    );
    Ok(RunResult::Success)
}

pub fn generate_aw3(
    conn: &mut PgConnection,
    store: &dyn ManifestStore,
    controller: &mut JobController,
    bucket: &str,
    genome_type: GenomeType,
) -> db::Result<RunResult> {
    let manifest = if genome_type.is_array() {
        OutboundManifest::Aw3Array
    } else {
        OutboundManifest::Aw3Wgs
    };
    let state_codes: &[i32] = if genome_type.is_array() {
        &[
            GenomicWorkflowState::GemReady.code(),
            GenomicWorkflowState::A1.code(),
            GenomicWorkflowState::GemRptReady.code(),
        ]
    } else {
        &[GenomicWorkflowState::CvlReady.code()]
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(aw3_header(genome_type))?;

    let mut exported_ids: Vec<i64> = Vec::new();
    let mut offset = 0;
    loop {
        let batch =
            member::aw3_candidates(conn, genome_type, state_codes, EXPORT_BATCH_SIZE, offset)?;
        let exhausted = (batch.len() as i64) < EXPORT_BATCH_SIZE;

        // Only members whose required GC data files have all arrived are
        // exportable to research.
        let batch_ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
        let batch_metrics = metrics::by_member_ids(conn, &batch_ids)?;
        for candidate in &batch {
            let Some(metric) = batch_metrics
                .iter()
                .find(|m| m.genomic_set_member_id == candidate.id)
                .filter(|m| m.has_required_files(genome_type) && !m.ignore_flag)
            else {
                continue;
            };
            write_aw3_row(&mut writer, genome_type, candidate, metric)?;
            exported_ids.push(candidate.id);
        }

        if exhausted {
            break;
        }
        offset += EXPORT_BATCH_SIZE;
    }

    if exported_ids.is_empty() {
        tracing::info!(%genome_type, "no aw3 candidates with complete data files");
        return Ok(RunResult::NoFiles);
    }

    let contents = writer
        .into_inner()
        .map_err(|e| db::Error::Other(e.to_string()))?;

    let file_path = finalize_manifest(conn, store, bucket, manifest, &contents, exported_ids.len())?;
    member::stamp_aw3_run(conn, &exported_ids, controller.run_id)?;

    tracing::info!(
        file = %file_path,
        %genome_type,
        members = exported_ids.len(),
        "aw3 manifest generated"
    );
    Ok(RunResult::Success)
}

fn aw3_header(genome_type: GenomeType) -> [&'static str; 8] {
    if genome_type.is_array() {
        [
            "biobank_id",
            "sample_id",
            "sex_at_birth",
            "site_id",
            "chipwellbarcode",
            "red_idat_path",
            "green_idat_path",
            "vcf_path",
        ]
    } else {
        [
            "biobank_id",
            "sample_id",
            "sex_at_birth",
            "site_id",
            "pipeline_id",
            "cram_path",
            "crai_path",
            "hf_vcf_path",
        ]
    }
}

fn write_aw3_row(
    writer: &mut csv::Writer<Vec<u8>>,
    genome_type: GenomeType,
    member: &GenomicSetMember,
    metric: &metrics::GcValidationMetrics,
) -> db::Result<()> {
    let record = if genome_type.is_array() {
        [
            member.biobank_id.as_str(),
            member.sample_id.as_deref().unwrap_or(""),
            member.sex_at_birth.as_deref().unwrap_or(""),
            metric.site_id.as_deref().unwrap_or(""),
            metric.chipwellbarcode.as_deref().unwrap_or(""),
            metric.idat_red_path.as_deref().unwrap_or(""),
            metric.idat_green_path.as_deref().unwrap_or(""),
            metric.vcf_path.as_deref().unwrap_or(""),
        ]
    } else {
        [
            member.biobank_id.as_str(),
            member.sample_id.as_deref().unwrap_or(""),
            member.sex_at_birth.as_deref().unwrap_or(""),
            metric.site_id.as_deref().unwrap_or(""),
            metric.pipeline_id.as_deref().unwrap_or(""),
            metric.cram_path.as_deref().unwrap_or(""),
            metric.crai_path.as_deref().unwrap_or(""),
            metric.hf_vcf_path.as_deref().unwrap_or(""),
        ]
    };
    writer.write_record(record)?;

    Ok(())
}

/// Write the CSV to the bucket and record the manifest row.
fn finalize_manifest(
    conn: &mut PgConnection,
    store: &dyn ManifestStore,
    bucket: &str,
    manifest: OutboundManifest,
    contents: &[u8],
    record_count: usize,
) -> db::Result<String> {
    let file_path = timestamped_filename(manifest);
    store.write(bucket, &file_path, contents)?;

    manifest_dao::NewManifestFile {
        manifest_type: manifest.manifest_type().to_string(),
        bucket_name: bucket.to_string(),
        file_path: file_path.clone(),
        record_count: record_count as i32,
        upload_date: Some(Utc::now().naive_utc()),
    }
    .create(conn)?;

    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_carry_prefix_and_timestamp() {
        let name = timestamped_filename(OutboundManifest::Aw3Array);
        assert!(name.starts_with("AoU_DRCV_GEN_"));
        assert!(name.ends_with(".csv"));
        assert!(crate::manifest::validate::timestamp_from_filename(&name).is_some());
    }
}
