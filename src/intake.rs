//! New-participant intake: pull consented cohort 3 participants with a
//! confirmed DNA sample into a fresh genomic set and hand the Biobank an AW0
//! manifest telling it which samples to pull.

use chrono::Utc;
use chrono_tz::US::Central;
use diesel::PgConnection;

use crate::{
    controller::JobController,
    db::{
        self, genomic_set, manifest as manifest_dao, member, participant,
        stored_sample::{self, StoredSample},
    },
    jobs::{GenomeType, RunResult},
    state::GenomicWorkflowState,
    storage::ManifestStore,
};

pub fn new_participant_workflow(
    conn: &mut PgConnection,
    store: &dyn ManifestStore,
    controller: &mut JobController,
    bucket: &str,
) -> db::Result<RunResult> {
    let mut eligible = Vec::new();
    for participant in participant::consented_cohort3(conn)? {
        if !member::exists_for_biobank_id(conn, &participant.biobank_id)? {
            eligible.push(participant);
        }
    }
    if eligible.is_empty() {
        tracing::info!("no new eligible participants");
        return Ok(RunResult::NoFiles);
    }

    let biobank_ids: Vec<String> = eligible.iter().map(|p| p.biobank_id.clone()).collect();
    let samples = stored_sample::confirmed_dna_samples(conn, &biobank_ids)?;

    // One confirmed DNA sample per participant; participants without one wait
    // for a later run.
    let chosen: Vec<(&participant::ParticipantSummary, &StoredSample)> = eligible
        .iter()
        .filter_map(|p| {
            samples
                .iter()
                .find(|s| s.biobank_id == p.biobank_id)
                .map(|s| (p, s))
        })
        .collect();
    if chosen.is_empty() {
        tracing::info!(
            eligible = eligible.len(),
            "eligible participants have no confirmed dna sample yet"
        );
        return Ok(RunResult::NoFiles);
    }

    let stamp = Utc::now().with_timezone(&Central).format("%Y-%m-%d-%H-%M-%S");
    let file_path = format!("AoU_AW0_{stamp}.csv");
    let contents = write_aw0(&chosen)?;
    store.write(bucket, &file_path, &contents)?;

    // Two members per participant, one per genome product.
    let record_count = (chosen.len() * 2) as i32;
    let manifest_file = manifest_dao::NewManifestFile {
        manifest_type: "AW0".to_string(),
        bucket_name: bucket.to_string(),
        file_path: file_path.clone(),
        record_count,
        upload_date: Some(Utc::now().naive_utc()),
    }
    .create(conn)?;

    let set = genomic_set::NewGenomicSet {
        name: format!("new_participant_workflow_{stamp}"),
        version: 1,
    }
    .create(conn)?;

    for (participant, sample) in &chosen {
        for genome_type in [GenomeType::AouArray, GenomeType::AouWgs] {
            let mut new_member = member::NewMember::new(
                set.id,
                participant.participant_id,
                participant.biobank_id.clone(),
                genome_type,
                GenomicWorkflowState::Aw0,
            );
            new_member.collection_tube_id = Some(sample.biobank_stored_sample_id.clone());
            new_member.sex_at_birth = participant.sex_at_birth.clone();
            new_member.aw0_manifest_file_id = Some(manifest_file.id);
            new_member.create(conn)?;
        }
    }

    tracing::info!(
        run_id = controller.run_id,
        set_id = set.id,
        participants = chosen.len(),
        members = record_count,
        file = %file_path,
        "new participant workflow complete"
    );
    Ok(RunResult::Success)
}

fn write_aw0(
    rows: &[(&participant::ParticipantSummary, &StoredSample)],
) -> db::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "biobank_id",
        "collection_tube_id",
        "sex_at_birth",
        "genome_type",
        "ny_flag",
        "validation_passed",
    ])?;
    for (participant, sample) in rows {
        for genome_type in [GenomeType::AouArray, GenomeType::AouWgs] {
            let genome_type = genome_type.to_string();
            writer.write_record([
                participant.biobank_id.as_str(),
                sample.biobank_stored_sample_id.as_str(),
                participant.sex_at_birth.as_deref().unwrap_or(""),
                genome_type.as_str(),
                "N",
                "Y",
            ])?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| db::Error::Other(e.to_string()))
}
