//! Decides whether a contaminated sample can be re-extracted or is terminally
//! failed.
//!
//! The calculation consults the append-only `genomic_sample_contamination`
//! log and, on a terminal result, writes to it. Callers run it inside the
//! same per-row transaction as the rest of the row's writes so that two
//! concurrently contaminated sibling samples serialize at the database
//! instead of both being marked extractable.

use diesel::PgConnection;
use strum::{Display, EnumString};

use crate::{
    db::{self, contamination, member::GenomicSetMember, stored_sample},
    jobs::GenomicJob,
};

/// Below this fraction a sample is not considered contaminated.
pub const CONTAMINATION_THRESHOLD: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContaminationCategory {
    NoExtract,
    ExtractWgs,
    ExtractBoth,
    TerminalNoExtract,
}

pub fn calculate_contamination_category(
    conn: &mut PgConnection,
    collection_tube_id: &str,
    contamination_value: f64,
    member: &GenomicSetMember,
    job: GenomicJob,
) -> db::Result<ContaminationCategory> {
    // Negative values are data-entry noise from the lab.
    let contamination_value = contamination_value.max(0.0);

    if contamination_value < CONTAMINATION_THRESHOLD {
        return Ok(ContaminationCategory::NoExtract);
    }

    if viable_alternate_exists(conn, &member.biobank_id, collection_tube_id)? {
        let category = match member.parsed_genome_type() {
            Some(gt) if gt.is_array() => ContaminationCategory::ExtractBoth,
            _ => ContaminationCategory::ExtractWgs,
        };
        return Ok(category);
    }

    // No viable sibling: this sample is done, and the log entry is what the
    // next sibling's calculation will see.
    contamination::record_failure(conn, collection_tube_id, job)?;
    Ok(ContaminationCategory::TerminalNoExtract)
}

/// A different DNA sample for the same participant that is not itself in the
/// contamination log.
fn viable_alternate_exists(
    conn: &mut PgConnection,
    biobank_id: &str,
    exclude_sample_id: &str,
) -> db::Result<bool> {
    let candidates = stored_sample::other_dna_samples(conn, biobank_id, exclude_sample_id)?;
    if candidates.is_empty() {
        return Ok(false);
    }

    let candidate_ids: Vec<String> = candidates
        .into_iter()
        .map(|s| s.biobank_stored_sample_id)
        .collect();
    let contaminated = contamination::contaminated_sample_ids(conn, &candidate_ids)?;

    Ok(candidate_ids.iter().any(|id| !contaminated.contains(id)))
}
