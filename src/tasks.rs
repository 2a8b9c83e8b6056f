//! Follow-up work the ingestion loop would otherwise fire-and-forget.
//!
//! Workflows queue tasks on the job controller instead of dispatching them
//! mid-row; the caller drains the queue after the run completes. In
//! deployment the queue maps onto cloud tasks; here execution is local and
//! the payloads are the wire format.

use diesel::PgConnection;
use serde::{Deserialize, Serialize};

use crate::{
    db::{self, member, metrics},
    state::GenomicWorkflowState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "endpoint", content = "payload", rename_all = "snake_case")]
pub enum CloudTask {
    /// Per-row metrics write, decoupled from the main ingestion transaction.
    GcMetricsUpsert(metrics::MetricsUpsert),
    /// A contaminated-but-extractable sample needs a new physical draw.
    ReplateMember { member_id: i64 },
}

pub fn execute(conn: &mut PgConnection, task: &CloudTask) -> db::Result<()> {
    match task {
        CloudTask::GcMetricsUpsert(values) => {
            let metric_id = metrics::upsert(conn, values)?;
            tracing::debug!(
                member_id = values.genomic_set_member_id,
                metric_id,
                "upserted gc validation metrics"
            );
            Ok(())
        }
        CloudTask::ReplateMember { member_id } => replate_member(conn, *member_id),
    }
}

pub fn drain(conn: &mut PgConnection, tasks: &[CloudTask]) -> db::Result<usize> {
    for task in tasks {
        tracing::debug!(
            task = %serde_json::to_string(task).unwrap_or_default(),
            "executing queued task"
        );
        execute(conn, task)?;
    }
    Ok(tasks.len())
}

/// A replated member is a fresh row in the same set awaiting a new tube from
/// the Biobank; the original member keeps its history.
fn replate_member(conn: &mut PgConnection, member_id: i64) -> db::Result<()> {
    let source = member::find(conn, member_id)?;

    let mut replate = member::NewMember::new(
        source.genomic_set_id,
        source.participant_id,
        source.biobank_id.clone(),
        source
            .parsed_genome_type()
            .ok_or_else(|| db::Error::Other(format!("member {member_id} has unknown genome type")))?,
        GenomicWorkflowState::ExtractRequested,
    );
    replate.sex_at_birth = source.sex_at_birth.clone();
    replate.ny_flag = source.ny_flag;

    let created = replate.create(conn)?;
    tracing::info!(
        source_member_id = member_id,
        replate_member_id = created.id,
        "created replate request member"
    );

    Ok(())
}
