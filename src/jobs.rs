use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Every pipeline execution is one of these jobs. Manifest ingestion jobs are
/// dispatched to a workflow in `crate::ingest`; the rest are outbound
/// generators or reconciliation sweeps.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenomicJob {
    NewParticipantWorkflow,
    Aw1Manifest,
    Aw1fManifest,
    MetricsIngestion,
    GemA2Manifest,
    Aw4ArrayManifest,
    Aw4WgsManifest,
    Aw5ArrayManifest,
    Aw5WgsManifest,
    GemA1Manifest,
    Aw3ArrayManifest,
    Aw3WgsManifest,
    ReconcileGcDataFiles,
    ReconcileReportStates,
}

impl GenomicJob {
    /// Jobs that consume a manifest file dropped in a bucket.
    pub fn is_ingestion(&self) -> bool {
        use GenomicJob::*;
        matches!(
            self,
            Aw1Manifest
                | Aw1fManifest
                | MetricsIngestion
                | GemA2Manifest
                | Aw4ArrayManifest
                | Aw4WgsManifest
                | Aw5ArrayManifest
                | Aw5WgsManifest
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunResult {
    Success,
    Error,
    NoFiles,
}

/// Genome product a sample is being processed for. The `_investigation`
/// variants are research-only: members carrying them are blocked from the
/// standard result pathways at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenomeType {
    AouArray,
    AouWgs,
    AouArrayInvestigation,
    AouWgsInvestigation,
}

impl GenomeType {
    pub fn is_investigation(&self) -> bool {
        matches!(
            self,
            GenomeType::AouArrayInvestigation | GenomeType::AouWgsInvestigation
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            GenomeType::AouArray | GenomeType::AouArrayInvestigation
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentCode {
    FileValidationFailedStructure,
    FileValidationFailedValues,
    UnableToFindMember,
    DataValidationFailed,
}
