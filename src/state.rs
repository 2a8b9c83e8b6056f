//! Workflow states for a genomic set member and the transition table that
//! advances them.
//!
//! States only ever move forward. Every transition is requested through a
//! [`WorkflowSignal`], and [`next_state`] refuses the request unless the
//! member's current state is an allowed predecessor for that signal. A
//! reingested or out-of-order manifest therefore cannot roll a member back.

use strum::{Display, EnumString};

use crate::jobs::GenomeType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GenomicWorkflowState {
    Unset,
    Aw0,
    Aw1,
    Aw1fPost,
    Aw2,
    GemReady,
    A1,
    A2f,
    GemRptReady,
    GemRptDeleted,
    CvlReady,
    ExtractRequested,
    GcDataFilesMissing,
}

impl GenomicWorkflowState {
    /// Stable numeric code persisted alongside the string mirror.
    pub fn code(&self) -> i32 {
        use GenomicWorkflowState::*;
        match self {
            Unset => 0,
            Aw0 => 1,
            Aw1 => 2,
            Aw1fPost => 3,
            Aw2 => 4,
            GemReady => 5,
            A1 => 6,
            A2f => 7,
            GemRptReady => 8,
            GemRptDeleted => 9,
            CvlReady => 10,
            ExtractRequested => 11,
            GcDataFilesMissing => 12,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use GenomicWorkflowState::*;
        let state = match code {
            0 => Unset,
            1 => Aw0,
            2 => Aw1,
            3 => Aw1fPost,
            4 => Aw2,
            5 => GemReady,
            6 => A1,
            7 => A2f,
            8 => GemRptReady,
            9 => GemRptDeleted,
            10 => CvlReady,
            11 => ExtractRequested,
            12 => GcDataFilesMissing,
            _ => return None,
        };
        Some(state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowSignal {
    /// AW1 accessioning row reconciled against the member.
    Aw1Reconciled,
    /// AW1/AW1F row carried a failure mode.
    Aw1Failed,
    /// AW2 metrics row ingested (intermediate bookkeeping state).
    MetricsIngested,
    /// Post-AW2 readiness for the array product.
    GemReady,
    /// Post-AW2 readiness for the wgs product.
    CvlReady,
    /// GEM A1 manifest generated for this member.
    A1ManifestSent,
    /// GEM A2 came back with a passing result.
    GemPass,
    /// GEM A2 came back failed.
    GemFail,
    /// Participant withdrew consent after a report became ready.
    ConsentWithdrawn,
    /// A required GC data file has not arrived.
    DataFilesMissing,
    /// Previously missing data files are now present.
    DataFilesResolved(GenomeType),
}

impl WorkflowSignal {
    /// States a member must currently be in for this signal to apply.
    pub fn allowed_predecessors(&self) -> &'static [GenomicWorkflowState] {
        use GenomicWorkflowState::*;
        match self {
            WorkflowSignal::Aw1Reconciled => &[Aw0],
            WorkflowSignal::Aw1Failed => &[Aw0, ExtractRequested],
            WorkflowSignal::MetricsIngested => &[Aw1],
            WorkflowSignal::GemReady | WorkflowSignal::CvlReady => &[Aw1, Aw2],
            WorkflowSignal::A1ManifestSent => &[GemReady],
            WorkflowSignal::GemPass | WorkflowSignal::GemFail => &[A1],
            WorkflowSignal::ConsentWithdrawn => &[GemRptReady],
            WorkflowSignal::DataFilesMissing => &[Aw2, GemReady, CvlReady, A1, GemRptReady],
            WorkflowSignal::DataFilesResolved(_) => &[GcDataFilesMissing],
        }
    }

    fn target(&self) -> GenomicWorkflowState {
        use GenomicWorkflowState::*;
        match self {
            WorkflowSignal::Aw1Reconciled => Aw1,
            WorkflowSignal::Aw1Failed => Aw1fPost,
            WorkflowSignal::MetricsIngested => Aw2,
            WorkflowSignal::GemReady => GemReady,
            WorkflowSignal::CvlReady => CvlReady,
            WorkflowSignal::A1ManifestSent => A1,
            WorkflowSignal::GemPass => GemRptReady,
            WorkflowSignal::GemFail => A2f,
            WorkflowSignal::ConsentWithdrawn => GemRptDeleted,
            WorkflowSignal::DataFilesMissing => GcDataFilesMissing,
            WorkflowSignal::DataFilesResolved(genome_type) => {
                if genome_type.is_array() {
                    GemReady
                } else {
                    CvlReady
                }
            }
        }
    }
}

/// `(current state, signal) -> new state`, or `None` if the current state is
/// not an allowed predecessor for the signal.
pub fn next_state(
    current: GenomicWorkflowState,
    signal: WorkflowSignal,
) -> Option<GenomicWorkflowState> {
    signal
        .allowed_predecessors()
        .contains(&current)
        .then(|| signal.target())
}

#[cfg(test)]
mod tests {
    use super::GenomicWorkflowState::*;
    use super::*;
    use crate::jobs::GenomeType;

    #[test]
    fn happy_path_array() {
        let mut state = Aw0;
        for signal in [
            WorkflowSignal::Aw1Reconciled,
            WorkflowSignal::GemReady,
            WorkflowSignal::A1ManifestSent,
            WorkflowSignal::GemPass,
        ] {
            state = next_state(state, signal).unwrap();
        }
        assert_eq!(state, GemRptReady);
    }

    #[test]
    fn states_never_regress() {
        // A delayed AW1 file must not pull a member back out of AW2.
        assert_eq!(next_state(Aw2, WorkflowSignal::Aw1Reconciled), None);
        assert_eq!(next_state(GemReady, WorkflowSignal::Aw1Reconciled), None);
        assert_eq!(next_state(GemRptReady, WorkflowSignal::GemFail), None);
    }

    #[test]
    fn aw1_failure_paths() {
        assert_eq!(next_state(Aw0, WorkflowSignal::Aw1Failed), Some(Aw1fPost));
        assert_eq!(
            next_state(ExtractRequested, WorkflowSignal::Aw1Failed),
            Some(Aw1fPost)
        );
        assert_eq!(next_state(Aw1, WorkflowSignal::Aw1Failed), None);
    }

    #[test]
    fn data_file_resolution_depends_on_genome_type() {
        assert_eq!(
            next_state(
                GcDataFilesMissing,
                WorkflowSignal::DataFilesResolved(GenomeType::AouArray)
            ),
            Some(GemReady)
        );
        assert_eq!(
            next_state(
                GcDataFilesMissing,
                WorkflowSignal::DataFilesResolved(GenomeType::AouWgs)
            ),
            Some(CvlReady)
        );
        // Members that never went missing are untouched by the resolve sweep.
        assert_eq!(
            next_state(CvlReady, WorkflowSignal::DataFilesResolved(GenomeType::AouWgs)),
            None
        );
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..=12 {
            let state = GenomicWorkflowState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(GenomicWorkflowState::from_code(99), None);
    }
}
