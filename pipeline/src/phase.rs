//! The fixed six-phase sequence of a run.

use serde::{Deserialize, Serialize};

/// One ordered stage of the pipeline.
///
/// The order is fixed: each phase's instruction only references artifacts
/// produced by earlier phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Creative Director: derive a game concept → `proposal.md`.
    CreativeDirector,
    /// Design Lead, guide-writing mode → `specs/design-plan.md`, `specs/guide-*.md`.
    DesignLeadGuides,
    /// Creative Director review of the guides → `specs/review-guides.md`.
    CdReview,
    /// Design Lead dispatching spec writers → `specs/spec-*.md`.
    DesignLeadDispatch,
    /// Design Lead review of the specs → `specs/review-specs.md`.
    DlReview,
    /// Implementer: build the playable prototype (refinement loop).
    Implement,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 6] = [
        Phase::CreativeDirector,
        Phase::DesignLeadGuides,
        Phase::CdReview,
        Phase::DesignLeadDispatch,
        Phase::DlReview,
        Phase::Implement,
    ];

    /// 1-based position in the sequence.
    pub fn ordinal(self) -> u32 {
        match self {
            Phase::CreativeDirector => 1,
            Phase::DesignLeadGuides => 2,
            Phase::CdReview => 3,
            Phase::DesignLeadDispatch => 4,
            Phase::DlReview => 5,
            Phase::Implement => 6,
        }
    }

    /// Key used for this phase in persisted run metadata.
    pub fn key(self) -> &'static str {
        match self {
            Phase::CreativeDirector => "creativeDirector",
            Phase::DesignLeadGuides => "designLeadGuides",
            Phase::CdReview => "cdReview",
            Phase::DesignLeadDispatch => "designLeadDispatch",
            Phase::DlReview => "dlReview",
            Phase::Implement => "implement",
        }
    }

    /// Human-readable role label, used in logs and failure messages.
    pub fn label(self) -> &'static str {
        match self {
            Phase::CreativeDirector => "Creative Director",
            Phase::DesignLeadGuides => "Design Lead guides",
            Phase::CdReview => "Creative Director review",
            Phase::DesignLeadDispatch => "Design Lead dispatch",
            Phase::DlReview => "Design Lead spec review",
            Phase::Implement => "Implementer",
        }
    }

    /// Agent turn budget for one invocation of this phase.
    pub fn max_turns(self) -> u32 {
        match self {
            Phase::CreativeDirector => 15,
            Phase::DesignLeadGuides => 20,
            Phase::CdReview => 15,
            Phase::DesignLeadDispatch => 30,
            Phase::DlReview => 20,
            Phase::Implement => 50,
        }
    }

    /// Commit message for this phase's artifacts.
    ///
    /// Phase 1 artifacts ride in the repository's initial commit, so it has
    /// no per-phase commit.
    pub fn commit_message(self) -> Option<&'static str> {
        match self {
            Phase::CreativeDirector => None,
            Phase::DesignLeadGuides => Some("docs: Phase 2 - design guides"),
            Phase::CdReview => Some("docs: Phase 3 - guide review & revisions"),
            Phase::DesignLeadDispatch => Some("docs: Phase 4 - detailed specs"),
            Phase::DlReview => Some("docs: Phase 5 - spec review & revisions"),
            Phase::Implement => Some("feat: Phase 6 - game implementation"),
        }
    }

    /// True for the phase that runs under the refinement loop.
    pub fn uses_refinement(self) -> bool {
        self == Phase::Implement
    }

    /// `Phase <n> (<label>)`, the prefix used in run-level failure messages.
    pub fn display_name(self) -> String {
        format!("Phase {} ({})", self.ordinal(), self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_and_unique() {
        let ordinals: Vec<u32> = Phase::ALL.iter().map(|p| p.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn only_the_implement_phase_refines() {
        let refining: Vec<Phase> = Phase::ALL
            .into_iter()
            .filter(|p| p.uses_refinement())
            .collect();
        assert_eq!(refining, vec![Phase::Implement]);
    }

    #[test]
    fn only_the_first_phase_has_no_commit_message() {
        for phase in Phase::ALL {
            assert_eq!(
                phase.commit_message().is_none(),
                phase == Phase::CreativeDirector,
                "unexpected commit message presence for {phase:?}"
            );
        }
    }

    #[test]
    fn display_name_includes_ordinal() {
        assert_eq!(
            Phase::DesignLeadGuides.display_name(),
            "Phase 2 (Design Lead guides)"
        );
    }
}
