//! Phase instruction builder.
//!
//! Each phase has a fixed minijinja template; rendering is pure given the
//! run's tag names and workspace path. Phase N's template only references
//! artifacts produced by phases before N.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::phase::Phase;

const CONCEPT_TEMPLATE: &str = include_str!("prompts/concept.md");
const DESIGN_GUIDES_TEMPLATE: &str = include_str!("prompts/design_guides.md");
const GUIDE_REVIEW_TEMPLATE: &str = include_str!("prompts/guide_review.md");
const SPEC_DISPATCH_TEMPLATE: &str = include_str!("prompts/spec_dispatch.md");
const SPEC_REVIEW_TEMPLATE: &str = include_str!("prompts/spec_review.md");
const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");

/// Inputs shared by every phase template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptInputs {
    /// Selected tag names in selection order.
    pub tags: Vec<String>,
    /// Absolute workspace path, interpolated into artifact references.
    pub workspace: String,
    /// Marker the implementation phase must emit when done.
    pub completion_marker: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("concept", CONCEPT_TEMPLATE),
            ("design_guides", DESIGN_GUIDES_TEMPLATE),
            ("guide_review", GUIDE_REVIEW_TEMPLATE),
            ("spec_dispatch", SPEC_DISPATCH_TEMPLATE),
            ("spec_review", SPEC_REVIEW_TEMPLATE),
            ("implement", IMPLEMENT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("phase template should be valid");
        }
        Self { env }
    }

    /// Render the instruction for one phase.
    pub fn build(&self, phase: Phase, inputs: &PromptInputs) -> String {
        let name = match phase {
            Phase::CreativeDirector => "concept",
            Phase::DesignLeadGuides => "design_guides",
            Phase::CdReview => "guide_review",
            Phase::DesignLeadDispatch => "spec_dispatch",
            Phase::DlReview => "spec_review",
            Phase::Implement => "implement",
        };
        let template = self.env.get_template(name).expect("registered template");
        template
            .render(context! {
                tags => inputs.tags,
                workspace => inputs.workspace,
                completion_marker => inputs.completion_marker,
            })
            .expect("phase template rendering should not fail")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
