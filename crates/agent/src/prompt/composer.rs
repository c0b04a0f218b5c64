//! Ordered section composition.

use stepwise_config::AgentConfig;
use stepwise_core::action::ActionRegistry;
use stepwise_core::prompt::RenderedPrompt;
use stepwise_core::run::Run;

use super::sections::{AvailableActionsSection, FixedSection, RecentStepsSection, TaskSection};
use super::{PromptContext, PromptSection};

/// Renders a Run into a prompt by concatenating sections in order.
///
/// The order is fixed at construction. Rendering is a pure function of the
/// run snapshot and the registry, so two renders of the same state are
/// byte-identical.
#[derive(Default)]
pub struct PromptComposer {
    sections: Vec<Box<dyn PromptSection>>,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section after the existing ones.
    pub fn with_section(mut self, section: impl PromptSection + 'static) -> Self {
        self.sections.push(Box::new(section));
        self
    }

    pub fn push(&mut self, section: Box<dyn PromptSection>) {
        self.sections.push(section);
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Role, optional constraints, action catalog, task, recent steps.
    pub fn standard(role: &str, constraints: Option<&str>, recent_steps: usize) -> Self {
        let mut composer = Self::new().with_section(FixedSection::system("role", role));
        if let Some(constraints) = constraints {
            composer = composer.with_section(FixedSection::system("constraints", constraints));
        }
        composer
            .with_section(AvailableActionsSection)
            .with_section(TaskSection::new())
            .with_section(RecentStepsSection::new(recent_steps))
    }

    /// The standard layout with text and retention from configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::standard(
            &config.role,
            config.constraints.as_deref(),
            config.recent_steps,
        )
    }

    pub fn render(&self, run: &Run, registry: &ActionRegistry) -> RenderedPrompt {
        let ctx = PromptContext { run, registry };
        RenderedPrompt::new(
            self.sections
                .iter()
                .filter_map(|section| section.render(&ctx))
                .collect(),
        )
    }
}

impl std::fmt::Debug for PromptComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptComposer")
            .field("sections", &self.sections.len())
            .finish()
    }
}
