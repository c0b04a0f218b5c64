//! Prompt composition.
//!
//! A [`PromptComposer`] is an ordered list of [`PromptSection`] renderers.
//! Each section reads the current [`Run`] and the [`ActionRegistry`] and
//! produces at most one [`RenderedSection`]. Sections never mutate state, so
//! the same run snapshot always renders to the same prompt.

mod composer;
mod sections;

pub use composer::PromptComposer;
pub use sections::{AvailableActionsSection, FixedSection, RecentStepsSection, TaskSection};

use stepwise_core::action::ActionRegistry;
use stepwise_core::prompt::RenderedSection;
use stepwise_core::run::Run;

/// Read-only view a section renders from.
#[derive(Clone, Copy)]
pub struct PromptContext<'a> {
    pub run: &'a Run,
    pub registry: &'a ActionRegistry,
}

/// One part of the prompt.
pub trait PromptSection: Send + Sync {
    /// Render this section, or `None` to leave it out of the prompt.
    fn render(&self, ctx: &PromptContext<'_>) -> Option<RenderedSection>;
}
