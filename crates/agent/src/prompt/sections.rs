//! Built-in prompt sections.

use stepwise_core::prompt::{RenderedSection, Role};
use stepwise_core::step::{Step, StepOutcome};

use super::{PromptContext, PromptSection};

/// Default number of steps the history section shows.
pub const DEFAULT_RECENT_STEPS: usize = 10;

/// Static text supplied once at construction (role, project, constraints).
#[derive(Debug, Clone)]
pub struct FixedSection {
    role: Role,
    title: String,
    content: String,
}

impl FixedSection {
    pub fn new(role: Role, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn system(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::System, title, content)
    }

    pub fn user(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::User, title, content)
    }
}

impl PromptSection for FixedSection {
    fn render(&self, _ctx: &PromptContext<'_>) -> Option<RenderedSection> {
        if self.content.trim().is_empty() {
            return None;
        }
        Some(RenderedSection {
            role: self.role,
            title: self.title.clone(),
            content: self.content.clone(),
        })
    }
}

/// The run's objective.
#[derive(Debug, Clone)]
pub struct TaskSection {
    title: String,
}

impl TaskSection {
    pub fn new() -> Self {
        Self {
            title: "task".into(),
        }
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl Default for TaskSection {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptSection for TaskSection {
    fn render(&self, ctx: &PromptContext<'_>) -> Option<RenderedSection> {
        Some(RenderedSection::user(
            self.title.clone(),
            ctx.run.objective(),
        ))
    }
}

/// The registry's action catalog.
#[derive(Debug, Clone, Default)]
pub struct AvailableActionsSection;

impl PromptSection for AvailableActionsSection {
    fn render(&self, ctx: &PromptContext<'_>) -> Option<RenderedSection> {
        Some(RenderedSection::system(
            "available actions",
            ctx.registry.render_catalog(),
        ))
    }
}

/// The last `retention` steps, oldest first.
#[derive(Debug, Clone)]
pub struct RecentStepsSection {
    retention: usize,
}

impl RecentStepsSection {
    pub fn new(retention: usize) -> Self {
        Self { retention }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    fn render_step(step: &Step) -> String {
        let mut out = format!("Step {}: {}\n", step.index + 1, step.action_label());
        if let Some(reasoning) = &step.reasoning {
            out.push_str(&format!("Thought: {}\n", reasoning.trim()));
        }
        if let Some(input) = &step.input {
            out.push_str(&format!("Input: {input}\n"));
        }
        match &step.outcome {
            StepOutcome::Succeeded { .. } => {
                out.push_str(&format!("Result: {}\n", step.summary.trim_end()));
            }
            StepOutcome::Failed { kind, message } => {
                if let Some(raw) = &step.raw_response {
                    out.push_str(&format!("Response: {}\n", raw.trim()));
                }
                out.push_str(&format!("Error ({kind}): {message}\n"));
            }
        }
        out
    }
}

impl Default for RecentStepsSection {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_STEPS)
    }
}

impl PromptSection for RecentStepsSection {
    fn render(&self, ctx: &PromptContext<'_>) -> Option<RenderedSection> {
        let total = ctx.run.step_count();
        if total == 0 {
            return Some(RenderedSection::user("recent steps", "No steps taken yet."));
        }

        let shown = ctx.run.recent_steps(self.retention);
        let mut content = String::new();
        if shown.len() < total {
            content.push_str(&format!(
                "(showing the last {} of {} steps)\n\n",
                shown.len(),
                total
            ));
        }
        content.push_str(
            &shown
                .iter()
                .map(Self::render_step)
                .collect::<Vec<_>>()
                .join("\n"),
        );
        Some(RenderedSection::user("recent steps", content))
    }
}
