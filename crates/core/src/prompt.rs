//! Rendered prompt types.
//!
//! The prompt composer (in `stepwise-agent`) turns a Run into a
//! [`RenderedPrompt`]: an ordered list of titled sections. Text generators
//! either consume the flat text or map the sections onto chat messages.

use serde::{Deserialize, Serialize};

/// The chat role a rendered section is addressed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions (role, project, constraints, action catalog).
    System,
    /// Task and run history.
    User,
}

/// One section of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSection {
    pub role: Role,
    pub title: String,
    pub content: String,
}

impl RenderedSection {
    pub fn system(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn user(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Markdown form: `## Title` heading followed by the content.
    pub fn to_markdown(&self) -> String {
        format!("## {}\n{}", self.title.to_uppercase(), self.content.trim_end())
    }
}

/// A chat message produced by merging consecutive same-role sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// The full rendered model input for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub sections: Vec<RenderedSection>,
}

impl RenderedPrompt {
    pub fn new(sections: Vec<RenderedSection>) -> Self {
        Self { sections }
    }

    /// Flat text form, sections separated by a blank line.
    pub fn text(&self) -> String {
        self.sections
            .iter()
            .map(RenderedSection::to_markdown)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Chat form: consecutive sections with the same role share one message.
    pub fn to_messages(&self) -> Vec<PromptMessage> {
        let mut messages: Vec<PromptMessage> = Vec::new();
        for section in &self.sections {
            let rendered = section.to_markdown();
            match messages.last_mut() {
                Some(last) if last.role == section.role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&rendered);
                }
                _ => messages.push(PromptMessage {
                    role: section.role,
                    content: rendered,
                }),
            }
        }
        messages
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.sections
            .iter()
            .map(|s| (s.title.len() + s.content.len()) / 4)
            .sum()
    }
}
