//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise agent
//! execution engine. Everything else depends inward on this crate.
//!
//! ## Design Philosophy
//!
//! Every collaborator the step loop talks to is a trait here:
//! - [`Action`]: a schema-validated capability the model can invoke
//! - [`ActionFormat`]: how the model writes its choice down
//! - [`TextGenerator`]: the model call
//! - [`RunObserver`]: lifecycle side-channel
//!
//! Concrete tools, model adapters and observers live in their own crates.

pub mod action;
pub mod error;
pub mod model;
pub mod observer;
pub mod prompt;
pub mod run;
pub mod step;

// Re-export key types at crate root for ergonomics
pub use action::{
    Action, ActionFormat, ActionInvocation, ActionOutput, ActionRegistry, DoneAction,
    ExecutionOutcome, FlexibleJsonActionFormat, JsonActionFormat,
};
pub use error::{
    ActionError, Error, ModelCallError, ObserverError, RegistryError, Result, ValidationError,
};
pub use model::{GenerateRequest, Generation, TextGenerator, Usage};
pub use observer::{NoopObserver, RunObserver};
pub use prompt::{PromptMessage, RenderedPrompt, RenderedSection, Role};
pub use run::{ModelCallRecord, Run, TerminationReason};
pub use step::{FailureKind, NewStep, Step, StepOutcome};
