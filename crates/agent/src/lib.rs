//! The Stepwise step loop.
//!
//! Each iteration of a run follows the same cycle:
//!
//! 1. **Render** a prompt from the run (role, action catalog, task, recent steps)
//! 2. **Ask** the text generator for the next action
//! 3. **Validate** the response against the action registry
//! 4. **Dispatch** the action and record the outcome as a step
//! 5. **Check** the controller and loop or stop
//!
//! Observers see every model call and every step without being able to
//! influence the loop.

pub mod controller;
pub mod loop_runner;
pub mod observer;
pub mod prompt;
pub mod scripted;

pub use controller::{AllOf, AnyOf, Controller, FnController, MaxSteps, all_of, any_of, from_fn, max_steps};
pub use loop_runner::{DEFAULT_MAX_STEPS, LoopSettings, RetryPolicy, StepLoop};
pub use observer::{CombinedObserver, ConsoleObserver, combine_observers};
pub use prompt::{
    AvailableActionsSection, FixedSection, PromptComposer, PromptContext, PromptSection,
    RecentStepsSection, TaskSection,
};
pub use scripted::ScriptedGenerator;
