//! Run controllers: policies deciding whether a run takes another step.
//!
//! A controller is a pure function of the Run. It holds no state of its own,
//! so asking twice about the same run gives the same answer.

use stepwise_core::run::Run;

/// Continue/stop policy consulted after every recorded step.
pub trait Controller: Send + Sync {
    fn should_continue(&self, run: &Run) -> bool;
}

/// Stops once the run has `limit` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxSteps {
    limit: usize,
}

impl MaxSteps {
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Controller for MaxSteps {
    fn should_continue(&self, run: &Run) -> bool {
        run.step_count() < self.limit
    }
}

pub fn max_steps(limit: usize) -> MaxSteps {
    MaxSteps { limit }
}

/// A controller backed by a predicate.
pub struct FnController<F> {
    predicate: F,
}

impl<F> Controller for FnController<F>
where
    F: Fn(&Run) -> bool + Send + Sync,
{
    fn should_continue(&self, run: &Run) -> bool {
        (self.predicate)(run)
    }
}

pub fn from_fn<F>(predicate: F) -> FnController<F>
where
    F: Fn(&Run) -> bool + Send + Sync,
{
    FnController { predicate }
}

/// Continues only while every inner controller continues.
pub struct AllOf {
    controllers: Vec<Box<dyn Controller>>,
}

impl Controller for AllOf {
    fn should_continue(&self, run: &Run) -> bool {
        self.controllers.iter().all(|c| c.should_continue(run))
    }
}

pub fn all_of(controllers: Vec<Box<dyn Controller>>) -> AllOf {
    AllOf { controllers }
}

/// Continues while at least one inner controller continues.
pub struct AnyOf {
    controllers: Vec<Box<dyn Controller>>,
}

impl Controller for AnyOf {
    fn should_continue(&self, run: &Run) -> bool {
        self.controllers.iter().any(|c| c.should_continue(run))
    }
}

pub fn any_of(controllers: Vec<Box<dyn Controller>>) -> AnyOf {
    AnyOf { controllers }
}
