//! Observer combination.
//!
//! [`CombinedObserver`] fans each lifecycle event out to a list of observers
//! in registration order. A failing or panicking observer is logged and
//! skipped; the rest still run, and the step loop never sees the error.

mod console;

pub use console::ConsoleObserver;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use stepwise_core::error::ObserverError;
use stepwise_core::observer::RunObserver;
use stepwise_core::run::{ModelCallRecord, Run};
use stepwise_core::step::Step;

#[derive(Clone, Default)]
pub struct CombinedObserver {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl CombinedObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// Combine observers into one, preserving order.
pub fn combine_observers(observers: impl IntoIterator<Item = Arc<dyn RunObserver>>) -> CombinedObserver {
    CombinedObserver {
        observers: observers.into_iter().collect(),
    }
}

/// Await one hook; log and swallow its error or panic.
async fn isolate<F>(observer: &str, hook: &'static str, fut: F)
where
    F: Future<Output = Result<(), ObserverError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(observer, hook, error = %e, "Observer failed"),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            warn!(observer, hook, panic = %detail, "Observer panicked");
        }
    }
}

#[async_trait]
impl RunObserver for CombinedObserver {
    fn name(&self) -> &str {
        "combined"
    }

    async fn on_run_started(&self, run: &Run) -> Result<(), ObserverError> {
        for o in &self.observers {
            isolate(o.name(), "on_run_started", o.on_run_started(run)).await;
        }
        Ok(())
    }

    async fn on_model_call_completed(&self, run: &Run, call: &ModelCallRecord) -> Result<(), ObserverError> {
        for o in &self.observers {
            isolate(
                o.name(),
                "on_model_call_completed",
                o.on_model_call_completed(run, call),
            )
            .await;
        }
        Ok(())
    }

    async fn on_step_completed(&self, run: &Run, step: &Step) -> Result<(), ObserverError> {
        for o in &self.observers {
            isolate(o.name(), "on_step_completed", o.on_step_completed(run, step)).await;
        }
        Ok(())
    }

    async fn on_run_finished(&self, run: &Run) -> Result<(), ObserverError> {
        for o in &self.observers {
            isolate(o.name(), "on_run_finished", o.on_run_finished(run)).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CombinedObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.observers.iter().map(|o| o.name().to_string()))
            .finish()
    }
}
