//! RunObserver trait: side-channel consumers of run lifecycle events.
//!
//! Observers see read-only snapshots of the Run. Nothing they return feeds
//! back into control flow; errors are logged by the caller and dropped.

use async_trait::async_trait;

use crate::error::ObserverError;
use crate::run::{ModelCallRecord, Run};
use crate::step::Step;

/// Lifecycle hooks. Every hook is optional.
#[async_trait]
pub trait RunObserver: Send + Sync {
    /// Name used when logging failures.
    fn name(&self) -> &str {
        "observer"
    }

    async fn on_run_started(&self, _run: &Run) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_model_call_completed(&self, _run: &Run, _call: &ModelCallRecord) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_step_completed(&self, _run: &Run, _step: &Step) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_run_finished(&self, _run: &Run) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {
    fn name(&self) -> &str {
        "noop"
    }
}
