// AutoFlow — Step executor (dispatch from step kind to action)

pub mod backend;

use crate::workflow::{Step, StepKind};
use async_trait::async_trait;
use backend::{AutomationBackend, LoggingBackend};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("invalid parameters for '{kind}': {reason}")]
    InvalidData { kind: String, reason: String },
    #[error("action failed: {0}")]
    Action(String),
}

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// Runs a single step. Swappable so the sequencer never depends on how
/// actions are actually carried out.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &Step) -> Result<(), ExecutionError>;
}

// ---------------------------------------------------------------------------
// Action executor
// ---------------------------------------------------------------------------

/// Default executor: decodes the step's parameters and hands them to an
/// [`AutomationBackend`]. Unknown kinds are skipped with a warning.
#[derive(Clone)]
pub struct ActionExecutor {
    backend: Arc<dyn AutomationBackend>,
}

impl ActionExecutor {
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }

    /// Executor over [`LoggingBackend`].
    pub fn logging() -> Self {
        Self::new(Arc::new(LoggingBackend::new()))
    }

    async fn dispatch(&self, step: &Step) -> Result<(), ExecutionError> {
        match &step.kind {
            StepKind::FillForm => self.backend.fill_form(&params(step)?).await,
            StepKind::ClickButton => self.backend.click_button(&params(step)?).await,
            StepKind::Notify => self.backend.send_notification(&params(step)?).await,
            StepKind::ExtractData => self.backend.extract_data(&params(step)?).await,
            StepKind::ScheduleTask => self.backend.schedule_task(&params(step)?).await,
            StepKind::Unknown(tag) => {
                tracing::warn!(step = %step.name, kind = %tag, "Unknown step type, skipping");
                Ok(())
            }
        }
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::logging()
    }
}

#[async_trait]
impl StepExecutor for ActionExecutor {
    async fn execute(&self, step: &Step) -> Result<(), ExecutionError> {
        tracing::debug!(step = %step.name, kind = %step.kind, backend = %self.backend.name(), "Executing step");
        let start = std::time::Instant::now();
        let result = self.dispatch(step).await;
        let duration = start.elapsed();

        match &result {
            Ok(()) => {
                tracing::info!(step = %step.name, kind = %step.kind, duration_ms = %duration.as_millis(), "Step completed")
            }
            Err(e) => {
                tracing::error!(step = %step.name, kind = %step.kind, duration_ms = %duration.as_millis(), error = %e, "Step failed")
            }
        }

        result
    }
}

/// Decode a step's parameter bag into the shape its kind expects.
/// A null bag is read as an empty object so defaults apply.
fn params<T: DeserializeOwned>(step: &Step) -> Result<T, ExecutionError> {
    let data = match &step.data {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(data).map_err(|e| ExecutionError::InvalidData {
        kind: step.kind.tag().to_string(),
        reason: e.to_string(),
    })
}
