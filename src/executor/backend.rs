// AutoFlow — Automation backends (the side effects behind each step kind)

use super::ExecutionError;
use crate::workflow::{
    ClickButtonParams, ExtractDataParams, FillFormParams, NotificationParams, ScheduleParams,
};
use async_trait::async_trait;

/// Capability that performs the real work for each known step kind.
///
/// The executor owns the dispatch; a backend only knows how to carry out one
/// action with already-validated parameters.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn fill_form(&self, params: &FillFormParams) -> Result<(), ExecutionError>;
    async fn click_button(&self, params: &ClickButtonParams) -> Result<(), ExecutionError>;
    async fn send_notification(&self, params: &NotificationParams) -> Result<(), ExecutionError>;
    async fn extract_data(&self, params: &ExtractDataParams) -> Result<(), ExecutionError>;
    async fn schedule_task(&self, params: &ScheduleParams) -> Result<(), ExecutionError>;
}

/// Backend that only records what it would have done.
#[derive(Debug, Clone, Default)]
pub struct LoggingBackend;

impl LoggingBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AutomationBackend for LoggingBackend {
    fn name(&self) -> &str {
        "logging"
    }

    async fn fill_form(&self, params: &FillFormParams) -> Result<(), ExecutionError> {
        tracing::info!(fields = params.fields.len(), "Filling form");
        Ok(())
    }

    async fn click_button(&self, params: &ClickButtonParams) -> Result<(), ExecutionError> {
        tracing::info!(selector = %params.selector, "Clicking button");
        Ok(())
    }

    async fn send_notification(&self, params: &NotificationParams) -> Result<(), ExecutionError> {
        tracing::info!(message = %params.message, "Sending notification");
        Ok(())
    }

    async fn extract_data(&self, params: &ExtractDataParams) -> Result<(), ExecutionError> {
        tracing::info!(selector = %params.selector, storage = %params.storage, "Extracting data");
        Ok(())
    }

    async fn schedule_task(&self, params: &ScheduleParams) -> Result<(), ExecutionError> {
        tracing::info!(time = %params.time, repeat = %params.repeat, "Scheduling task");
        Ok(())
    }
}
