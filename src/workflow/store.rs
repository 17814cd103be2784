// AutoFlow — Workflow store (CRUD over a single key-value blob)

use super::draft::Draft;
use super::{Step, Workflow};
use crate::storage::{KeyValueStore, StorageError};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Why an imported or newly saved workflow was refused.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("workflow text could not be parsed: {0}")]
    Parse(String),
    #[error("workflow must be an object")]
    NotAnObject,
    #[error("workflow name is required")]
    MissingName,
    #[error("workflow steps must be a list")]
    StepsNotSequence,
    #[error("step {index} is malformed: {reason}")]
    InvalidStep { index: usize, reason: String },
}

/// Text formats workflows can be exchanged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowFormat {
    #[default]
    Json,
    Yaml,
}

/// Outcome of [`WorkflowStore::save_draft`].
#[derive(Debug, Clone, PartialEq)]
pub enum SavedDraft {
    Added(Workflow),
    Updated(Workflow),
}

impl SavedDraft {
    pub fn workflow(&self) -> &Workflow {
        match self {
            Self::Added(w) | Self::Updated(w) => w,
        }
    }
}

pub struct WorkflowStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    workflows: RwLock<Vec<Workflow>>,
}

impl WorkflowStore {
    /// Open the store, reading whatever collection is persisted under `key`.
    pub async fn open(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let workflows = read_blob(kv.as_ref(), &key).await;
        tracing::debug!(key = %key, count = workflows.len(), "Workflow store opened");
        Self {
            kv,
            key,
            workflows: RwLock::new(workflows),
        }
    }

    /// Read the persisted collection. Missing or malformed blobs read as empty.
    pub async fn load(&self) -> Vec<Workflow> {
        read_blob(self.kv.as_ref(), &self.key).await
    }

    /// Replace the whole collection, in memory and on storage.
    pub async fn save(&self, workflows: Vec<Workflow>) {
        let mut guard = self.workflows.write().await;
        *guard = workflows;
        self.persist(&guard).await;
    }

    /// Create and persist a new workflow.
    pub async fn add(
        &self,
        name: &str,
        description: Option<String>,
        steps: Vec<Step>,
    ) -> Result<Workflow, ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }

        let workflow = Workflow::new(name, description, steps);
        let mut guard = self.workflows.write().await;
        guard.push(workflow.clone());
        self.persist(&guard).await;

        tracing::info!(id = %workflow.id, name = %workflow.name, steps = workflow.steps.len(), "Workflow added");
        Ok(workflow)
    }

    pub async fn get(&self, id: &str) -> Option<Workflow> {
        self.workflows
            .read()
            .await
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }

    /// All workflows in insertion order.
    pub async fn list(&self) -> Vec<Workflow> {
        self.workflows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }

    /// Replace name, description and steps of an existing workflow.
    /// Returns `None` (and changes nothing) when `id` is unknown.
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        description: Option<String>,
        steps: Vec<Step>,
    ) -> Option<Workflow> {
        let mut guard = self.workflows.write().await;
        let updated = {
            let workflow = guard.iter_mut().find(|w| w.id == id)?;
            workflow.name = name.to_string();
            workflow.description = description;
            workflow.steps = steps;
            workflow.updated = Some(Utc::now());
            workflow.clone()
        };
        self.persist(&guard).await;

        tracing::info!(id = %id, "Workflow updated");
        Some(updated)
    }

    /// Remove a workflow. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> bool {
        let mut guard = self.workflows.write().await;
        let before = guard.len();
        guard.retain(|w| w.id != id);
        if guard.len() == before {
            tracing::debug!(id = %id, "Delete of unknown workflow ignored");
            return false;
        }
        self.persist(&guard).await;

        tracing::info!(id = %id, "Workflow deleted");
        true
    }

    /// Save a draft's steps.
    ///
    /// A draft loaded from a stored workflow updates it in place; a missing
    /// name or description keeps the stored value. Any other draft (or one
    /// whose source has since been deleted) becomes a new workflow, and the
    /// draft is pointed at it.
    pub async fn save_draft(
        &self,
        draft: &mut Draft,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<SavedDraft, ValidationError> {
        let mut name = name.map(str::trim).unwrap_or_default().to_string();
        let mut description = description;
        let steps = draft.steps().to_vec();

        let stored = match draft.source_id() {
            Some(id) => self.get(id).await,
            None => None,
        };
        if let Some(stored) = stored {
            if name.is_empty() {
                name = stored.name;
            }
            description = description.or(stored.description);
            if let Some(workflow) = self
                .update(&stored.id, &name, description.clone(), steps.clone())
                .await
            {
                return Ok(SavedDraft::Updated(workflow));
            }
        }

        let workflow = self.add(&name, description, steps).await?;
        draft.set_source_id(workflow.id.clone());
        Ok(SavedDraft::Added(workflow))
    }

    /// Import a workflow from its JSON export.
    pub async fn import_from(&self, text: &str) -> Result<Workflow, ValidationError> {
        self.import_from_format(text, WorkflowFormat::Json).await
    }

    /// Import a workflow. Validation happens before anything is stored, so a
    /// rejected import leaves the collection untouched.
    pub async fn import_from_format(
        &self,
        text: &str,
        format: WorkflowFormat,
    ) -> Result<Workflow, ValidationError> {
        let value: Value = match format {
            WorkflowFormat::Json => {
                serde_json::from_str(text).map_err(|e| ValidationError::Parse(e.to_string()))?
            }
            WorkflowFormat::Yaml => {
                serde_yaml::from_str(text).map_err(|e| ValidationError::Parse(e.to_string()))?
            }
        };

        let (name, description, steps) = match validate_import(value) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected workflow import");
                return Err(e);
            }
        };

        let workflow = Workflow::new(name, description, steps);
        let mut guard = self.workflows.write().await;
        guard.push(workflow.clone());
        self.persist(&guard).await;

        tracing::info!(id = %workflow.id, name = %workflow.name, "Workflow imported");
        Ok(workflow)
    }

    /// Serialize a workflow as pretty-printed JSON, re-importable with
    /// [`WorkflowStore::import_from`].
    pub fn export_to(workflow: &Workflow) -> serde_json::Result<String> {
        serde_json::to_string_pretty(workflow)
    }

    pub fn export_to_format(workflow: &Workflow, format: WorkflowFormat) -> anyhow::Result<String> {
        Ok(match format {
            WorkflowFormat::Json => Self::export_to(workflow)?,
            WorkflowFormat::Yaml => serde_yaml::to_string(workflow)?,
        })
    }

    async fn persist(&self, workflows: &[Workflow]) {
        if let Err(e) = write_blob(self.kv.as_ref(), &self.key, workflows).await {
            tracing::error!(key = %self.key, "Failed to persist workflows: {}", e);
        }
    }
}

async fn read_blob(kv: &dyn KeyValueStore, key: &str) -> Vec<Workflow> {
    let content = match kv.get(key).await {
        Ok(Some(content)) => content,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(key = %key, "Failed to read workflows: {}", e);
            return Vec::new();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(key = %key, "Stored workflows are malformed, starting empty: {}", e);
        Vec::new()
    })
}

async fn write_blob(
    kv: &dyn KeyValueStore,
    key: &str,
    workflows: &[Workflow],
) -> Result<(), StorageError> {
    let content = serde_json::to_string(workflows)?;
    kv.set(key, &content).await
}

fn validate_import(value: Value) -> Result<(String, Option<String>, Vec<Step>), ValidationError> {
    let Value::Object(mut map) = value else {
        return Err(ValidationError::NotAnObject);
    };

    let name = match map.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return Err(ValidationError::MissingName),
    };

    let items = match map.remove("steps") {
        Some(Value::Array(items)) => items,
        _ => return Err(ValidationError::StepsNotSequence),
    };

    // Step ids must stay unique within the workflow; missing or repeated
    // ids get a fresh one.
    let mut seen = HashSet::with_capacity(items.len());
    let steps = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut step: Step =
                serde_json::from_value(item).map_err(|e| ValidationError::InvalidStep {
                    index,
                    reason: e.to_string(),
                })?;
            while step.id == 0 || !seen.insert(step.id) {
                step.id = super::next_step_id();
            }
            Ok(step)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let description = match map.remove("description") {
        Some(Value::String(description)) => Some(description),
        _ => None,
    };

    Ok((name, description, steps))
}
