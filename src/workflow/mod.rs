// AutoFlow — Workflow data model

pub mod draft;
pub mod parser;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Step kinds
// ---------------------------------------------------------------------------

/// The action a step performs. Serialized as its string tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    FillForm,
    ClickButton,
    Notify,
    ExtractData,
    ScheduleTask,
    /// A tag this build does not recognise; kept verbatim.
    Unknown(String),
}

impl StepKind {
    pub const KNOWN: [StepKind; 5] = [
        StepKind::FillForm,
        StepKind::ClickButton,
        StepKind::Notify,
        StepKind::ExtractData,
        StepKind::ScheduleTask,
    ];

    pub fn parse(tag: &str) -> Self {
        match tag {
            "fill-form" => Self::FillForm,
            "click-button" => Self::ClickButton,
            "send-notification" => Self::Notify,
            "extract-data" => Self::ExtractData,
            "schedule-task" => Self::ScheduleTask,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::FillForm => "fill-form",
            Self::ClickButton => "click-button",
            Self::Notify => "send-notification",
            Self::ExtractData => "extract-data",
            Self::ScheduleTask => "schedule-task",
            Self::Unknown(tag) => tag,
        }
    }

    /// Human-readable label a new step of this kind starts with.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::FillForm => "Fill Form",
            Self::ClickButton => "Click Button",
            Self::Notify => "Send Notification",
            Self::ExtractData => "Extract Data",
            Self::ScheduleTask => "Schedule Task",
            Self::Unknown(_) => "Unknown Action",
        }
    }

    /// Parameter bag a new step of this kind starts with.
    pub fn default_data(&self) -> Value {
        match self {
            Self::FillForm => json!({ "fields": [] }),
            Self::ClickButton => json!({ "selector": "" }),
            Self::Notify => json!({ "message": DEFAULT_NOTIFICATION }),
            Self::ExtractData => json!({ "selector": "", "storage": "variable" }),
            Self::ScheduleTask => json!({ "time": "09:00", "repeat": "daily" }),
            Self::Unknown(_) => json!({}),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for StepKind {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.tag().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

const DEFAULT_NOTIFICATION: &str = "Notification from AutoFlow";

// ---------------------------------------------------------------------------
// Typed parameter bags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillFormParams {
    #[serde(default)]
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickButtonParams {
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationParams {
    #[serde(default = "default_notification")]
    pub message: String,
}

fn default_notification() -> String {
    DEFAULT_NOTIFICATION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractDataParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default = "default_storage_target")]
    pub storage: String,
}

fn default_storage_target() -> String {
    "variable".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParams {
    #[serde(default = "default_schedule_time")]
    pub time: String,
    #[serde(default = "default_repeat")]
    pub repeat: String,
}

fn default_schedule_time() -> String {
    "09:00".to_string()
}
fn default_repeat() -> String {
    "daily".to_string()
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub name: String,
    #[serde(default = "empty_data")]
    pub data: Value,
}

fn empty_data() -> Value {
    json!({})
}

impl Step {
    /// A fresh step of `kind` with default name and parameters.
    pub fn new(kind: StepKind) -> Self {
        Self {
            id: next_step_id(),
            name: kind.default_name().to_string(),
            data: kind.default_data(),
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Allocate a step id. Ids are strictly increasing within a process and
/// start from the wall clock in milliseconds.
pub fn next_step_id() -> u64 {
    static NEXT: OnceLock<AtomicU64> = OnceLock::new();
    NEXT.get_or_init(|| AtomicU64::new(Utc::now().timestamp_millis().max(1) as u64))
        .fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<Step>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Build a workflow with a fresh id and creation time.
    pub fn new(name: impl Into<String>, description: Option<String>, steps: Vec<Step>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            steps,
            created: Utc::now(),
            updated: None,
        }
    }
}
