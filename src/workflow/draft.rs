// AutoFlow — Draft: the caller-owned working copy of a workflow being edited

use super::{Step, StepKind, Workflow};

/// Steps being assembled before they are saved.
///
/// A draft never shares storage with a stored [`Workflow`]: loading copies
/// the steps, and nothing reaches the store until the caller saves.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    steps: Vec<Step>,
    source_id: Option<String>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new step of `kind` with default name and parameters.
    pub fn push(&mut self, kind: StepKind) -> &Step {
        self.steps.push(Step::new(kind));
        &self.steps[self.steps.len() - 1]
    }

    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Remove the step with `step_id`. Returns whether a step was removed.
    pub fn remove(&mut self, step_id: u64) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.id != step_id);
        self.steps.len() != before
    }

    /// Rename the step with `step_id`. Blank names are ignored.
    pub fn rename(&mut self, step_id: u64, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.source_id = None;
    }

    /// Replace the draft with a copy of a stored workflow's steps.
    pub fn load(&mut self, workflow: &Workflow) {
        self.steps = workflow.steps.clone();
        self.source_id = Some(workflow.id.clone());
    }

    /// Id of the stored workflow this draft was loaded from, if any.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Point the draft at a stored workflow (after a first save).
    pub fn set_source_id(&mut self, id: impl Into<String>) {
        self.source_id = Some(id.into());
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
