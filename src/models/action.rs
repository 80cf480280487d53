use serde::{Deserialize, Serialize};

use crate::models::event::{Event, EventPatch, NewEvent};

/// One create/update instruction recovered from a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create { data: NewEvent },
    Update { target_id: String, patch: EventPatch },
}

/// Outcome of normalizing a single element of the `actions` array.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    Ready(Action),
    Rejected(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAnObject,
    UnknownActionKind,
    MissingTitle,
    MissingTargetId,
    StoreFailure,
}

impl SkipReason {
    pub fn message(&self) -> &'static str {
        match self {
            SkipReason::NotAnObject => "action is not an object",
            SkipReason::UnknownActionKind => "unknown action kind",
            SkipReason::MissingTitle => "missing title",
            SkipReason::MissingTargetId => "missing target id",
            SkipReason::StoreFailure => "could not be saved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActionResult {
    Created { index: usize, event: Event },
    Updated { index: usize, event: Event },
    Skipped { index: usize, reason: String },
}

impl ActionResult {
    pub fn event(&self) -> Option<&Event> {
        match self {
            ActionResult::Created { event, .. } | ActionResult::Updated { event, .. } => Some(event),
            ActionResult::Skipped { .. } => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ActionResult::Created { index, .. }
            | ActionResult::Updated { index, .. }
            | ActionResult::Skipped { index, .. } => *index,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Updates whose target was not one of the caller's events. They get no result entry.
    pub unresolved: usize,
}

impl ActionSummary {
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpretationReport {
    pub results: Vec<ActionResult>,
    pub summary: ActionSummary,
}

impl InterpretationReport {
    pub fn push(&mut self, result: ActionResult) {
        match &result {
            ActionResult::Created { .. } => self.summary.created += 1,
            ActionResult::Updated { .. } => self.summary.updated += 1,
            ActionResult::Skipped { .. } => self.summary.skipped += 1,
        }
        self.results.push(result);
    }

    pub fn message(&self) -> String {
        format!("Processed {} actions", self.summary.applied())
    }
}
