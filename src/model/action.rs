use crate::model::request::{RequestStatus, SourceType};
use serde::Serialize;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdminAction {
    Approve,
    Reject,
    Delete,
}

impl AdminAction {
    /// `None` for anything other than the three known actions.
    pub fn parse(value: &str) -> Option<Self> {
        AdminAction::from_str(value).ok()
    }

    /// Status written by a decision, `None` for delete.
    pub fn decision_status(self) -> Option<RequestStatus> {
        match self {
            AdminAction::Approve => Some(RequestStatus::Approved),
            AdminAction::Reject => Some(RequestStatus::Rejected),
            AdminAction::Delete => None,
        }
    }
}

/// Lifecycle of one admin action as the dashboard sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ActionState {
    /// Control disabled while the write is in flight.
    Pending,
    Succeeded,
    Failed { reason: String },
}

impl ActionState {
    pub fn control_disabled(&self) -> bool {
        matches!(self, ActionState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub id: String,
    pub source_type: SourceType,
    pub action: AdminAction,
    pub state: ActionState,
}
