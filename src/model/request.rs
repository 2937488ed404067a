use crate::model::timestamp::RawTimestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Minutes after a decision during which the request can still be deleted.
pub const DECISION_WINDOW_MINUTES: i64 = 55;

/// Which collection a request came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceType {
    Leave,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Editing,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => RequestStatus::Pending,
            "editing" => RequestStatus::Editing,
            "approved" => RequestStatus::Approved,
            "rejected" => RequestStatus::Rejected,
            _ => RequestStatus::Unknown,
        }
    }

    /// Sort priority used when a page mixes statuses.
    pub fn priority(self) -> u8 {
        match self {
            RequestStatus::Pending => 1,
            RequestStatus::Editing => 2,
            RequestStatus::Approved => 3,
            RequestStatus::Rejected => 4,
            RequestStatus::Unknown => 5,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Editing)
    }

    pub fn is_decided(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// Server-side status scope of a subscription, and the "page" the admin is looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    All,
    /// `pending` or `editing`
    #[default]
    Pending,
    Exactly(String),
}

impl StatusFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "all" => Some(StatusFilter::All),
            "pending" => Some(StatusFilter::Pending),
            other => Some(StatusFilter::Exactly(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Pending => "pending",
            StatusFilter::Exactly(status) => status,
        }
    }

    /// Whether a document with the given raw `status` field falls inside this scope.
    pub fn matches_raw(&self, status: Option<&str>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => matches!(status, Some("pending") | Some("editing")),
            StatusFilter::Exactly(expected) => status == Some(expected.as_str()),
        }
    }

    pub fn is_page(&self, status: RequestStatus) -> bool {
        let name: &str = status.as_ref();
        matches!(self, StatusFilter::Exactly(s) if s.as_str() == name)
    }

    /// Approved and rejected pages are status-homogeneous.
    pub fn is_decided_page(&self) -> bool {
        self.is_page(RequestStatus::Approved) || self.is_page(RequestStatus::Rejected)
    }
}

/// A request document as stored, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDocument {
    pub status: Option<String>,
    pub requested_at: Option<RawTimestamp>,
    pub decision_at: Option<RawTimestamp>,
    pub decision_by: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub department: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub duration: Option<String>,
    pub reason: Option<String>,
    pub photo: Option<String>,
    pub return_status: Option<String>,
    pub returned_at: Option<RawTimestamp>,
}

/// Accepts strings, numbers and booleans for free-text display fields.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

impl RequestDocument {
    pub fn status(&self) -> RequestStatus {
        self.status
            .as_deref()
            .map(RequestStatus::parse)
            .unwrap_or(RequestStatus::Unknown)
    }

    /// Judged from the stored status and decision time, whatever page is open.
    pub fn delete_permission(&self, now: DateTime<Utc>) -> DeletePermission {
        let decided = self.decision_at.as_ref().and_then(RawTimestamp::normalize);
        DeletePermission::evaluate(self.status(), decided, now)
    }
}

/// A document plus the id it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub body: RequestDocument,
}

impl StoredDocument {
    pub fn into_record(self, source_type: SourceType) -> RequestRecord {
        let body = self.body;
        RequestRecord {
            id: self.id,
            source_type,
            status: body.status(),
            requested_at: body.requested_at.as_ref().and_then(RawTimestamp::normalize),
            decision_at: body.decision_at.as_ref().and_then(RawTimestamp::normalize),
            decision_by: body.decision_by,
            department: body.department,
            name: body.name,
            user_id: body.user_id,
            start_date: body.start_date,
            end_date: body.end_date,
            duration: body.duration,
            reason: body.reason,
            photo: body.photo,
            return_status: body.return_status,
            returned_at: body.returned_at.as_ref().and_then(RawTimestamp::normalize),
        }
    }
}

/// A request inside the merged view. Timestamps are already canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: String,
    pub source_type: SourceType,
    pub status: RequestStatus,
    pub requested_at: Option<DateTime<Utc>>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<String>,
    pub department: Option<String>,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub duration: Option<String>,
    pub reason: Option<String>,
    pub photo: Option<String>,
    pub return_status: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeletePermission {
    /// Open request, no time limit.
    Allowed,
    /// Decided request still inside the decision window.
    AllowedFor {
        #[serde(rename = "minutesLeft")]
        minutes_left: i64,
    },
    /// Decision window has passed.
    Locked,
    /// Decided, but no readable decision time.
    NoDecisionTime,
    NotDeletable,
}

impl DeletePermission {
    pub fn is_allowed(self) -> bool {
        matches!(self, DeletePermission::Allowed | DeletePermission::AllowedFor { .. })
    }

    pub fn evaluate(status: RequestStatus, decision_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if status.is_open() {
            return DeletePermission::Allowed;
        }
        if !status.is_decided() {
            return DeletePermission::NotDeletable;
        }
        let Some(decided) = decision_at else {
            return DeletePermission::NoDecisionTime;
        };

        let elapsed_minutes = (now - decided).num_milliseconds() as f64 / 60_000.0;
        let window = DECISION_WINDOW_MINUTES as f64;
        if elapsed_minutes < window {
            DeletePermission::AllowedFor {
                minutes_left: (window - elapsed_minutes).floor() as i64,
            }
        } else {
            DeletePermission::Locked
        }
    }
}

impl RequestRecord {
    pub fn matches_key(&self, id: &str, source_type: SourceType) -> bool {
        self.source_type == source_type && self.id == id
    }

    pub fn delete_permission(&self, now: DateTime<Utc>) -> DeletePermission {
        DeletePermission::evaluate(self.status, self.decision_at, now)
    }
}
