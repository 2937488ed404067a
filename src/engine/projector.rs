use crate::model::request::{DeletePermission, RequestRecord, RequestStatus, SourceType, StatusFilter};
use crate::model::settings::Settings;
use crate::model::timestamp::{format_timestamp, TimestampFormat};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Full,
    Compact,
}

/// One rendered request.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestCard {
    pub id: String,
    pub source_type: SourceType,
    pub status: RequestStatus,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub department: Option<String>,
    pub photo: Option<String>,
    #[schema(example = "12/05/2025 to 14/05/2025")]
    pub date_range: String,
    pub duration: Option<String>,
    pub reason: Option<String>,
    pub return_status: Option<String>,
    #[schema(example = "08:30 12/05/2025")]
    pub requested_at: String,
    pub decision_at: String,
    pub decision_by: Option<String>,
    pub returned_at: String,
    pub delete_permission: DeletePermission,
}

fn requested_millis(record: &RequestRecord) -> i64 {
    record.requested_at.map(|t| t.timestamp_millis()).unwrap_or(0)
}

/// Status-priority + recency ordering for a page. Stable.
pub fn sort_requests(records: &mut [RequestRecord], page: &StatusFilter) {
    let grouped = !page.is_decided_page();
    let ascending = *page == StatusFilter::Pending;

    records.sort_by(|a, b| {
        if grouped {
            let by_status = a.status.priority().cmp(&b.status.priority());
            if by_status != Ordering::Equal {
                return by_status;
            }
        }
        let by_time = requested_millis(a).cmp(&requested_millis(b));
        if ascending { by_time } else { by_time.reverse() }
    });
}

pub fn layout_for(page: &StatusFilter, settings: &Settings) -> Layout {
    if page.is_page(RequestStatus::Approved) && settings.compact_view_approved {
        Layout::Compact
    } else {
        Layout::Full
    }
}

fn date_range(record: &RequestRecord) -> String {
    match (record.start_date.as_deref(), record.end_date.as_deref()) {
        (Some(start), Some(end)) if start == end => start.to_string(),
        (Some(start), Some(end)) => format!("{start} to {end}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => String::new(),
    }
}

pub fn card(record: &RequestRecord, now: DateTime<Utc>) -> RequestCard {
    let fmt = |t: Option<&DateTime<Utc>>| format_timestamp(t, &Local, TimestampFormat::DateTime);
    RequestCard {
        id: record.id.clone(),
        source_type: record.source_type,
        status: record.status,
        name: record.name.clone(),
        user_id: record.user_id.clone(),
        department: record.department.clone(),
        photo: record.photo.clone(),
        date_range: date_range(record),
        duration: record.duration.clone(),
        reason: record.reason.clone(),
        return_status: record.return_status.clone(),
        requested_at: fmt(record.requested_at.as_ref()),
        decision_at: fmt(record.decision_at.as_ref()),
        decision_by: record.decision_by.clone(),
        returned_at: fmt(record.returned_at.as_ref()),
        delete_permission: record.delete_permission(now),
    }
}

/// Sort a filtered set for `page` and render its cards.
pub fn project(records: &[RequestRecord], page: &StatusFilter, now: DateTime<Utc>) -> Vec<RequestCard> {
    let mut sorted = records.to_vec();
    sort_requests(&mut sorted, page);
    sorted.iter().map(|r| card(r, now)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::request::tests::record;
    use chrono::{Duration, TimeZone};

    fn at(id: &str, status: RequestStatus, secs: Option<i64>) -> RequestRecord {
        let mut r = record(id, SourceType::Leave, status);
        r.requested_at = secs.and_then(|s| Utc.timestamp_opt(s, 0).single());
        r
    }

    fn ids(records: &[RequestRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn pending_page_oldest_first() {
        let mut records = vec![
            at("A", RequestStatus::Pending, Some(100)),
            at("B", RequestStatus::Pending, Some(50)),
        ];
        sort_requests(&mut records, &StatusFilter::Pending);
        assert_eq!(ids(&records), vec!["B", "A"]);
    }

    #[test]
    fn pending_page_groups_by_status() {
        let mut records = vec![
            at("rejected", RequestStatus::Rejected, Some(1)),
            at("editing", RequestStatus::Editing, Some(10)),
            at("approved", RequestStatus::Approved, Some(2)),
            at("pending-late", RequestStatus::Pending, Some(300)),
            at("pending-early", RequestStatus::Pending, Some(200)),
        ];
        sort_requests(&mut records, &StatusFilter::Pending);
        assert_eq!(
            ids(&records),
            vec!["pending-early", "pending-late", "editing", "approved", "rejected"]
        );
    }

    #[test]
    fn approved_page_is_newest_first_regardless_of_status() {
        let mut records = vec![
            at("old", RequestStatus::Approved, Some(10)),
            at("odd", RequestStatus::Pending, Some(20)),
            at("new", RequestStatus::Approved, Some(30)),
            at("none", RequestStatus::Approved, None),
        ];
        sort_requests(&mut records, &StatusFilter::parse("approved").unwrap());
        assert_eq!(ids(&records), vec!["new", "odd", "old", "none"]);
    }

    #[test]
    fn all_page_groups_then_newest_first() {
        let mut records = vec![
            at("p1", RequestStatus::Pending, Some(10)),
            at("x", RequestStatus::Unknown, Some(99)),
            at("p2", RequestStatus::Pending, Some(20)),
            at("a", RequestStatus::Approved, None),
        ];
        sort_requests(&mut records, &StatusFilter::All);
        assert_eq!(ids(&records), vec!["p2", "p1", "a", "x"]);
    }

    #[test]
    fn compact_layout_only_on_approved_page() {
        let settings = Settings {
            compact_view_approved: true,
            ..Settings::default()
        };
        let approved = StatusFilter::parse("approved").unwrap();
        assert_eq!(layout_for(&approved, &settings), Layout::Compact);
        assert_eq!(layout_for(&StatusFilter::Pending, &settings), Layout::Full);
        assert_eq!(layout_for(&approved, &Settings::default()), Layout::Full);
    }

    #[test]
    fn cards_carry_delete_permission_and_date_range() {
        let now = Utc::now();
        let mut decided = at("d", RequestStatus::Approved, Some(5));
        decided.decision_at = Some(now - Duration::minutes(60));
        decided.start_date = Some("01/05/2025".into());
        decided.end_date = Some("01/05/2025".into());

        let mut open = at("o", RequestStatus::Pending, Some(6));
        open.start_date = Some("01/05/2025".into());
        open.end_date = Some("03/05/2025".into());

        let cards = project(&[decided, open], &StatusFilter::All, now);
        assert_eq!(cards[0].id, "o");
        assert_eq!(cards[0].delete_permission, DeletePermission::Allowed);
        assert_eq!(cards[0].date_range, "01/05/2025 to 03/05/2025");
        assert_eq!(cards[1].delete_permission, DeletePermission::Locked);
        assert_eq!(cards[1].date_range, "01/05/2025");
        assert!(!cards[1].decision_at.is_empty());
    }
}
