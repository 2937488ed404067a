use crate::model::request::{RequestRecord, RequestStatus, SourceType, StatusFilter};
use crate::model::settings::Settings;
use crate::store::{CollectionMap, DocumentStore, Snapshot, StoreError};
use chrono::{Datelike, Local, NaiveDate};
use futures::future;
use futures::stream::{self, AbortHandle, Abortable, BoxStream, Stream, StreamExt};
use std::collections::{BTreeSet, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// What the engine emits to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateEvent {
    Update(AggregateUpdate),
    SourceError { source: SourceType, error: StoreError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateUpdate {
    /// Full filtered set, in merge order.
    pub requests: Vec<RequestRecord>,
    /// Distinct non-empty departments seen since the subscription began.
    pub departments: BTreeSet<String>,
    /// Sources that have not delivered yet; zero means the initial load is done.
    pub remaining_initial_loads: usize,
}

type Delivery = (SourceType, Result<Snapshot, StoreError>);

/// Owns at most one live subscription pair over the two source collections.
pub struct LiveAggregator {
    store: Arc<dyn DocumentStore>,
    collections: CollectionMap,
    active: Option<AbortHandle>,
}

impl LiveAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, collections: CollectionMap) -> Self {
        Self {
            store,
            collections,
            active: None,
        }
    }

    /// Tear down the previous subscription pair, then open a new one.
    ///
    /// Once this returns, the previous [`LiveView`] yields nothing more.
    pub fn subscribe(&mut self, page: StatusFilter, settings: Settings) -> LiveView {
        self.unsubscribe();
        info!(status = page.as_str(), "subscribing to request sources");

        let sources: Vec<BoxStream<'static, Delivery>> = SourceType::iter()
            .map(|source| self.source_stream(source, &page))
            .collect();
        let state = MergeState::new(page, settings, sources.len());

        let events = stream::select_all(sources)
            .scan(state, |state, (source, delivery)| {
                future::ready(Some(state.apply(source, delivery)))
            })
            .boxed();

        let (handle, registration) = AbortHandle::new_pair();
        self.active = Some(handle.clone());
        LiveView {
            events: Abortable::new(events, registration),
            handle,
        }
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!("unsubscribing previous request listeners");
            handle.abort();
        }
    }

    fn source_stream(&self, source: SourceType, page: &StatusFilter) -> BoxStream<'static, Delivery> {
        let Some(collection) = self.collections.resolve(source) else {
            let error = StoreError::UnknownCollection {
                collection: source.to_string(),
            };
            return stream::once(future::ready((source, Err(error)))).boxed();
        };

        // a source that failed delivers nothing further
        self.store
            .watch(collection, page)
            .scan(false, move |failed, delivery| {
                if *failed {
                    return future::ready(None);
                }
                *failed = delivery.is_err();
                future::ready(Some((source, delivery)))
            })
            .boxed()
    }
}

impl Drop for LiveAggregator {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Cancellable stream of [`AggregateEvent`]s for one subscription pair.
pub struct LiveView {
    events: Abortable<BoxStream<'static, AggregateEvent>>,
    handle: AbortHandle,
}

impl LiveView {
    /// Idempotent; terminates both source subscriptions.
    pub fn unsubscribe(&self) {
        self.handle.abort();
    }
}

impl Stream for LiveView {
    type Item = AggregateEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

struct MergeState {
    page: StatusFilter,
    settings: Settings,
    merged: Vec<RequestRecord>,
    departments: BTreeSet<String>,
    delivered: HashSet<SourceType>,
    source_count: usize,
}

impl MergeState {
    fn new(page: StatusFilter, settings: Settings, source_count: usize) -> Self {
        Self {
            page,
            settings,
            merged: Vec::new(),
            departments: BTreeSet::new(),
            delivered: HashSet::new(),
            source_count,
        }
    }

    fn apply(&mut self, source: SourceType, delivery: Result<Snapshot, StoreError>) -> AggregateEvent {
        let snapshot = match delivery {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%source, error = %error, "request source failed");
                return AggregateEvent::SourceError { source, error };
            }
        };
        debug!(%source, size = snapshot.len(), status = self.page.as_str(), "snapshot received");

        self.replace_partition(source, snapshot);
        self.delivered.insert(source);

        let today = Local::now().date_naive();
        AggregateEvent::Update(AggregateUpdate {
            requests: apply_filters(&self.merged, &self.page, &self.settings, today),
            departments: self.departments.clone(),
            remaining_initial_loads: self.source_count.saturating_sub(self.delivered.len()),
        })
    }

    /// Swap out one source's slice of the merged set. The other source is untouched.
    fn replace_partition(&mut self, source: SourceType, snapshot: Snapshot) {
        self.merged.retain(|r| r.source_type != source);

        let mut seen = HashSet::new();
        for doc in snapshot {
            if !seen.insert(doc.id.clone()) {
                continue;
            }
            let record = doc.into_record(source);
            if let Some(department) = record.department.as_deref().filter(|d| !d.is_empty()) {
                self.departments.insert(department.to_string());
            }
            self.merged.push(record);
        }
    }
}

/// `MM/YYYY` token the date strings are matched against.
pub fn month_token(today: NaiveDate) -> String {
    format!("{:02}/{}", today.month(), today.year())
}

/// Client-side filters, applied in order: current month, approved type, department.
pub fn apply_filters(
    records: &[RequestRecord],
    page: &StatusFilter,
    settings: &Settings,
    today: NaiveDate,
) -> Vec<RequestRecord> {
    let month = settings.filter_current_month.then(|| month_token(today));
    let approved_type = if page.is_page(RequestStatus::Approved) {
        settings.approved_filter_type.source_type()
    } else {
        None
    };
    let department = settings.department_filter();

    records
        .iter()
        .filter(|r| match &month {
            Some(token) => {
                let ends = |d: &Option<String>| d.as_deref().is_some_and(|d| d.ends_with(token.as_str()));
                ends(&r.start_date) || ends(&r.end_date)
            }
            None => true,
        })
        .filter(|r| approved_type.is_none_or(|t| r.source_type == t))
        .filter(|r| department.is_none_or(|d| r.department.as_deref() == Some(d)))
        .cloned()
        .collect()
}
