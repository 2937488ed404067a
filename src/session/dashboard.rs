use crate::engine::aggregator::{AggregateEvent, LiveAggregator, LiveView};
use crate::engine::executor::{ActionError, ActionExecutor};
use crate::engine::projector::{layout_for, project, Layout, RequestCard};
use crate::model::action::{ActionEntry, ActionState, AdminAction};
use crate::model::request::{RequestRecord, SourceType, StatusFilter};
use crate::model::settings::{Settings, SettingsPatch};
use crate::store::kv::{load_settings, save_settings, KeyValueStore};
use crate::store::{CollectionMap, DocumentStore, StoreError};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use strum::IntoEnumIterator;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn DocumentStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub collections: CollectionMap,
    /// Written to `decisionBy` on approve/reject.
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceErrorView {
    pub source_type: SourceType,
    pub message: String,
}

/// What the dashboard renders, rebuilt on every change.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[schema(example = "pending")]
    pub page: String,
    pub layout: Layout,
    pub requests: Vec<RequestCard>,
    pub departments: Vec<String>,
    /// Still waiting for the first delivery of a source.
    pub loading: bool,
    /// Loaded, nothing to show.
    pub empty: bool,
    pub errors: Vec<SourceErrorView>,
    pub actions: Vec<ActionEntry>,
}

struct SessionState {
    aggregator: LiveAggregator,
    generation: u64,
    page: StatusFilter,
    settings: Settings,
    merged: Vec<RequestRecord>,
    departments: BTreeSet<String>,
    remaining_initial_loads: usize,
    errors: BTreeMap<SourceType, String>,
    actions: BTreeMap<(SourceType, String), ActionEntry>,
}

impl SessionState {
    fn view(&self, now: DateTime<Utc>) -> ViewState {
        let requests = project(&self.merged, &self.page, now);
        let loading = self.remaining_initial_loads > 0 && self.errors.is_empty();
        ViewState {
            page: self.page.as_str().to_string(),
            layout: layout_for(&self.page, &self.settings),
            empty: !loading && requests.is_empty(),
            requests,
            departments: self.departments.iter().cloned().collect(),
            loading,
            errors: self
                .errors
                .iter()
                .map(|(source_type, message)| SourceErrorView {
                    source_type: *source_type,
                    message: message.clone(),
                })
                .collect(),
            actions: self.actions.values().cloned().collect(),
        }
    }
}

fn describe(error: &StoreError) -> String {
    match error {
        StoreError::MissingIndex { .. } => {
            "A server-side index is required for this query. Create it and reload.".to_string()
        }
        other => format!("Error loading data: {other}"),
    }
}

/// Successful actions are dropped once their request has left the view.
/// Failures stay until the next action on the same request.
fn forget_settled(state: &mut SessionState) {
    let SessionState { actions, merged, .. } = state;
    actions.retain(|(source, id), entry| {
        entry.state != ActionState::Succeeded || merged.iter().any(|r| r.matches_key(id, *source))
    });
}

/// Per-admin dashboard context: settings, the live subscription, the current view
/// and in-flight actions.
pub struct DashboardSession {
    uid: String,
    actor: String,
    kv: Arc<dyn KeyValueStore>,
    executor: ActionExecutor,
    state: Mutex<SessionState>,
    view: watch::Sender<ViewState>,
}

impl DashboardSession {
    /// Load settings and open the default `pending` page.
    pub async fn open(uid: String, deps: &SessionDeps) -> Arc<Self> {
        let settings = load_settings(deps.kv.as_ref()).await;
        let page = StatusFilter::default();

        let state = SessionState {
            aggregator: LiveAggregator::new(deps.store.clone(), deps.collections.clone()),
            generation: 0,
            page: page.clone(),
            settings,
            merged: Vec::new(),
            departments: BTreeSet::new(),
            remaining_initial_loads: SourceType::iter().count(),
            errors: BTreeMap::new(),
            actions: BTreeMap::new(),
        };
        let (view, _) = watch::channel(state.view(Utc::now()));

        let session = Arc::new(Self {
            uid,
            actor: deps.actor.clone(),
            kv: deps.kv.clone(),
            executor: ActionExecutor::new(deps.store.clone(), deps.collections.clone()),
            state: Mutex::new(state),
            view,
        });
        info!(uid = %session.uid, "dashboard session opened");
        session.open_page(page);
        session
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn page(&self) -> StatusFilter {
        self.lock().page.clone()
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    /// Switch the page: the previous subscription is torn down before the new one
    /// is established, and its late events are ignored.
    pub fn open_page(self: &Arc<Self>, page: StatusFilter) {
        let (generation, live) = {
            let mut state = self.lock();
            let settings = state.settings.clone();
            let live = state.aggregator.subscribe(page.clone(), settings);

            state.generation += 1;
            state.page = page;
            state.merged.clear();
            state.departments.clear();
            state.errors.clear();
            state.remaining_initial_loads = SourceType::iter().count();
            self.publish(&state);
            (state.generation, live)
        };
        self.drive(generation, live);
    }

    pub async fn update_settings(self: &Arc<Self>, patch: SettingsPatch) -> Settings {
        let (settings, change) = {
            let mut state = self.lock();
            let change = patch.apply(&mut state.settings);
            (state.settings.clone(), change)
        };

        if let Err(e) = save_settings(self.kv.as_ref(), &settings).await {
            warn!(uid = %self.uid, error = %e, "failed to save settings");
        }

        if change.refilter {
            let page = self.page();
            self.open_page(page);
        } else if change.relayout {
            let state = self.lock();
            self.publish(&state);
        }
        settings
    }

    /// Run one admin action with optimistic state: `Pending` while in flight,
    /// then `Succeeded` or `Failed`.
    pub async fn perform(&self, id: &str, source_type: SourceType, action: AdminAction) -> Result<(), ActionError> {
        let key = (source_type, id.to_string());
        {
            let mut state = self.lock();
            if state
                .actions
                .get(&key)
                .is_some_and(|entry| entry.state.control_disabled())
            {
                return Err(ActionError::InFlight { id: id.to_string() });
            }

            // the store re-checks requests that are not in view
            if action == AdminAction::Delete {
                let permission = state
                    .merged
                    .iter()
                    .find(|r| r.matches_key(id, source_type))
                    .map(|r| r.delete_permission(Utc::now()));
                if let Some(permission) = permission.filter(|p| !p.is_allowed()) {
                    return Err(ActionError::Locked {
                        id: id.to_string(),
                        permission,
                    });
                }
            }

            state.actions.insert(
                key.clone(),
                ActionEntry {
                    id: id.to_string(),
                    source_type,
                    action,
                    state: ActionState::Pending,
                },
            );
            self.publish(&state);
        }

        let result = self.executor.execute(id, source_type, action, &self.actor).await;

        let mut state = self.lock();
        let outcome = match &result {
            Ok(()) => ActionState::Succeeded,
            Err(e) => ActionState::Failed { reason: e.to_string() },
        };
        if let Some(entry) = state.actions.get_mut(&key) {
            entry.state = outcome;
        }
        forget_settled(&mut state);
        self.publish(&state);
        result
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &SessionState) {
        self.view.send_replace(state.view(Utc::now()));
    }

    fn drive(self: &Arc<Self>, generation: u64, mut live: LiveView) {
        let session = Arc::downgrade(self);
        actix_web::rt::spawn(async move {
            while let Some(event) = live.next().await {
                let current = session
                    .upgrade()
                    .is_some_and(|session| session.apply(generation, event));
                if !current {
                    live.unsubscribe();
                    break;
                }
            }
            debug!(generation, "view driver stopped");
        });
    }

    /// Fold one engine event into the view. `false` once `generation` is stale.
    fn apply(&self, generation: u64, event: AggregateEvent) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }

        match event {
            AggregateEvent::Update(update) => {
                state.merged = update.requests;
                state.departments = update.departments;
                state.remaining_initial_loads = update.remaining_initial_loads;
                forget_settled(&mut state);
            }
            AggregateEvent::SourceError { source, error } => {
                state.errors.insert(source, describe(&error));
            }
        }
        self.publish(&state);
        true
    }
}
