use crate::session::dashboard::{DashboardSession, SessionDeps};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Live dashboard sessions keyed by anonymous uid.
///
/// Idle sessions are evicted; dropping the last handle tears down its subscription.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<String, Arc<DashboardSession>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(idle)
            .build();
        Self { sessions, deps }
    }

    /// Mint a fresh anonymous identity with its own session.
    pub async fn sign_in(&self) -> Arc<DashboardSession> {
        let uid = Uuid::new_v4().to_string();
        let session = DashboardSession::open(uid.clone(), &self.deps).await;
        self.sessions.insert(uid, session.clone()).await;
        session
    }

    pub async fn get(&self, uid: &str) -> Option<Arc<DashboardSession>> {
        self.sessions.get(uid).await
    }

    pub async fn sign_out(&self, uid: &str) {
        self.sessions.invalidate(uid).await;
        info!(uid, "dashboard session closed");
    }
}
