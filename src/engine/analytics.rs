use serde::Serialize;

use super::EngineResult;
use crate::db::{count_browse_sessions, count_threats_for_user, Store, User};

/// Per-user dashboard counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub safe_sessions: i64,
    /// Danger and warning verdicts
    pub dangerous_sessions: i64,
    /// Threat log rows on the caller's own sessions
    pub threats_detected: i64,
}

pub struct AnalyticsAggregator {
    store: Store,
}

impl AnalyticsAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn stats(&self, user: &User) -> EngineResult<SessionStats> {
        let pool = self.store.pool()?;
        let counts = count_browse_sessions(pool, &user.id).await?;
        let threats_detected = count_threats_for_user(pool, &user.id).await?;
        Ok(SessionStats {
            total_sessions: counts.total,
            active_sessions: counts.active,
            safe_sessions: counts.safe,
            dangerous_sessions: counts.dangerous,
            threats_detected,
        })
    }
}
