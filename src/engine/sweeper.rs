//! Session expiry sweeper
//!
//! Runs as a background task that periodically terminates active sessions
//! whose auto-delete deadline has passed. Disabled unless
//! `sessions.sweep_enabled` is set.

use chrono::Utc;
use tokio::time::{interval, Duration};

use super::EngineResult;
use crate::api::metrics::record_session_nuked;
use crate::config::SessionsConfig;
use crate::db::{format_timestamp, terminate_expired_sessions, Store};

pub struct SessionSweeper {
    store: Store,
}

impl SessionSweeper {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run a single sweep; returns the number of sessions terminated
    pub async fn run_sweep(&self) -> EngineResult<u64> {
        let pool = self.store.pool()?;
        let now = format_timestamp(Utc::now());
        let terminated = terminate_expired_sessions(pool, &now).await?;

        if terminated > 0 {
            record_session_nuked("expired", terminated);
            tracing::info!(terminated = terminated, "Terminated expired browse sessions");
        } else {
            tracing::debug!("No expired browse sessions");
        }
        Ok(terminated)
    }
}

/// Spawn the background sweeper task
pub fn spawn_sweeper_task(store: Store, config: SessionsConfig) {
    if !config.sweep_enabled {
        tracing::info!("Session expiry sweeper is disabled");
        return;
    }
    if !store.is_available() {
        tracing::warn!("Session expiry sweeper needs a database, not starting");
        return;
    }

    let interval_secs = config.sweep_interval_seconds.max(1);
    tracing::info!(interval_secs = interval_secs, "Starting session expiry sweeper");

    let sweeper = SessionSweeper::new(store);
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = sweeper.run_sweep().await {
                tracing::error!(error = %e, "Session sweep failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_test_user, find_browse_session, insert_browse_session, memory_store, test_session,
        SessionStatus, SubscriptionTier,
    };

    #[tokio::test]
    async fn test_sweep_terminates_only_expired_sessions() {
        let store = memory_store().await;
        let pool = store.pool().unwrap();
        let user = create_test_user(pool, "yan@example.com", SubscriptionTier::Free).await;

        let past = format_timestamp(Utc::now() - chrono::Duration::minutes(5));
        let future = format_timestamp(Utc::now() + chrono::Duration::minutes(5));
        let mut expired = test_session(&user.id, &past);
        expired.auto_delete_at = Some(past.clone());
        let mut live = test_session(&user.id, &past);
        live.auto_delete_at = Some(future);
        insert_browse_session(pool, &expired).await.unwrap();
        insert_browse_session(pool, &live).await.unwrap();

        let sweeper = SessionSweeper::new(store.clone());
        assert_eq!(sweeper.run_sweep().await.unwrap(), 1);
        assert_eq!(sweeper.run_sweep().await.unwrap(), 0);

        let swept = find_browse_session(pool, &expired.id).await.unwrap().unwrap();
        assert_eq!(swept.status, SessionStatus::Terminated);
        assert!(swept.deleted_at.is_some());
        let kept = find_browse_session(pool, &live.id).await.unwrap().unwrap();
        assert_eq!(kept.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_sweep_without_store_fails() {
        let sweeper = SessionSweeper::new(Store::unavailable());
        assert!(sweeper.run_sweep().await.is_err());
    }
}
