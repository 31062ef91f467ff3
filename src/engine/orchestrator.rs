//! Browsing session lifecycle: scan, start, nuke, end, list.
//!
//! A session is created `active` and moves exactly once to a terminal status.
//! Every transition is a conditional update on `status = 'active'`, so two
//! racing callers cannot both succeed.

use chrono::Utc;
use serde::Deserialize;

use super::classifier::{classify, Verdict};
use super::{EngineError, EngineResult};
use crate::api::metrics::{record_session_nuked, record_session_started, record_threat_detected};
use crate::db::{
    close_browse_session, find_browse_session, find_settings, format_timestamp,
    insert_browse_session, insert_threat, list_browse_sessions, BrowseSession, SessionStatus,
    Store, Threat, User, UserSettings,
};

/// Longest URL accepted for scanning or browsing
pub const MAX_URL_LENGTH: usize = 2048;

/// VPN identity captured by the client at connect time
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnSnapshot {
    pub ip: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub verdict: Verdict,
    pub auto_delete_at: Option<String>,
}

/// Result of a nuke request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NukeOutcome {
    Nuked,
    /// The session was already deleted; nothing changed
    AlreadyDeleted,
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_url(url: &str) -> EngineResult<()> {
    if url.trim().is_empty() {
        return Err(EngineError::Validation("URL is required".to_string()));
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(EngineError::Validation(format!(
            "URL is too long (max {} characters)",
            MAX_URL_LENGTH
        )));
    }

    let parsed = reqwest::Url::parse(url)
        .map_err(|e| EngineError::Validation(format!("Invalid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(EngineError::Validation(
            "URL must use http or https".to_string(),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(EngineError::Validation("URL must include a host".to_string()));
    }
    Ok(())
}

pub struct SessionOrchestrator {
    store: Store,
}

impl SessionOrchestrator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Verdict for a URL without creating a session
    pub fn scan(&self, url: &str) -> EngineResult<Verdict> {
        validate_url(url)?;
        Ok(classify(url))
    }

    pub async fn start(
        &self,
        user: &User,
        url: &str,
        vpn: Option<VpnSnapshot>,
    ) -> EngineResult<StartedSession> {
        validate_url(url)?;
        let pool = self.store.pool()?;

        let verdict = classify(url);
        let settings = find_settings(pool, &user.id)
            .await?
            .unwrap_or_else(|| UserSettings::defaults(&user.id));

        let now = Utc::now();
        let auto_delete_at = settings
            .auto_delete_after()
            .map(|after| format_timestamp(now + after));
        let started_at = format_timestamp(now);
        let vpn = vpn.unwrap_or_default();
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());

        let session = BrowseSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            url: url.to_string(),
            vpn_ip: non_empty(vpn.ip),
            vpn_location: non_empty(vpn.city),
            vpn_country: non_empty(vpn.country),
            vpn_latitude: vpn.latitude,
            vpn_longitude: vpn.longitude,
            threat_level: verdict.level,
            threat_details: verdict
                .details()
                .and_then(|d| serde_json::to_string(&d).ok()),
            status: SessionStatus::Active,
            auto_delete_at: auto_delete_at.clone(),
            started_at: started_at.clone(),
            ended_at: None,
            deleted_at: None,
        };
        insert_browse_session(pool, &session).await?;

        if let Some(rule) = verdict.rule {
            let threat = Threat {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session.id.clone(),
                threat_type: rule.threat_type.to_string(),
                description: rule.description.to_string(),
                confidence: i64::from(rule.confidence),
                blocked: true,
                detected_at: started_at,
            };
            insert_threat(pool, &threat).await?;
            record_threat_detected(rule.threat_type);
        }

        record_session_started(verdict.level.as_str());
        tracing::info!(
            session_id = %session.id,
            user_id = %user.id,
            threat_level = verdict.level.as_str(),
            "Browse session started"
        );

        Ok(StartedSession {
            session_id: session.id,
            verdict,
            auto_delete_at,
        })
    }

    /// Logically delete a session the caller owns.
    ///
    /// Re-nuking a deleted session is a no-op. Sessions that ended any other
    /// way cannot be nuked.
    pub async fn nuke(&self, user: &User, session_id: &str) -> EngineResult<NukeOutcome> {
        let session = self.owned_session(user, session_id).await?;
        match session.status {
            SessionStatus::Deleted => return Ok(NukeOutcome::AlreadyDeleted),
            SessionStatus::Completed | SessionStatus::Terminated => {
                return Err(EngineError::InvalidState(format!(
                    "Session is already {}",
                    session.status
                )))
            }
            SessionStatus::Active => {}
        }

        let pool = self.store.pool()?;
        let now = format_timestamp(Utc::now());
        if close_browse_session(pool, session_id, SessionStatus::Deleted, &now).await? == 0 {
            // Lost a race with another transition
            return match self.current_status(session_id).await? {
                Some(SessionStatus::Deleted) => Ok(NukeOutcome::AlreadyDeleted),
                Some(status) => Err(EngineError::InvalidState(format!(
                    "Session is already {}",
                    status
                ))),
                None => Err(EngineError::NotFound("Session")),
            };
        }

        record_session_nuked("user", 1);
        tracing::info!(session_id = %session_id, user_id = %user.id, "Browse session nuked");
        Ok(NukeOutcome::Nuked)
    }

    /// Close an active session normally
    pub async fn end(&self, user: &User, session_id: &str) -> EngineResult<()> {
        let session = self.owned_session(user, session_id).await?;
        if session.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "Session is already {}",
                session.status
            )));
        }

        let pool = self.store.pool()?;
        let now = format_timestamp(Utc::now());
        if close_browse_session(pool, session_id, SessionStatus::Completed, &now).await? == 0 {
            return Err(EngineError::InvalidState(
                "Session is no longer active".to_string(),
            ));
        }

        tracing::info!(session_id = %session_id, user_id = %user.id, "Browse session ended");
        Ok(())
    }

    /// The caller's sessions, newest first
    pub async fn list(&self, user: &User) -> EngineResult<Vec<BrowseSession>> {
        let pool = self.store.pool()?;
        Ok(list_browse_sessions(pool, &user.id).await?)
    }

    /// Load a session and check the caller owns it
    pub async fn owned_session(&self, user: &User, session_id: &str) -> EngineResult<BrowseSession> {
        let pool = self.store.pool()?;
        let session = find_browse_session(pool, session_id)
            .await?
            .ok_or(EngineError::NotFound("Session"))?;
        if session.user_id != user.id {
            tracing::warn!(
                session_id = %session_id,
                user_id = %user.id,
                "Rejected access to another user's session"
            );
            return Err(EngineError::Unauthorized(
                "You do not own this session".to_string(),
            ));
        }
        Ok(session)
    }

    async fn current_status(&self, session_id: &str) -> EngineResult<Option<SessionStatus>> {
        let pool = self.store.pool()?;
        Ok(find_browse_session(pool, session_id).await?.map(|s| s.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        count_threats_for_user, create_test_user, get_or_create_settings, memory_store,
        parse_timestamp, upsert_settings, SubscriptionTier, ThreatLevel,
    };

    async fn setup() -> (SessionOrchestrator, User, Store) {
        let store = memory_store().await;
        let user = create_test_user(store.pool().unwrap(), "pat@example.com", SubscriptionTier::Free).await;
        (SessionOrchestrator::new(store.clone()), user, store)
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("https://example.com/path?q=1").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());
        for bad in ["", "   ", "example.com", "ftp://example.com", "javascript:alert(1)", "https://"] {
            assert!(
                matches!(validate_url(bad), Err(EngineError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(validate_url(&long).is_err());
    }

    #[tokio::test]
    async fn test_start_safe_session_with_default_deadline() {
        let (orchestrator, user, store) = setup().await;
        let before = Utc::now();

        let vpn = VpnSnapshot {
            ip: "10.0.0.1".to_string(),
            city: "Amsterdam".to_string(),
            country: "Netherlands".to_string(),
            latitude: Some("52.3676".to_string()),
            longitude: None,
        };
        let started = orchestrator
            .start(&user, "https://example.com/", Some(vpn))
            .await
            .unwrap();
        assert!(started.verdict.is_safe());

        let deadline = parse_timestamp(started.auto_delete_at.as_deref().unwrap()).unwrap();
        let expected = before + chrono::Duration::minutes(30);
        assert!((deadline - expected).num_seconds().abs() <= 5);

        let session = find_browse_session(store.pool().unwrap(), &started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.vpn_location.as_deref(), Some("Amsterdam"));
        assert_eq!(session.vpn_latitude.as_deref(), Some("52.3676"));
        assert!(session.threat_details.is_none());
    }

    #[tokio::test]
    async fn test_start_without_auto_delete_has_no_deadline() {
        let (orchestrator, user, store) = setup().await;
        let pool = store.pool().unwrap();
        let mut settings = get_or_create_settings(pool, &user.id).await.unwrap();
        settings.auto_delete_sessions = false;
        upsert_settings(pool, &settings).await.unwrap();

        let started = orchestrator.start(&user, "https://example.com/", None).await.unwrap();
        assert!(started.auto_delete_at.is_none());
    }

    #[tokio::test]
    async fn test_dangerous_start_logs_threat() {
        let (orchestrator, user, store) = setup().await;
        let started = orchestrator
            .start(&user, "https://bit.ly/x?eval(1)", None)
            .await
            .unwrap();
        assert_eq!(started.verdict.level, ThreatLevel::Danger);

        let pool = store.pool().unwrap();
        assert_eq!(count_threats_for_user(pool, &user.id).await.unwrap(), 1);
        let session = find_browse_session(pool, &started.session_id).await.unwrap().unwrap();
        let details = session.threat_details().unwrap();
        assert_eq!(details.threat_type, "Suspicious JavaScript");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_storage() {
        let orchestrator = SessionOrchestrator::new(Store::unavailable());
        let user = User::system();
        assert!(matches!(
            orchestrator.start(&user, "not a url", None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            orchestrator.start(&user, "https://example.com", None).await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_nuke_twice_is_noop() {
        let (orchestrator, user, store) = setup().await;
        let started = orchestrator.start(&user, "https://example.com/", None).await.unwrap();

        assert_eq!(
            orchestrator.nuke(&user, &started.session_id).await.unwrap(),
            NukeOutcome::Nuked
        );
        let first = find_browse_session(store.pool().unwrap(), &started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, SessionStatus::Deleted);
        assert!(first.deleted_at.is_some());

        assert_eq!(
            orchestrator.nuke(&user, &started.session_id).await.unwrap(),
            NukeOutcome::AlreadyDeleted
        );
        let second = find_browse_session(store.pool().unwrap(), &started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.deleted_at, second.deleted_at);
    }

    #[tokio::test]
    async fn test_nuke_by_other_user_is_unauthorized() {
        let (orchestrator, owner, store) = setup().await;
        let intruder =
            create_test_user(store.pool().unwrap(), "quinn@example.com", SubscriptionTier::Pro).await;
        let started = orchestrator.start(&owner, "https://example.com/", None).await.unwrap();

        assert!(matches!(
            orchestrator.nuke(&intruder, &started.session_id).await,
            Err(EngineError::Unauthorized(_))
        ));
        let session = find_browse_session(store.pool().unwrap(), &started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_nuke_unknown_session_is_not_found() {
        let (orchestrator, user, _store) = setup().await;
        assert!(matches!(
            orchestrator.nuke(&user, "missing").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ended_session_cannot_be_nuked_or_ended_again() {
        let (orchestrator, user, store) = setup().await;
        let started = orchestrator.start(&user, "https://example.com/", None).await.unwrap();

        orchestrator.end(&user, &started.session_id).await.unwrap();
        let session = find_browse_session(store.pool().unwrap(), &started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());

        assert!(matches!(
            orchestrator.nuke(&user, &started.session_id).await,
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            orchestrator.end(&user, &started.session_id).await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_nukes_transition_once() {
        let (orchestrator, user, _store) = setup().await;
        let started = orchestrator.start(&user, "https://example.com/", None).await.unwrap();

        let (a, b) = tokio::join!(
            orchestrator.nuke(&user, &started.session_id),
            orchestrator.nuke(&user, &started.session_id)
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == NukeOutcome::Nuked).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_list_only_returns_callers_sessions() {
        let (orchestrator, user, store) = setup().await;
        let other = create_test_user(store.pool().unwrap(), "rae@example.com", SubscriptionTier::Free).await;
        orchestrator.start(&user, "https://a.example/", None).await.unwrap();
        orchestrator.start(&user, "https://b.example/", None).await.unwrap();
        orchestrator.start(&other, "https://c.example/", None).await.unwrap();

        let listed = orchestrator.list(&user).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].url, "https://b.example/");
    }
}
