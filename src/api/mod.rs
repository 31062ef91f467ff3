mod analytics;
pub mod auth;
mod browse;
mod chat;
pub mod error;
pub mod metrics;
pub mod rate_limit;
mod rpc;
mod settings;
mod subscription;
mod validation;
mod vpn;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Procedures live under `/api/rpc/<namespace>.<procedure>`; queries are
/// GET, mutations are POST with a JSON body.
pub fn create_router(state: Arc<AppState>) -> Router {
    let rpc_routes = Router::new()
        // Auth
        .route("/auth.me", get(auth::me))
        .route("/auth.logout", post(auth::logout))
        // Settings
        .route("/settings.get", get(settings::get_settings))
        .route("/settings.update", post(settings::update_settings))
        // VPN
        .route("/vpn.locations", get(vpn::list_locations))
        .route("/vpn.connect", post(vpn::connect))
        // Browse
        .route("/browse.scan", post(browse::scan))
        .route("/browse.start", post(browse::start))
        .route("/browse.nuke", post(browse::nuke))
        .route("/browse.end", post(browse::end))
        .route("/browse.sessions", get(browse::list_sessions))
        // Chat
        .route("/chat.messages", get(chat::list_messages))
        // Analytics
        .route("/analytics.stats", get(analytics::stats))
        // Subscription
        .route("/subscription.createPayment", post(subscription::create_payment))
        .route("/subscription.confirmPayment", post(subscription::confirm_payment))
        .route("/subscription.payments", get(subscription::list_payments))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    // Login gets the stricter auth budget
    let login_routes = Router::new()
        .route("/auth.login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Each send is an upstream completion call
    let chat_routes = Router::new()
        .route("/chat.send", post(chat::send_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_chat,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/rpc", rpc_routes.merge(login_routes).merge(chat_routes))
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{memory_store, Store};
    use crate::llm::scripted::ScriptedClient;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const PASSWORD: &str = "blue-kettle-84";

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
    }

    impl TestApp {
        async fn new() -> Self {
            Self::with_state(crate::test_state(memory_store().await))
        }

        fn with_state(state: Arc<AppState>) -> Self {
            Self {
                router: create_router(state.clone()),
                state,
            }
        }

        fn admin_token(&self) -> String {
            self.state.config.auth.admin_token.clone()
        }

        async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, HeaderMap, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(value) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(serde_json::to_vec(&value).unwrap())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, headers, value)
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            let (status, _, body) = self.request(Method::GET, uri, token, None).await;
            (status, body)
        }

        async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            let (status, _, body) = self.request(Method::POST, uri, token, Some(body)).await;
            (status, body)
        }

        async fn login(&self, email: &str) -> String {
            let (status, body) = self
                .post("/api/rpc/auth.login", None, json!({"email": email, "password": PASSWORD}))
                .await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            body["token"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_first_login_creates_account_and_sets_cookie() {
        let app = TestApp::new().await;
        let (status, headers, body) = app
            .request(
                Method::POST,
                "/api/rpc/auth.login",
                None,
                Some(json!({"email": "Ada@Example.com", "password": PASSWORD, "name": "Ada"})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert_eq!(body["user"]["name"], "Ada");
        assert_eq!(body["user"]["role"], "user");
        assert_eq!(body["user"]["subscriptionTier"], "free");

        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        let token = body["token"].as_str().unwrap();
        assert!(cookie.starts_with(&format!("shieldd_session={}", token)));
        assert!(cookie.contains("HttpOnly"));

        let (status, me) = app.get("/api/rpc/auth.me", Some(token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_cookie_authenticates() {
        let app = TestApp::new().await;
        let token = app.login("cal@example.com").await;

        let request = Request::get("/api/rpc/auth.me")
            .header(header::COOKIE, format!("shieldd_session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let me: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(me["email"], "cal@example.com");
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password_and_weak_password() {
        let app = TestApp::new().await;
        app.login("bea@example.com").await;

        let (status, body) = app
            .post(
                "/api/rpc/auth.login",
                None,
                json!({"email": "bea@example.com", "password": "wrong-kettle-84"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, body) = app
            .post(
                "/api/rpc/auth.login",
                None,
                json!({"email": "new@example.com", "password": "short"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_owner_email_becomes_admin() {
        let mut config = Config::default();
        config.auth.owner_email = Some("Owner@Example.com".to_string());
        let state = Arc::new(AppState::new(
            config,
            memory_store().await,
            Arc::new(crate::llm::DisabledClient),
        ));
        let app = TestApp::with_state(state);

        let (status, body) = app
            .post("/api/rpc/auth.login", None, json!({"email": "owner@example.com", "password": PASSWORD}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "admin");
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let app = TestApp::new().await;
        let token = app.login("dev@example.com").await;

        let (status, headers, body) = app
            .request(Method::POST, "/api/rpc/auth.logout", Some(&token), Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("shieldd_session="));

        let (_, me) = app.get("/api/rpc/auth.me", Some(&token)).await;
        assert_eq!(me, Value::Null);
        let (status, _) = app.get("/api/rpc/browse.sessions", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_procedures_require_auth() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/rpc/browse.sessions", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = app.get("/api/rpc/settings.get", Some("bogus")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, me) = app.get("/api/rpc/auth.me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, Value::Null);
    }

    #[tokio::test]
    async fn test_browse_lifecycle() {
        let app = TestApp::new().await;
        let token = app.login("eve@example.com").await;
        let token = Some(token.as_str());

        let (status, vpn) = app.post("/api/rpc/vpn.connect", token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(vpn["ip"].is_string());
        assert!(vpn["latency"].is_i64());

        let (status, started) = app
            .post(
                "/api/rpc/browse.start",
                token,
                json!({"url": "https://bit.ly/abc", "vpn": {"ip": vpn["ip"], "city": vpn["city"], "country": vpn["country"]}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["threatLevel"], "danger");
        assert_eq!(started["threatDetails"]["type"], "URL Shortener");
        assert!(started["autoDeleteAt"].is_string());
        let session_id = started["sessionId"].as_str().unwrap().to_string();

        let (_, sessions) = app.get("/api/rpc/browse.sessions", token).await;
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        assert_eq!(sessions[0]["status"], "active");
        assert_eq!(sessions[0]["vpnIp"], vpn["ip"]);

        let (status, body) = app
            .post("/api/rpc/browse.nuke", token, json!({"sessionId": session_id}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        // Repeating the nuke is a no-op
        let (status, _) = app
            .post("/api/rpc/browse.nuke", token, json!({"sessionId": session_id}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .post("/api/rpc/browse.end", token, json!({"sessionId": session_id}))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");

        let (_, stats) = app.get("/api/rpc/analytics.stats", token).await;
        assert_eq!(stats["totalSessions"], 1);
        assert_eq!(stats["activeSessions"], 0);
        assert_eq!(stats["dangerousSessions"], 1);
        assert_eq!(stats["threatsDetected"], 1);
    }

    #[tokio::test]
    async fn test_foreign_session_is_forbidden() {
        let app = TestApp::new().await;
        let owner = app.login("fay@example.com").await;
        let other = app.login("gus@example.com").await;

        let (_, started) = app
            .post("/api/rpc/browse.start", Some(&owner), json!({"url": "https://example.com"}))
            .await;
        let session_id = started["sessionId"].as_str().unwrap();

        let (status, body) = app
            .post("/api/rpc/browse.nuke", Some(&other), json!({"sessionId": session_id}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");

        let (status, _) = app
            .get(&format!("/api/rpc/chat.messages?sessionId={}", session_id), Some(&other))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .post("/api/rpc/browse.nuke", Some(&other), json!({"sessionId": "does-not-exist"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Session not found");
    }

    #[tokio::test]
    async fn test_malformed_input_is_validation_error() {
        let app = TestApp::new().await;
        let token = app.login("hal@example.com").await;

        let (status, body) = app
            .post("/api/rpc/browse.start", Some(&token), json!({"link": "https://example.com"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, body) = app
            .post("/api/rpc/browse.scan", Some(&token), json!({"url": "javascript:alert(1)"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, _) = app
            .post("/api/rpc/settings.update", Some(&token), json!({"deleteAfterMinutes": 0}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post("/api/rpc/settings.update", Some(&token), json!({"unknownField": true}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.get("/api/rpc/chat.messages", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let app = TestApp::new().await;
        let token = app.login("ivy@example.com").await;

        let (_, defaults) = app.get("/api/rpc/settings.get", Some(&token)).await;
        assert_eq!(defaults["deleteAfterMinutes"], 30);
        assert_eq!(defaults["enableAiAssistant"], true);

        let (status, _) = app
            .post(
                "/api/rpc/settings.update",
                Some(&token),
                json!({"deleteAfterMinutes": 90, "threatSensitivity": "high", "preferredVpnCountry": "Japan"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, saved) = app.get("/api/rpc/settings.get", Some(&token)).await;
        assert_eq!(saved["deleteAfterMinutes"], 90);
        assert_eq!(saved["threatSensitivity"], "high");
        assert_eq!(saved["preferredVpnCountry"], "Japan");
        assert_eq!(saved["blockAds"], true);
    }

    #[tokio::test]
    async fn test_settings_get_creates_row_once() {
        let app = TestApp::new().await;
        let token = app.login("ida@example.com").await;

        let (status, first) = app.get("/api/rpc/settings.get", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = app.get("/api/rpc/settings.get", Some(&token)).await;
        assert_eq!(first["id"], second["id"]);

        let pool = app.state.store.pool().unwrap();
        let user_id = first["userId"].as_str().unwrap();
        let stored = crate::db::find_settings(pool, user_id).await.unwrap().unwrap();
        assert_eq!(Value::String(stored.id), first["id"]);
    }

    #[tokio::test]
    async fn test_free_user_sees_only_free_locations() {
        let app = TestApp::new().await;
        let token = app.login("jon@example.com").await;

        let (_, locations) = app.get("/api/rpc/vpn.locations", Some(&token)).await;
        let locations = locations.as_array().unwrap();
        assert!(!locations.is_empty());
        assert!(locations.iter().all(|l| l["isPro"] == false));
        assert!(locations.iter().all(|l| l.get("ipPool").is_none()));

        let (_, all) = app.get("/api/rpc/vpn.locations", Some(&app.admin_token())).await;
        assert!(all.as_array().unwrap().len() > locations.len());
    }

    #[tokio::test]
    async fn test_chat_send_and_history() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("Check the padlock.".to_string())]));
        let state = Arc::new(AppState::new(Config::default(), memory_store().await, client));
        let app = TestApp::with_state(state);
        let token = app.login("kim@example.com").await;

        let (_, started) = app
            .post("/api/rpc/browse.start", Some(&token), json!({"url": "https://example.com"}))
            .await;
        let session_id = started["sessionId"].as_str().unwrap();

        let (status, reply) = app
            .post(
                "/api/rpc/chat.send",
                Some(&token),
                json!({"sessionId": session_id, "message": "Is this site safe?"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply,
            json!({"userMessage": "Is this site safe?", "aiResponse": "Check the padlock.", "fallback": false})
        );

        // The script is exhausted, so the second turn falls back
        let (_, reply) = app
            .post(
                "/api/rpc/chat.send",
                Some(&token),
                json!({"sessionId": session_id, "message": "And now?"}),
            )
            .await;
        assert_eq!(reply["fallback"], true);
        assert_eq!(reply["aiResponse"], "I'm here to help you browse safely.");

        let (_, messages) = app
            .get(&format!("/api/rpc/chat.messages?sessionId={}", session_id), Some(&token))
            .await;
        let roles: Vec<&str> = messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_subscription_upgrade_unlocks_pro_locations() {
        let app = TestApp::new().await;
        let token = app.login("lea@example.com").await;
        let token = Some(token.as_str());

        let (status, body) = app
            .post("/api/rpc/subscription.createPayment", token, json!({"tier": "pro", "months": 13}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

        let (status, payment) = app
            .post("/api/rpc/subscription.createPayment", token, json!({"tier": "pro", "months": 2}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payment["amount"], 1998);
        assert_eq!(payment["currency"], "USD");

        let (status, _) = app
            .post(
                "/api/rpc/subscription.confirmPayment",
                token,
                json!({"paymentId": payment["paymentId"]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .post(
                "/api/rpc/subscription.confirmPayment",
                token,
                json!({"paymentId": payment["paymentId"]}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, me) = app.get("/api/rpc/auth.me", token).await;
        assert_eq!(me["subscriptionTier"], "pro");
        assert!(me["subscriptionExpiry"].is_string());

        let (_, locations) = app.get("/api/rpc/vpn.locations", token).await;
        assert!(locations.as_array().unwrap().iter().any(|l| l["isPro"] == true));

        let (_, payments) = app.get("/api/rpc/subscription.payments", token).await;
        assert_eq!(payments[0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_degraded_reads_without_store() {
        let app = TestApp::with_state(crate::test_state(Store::unavailable()));
        let admin = app.admin_token();
        let admin = Some(admin.as_str());

        let (status, me) = app.get("/api/rpc/auth.me", Some("user-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, Value::Null);

        let (status, sessions) = app.get("/api/rpc/browse.sessions", admin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions, json!([]));

        let (_, locations) = app.get("/api/rpc/vpn.locations", admin).await;
        assert_eq!(locations, json!([]));

        let (_, messages) = app.get("/api/rpc/chat.messages?sessionId=abc", admin).await;
        assert_eq!(messages, json!([]));

        let (_, settings) = app.get("/api/rpc/settings.get", admin).await;
        assert_eq!(settings["deleteAfterMinutes"], 30);

        let (_, stats) = app.get("/api/rpc/analytics.stats", admin).await;
        assert_eq!(stats["totalSessions"], 0);
        assert_eq!(stats["threatsDetected"], 0);

        let (status, body) = app
            .post("/api/rpc/browse.start", admin, json!({"url": "https://example.com"}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "service_unavailable");

        let (status, _) = app
            .post("/api/rpc/auth.login", None, json!({"email": "x@example.com", "password": PASSWORD}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        // Scanning touches no storage
        let (status, _) = app
            .post("/api/rpc/browse.scan", admin, json!({"url": "https://example.com"}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let mut config = Config::default();
        config.rate_limit.auth_requests_per_window = 2;
        let state = Arc::new(AppState::new(
            config,
            memory_store().await,
            Arc::new(crate::llm::DisabledClient),
        ));
        let app = TestApp::with_state(state);

        let attempt = json!({"email": "max@example.com", "password": "nope"});
        for _ in 0..2 {
            let (status, _) = app.post("/api/rpc/auth.login", None, attempt.clone()).await;
            assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
        }

        let (status, headers, body) = app
            .request(Method::POST, "/api/rpc/auth.login", None, Some(attempt))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "too_many_requests");
        assert!(headers.contains_key("retry-after"));

        // Other procedures keep their own budget
        let (status, _) = app.get("/api/rpc/auth.me", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
