//! Gateway session layer.
//!
//! Turns a single-use access token into an application-scoped standing
//! session carried by a cookie. Also mints the very short-lived, single-use
//! iframe tokens that embedded applications check once against the
//! gateway.
//!
//! Standing sessions and iframe tokens share one [`GatewayStore`] under
//! distinct key prefixes, so neither can be presented as the other.

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::auth::access_tokens::redeem_token;
use crate::auth::{AuthError, bounded, generate_token, hash_token};
use crate::clock::expires_after;
use store::{GatewayStore, MemoryGatewayStore, Retain};

/// Default standing gateway session lifetime: 2 hours.
pub const DEFAULT_GATEWAY_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Iframe validation token lifetime: 1 minute.
pub const IFRAME_TOKEN_TTL: Duration = Duration::from_secs(60);

/// How often the background sweeper drops expired records.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const SESSION_PREFIX: &str = "session:";
const IFRAME_PREFIX: &str = "iframe:";

/// Kind of gateway record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Cookie-backed session; authorizes every request for its app.
    Standing,
    /// Single-use iframe token. `used` flips on the first check.
    Iframe { used: bool },
}

/// One gateway record, scoped to a single application.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySession {
    pub user_id: String,
    pub app_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub kind: SessionKind,
}

impl GatewaySession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Why an iframe token was refused. Reasons stay coarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IframeRejection {
    NotFound,
    Expired,
    AppMismatch,
    AlreadyUsed,
}

impl IframeRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            IframeRejection::NotFound => "Session not found",
            IframeRejection::Expired => "Session expired",
            IframeRejection::AppMismatch => "App mismatch",
            IframeRejection::AlreadyUsed => "Session already used",
        }
    }
}

/// Outcome of checking an iframe token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IframeValidation {
    #[serde(rename_all = "camelCase")]
    Valid {
        valid: bool,
        user_id: String,
        app_id: String,
        expires_at: DateTime<Utc>,
    },
    Invalid { valid: bool, reason: &'static str },
}

impl IframeValidation {
    fn valid(session: &GatewaySession) -> Self {
        IframeValidation::Valid {
            valid: true,
            user_id: session.user_id.clone(),
            app_id: session.app_id.clone(),
            expires_at: session.expires_at,
        }
    }

    fn invalid(rejection: IframeRejection) -> Self {
        IframeValidation::Invalid {
            valid: false,
            reason: rejection.reason(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, IframeValidation::Valid { .. })
    }
}

fn check_iframe(
    session: &GatewaySession,
    app_id: &str,
    now: DateTime<Utc>,
) -> Result<(), IframeRejection> {
    match session.kind {
        SessionKind::Standing => Err(IframeRejection::NotFound),
        SessionKind::Iframe { used: true } => Err(IframeRejection::AlreadyUsed),
        SessionKind::Iframe { used: false } if session.is_expired_at(now) => {
            Err(IframeRejection::Expired)
        }
        SessionKind::Iframe { used: false } if session.app_id != app_id => {
            Err(IframeRejection::AppMismatch)
        }
        SessionKind::Iframe { used: false } => Ok(()),
    }
}

fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}{}", hash_token(token))
}

fn iframe_key(token: &str) -> String {
    format!("{IFRAME_PREFIX}{}", hash_token(token))
}

/// The gateway session layer over an injected [`GatewayStore`].
pub struct GatewaySessions {
    store: Arc<dyn GatewayStore>,
    session_ttl: Duration,
    iframe_ttl: Duration,
}

impl GatewaySessions {
    pub fn new(store: Arc<dyn GatewayStore>, session_ttl: Duration, iframe_ttl: Duration) -> Self {
        Self {
            store,
            session_ttl,
            iframe_ttl,
        }
    }

    /// In-process store with the default lifetimes.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryGatewayStore::new()),
            DEFAULT_GATEWAY_SESSION_TTL,
            IFRAME_TOKEN_TTL,
        )
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Create a standing session for `user_id` on `app_id`. Returns the
    /// opaque cookie value.
    pub async fn establish(&self, user_id: &str, app_id: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let token = generate_token();
        let session = GatewaySession {
            user_id: user_id.to_string(),
            app_id: app_id.to_string(),
            created_at: now,
            expires_at: expires_after(now, self.session_ttl),
            kind: SessionKind::Standing,
        };
        self.store.put(session_key(&token), session).await?;
        info!(user_id, app_id, "gateway session established");
        Ok(token)
    }

    /// Redeem an access token for `app_id` and establish a standing session
    /// from it. The redemption runs under `limit`; exceeding it denies.
    pub async fn launch(
        &self,
        pool: &SqlitePool,
        access_token: &str,
        app_id: &str,
        limit: Duration,
    ) -> Result<String, AuthError> {
        let redemption = bounded(limit, redeem_token(pool, access_token, app_id)).await?;
        self.establish(&redemption.user_id, &redemption.app_id).await
    }

    /// The standing session behind `cookie`, if it is live and scoped to
    /// `app_id`. Expired records are dropped on sight.
    pub async fn authorize(
        &self,
        cookie: &str,
        app_id: &str,
    ) -> Result<Option<GatewaySession>, AuthError> {
        let now = Utc::now();
        let before = self
            .store
            .modify(
                &session_key(cookie),
                Box::new(move |session: &mut GatewaySession| {
                    if session.is_expired_at(now) {
                        Retain::Remove
                    } else {
                        Retain::Keep
                    }
                }),
            )
            .await?;
        let session = match before {
            Some(s) if s.kind == SessionKind::Standing => s,
            _ => return Ok(None),
        };
        if session.is_expired_at(now) {
            debug!(app_id, "gateway session expired");
            return Ok(None);
        }
        if session.app_id != app_id {
            debug!(app_id, session_app = %session.app_id, "gateway session used for another app");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Slide the expiry of a live standing session for `app_id`. Returns
    /// whether the session was extended.
    pub async fn refresh(&self, cookie: &str, app_id: &str) -> Result<bool, AuthError> {
        let now = Utc::now();
        let new_expiry = expires_after(now, self.session_ttl);
        let expected_app = app_id.to_string();

        let before = self
            .store
            .modify(
                &session_key(cookie),
                Box::new(move |session: &mut GatewaySession| {
                    if session.is_expired_at(now) {
                        return Retain::Remove;
                    }
                    if session.kind == SessionKind::Standing && session.app_id == expected_app {
                        session.expires_at = new_expiry;
                    }
                    Retain::Keep
                }),
            )
            .await?;

        let refreshed = matches!(
            before,
            Some(ref s) if s.kind == SessionKind::Standing
                && s.app_id == app_id
                && !s.is_expired_at(now)
        );
        debug!(app_id, refreshed, "gateway session refresh");
        Ok(refreshed)
    }

    /// End the standing session behind `cookie`. Returns whether one
    /// existed.
    pub async fn revoke(&self, cookie: &str) -> Result<bool, AuthError> {
        Ok(self.store.delete(&session_key(cookie)).await?.is_some())
    }

    /// Mint a single-use iframe token for the application of `session`.
    pub async fn mint_iframe_token(&self, session: &GatewaySession) -> Result<String, AuthError> {
        let now = Utc::now();
        let token = generate_token();
        let record = GatewaySession {
            user_id: session.user_id.clone(),
            app_id: session.app_id.clone(),
            created_at: now,
            expires_at: expires_after(now, self.iframe_ttl),
            kind: SessionKind::Iframe { used: false },
        };
        self.store.put(iframe_key(&token), record).await?;
        debug!(user_id = %session.user_id, app_id = %session.app_id, "iframe token minted");
        Ok(token)
    }

    /// Check an iframe token for `app_id`. The first successful check marks
    /// it used; every later check is refused even inside its lifetime.
    pub async fn validate_iframe_token(
        &self,
        token: &str,
        app_id: &str,
    ) -> Result<IframeValidation, AuthError> {
        let now = Utc::now();
        let expected_app = app_id.to_string();

        let before = self
            .store
            .modify(
                &iframe_key(token),
                Box::new(move |session: &mut GatewaySession| {
                    match check_iframe(session, &expected_app, now) {
                        Ok(()) => {
                            session.kind = SessionKind::Iframe { used: true };
                            Retain::Keep
                        }
                        Err(IframeRejection::Expired) => Retain::Remove,
                        Err(_) => Retain::Keep,
                    }
                }),
            )
            .await?;

        let outcome = match before {
            None => IframeValidation::invalid(IframeRejection::NotFound),
            Some(session) => match check_iframe(&session, app_id, now) {
                Ok(()) => IframeValidation::valid(&session),
                Err(rejection) => IframeValidation::invalid(rejection),
            },
        };
        if let IframeValidation::Invalid { reason, .. } = &outcome {
            debug!(app_id, reason, "iframe token rejected");
        }
        Ok(outcome)
    }

    /// Drop expired records. Returns the count removed.
    pub async fn sweep(&self) -> Result<usize, AuthError> {
        let removed = self.store.sweep(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "expired gateway records swept");
        }
        Ok(removed)
    }

    /// Spawn a task that sweeps every `period` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = sessions.sweep().await {
                    warn!(error = %e, "gateway sweep failed");
                }
            }
        })
    }
}

impl Default for GatewaySessions {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::queries::register_application;
    use crate::auth::access_tokens::{DEFAULT_ACCESS_TOKEN_TTL, issue_token};
    use crate::auth::queries::create_user;
    use crate::auth::sessions::{DEFAULT_PORTAL_SESSION_TTL, create_session};
    use crate::db::{file_pool, memory_pool};
    use crate::models::apps::NewApplication;
    use crate::models::auth::NewUser;

    fn layer(session_ttl: Duration, iframe_ttl: Duration) -> GatewaySessions {
        GatewaySessions::new(Arc::new(MemoryGatewayStore::new()), session_ttl, iframe_ttl)
    }

    #[tokio::test]
    async fn established_session_is_scoped_to_its_app() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();

        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        assert_eq!(session.user_id, "u1");
        assert!(gw.authorize(&cookie, "app-b").await.unwrap().is_none());
        assert!(gw.authorize("garbage", "app-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_denied_and_dropped() {
        let gw = layer(Duration::from_millis(1), IFRAME_TOKEN_TTL);
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(gw.authorize(&cookie, "app-a").await.unwrap().is_none());
        assert_eq!(gw.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refresh_slides_expiry() {
        let gw = layer(Duration::from_millis(300), IFRAME_TOKEN_TTL);
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let before = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gw.refresh(&cookie, "app-a").await.unwrap());
        let after = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        assert!(after.expires_at > before.expires_at);
    }

    #[tokio::test]
    async fn refresh_rejects_wrong_app_and_unknown_cookie() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        assert!(!gw.refresh(&cookie, "app-b").await.unwrap());
        assert!(!gw.refresh("nope", "app-a").await.unwrap());
    }

    #[tokio::test]
    async fn refresh_of_expired_session_fails() {
        let gw = layer(Duration::from_millis(1), IFRAME_TOKEN_TTL);
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!gw.refresh(&cookie, "app-a").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_ends_session() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        assert!(gw.revoke(&cookie).await.unwrap());
        assert!(gw.authorize(&cookie, "app-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn iframe_token_validates_once() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        let token = gw.mint_iframe_token(&session).await.unwrap();

        let first = gw.validate_iframe_token(&token, "app-a").await.unwrap();
        assert!(first.is_valid());

        let second = gw.validate_iframe_token(&token, "app-a").await.unwrap();
        assert_eq!(
            second,
            IframeValidation::Invalid {
                valid: false,
                reason: "Session already used"
            }
        );
    }

    #[tokio::test]
    async fn iframe_token_reports_coarse_reasons() {
        let gw = layer(DEFAULT_GATEWAY_SESSION_TTL, Duration::from_millis(1));
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();

        let unknown = gw.validate_iframe_token("missing", "app-a").await.unwrap();
        assert_eq!(
            unknown,
            IframeValidation::Invalid {
                valid: false,
                reason: "Session not found"
            }
        );

        let expiring = gw.mint_iframe_token(&session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = gw.validate_iframe_token(&expiring, "app-a").await.unwrap();
        assert_eq!(
            expired,
            IframeValidation::Invalid {
                valid: false,
                reason: "Session expired"
            }
        );
    }

    #[tokio::test]
    async fn iframe_token_for_other_app_is_not_consumed() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        let token = gw.mint_iframe_token(&session).await.unwrap();

        let mismatch = gw.validate_iframe_token(&token, "app-b").await.unwrap();
        assert_eq!(
            mismatch,
            IframeValidation::Invalid {
                valid: false,
                reason: "App mismatch"
            }
        );
        assert!(gw.validate_iframe_token(&token, "app-a").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn cookie_and_iframe_namespaces_do_not_mix() {
        let gw = GatewaySessions::in_memory();
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        let iframe = gw.mint_iframe_token(&session).await.unwrap();

        assert!(gw.authorize(&iframe, "app-a").await.unwrap().is_none());
        assert!(!gw.validate_iframe_token(&cookie, "app-a").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn concurrent_iframe_checks_yield_one_success() {
        let gw = Arc::new(GatewaySessions::in_memory());
        let cookie = gw.establish("u1", "app-a").await.unwrap();
        let session = gw.authorize(&cookie, "app-a").await.unwrap().unwrap();
        let token = gw.mint_iframe_token(&session).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gw = Arc::clone(&gw);
                let token = token.clone();
                tokio::spawn(async move { gw.validate_iframe_token(&token, "app-a").await })
            })
            .collect();
        let mut valid = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_valid() {
                valid += 1;
            }
        }
        assert_eq!(valid, 1);
    }

    #[tokio::test]
    async fn sweep_removes_expired_records() {
        let gw = layer(Duration::from_millis(1), Duration::from_millis(1));
        gw.establish("u1", "app-a").await.unwrap();
        gw.establish("u2", "app-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gw.sweep().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweeper_task_runs() {
        let gw = Arc::new(layer(Duration::from_millis(1), IFRAME_TOKEN_TTL));
        gw.establish("u1", "app-a").await.unwrap();
        let handle = gw.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(gw.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn launch_consumes_access_token_once() {
        let pool = memory_pool().await.unwrap();
        let user = create_user(
            &pool,
            &NewUser {
                username: "alice".into(),
                password: "wonderland".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let app = register_application(&pool, &NewApplication::new(9001, "Analytics"))
            .await
            .unwrap();
        let portal = create_session(&pool, &user.id, DEFAULT_PORTAL_SESSION_TTL)
            .await
            .unwrap();
        let token = issue_token(&pool, &user.id, &app.id, &portal, DEFAULT_ACCESS_TOKEN_TTL)
            .await
            .unwrap();

        let gw = GatewaySessions::in_memory();
        let limit = Duration::from_secs(2);
        let cookie = gw.launch(&pool, &token, &app.id, limit).await.unwrap();
        let session = gw.authorize(&cookie, &app.id).await.unwrap().unwrap();
        assert_eq!(session.user_id, user.id);

        let replay = gw.launch(&pool, &token, &app.id, limit).await;
        assert!(matches!(replay, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_launches_establish_one_session() {
        let (_dir, pool) = file_pool(5).await;
        let user = create_user(
            &pool,
            &NewUser {
                username: "alice".into(),
                password: "wonderland".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let app = register_application(&pool, &NewApplication::new(9001, "Analytics"))
            .await
            .unwrap();
        let portal = create_session(&pool, &user.id, DEFAULT_PORTAL_SESSION_TTL)
            .await
            .unwrap();
        let token = issue_token(&pool, &user.id, &app.id, &portal, DEFAULT_ACCESS_TOKEN_TTL)
            .await
            .unwrap();

        let gw = Arc::new(GatewaySessions::in_memory());
        let launches: Vec<_> = (0..16)
            .map(|_| {
                let gw = Arc::clone(&gw);
                let pool = pool.clone();
                let token = token.clone();
                let app_id = app.id.clone();
                tokio::spawn(async move {
                    gw.launch(&pool, &token, &app_id, Duration::from_secs(10)).await
                })
            })
            .collect();
        let mut cookies = Vec::new();
        for handle in launches {
            match handle.await.unwrap() {
                Ok(cookie) => cookies.push(cookie),
                Err(AuthError::TokenInvalid) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(cookies.len(), 1);
    }
}
