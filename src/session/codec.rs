use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::cookie::CookieDirective;
use super::{SessionState, SessionStore, UserSession};
use crate::config::SessionConfig;
use crate::entities::user_sessions;
use crate::services::fingerprint::DeviceFingerprint;

/// Request metadata the codec needs from the HTTP boundary.
#[derive(Debug, Clone, Copy)]
pub struct RequestMeta<'a> {
    pub client_address: &'a str,
    pub user_agent: Option<&'a str>,
    pub session_cookie: Option<&'a str>,
}

/// Mint a session id: hex SHA-256 over the client address, user agent, the
/// current time and a random nonce.
#[must_use]
pub fn new_session_id(client_address: &str, user_agent: &str, now: DateTime<Utc>) -> String {
    let nonce: [u8; 16] = rand::rng().random();

    let mut hasher = Sha256::new();
    hasher.update(client_address.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(nonce);

    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Classify a presented cookie against what the store returned for it.
#[must_use]
pub fn resolve(
    presented: Option<&str>,
    stored: Option<&user_sessions::Model>,
    device_identifier: &str,
    now: DateTime<Utc>,
) -> SessionState {
    if presented.is_none() {
        return SessionState::NoCookiePresented;
    }

    let Some(stored) = stored else {
        return SessionState::AnonymousFresh;
    };

    if stored.expires_at.is_some_and(|expires| expires <= now) {
        SessionState::Expired
    } else if stored.device_identifier != device_identifier {
        SessionState::DeviceMismatch
    } else {
        SessionState::Restored
    }
}

pub struct SessionCodec {
    store: Arc<dyn SessionStore>,
    fingerprint: DeviceFingerprint,
    lifetime: Duration,
    refresh_each_request: bool,
    max_data_bytes: usize,
    no_cookie_paths: Vec<String>,
}

impl SessionCodec {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            fingerprint: DeviceFingerprint::new(config.bind_client_address),
            lifetime: Duration::days(config.lifetime_days),
            refresh_each_request: config.refresh_each_request,
            max_data_bytes: config.max_data_bytes,
            no_cookie_paths: config.no_cookie_paths.clone(),
        }
    }

    /// Resolve the working session for a request. Never fails: storage
    /// errors fall back to a fresh anonymous session.
    pub async fn open(&self, meta: RequestMeta<'_>) -> UserSession {
        let now = Utc::now();
        let device = self
            .fingerprint
            .compute(meta.client_address, meta.user_agent);

        let stored = match meta.session_cookie {
            Some(id) => match self.store.get(id).await {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Session lookup failed, continuing anonymously");
                    None
                }
            },
            None => None,
        };

        let state = resolve(meta.session_cookie, stored.as_ref(), &device, now);
        metrics::counter!("sessions_opened_total", "state" => state.as_str()).increment(1);

        match (state, stored) {
            (SessionState::Restored, Some(record)) => {
                debug!(session_id = %record.id, "Session restored");
                return UserSession::restored(record, device, self.max_data_bytes);
            }
            (SessionState::Expired | SessionState::DeviceMismatch, Some(record)) => {
                debug!(session_id = %record.id, %state, "Discarding stored session");
                if let Err(e) = self.store.delete(&record.id).await {
                    warn!(error = %e, session_id = %record.id, "Failed to delete stale session");
                }
            }
            _ => {}
        }

        let id = new_session_id(
            meta.client_address,
            meta.user_agent.unwrap_or_default(),
            now,
        );
        UserSession::anonymous(id, state, device, self.max_data_bytes)
    }

    /// Whether a response to `path` may carry the session cookie.
    #[must_use]
    pub fn should_set_cookie(&self, session: &UserSession, path: &str) -> bool {
        let excluded = self
            .no_cookie_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));

        !excluded && (session.is_modified() || self.refresh_each_request)
    }

    /// Persist the working session and report the cookie instruction.
    /// Storage errors are logged and yield [`CookieDirective::None`].
    pub async fn save(&self, session: &UserSession, path: &str) -> CookieDirective {
        if let Some(previous) = session.rotated_from() {
            debug!(session_id = %previous, "Session switched user, dropping previous row");
            if let Err(e) = self.store.delete(previous).await {
                warn!(error = %e, session_id = %previous, "Failed to delete session");
            }
        }

        if session.is_empty() && session.is_modified() {
            if session.is_persisted() {
                if let Err(e) = self.store.delete(session.id()).await {
                    warn!(error = %e, session_id = %session.id(), "Failed to delete session");
                }
            }
            record_save("cleared");
            return CookieDirective::Clear;
        }

        if !self.should_set_cookie(session, path) {
            return CookieDirective::None;
        }

        let now = Utc::now();
        let expires = now + self.lifetime;

        if session.is_persisted() {
            return match self
                .store
                .update(session.id(), Some(expires), session.to_json())
                .await
            {
                Ok(true) => {
                    record_save("updated");
                    CookieDirective::Set {
                        id: session.id().to_string(),
                        expires,
                    }
                }
                Ok(false) => {
                    debug!(session_id = %session.id(), "Session row vanished before save");
                    record_save("cleared");
                    CookieDirective::Clear
                }
                Err(e) => {
                    warn!(error = %e, session_id = %session.id(), "Failed to update session");
                    record_save("failed");
                    CookieDirective::None
                }
            };
        }

        let Some(user_id) = session.user_id() else {
            return CookieDirective::Clear;
        };

        // A session taken over by another user never reuses the old id
        let id = if session.rotated_from().is_some() {
            new_session_id(session.device_identifier(), "", now)
        } else {
            session.id().to_string()
        };

        let record = user_sessions::Model {
            id: id.clone(),
            device_identifier: session.device_identifier().to_string(),
            created_at: now,
            expires_at: Some(expires),
            user_id,
            data: Some(session.to_json()),
        };

        match self.store.insert(record).await {
            Ok(()) => {
                debug!(session_id = %id, %user_id, "Session persisted");
                record_save("inserted");
                CookieDirective::Set { id, expires }
            }
            Err(e) => {
                warn!(error = %e, session_id = %id, "Failed to insert session");
                record_save("failed");
                CookieDirective::None
            }
        }
    }
}

fn record_save(action: &'static str) {
    metrics::counter!("session_saves_total", "action" => action).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const OTHER_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, user_sessions::Model>>,
        fail: bool,
    }

    impl MemoryStore {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn row(&self, id: &str) -> Option<user_sessions::Model> {
            self.rows.lock().unwrap().get(id).cloned()
        }

        fn put(&self, record: user_sessions::Model) {
            self.rows.lock().unwrap().insert(record.id.clone(), record);
        }

        fn check(&self) -> Result<()> {
            if self.fail {
                Err(anyhow!("storage unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn get(&self, id: &str) -> Result<Option<user_sessions::Model>> {
            self.check()?;
            Ok(self.row(id))
        }

        async fn insert(&self, record: user_sessions::Model) -> Result<()> {
            self.check()?;
            self.put(record);
            Ok(())
        }

        async fn update(
            &self,
            id: &str,
            expires_at: Option<DateTime<Utc>>,
            data: serde_json::Value,
        ) -> Result<bool> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get_mut(id) else {
                return Ok(false);
            };
            row.expires_at = expires_at;
            row.data = Some(data);
            Ok(true)
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            self.check()?;
            Ok(self.rows.lock().unwrap().remove(id).is_some())
        }
    }

    fn codec(store: Arc<MemoryStore>) -> SessionCodec {
        SessionCodec::new(store, &SessionConfig::default())
    }

    fn meta<'a>(ua: &'a str, cookie: Option<&'a str>) -> RequestMeta<'a> {
        RequestMeta {
            client_address: "10.0.0.1",
            user_agent: Some(ua),
            session_cookie: cookie,
        }
    }

    fn stored(id: &str, device: &str, expires_at: Option<DateTime<Utc>>) -> user_sessions::Model {
        let user_id = Uuid::new_v4();
        user_sessions::Model {
            id: id.to_string(),
            device_identifier: device.to_string(),
            created_at: Utc::now(),
            expires_at,
            user_id,
            data: Some(serde_json::json!({ "user_id": user_id, "username": "alice" })),
        }
    }

    fn device(ua: &str) -> String {
        DeviceFingerprint::default().compute("10.0.0.1", Some(ua))
    }

    #[test]
    fn test_session_ids_are_unique_hex() {
        let now = Utc::now();
        let a = new_session_id("10.0.0.1", UA, now);
        let b = new_session_id("10.0.0.1", UA, now);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_classification() {
        let now = Utc::now();
        let row = stored("s", "dev", Some(now + Duration::days(1)));

        assert_eq!(resolve(None, None, "dev", now), SessionState::NoCookiePresented);
        assert_eq!(resolve(Some("s"), None, "dev", now), SessionState::AnonymousFresh);
        assert_eq!(resolve(Some("s"), Some(&row), "dev", now), SessionState::Restored);
        assert_eq!(
            resolve(Some("s"), Some(&row), "other", now),
            SessionState::DeviceMismatch
        );

        let expired = stored("s", "dev", Some(now - Duration::seconds(1)));
        assert_eq!(resolve(Some("s"), Some(&expired), "dev", now), SessionState::Expired);

        let no_expiry = stored("s", "dev", None);
        assert_eq!(resolve(Some("s"), Some(&no_expiry), "dev", now), SessionState::Restored);
    }

    #[tokio::test]
    async fn test_open_without_cookie_is_anonymous() {
        let store = Arc::new(MemoryStore::default());
        let session = codec(store.clone()).open(meta(UA, None)).await;

        assert_eq!(session.state(), SessionState::AnonymousFresh);
        assert_eq!(session.opened_as(), SessionState::NoCookiePresented);
        assert!(!session.is_persisted());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_cookie_is_not_reused() {
        let store = Arc::new(MemoryStore::default());
        let session = codec(store).open(meta(UA, Some("forged"))).await;

        assert_eq!(session.opened_as(), SessionState::AnonymousFresh);
        assert_ne!(session.id(), "forged");
    }

    #[tokio::test]
    async fn test_restore_matching_session() {
        let store = Arc::new(MemoryStore::default());
        let row = stored("live", &device(UA), Some(Utc::now() + Duration::days(1)));
        let user_id = row.user_id;
        store.put(row);

        let session = codec(store).open(meta(UA, Some("live"))).await;
        assert_eq!(session.state(), SessionState::Restored);
        assert_eq!(session.id(), "live");
        assert_eq!(session.user_id(), Some(user_id));
    }

    #[tokio::test]
    async fn test_device_mismatch_deletes_row() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored("live", &device(UA), None));

        let session = codec(store.clone()).open(meta(OTHER_UA, Some("live"))).await;
        assert_eq!(session.opened_as(), SessionState::DeviceMismatch);
        assert_eq!(session.state(), SessionState::AnonymousFresh);
        assert!(session.user_id().is_none());
        assert_ne!(session.id(), "live");
        assert!(store.row("live").is_none());
    }

    #[tokio::test]
    async fn test_expired_session_deleted() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored(
            "old",
            &device(UA),
            Some(Utc::now() - Duration::minutes(5)),
        ));

        let session = codec(store.clone()).open(meta(UA, Some("old"))).await;
        assert_eq!(session.opened_as(), SessionState::Expired);
        assert!(!session.is_persisted());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_open() {
        let store = Arc::new(MemoryStore::failing());
        let session = codec(store).open(meta(UA, Some("anything"))).await;
        assert_eq!(session.state(), SessionState::AnonymousFresh);
        assert!(session.user_id().is_none());
    }

    #[tokio::test]
    async fn test_anonymous_save_never_writes() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(store.clone());
        let session = codec.open(meta(UA, None)).await;

        assert_eq!(codec.save(&session, "/").await, CookieDirective::Clear);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_login_inserts_and_sets_cookie() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(store.clone());
        let mut session = codec.open(meta(UA, None)).await;
        let user_id = Uuid::new_v4();
        session.login(user_id, "alice").unwrap();

        let directive = codec.save(&session, "/auth/login").await;
        let CookieDirective::Set { id, expires } = directive else {
            panic!("expected a cookie to be set, got {directive:?}");
        };
        assert_eq!(id, session.id());
        assert!(expires > Utc::now() + Duration::days(30));

        let row = store.row(&id).unwrap();
        assert_eq!(row.user_id, user_id);
        assert_eq!(row.device_identifier, device(UA));

        // Next request with the cookie restores it.
        let restored = codec.open(meta(UA, Some(&id))).await;
        assert_eq!(restored.state(), SessionState::Restored);
        assert_eq!(restored.username().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_persisted_session_is_refreshed() {
        let store = Arc::new(MemoryStore::default());
        let soon = Utc::now() + Duration::hours(1);
        store.put(stored("live", &device(UA), Some(soon)));
        let codec = codec(store.clone());

        let session = codec.open(meta(UA, Some("live"))).await;
        let directive = codec.save(&session, "/").await;
        assert!(matches!(directive, CookieDirective::Set { ref id, .. } if id == "live"));
        assert!(store.row("live").unwrap().expires_at.unwrap() > soon);
    }

    #[tokio::test]
    async fn test_clear_deletes_row() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored("live", &device(UA), None));
        let codec = codec(store.clone());

        let mut session = codec.open(meta(UA, Some("live"))).await;
        session.clear();

        assert_eq!(codec.save(&session, "/auth/logout").await, CookieDirective::Clear);
        assert_eq!(session.state(), SessionState::Removed);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_no_cookie_paths_skip_save() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored("live", &device(UA), None));
        let codec = codec(store.clone());

        let session = codec.open(meta(UA, Some("live"))).await;
        assert!(!codec.should_set_cookie(&session, "/static/app.js"));
        assert_eq!(codec.save(&session, "/static/app.js").await, CookieDirective::None);
        assert!(store.row("live").unwrap().expires_at.is_none());
    }

    #[tokio::test]
    async fn test_unmodified_session_without_refresh() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored("live", &device(UA), None));
        let config = SessionConfig {
            refresh_each_request: false,
            ..SessionConfig::default()
        };
        let codec = SessionCodec::new(store, &config);

        let mut session = codec.open(meta(UA, Some("live"))).await;
        assert!(!codec.should_set_cookie(&session, "/"));

        session.insert("theme", "dark").unwrap();
        assert!(codec.should_set_cookie(&session, "/"));
    }

    #[tokio::test]
    async fn test_login_as_other_user_rotates_row() {
        let store = Arc::new(MemoryStore::default());
        store.put(stored("live", &device(UA), None));
        let codec = codec(store.clone());

        let mut session = codec.open(meta(UA, Some("live"))).await;
        let bob = Uuid::new_v4();
        session.login(bob, "bob").unwrap();

        let CookieDirective::Set { id, .. } = codec.save(&session, "/auth/login").await else {
            panic!("expected a fresh cookie");
        };
        assert_ne!(id, "live");
        assert!(store.row("live").is_none());
        assert_eq!(store.row(&id).unwrap().user_id, bob);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_sets_no_cookie() {
        let store = Arc::new(MemoryStore::failing());
        let codec = codec(store);
        let mut session = codec.open(meta(UA, None)).await;
        session.login(Uuid::new_v4(), "alice").unwrap();

        assert_eq!(codec.save(&session, "/").await, CookieDirective::None);
    }
}
