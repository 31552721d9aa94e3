use chrono::{Duration, Utc};
use mediamirror::config::SessionConfig;
use mediamirror::db::Store;
use mediamirror::entities::user_sessions;
use mediamirror::services::DeviceFingerprint;
use mediamirror::session::{
    CookieDirective, RequestMeta, SessionCodec, SessionError, SessionState, SessionStore,
};
use uuid::Uuid;

const FIREFOX: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

async fn test_store() -> Store {
    let path = std::env::temp_dir().join(format!("mediamirror-session-{}.db", Uuid::new_v4()));
    Store::new(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open test database")
}

fn codec(store: &Store, config: &SessionConfig) -> SessionCodec {
    SessionCodec::new(store.session_store(), config)
}

fn meta<'a>(user_agent: &'a str, cookie: Option<&'a str>) -> RequestMeta<'a> {
    RequestMeta {
        client_address: "192.0.2.10",
        user_agent: Some(user_agent),
        session_cookie: cookie,
    }
}

async fn logged_in_cookie(codec: &SessionCodec, user_id: Uuid) -> String {
    let mut session = codec.open(meta(FIREFOX, None)).await;
    session.login(user_id, "alice").unwrap();

    match codec.save(&session, "/auth/login").await {
        CookieDirective::Set { id, .. } => id,
        other => panic!("expected a Set directive, got {other:?}"),
    }
}

#[tokio::test]
async fn test_anonymous_session_is_never_persisted() {
    let store = test_store().await;
    let codec = codec(&store, &SessionConfig::default());

    let session = codec.open(meta(FIREFOX, None)).await;
    assert_eq!(session.opened_as(), SessionState::NoCookiePresented);
    assert!(!session.is_persisted());
    assert_eq!(session.id().len(), 64);

    assert_eq!(codec.save(&session, "/").await, CookieDirective::Clear);

    let sessions = store.session_store();
    assert!(sessions.get(session.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_persists_and_restores_session() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let id = logged_in_cookie(&codec, user.id).await;

    let row = store.session_store().get(&id).await.unwrap().unwrap();
    assert_eq!(row.user_id, user.id);
    assert!(row.expires_at.unwrap() > Utc::now() + Duration::days(30));

    let restored = codec.open(meta(FIREFOX, Some(&id))).await;
    assert_eq!(restored.opened_as(), SessionState::Restored);
    assert!(restored.is_persisted());
    assert_eq!(restored.id(), id);
    assert_eq!(restored.user_id(), Some(user.id));
    assert_eq!(restored.username().as_deref(), Some("alice"));

    match codec.save(&restored, "/").await {
        CookieDirective::Set { id: again, .. } => assert_eq!(again, id),
        other => panic!("expected refresh, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_from_other_device_is_discarded() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let id = logged_in_cookie(&codec, user.id).await;

    let session = codec.open(meta(SAFARI_IPHONE, Some(&id))).await;
    assert_eq!(session.opened_as(), SessionState::DeviceMismatch);
    assert_ne!(session.id(), id);
    assert_eq!(session.user_id(), None);

    assert!(store.session_store().get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_address_is_ignored_unless_bound() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();

    let loose = codec(&store, &SessionConfig::default());
    let id = logged_in_cookie(&loose, user.id).await;

    let moved = RequestMeta {
        client_address: "198.51.100.7",
        ..meta(FIREFOX, Some(&id))
    };
    assert_eq!(loose.open(moved).await.opened_as(), SessionState::Restored);

    let strict = codec(
        &store,
        &SessionConfig {
            bind_client_address: true,
            ..SessionConfig::default()
        },
    );
    let id = logged_in_cookie(&strict, user.id).await;
    let moved = RequestMeta {
        client_address: "198.51.100.7",
        ..meta(FIREFOX, Some(&id))
    };
    assert_eq!(
        strict.open(moved).await.opened_as(),
        SessionState::DeviceMismatch
    );
}

#[tokio::test]
async fn test_unknown_cookie_yields_fresh_session() {
    let store = test_store().await;
    let codec = codec(&store, &SessionConfig::default());

    let session = codec.open(meta(FIREFOX, Some("deadbeef"))).await;
    assert_eq!(session.opened_as(), SessionState::AnonymousFresh);
    assert_ne!(session.id(), "deadbeef");
}

#[tokio::test]
async fn test_expired_session_is_deleted() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());
    let sessions = store.session_store();

    let device = DeviceFingerprint::new(false).compute("192.0.2.10", Some(FIREFOX));
    sessions
        .insert(user_sessions::Model {
            id: "stale".to_string(),
            device_identifier: device,
            created_at: Utc::now() - Duration::days(40),
            expires_at: Some(Utc::now() - Duration::days(1)),
            user_id: user.id,
            data: Some(serde_json::json!({ "user_id": user.id })),
        })
        .await
        .unwrap();

    let session = codec.open(meta(FIREFOX, Some("stale"))).await;
    assert_eq!(session.opened_as(), SessionState::Expired);
    assert_eq!(session.user_id(), None);
    assert!(sessions.get("stale").await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_deletes_row_and_clears_cookie() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let id = logged_in_cookie(&codec, user.id).await;

    let mut session = codec.open(meta(FIREFOX, Some(&id))).await;
    session.clear();
    assert_eq!(session.state(), SessionState::Removed);

    assert_eq!(codec.save(&session, "/auth/logout").await, CookieDirective::Clear);
    assert!(store.session_store().get(&id).await.unwrap().is_none());

    let after = codec.open(meta(FIREFOX, Some(&id))).await;
    assert_eq!(after.opened_as(), SessionState::AnonymousFresh);
}

#[tokio::test]
async fn test_deleting_user_invalidates_sessions() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let id = logged_in_cookie(&codec, user.id).await;
    store.delete_user(user.id).await.unwrap();

    let session = codec.open(meta(FIREFOX, Some(&id))).await;
    assert_eq!(session.opened_as(), SessionState::AnonymousFresh);
}

#[tokio::test]
async fn test_login_as_other_user_follows_new_owner() {
    let store = test_store().await;
    let alice = store.create_user("alice", "x".to_string()).await.unwrap();
    let bob = store.create_user("bob", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let alice_id = logged_in_cookie(&codec, alice.id).await;

    let mut session = codec.open(meta(FIREFOX, Some(&alice_id))).await;
    assert_eq!(session.user_id(), Some(alice.id));
    session.login(bob.id, "bob").unwrap();

    let bob_id = match codec.save(&session, "/auth/login").await {
        CookieDirective::Set { id, .. } => id,
        other => panic!("expected a Set directive, got {other:?}"),
    };
    assert_ne!(bob_id, alice_id);

    let sessions = store.session_store();
    assert!(sessions.get(&alice_id).await.unwrap().is_none());
    let row = sessions.get(&bob_id).await.unwrap().unwrap();
    assert_eq!(row.user_id, bob.id);

    store.delete_user(bob.id).await.unwrap();

    for id in [&alice_id, &bob_id] {
        let session = codec.open(meta(FIREFOX, Some(id))).await;
        assert_eq!(session.opened_as(), SessionState::AnonymousFresh);
        assert_eq!(session.user_id(), None);
    }
}

#[tokio::test]
async fn test_excluded_paths_get_no_cookie() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(&store, &SessionConfig::default());

    let id = logged_in_cookie(&codec, user.id).await;
    let session = codec.open(meta(FIREFOX, Some(&id))).await;

    assert!(!codec.should_set_cookie(&session, "/static/app.js"));
    assert_eq!(
        codec.save(&session, "/static/app.js").await,
        CookieDirective::None
    );
}

#[tokio::test]
async fn test_unmodified_session_without_refresh_keeps_cookie() {
    let store = test_store().await;
    let user = store.create_user("alice", "x".to_string()).await.unwrap();
    let codec = codec(
        &store,
        &SessionConfig {
            refresh_each_request: false,
            ..SessionConfig::default()
        },
    );

    let id = logged_in_cookie(&codec, user.id).await;
    let session = codec.open(meta(FIREFOX, Some(&id))).await;

    assert!(!session.is_modified());
    assert_eq!(codec.save(&session, "/").await, CookieDirective::None);
}

#[tokio::test]
async fn test_payload_bound_is_enforced() {
    let store = test_store().await;
    let codec = codec(
        &store,
        &SessionConfig {
            max_data_bytes: 128,
            ..SessionConfig::default()
        },
    );

    let mut session = codec.open(meta(FIREFOX, None)).await;
    session.insert("theme", "dark").unwrap();

    let err = session.insert("blob", "x".repeat(200)).unwrap_err();
    assert!(matches!(err, SessionError::PayloadTooLarge { limit: 128, .. }));
    assert_eq!(session.get::<String>("theme").as_deref(), Some("dark"));
    assert_eq!(session.get::<String>("blob"), None);
}
