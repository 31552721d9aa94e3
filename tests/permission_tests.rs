use chrono::{Duration, Utc};
use mediamirror::config::SecurityConfig;
use mediamirror::db::Store;
use mediamirror::services::{
    ApiKeyService, AuthError, AuthService, PermissionService, Principal, SeaOrmApiKeyService,
    SeaOrmAuthService, SeaOrmPermissionService,
};
use std::sync::Arc;
use uuid::Uuid;

struct Services {
    store: Store,
    auth: SeaOrmAuthService,
    api_keys: Arc<dyn ApiKeyService>,
    permissions: SeaOrmPermissionService,
}

async fn setup() -> Services {
    let path = std::env::temp_dir().join(format!("mediamirror-perm-{}.db", Uuid::new_v4()));
    let store = Store::new(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open test database");

    let security = SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
        ..SecurityConfig::default()
    };

    let auth = SeaOrmAuthService::new(store.clone(), &security).unwrap();
    let api_keys: Arc<dyn ApiKeyService> = Arc::new(SeaOrmApiKeyService::new(store.clone()));
    let permissions = SeaOrmPermissionService::new(store.clone(), api_keys.clone());

    Services {
        store,
        auth,
        api_keys,
        permissions,
    }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| (*k).to_string()).collect()
}

#[tokio::test]
async fn test_default_permissions_are_seeded() {
    let svc = setup().await;

    let all = svc.permissions.list_permissions().await.unwrap();
    let registered: Vec<&str> = all.iter().map(|p| p.key.as_str()).collect();

    for key in ["admin", "view-users", "modify-users", "manage-users", "view-logs"] {
        assert!(registered.contains(&key), "missing seeded permission {key}");
    }
    assert!(svc.store.is_fresh_schema());
}

#[tokio::test]
async fn test_create_permission_validates_and_rejects_duplicates() {
    let svc = setup().await;

    let created = svc
        .permissions
        .create_permission("view-reports", "Read the reports panel")
        .await
        .unwrap();
    assert_eq!(created.key, "view-reports");

    let fetched = svc.permissions.get_permission("view-reports").await.unwrap();
    assert_eq!(fetched.unwrap().description, "Read the reports panel");
    assert!(
        svc.permissions
            .get_permission("view-nothing")
            .await
            .unwrap()
            .is_none()
    );

    let err = svc
        .permissions
        .create_permission("view-reports", "again")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicateKey(_)));

    let too_long = "a".repeat(61);
    for bad in ["View-Reports", "view_reports", "view reports", "views2", too_long.as_str()] {
        let err = svc.permissions.create_permission(bad, "x").await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidKeyFormat(_)),
            "{bad} should be rejected"
        );
    }

    assert!(
        svc.permissions
            .create_permission(&"a".repeat(60), "longest allowed")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_grant_batch_is_all_or_nothing() {
    let svc = setup().await;
    let user = svc.auth.create_user("alice", "Secr3t!").await.unwrap();

    let err = svc
        .permissions
        .add_user_permissions(user.id, &keys(&["view-logs", "does-not-exist"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingPermission(key) if key == "does-not-exist"));
    assert!(svc.auth.user_permissions(user.id).await.unwrap().is_empty());

    svc.permissions
        .add_user_permissions(user.id, &keys(&["view-logs"]))
        .await
        .unwrap();

    let err = svc
        .permissions
        .add_user_permissions(user.id, &keys(&["view-users", "view-logs"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicatePermission(key) if key == "view-logs"));
    assert_eq!(
        svc.auth.user_permissions(user.id).await.unwrap(),
        vec!["view-logs"]
    );

    let err = svc
        .permissions
        .add_user_permissions(Uuid::new_v4(), &keys(&["view-logs"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingUser(_)));
}

#[tokio::test]
async fn test_repeated_key_in_one_batch_is_rejected() {
    let svc = setup().await;
    let user = svc.auth.create_user("alice", "Secr3t!").await.unwrap();

    let err = svc
        .permissions
        .add_user_permissions(user.id, &keys(&["view-logs", "view-logs"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicatePermission(_)));
    assert!(svc.auth.user_permissions(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_revoke_batch_is_all_or_nothing() {
    let svc = setup().await;
    let user = svc.auth.create_user("alice", "Secr3t!").await.unwrap();

    svc.permissions
        .add_user_permissions(user.id, &keys(&["view-logs", "view-users"]))
        .await
        .unwrap();

    let err = svc
        .permissions
        .delete_user_permissions(user.id, &keys(&["view-logs", "manage-users"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingPermission(_)));
    assert_eq!(svc.auth.user_permissions(user.id).await.unwrap().len(), 2);

    svc.permissions
        .delete_user_permissions(user.id, &keys(&["view-logs"]))
        .await
        .unwrap();
    assert_eq!(
        svc.auth.user_permissions(user.id).await.unwrap(),
        vec!["view-users"]
    );
}

#[tokio::test]
async fn test_check_follows_grants_and_admin() {
    let svc = setup().await;
    let alice = svc.auth.create_user("alice", "Secr3t!").await.unwrap();
    let root = svc.auth.create_user("root", "Secr3t!").await.unwrap();
    let alice_p = Principal::User(alice.id);
    let root_p = Principal::User(root.id);

    // No grants at all: everything is denied, even an empty requirement
    assert!(!svc.permissions.check(&[], &alice_p).await.unwrap());
    assert!(!svc.permissions.check(&["view-logs"], &alice_p).await.unwrap());

    svc.permissions
        .add_user_permissions(alice.id, &keys(&["view-logs"]))
        .await
        .unwrap();

    assert!(svc.permissions.check(&["view-logs"], &alice_p).await.unwrap());
    assert!(svc.permissions.check(&[], &alice_p).await.unwrap());
    assert!(
        !svc.permissions
            .check(&["view-logs", "view-users"], &alice_p)
            .await
            .unwrap()
    );

    svc.permissions
        .add_user_permissions(root.id, &keys(&["admin"]))
        .await
        .unwrap();
    assert!(
        svc.permissions
            .check(&["view-logs", "manage-plugins"], &root_p)
            .await
            .unwrap()
    );

    svc.permissions
        .delete_user_permissions(alice.id, &keys(&["view-logs"]))
        .await
        .unwrap();
    assert!(!svc.permissions.check(&["view-logs"], &alice_p).await.unwrap());
}

#[tokio::test]
async fn test_api_key_acts_with_owner_grants() {
    let svc = setup().await;
    let user = svc.auth.create_user("alice", "Secr3t!").await.unwrap();
    svc.permissions
        .add_user_permissions(user.id, &keys(&["view-users"]))
        .await
        .unwrap();

    let issued = svc.api_keys.create_api_key(user.id, None).await.unwrap();
    let key = issued.key.to_string();

    assert!(svc.api_keys.check_valid(&key).await.unwrap());
    assert_eq!(svc.api_keys.owner(&key).await.unwrap(), Some(user.id));
    assert_eq!(
        svc.api_keys.permissions_for(&key).await.unwrap(),
        vec!["view-users"]
    );

    let principal = Principal::ApiKey(key.clone());
    assert!(svc.permissions.check(&["view-users"], &principal).await.unwrap());
    assert!(!svc.permissions.check(&["admin"], &principal).await.unwrap());

    let listed = svc.api_keys.list_api_keys(user.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(svc.api_keys.delete_api_key(&key).await.unwrap());
    assert!(!svc.api_keys.delete_api_key(&key).await.unwrap());
    assert!(!svc.api_keys.check_valid(&key).await.unwrap());
    assert!(!svc.permissions.check(&["view-users"], &principal).await.unwrap());
}

#[tokio::test]
async fn test_expired_api_key_is_rejected_and_evicted() {
    let svc = setup().await;
    let user = svc.auth.create_user("alice", "Secr3t!").await.unwrap();
    svc.permissions
        .add_user_permissions(user.id, &keys(&["admin"]))
        .await
        .unwrap();

    let expired = svc
        .api_keys
        .create_api_key(user.id, Some(Utc::now() - Duration::minutes(1)))
        .await
        .unwrap();
    let key = expired.key.to_string();

    assert!(svc.api_keys.permissions_for(&key).await.unwrap().is_empty());
    assert_eq!(svc.api_keys.owner(&key).await.unwrap(), None);

    assert!(!svc.api_keys.check_valid(&key).await.unwrap());
    assert!(svc.store.get_api_key(expired.key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_api_keys_are_invalid() {
    let svc = setup().await;

    assert!(!svc.api_keys.check_valid("not-a-uuid").await.unwrap());
    assert!(
        !svc.api_keys
            .check_valid(&Uuid::new_v4().to_string())
            .await
            .unwrap()
    );
    assert!(svc.api_keys.permissions_for("not-a-uuid").await.unwrap().is_empty());

    let err = svc
        .api_keys
        .create_api_key(Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingUser(_)));
}

#[tokio::test]
async fn test_alice_can_view_logs_but_not_manage_users() {
    let svc = setup().await;

    // Seeded by the initial schema, so registering it again is a duplicate
    let err = svc
        .permissions
        .create_permission("view-logs", "Access the logs panel")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicateKey(_)));
    assert!(svc.permissions.get_permission("view-logs").await.unwrap().is_some());

    let alice = svc.auth.create_user("alice", "Secr3t!").await.unwrap();
    assert_eq!(
        svc.auth.check_credentials("alice", "Secr3t!").await.unwrap(),
        alice.id
    );

    svc.permissions
        .add_user_permissions(alice.id, &keys(&["view-logs"]))
        .await
        .unwrap();

    let principal = Principal::User(alice.id);
    assert!(svc.permissions.check(&["view-logs"], &principal).await.unwrap());
    assert!(!svc.permissions.check(&["manage-users"], &principal).await.unwrap());
}
