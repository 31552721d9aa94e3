pub use super::api_keys::Entity as ApiKeys;
pub use super::permissions::Entity as Permissions;
pub use super::user_permissions::Entity as UserPermissions;
pub use super::user_sessions::Entity as UserSessions;
pub use super::users::Entity as Users;
