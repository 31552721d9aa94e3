pub mod prelude;

pub mod api_keys;
pub mod permissions;
pub mod user_permissions;
pub mod user_sessions;
pub mod users;
