pub mod api_key;
pub mod permission;
pub mod session;
pub mod user;
