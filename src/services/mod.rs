pub mod fingerprint;
pub use fingerprint::DeviceFingerprint;

pub mod password;
pub use password::{CredentialError, CredentialVerifier};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, UserInfo, UserPage};
pub use auth_service_impl::SeaOrmAuthService;

pub mod permission_service;
pub mod permission_service_impl;
pub use permission_service::{PermissionService, Principal, is_authorized};
pub use permission_service_impl::SeaOrmPermissionService;

pub mod api_key_service;
pub mod api_key_service_impl;
pub use api_key_service::{ApiKeyInfo, ApiKeyService};
pub use api_key_service_impl::SeaOrmApiKeyService;

pub mod bootstrap;
pub use bootstrap::ensure_default_admin;
