//! Cookie-backed user sessions.
//!
//! A [`UserSession`] is the per-request working copy. [`SessionCodec`] opens it
//! from the presented cookie and decides on save whether a row is written and
//! which cookie instruction goes back to the client. Anonymous sessions are
//! never persisted: a row exists only once the payload carries a user id.

pub mod codec;
pub mod cookie;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::constants::session::{USERNAME_KEY, USER_ID_KEY};
use crate::entities::user_sessions;

pub use codec::{RequestMeta, SessionCodec, new_session_id, resolve};
pub use cookie::{CookieDirective, CookieSettings};

/// Durable session rows. Errors are reported, the codec decides how to degrade.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<user_sessions::Model>>;

    async fn insert(&self, record: user_sessions::Model) -> Result<()>;

    /// Returns false when the row no longer exists.
    async fn update(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
        data: Value,
    ) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Session value could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoCookiePresented,
    AnonymousFresh,
    Restored,
    Expired,
    DeviceMismatch,
    Removed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCookiePresented => "no_cookie",
            Self::AnonymousFresh => "anonymous",
            Self::Restored => "restored",
            Self::Expired => "expired",
            Self::DeviceMismatch => "device_mismatch",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    id: String,
    state: SessionState,
    /// How `open` classified the presented cookie.
    opened_as: SessionState,
    persisted: bool,
    modified: bool,
    /// Stored row this session replaces once saved under a new id.
    rotated_from: Option<String>,
    device_identifier: String,
    data: BTreeMap<String, Value>,
    max_bytes: usize,
}

impl UserSession {
    pub(crate) fn anonymous(
        id: String,
        opened_as: SessionState,
        device_identifier: String,
        max_bytes: usize,
    ) -> Self {
        Self {
            id,
            state: SessionState::AnonymousFresh,
            opened_as,
            persisted: false,
            modified: false,
            rotated_from: None,
            device_identifier,
            data: BTreeMap::new(),
            max_bytes,
        }
    }

    pub(crate) fn restored(
        record: user_sessions::Model,
        device_identifier: String,
        max_bytes: usize,
    ) -> Self {
        let data = match record.data {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        Self {
            id: record.id,
            state: SessionState::Restored,
            opened_as: SessionState::Restored,
            persisted: true,
            modified: false,
            rotated_from: None,
            device_identifier,
            data,
            max_bytes,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn opened_as(&self) -> SessionState {
        self.opened_as
    }

    /// Whether a stored row backs this session.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    #[must_use]
    pub fn rotated_from(&self) -> Option<&str> {
        self.rotated_from.as_deref()
    }

    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn device_identifier(&self) -> &str {
        &self.device_identifier
    }

    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Store a value. The payload is left untouched if the result would exceed
    /// the configured size bound.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let previous = self.data.insert(key.to_string(), value);

        let size = self.encoded_len()?;
        if size > self.max_bytes {
            match previous {
                Some(previous) => self.data.insert(key.to_string(), previous),
                None => self.data.remove(key),
            };
            return Err(SessionError::PayloadTooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        self.modified = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Drop the whole payload. On save the row is deleted and the cookie cleared.
    pub fn clear(&mut self) {
        self.data.clear();
        self.modified = true;
        self.state = SessionState::Removed;
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.get(USER_ID_KEY)
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.get(USERNAME_KEY)
    }

    /// Bind the session to an authenticated user.
    ///
    /// Switching a stored session to a different user drops the previous
    /// payload and detaches it from its row, so the next save deletes that row
    /// and persists the session under a new id.
    pub fn login(&mut self, user_id: Uuid, username: &str) -> Result<(), SessionError> {
        if self.persisted && self.user_id().is_some_and(|current| current != user_id) {
            self.data.clear();
            self.rotated_from = Some(self.id.clone());
            self.persisted = false;
        }

        self.insert(USER_ID_KEY, user_id)?;
        self.insert(USERNAME_KEY, username)
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    fn encoded_len(&self) -> Result<usize, SessionError> {
        Ok(serde_json::to_vec(&self.data)?.len())
    }
}
