use anyhow::{Result, bail};
use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use tower_sessions::cookie::{Cookie, SameSite};

use crate::config::SessionConfig;

/// What the HTTP boundary should do with the session cookie after a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    Set {
        id: String,
        expires: DateTime<Utc>,
    },
    Clear,
    None,
}

pub fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => bail!("Unknown SameSite value '{other}', expected strict, lax or none"),
    }
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl CookieSettings {
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            name: config.cookie_name.clone(),
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            secure: config.secure,
            http_only: config.http_only,
            same_site: parse_same_site(&config.same_site)?,
        })
    }

    /// Session id presented in the `Cookie` header, if any.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.name && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
    }

    fn base(&self, value: String) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), value))
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site);

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }

        builder.build()
    }

    /// `Set-Cookie` value for a directive, `None` when nothing is to be sent.
    #[must_use]
    pub fn render(&self, directive: &CookieDirective) -> Option<HeaderValue> {
        let cookie = match directive {
            CookieDirective::None => return None,
            CookieDirective::Set { id, expires } => {
                let mut cookie = self.base(id.clone());
                if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires.timestamp()) {
                    cookie.set_expires(expires);
                }
                cookie
            }
            CookieDirective::Clear => {
                let mut cookie = self.base(String::new());
                cookie.make_removal();
                cookie
            }
        };

        HeaderValue::from_str(&cookie.to_string()).ok()
    }
}
