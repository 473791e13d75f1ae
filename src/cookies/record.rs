//! Cookie representation used by the governance core.
//!
//! Modeled after Chromium's `net::CanonicalCookie`, reduced to the fields
//! party classification and retention actually consult. The whitelisted /
//! blacklisted / removed states are derived at classification time and never
//! stored on the cookie itself.

use crate::cookies::psl;
use crate::base::error::GuardError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A cookie as reported by the platform cookie collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Session cookie: no expiration, dies with the browsing session.
    pub session: bool,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub expires: Option<OffsetDateTime>,
}

impl CookieRecord {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        CookieRecord {
            name: name.into(),
            value: String::new(),
            domain: domain.into(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            session: true,
            expires: None,
        }
    }

    /// Root domain of this cookie (leading dot stripped, PSL-reduced).
    pub fn root_domain(&self) -> String {
        psl::prepare_root_domain(&self.domain)
    }

    /// Identity key used by list lookups and the temporary blacklist.
    pub fn key(&self) -> CookieKey {
        CookieKey {
            name: self.name.clone(),
            domain: self.root_domain(),
        }
    }

    /// URL to hand to the platform when removing this cookie: scheme chosen
    /// by the secure flag, leading dot stripped from the domain.
    pub fn removal_url(&self) -> String {
        let domain = self.domain.strip_prefix('.').unwrap_or(&self.domain);
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, domain, self.path)
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.expires {
            Some(expiry) => expiry < now,
            None => false,
        }
    }

    /// Parse a raw `Set-Cookie` line into a record, for embedders whose
    /// platform delivers header lines rather than structured cookies.
    pub fn from_set_cookie_line(line: &str, default_domain: &str) -> Result<Self, GuardError> {
        let parsed = cookie::Cookie::parse(line.to_string())
            .map_err(|e| GuardError::CookieParse(e.to_string()))?;

        let domain = parsed
            .domain()
            .map(|d| d.to_lowercase())
            .unwrap_or_else(|| default_domain.to_lowercase());
        let expires = parsed.expires().and_then(|e| e.datetime());

        Ok(CookieRecord {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path: parsed.path().unwrap_or("/").to_string(),
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            session: expires.is_none(),
            expires,
        })
    }
}

/// (name, root domain) pair identifying a cookie across the whitelist,
/// blacklist and temporary blacklist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CookieKey {
    pub name: String,
    pub domain: String,
}

impl CookieKey {
    pub fn new(name: impl Into<String>, domain: &str) -> Self {
        CookieKey {
            name: name.into(),
            domain: psl::prepare_root_domain(domain),
        }
    }
}

/// A cookie-change notification from the platform.
///
/// `cookie` is optional so partial events can be represented and dropped by
/// the classifier's guards instead of panicking upstream.
#[derive(Debug, Clone)]
pub struct CookieEvent {
    pub cookie: Option<CookieRecord>,
    pub removed: bool,
}

impl CookieEvent {
    pub fn added(cookie: CookieRecord) -> Self {
        CookieEvent { cookie: Some(cookie), removed: false }
    }

    pub fn removed(cookie: CookieRecord) -> Self {
        CookieEvent { cookie: Some(cookie), removed: true }
    }
}

/// A cookie annotated with its derived list states, as handed to the
/// display layer by `get_domain_init_cookies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedCookie {
    pub cookie: CookieRecord,
    pub whitelisted: bool,
    pub blacklisted: bool,
}
