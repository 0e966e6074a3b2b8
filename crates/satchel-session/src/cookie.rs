//! Session cookie issuance and lookup.

use std::fmt;
use std::time::Duration;

use satchel_config::{CookieSection, SameSite};

/// How the session cookie is issued. Absent when cookies are disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub max_age: Option<Duration>,
}

impl CookieSettings {
    /// Settings from the `[session.cookie]` section, `None` when the cookie
    /// name disables cookies.
    pub fn from_section(section: &CookieSection) -> Option<Self> {
        let name = section.enabled_name()?;
        Some(Self {
            name: name.to_string(),
            path: section.path.clone(),
            domain: section.domain.clone(),
            secure: section.secure,
            http_only: section.http_only,
            same_site: section.same_site,
            max_age: section.max_age.map(|m| m.as_duration()),
        })
    }

    /// Whether the cookie is re-sent on every response to roll its expiry.
    pub fn keep_alive(&self) -> bool {
        self.max_age.is_some()
    }

    pub fn issue(&self, session_id: &str) -> SetCookie {
        SetCookie {
            name: self.name.clone(),
            value: session_id.to_string(),
            path: self.path.clone(),
            domain: self.domain.clone(),
            secure: self.secure,
            http_only: self.http_only,
            same_site: self.same_site,
            max_age: self.max_age.map(|d| d.as_secs()),
        }
    }

    /// Session identity carried by a `Cookie` request header.
    pub fn find_in_header(&self, cookie_header: &str) -> Option<String> {
        cookie_value(cookie_header, &self.name)
    }
}

/// One cookie to send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub max_age: Option<u64>,
}

impl fmt::Display for SetCookie {
    /// Renders the value of a `Set-Cookie` response header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; Path={}", self.path)?;
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }
        Ok(())
    }
}

/// Value of cookie `name` in a `Cookie` header, ignoring empty values.
pub fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.trim().trim_matches('"');
        (key.trim() == name && !value.is_empty()).then(|| value.to_string())
    })
}
