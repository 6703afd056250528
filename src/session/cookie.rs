//! Session cookie encoding.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};

/// Fixed attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    /// `Secure` attribute; on in production.
    pub secure: bool,
}

impl CookieSettings {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    /// Session id presented in the request's `Cookie` headers, if any.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(Result::ok)
            .find(|c| c.name() == self.name)
            .map(|c| c.value().to_string())
    }

    fn build(&self, value: String, max_age: Duration) -> Cookie<'static> {
        let max_age = cookie::time::Duration::seconds(max_age.as_secs().min(i64::MAX as u64) as i64);
        Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(max_age)
            .build()
    }

    /// Append a `Set-Cookie` carrying `session_id`, valid for `max_age`.
    pub fn set(&self, headers: &mut HeaderMap, session_id: &str, max_age: Duration) {
        append(headers, self.build(session_id.to_string(), max_age));
    }

    /// Append a `Set-Cookie` that removes the session cookie.
    pub fn clear(&self, headers: &mut HeaderMap) {
        let mut cookie = self.build(String::new(), Duration::ZERO);
        cookie.make_removal();
        append(headers, cookie);
    }
}

fn append(headers: &mut HeaderMap, cookie: Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unencodable Set-Cookie header"),
    }
}
