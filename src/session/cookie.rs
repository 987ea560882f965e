use chrono::Utc;

use super::SessionCredential;
use crate::config::CookieConfig;

/// Renders the `Set-Cookie` value for an issued session.
pub struct SessionCookie;

impl SessionCookie {
    pub fn build(config: &CookieConfig, credential: &SessionCredential) -> String {
        let max_age = (credential.expires_at - Utc::now()).num_seconds().max(0);

        let mut cookie = format!("{}={}", config.name, credential.cookie_value);

        if let Some(ref domain) = config.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str("; Path=/");

        if config.secure {
            cookie.push_str("; Secure");
        }

        if config.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", config.same_site));
        cookie.push_str(&format!("; Max-Age={}", max_age));

        cookie
    }
}
