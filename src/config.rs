const PLACEHOLDER_SECRET: &str = "CHANGE_ME_SESSION_SIGNING_SECRET";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Guards the audit log API. When unset the admin routes reject every request.
    pub admin_key: Option<String>,
    /// Product name. Used as the session cookie name and the JWT issuer.
    pub service_name: String,
    pub token: TokenConfig,
    pub session: SessionConfig,
    pub audit_log: AuditLogConfig,
    /// Interval of the expired-token purge job. 0 = disabled.
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Seconds between token creation and expiry.
    pub lifespan_secs: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Also return the session JWT in the `X-Auth-Token` response header.
    pub enable_auth_token_header: bool,
    pub lifespan_secs: i64,
    pub signing_secret: String,
    pub cookie: CookieConfig,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogConfig {
    pub storage: AuditStorageConfig,
    pub console_output: AuditConsoleConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AuditStorageConfig {
    /// When false, audit entries are only written to the log output.
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AuditConsoleConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        let service_name = "hanko".to_string();
        Self {
            port: 8000,
            database_url: "postgres://localhost/token_exchange".into(),
            admin_key: None,
            token: TokenConfig { lifespan_secs: 60 },
            session: SessionConfig {
                enable_auth_token_header: true,
                lifespan_secs: 12 * 60 * 60,
                signing_secret: PLACEHOLDER_SECRET.into(),
                cookie: CookieConfig {
                    name: service_name.clone(),
                    domain: None,
                    secure: true,
                    http_only: true,
                    same_site: "Lax".into(),
                },
            },
            audit_log: AuditLogConfig {
                storage: AuditStorageConfig { enabled: true },
                console_output: AuditConsoleConfig { enabled: true },
            },
            service_name,
            cleanup_interval_secs: 600,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let signing_secret = std::env::var("EXCHANGE_SESSION_SECRET")
        .unwrap_or_else(|_| PLACEHOLDER_SECRET.into());

    let service_name = std::env::var("EXCHANGE_SERVICE_NAME").unwrap_or(defaults.service_name);

    Ok(Config {
        port: env_or("EXCHANGE_PORT", defaults.port),
        database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        admin_key: std::env::var("EXCHANGE_ADMIN_KEY")
            .ok()
            .filter(|k| !k.is_empty()),
        token: TokenConfig {
            lifespan_secs: env_or("EXCHANGE_TOKEN_LIFESPAN", defaults.token.lifespan_secs),
        },
        session: SessionConfig {
            enable_auth_token_header: env_flag(
                "EXCHANGE_ENABLE_AUTH_TOKEN_HEADER",
                defaults.session.enable_auth_token_header,
            ),
            lifespan_secs: env_or("EXCHANGE_SESSION_LIFESPAN", defaults.session.lifespan_secs),
            signing_secret,
            cookie: CookieConfig {
                name: std::env::var("EXCHANGE_COOKIE_NAME").unwrap_or_else(|_| service_name.clone()),
                domain: std::env::var("EXCHANGE_COOKIE_DOMAIN").ok(),
                secure: env_flag("EXCHANGE_COOKIE_SECURE", defaults.session.cookie.secure),
                http_only: defaults.session.cookie.http_only,
                same_site: std::env::var("EXCHANGE_COOKIE_SAME_SITE")
                    .unwrap_or(defaults.session.cookie.same_site),
            },
        },
        audit_log: AuditLogConfig {
            storage: AuditStorageConfig {
                enabled: env_flag(
                    "EXCHANGE_AUDIT_STORAGE_ENABLED",
                    defaults.audit_log.storage.enabled,
                ),
            },
            console_output: AuditConsoleConfig {
                enabled: env_flag(
                    "EXCHANGE_AUDIT_CONSOLE_ENABLED",
                    defaults.audit_log.console_output.enabled,
                ),
            },
        },
        service_name,
        cleanup_interval_secs: env_or("EXCHANGE_CLEANUP_INTERVAL", defaults.cleanup_interval_secs),
    })
}

impl Config {
    /// Refuse the placeholder signing secret in production. Only commands
    /// that issue sessions need this.
    pub fn ensure_session_secret(&self) -> anyhow::Result<()> {
        let env_mode = std::env::var("EXCHANGE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        check_session_secret(&self.session.signing_secret, env_mode == "production")
    }
}

fn check_session_secret(secret: &str, production: bool) -> anyhow::Result<()> {
    if secret != PLACEHOLDER_SECRET {
        return Ok(());
    }
    if production {
        anyhow::bail!(
            "EXCHANGE_SESSION_SECRET is still the insecure placeholder. \
             Set a proper secret before running in production."
        );
    }
    tracing::warn!("EXCHANGE_SESSION_SECRET is not set, using insecure placeholder");
    Ok(())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => parse_flag(&v).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_defaults_enable_header_and_storage() {
        let cfg = Config::default();
        assert!(cfg.session.enable_auth_token_header);
        assert!(cfg.audit_log.storage.enabled);
        assert_eq!(cfg.session.cookie.name, cfg.service_name);
        assert_eq!(cfg.token.lifespan_secs, 60);
    }

    #[test]
    fn test_placeholder_secret_only_refused_in_production() {
        assert!(check_session_secret(PLACEHOLDER_SECRET, true).is_err());
        assert!(check_session_secret(PLACEHOLDER_SECRET, false).is_ok());
        assert!(check_session_secret("a-real-secret-0123456789", true).is_ok());
    }
}
