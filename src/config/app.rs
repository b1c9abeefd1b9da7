use std::env;
use std::time::Duration as StdDuration;

use super::session::SessionSettings;
use crate::models::user::normalize_email;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Insecure production configuration: {0}")]
    Insecure(String),
}

/// Settings the auth service needs at construction time.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// How long a freshly issued magic link stays redeemable.
    pub invite_ttl: chrono::Duration,
    /// Upper bound on a single mail dispatch.
    pub mail_timeout: StdDuration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            invite_ttl: chrono::Duration::days(7),
            mail_timeout: StdDuration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEncryption {
    Tls,
    StartTls,
    None,
}

/// Which mail transport to use.
#[derive(Clone)]
pub enum MailerSettings {
    /// Write links to the log instead of sending them.
    Log,
    Brevo {
        api_key: String,
        api_base: String,
        sender_email: String,
        sender_name: String,
    },
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        from_email: String,
        from_name: String,
        encryption: SmtpEncryption,
    },
}

impl std::fmt::Debug for MailerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailerSettings::Log => f.write_str("Log"),
            MailerSettings::Brevo {
                api_base,
                sender_email,
                ..
            } => f
                .debug_struct("Brevo")
                .field("api_base", api_base)
                .field("sender_email", sender_email)
                .field("api_key", &"[REDACTED]")
                .finish(),
            MailerSettings::Smtp {
                host,
                port,
                from_email,
                encryption,
                ..
            } => f
                .debug_struct("Smtp")
                .field("host", host)
                .field("port", port)
                .field("from_email", from_email)
                .field("encryption", encryption)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Process-wide configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Used for magic links when the request carries no usable host headers.
    pub app_base_url: String,
    /// Bootstrap administrator; never needs an invitation.
    pub admin_email: Option<String>,
    /// Sign the admin in directly on login instead of mailing a link.
    pub admin_auto_login: bool,
    /// Honour X-Forwarded-* headers for client IP and base URL resolution.
    /// Off unless `TRUST_PROXY_HEADERS` is set; only enable it behind a proxy
    /// that overwrites those headers, or clients can dodge the login limiter.
    pub trust_proxy_headers: bool,
    pub login_rate_per_minute: u32,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub mailer: MailerSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let admin_email = env::var("ADMIN_EMAIL")
            .ok()
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty());
        if admin_email.is_none() {
            tracing::warn!("ADMIN_EMAIL is not set; nobody can bootstrap the admin dashboard");
        }

        Ok(Self {
            session: SessionSettings::from_env(&environment)?,
            environment,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/quickr.db?mode=rwc".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080u16)?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            admin_email,
            admin_auto_login: env_flag_enabled("ADMIN_AUTO_LOGIN"),
            trust_proxy_headers: env_flag_enabled("TRUST_PROXY_HEADERS"),
            login_rate_per_minute: parse_var("LOGIN_RATE_PER_MINUTE", 20u32)?,
            auth: AuthSettings::from_env()?,
            mailer: MailerSettings::from_env()?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            invite_ttl: chrono::Duration::days(parse_var("INVITE_TTL_DAYS", 7i64)?),
            mail_timeout: StdDuration::from_secs(parse_var("MAIL_TIMEOUT_SECS", 10u64)?),
        })
    }
}

impl MailerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(api_key) = env::var("SENDINBLUE_API_KEY") {
            if !api_key.is_empty() {
                return Ok(MailerSettings::Brevo {
                    api_key,
                    api_base: env::var("BREVO_API_BASE")
                        .unwrap_or_else(|_| "https://api.brevo.com".to_string()),
                    sender_email: required_var("SENDER_EMAIL")?,
                    sender_name: env::var("SENDER_NAME").unwrap_or_else(|_| "Quickr".to_string()),
                });
            }
        }

        if let Ok(host) = env::var("SMTP_HOST") {
            let encryption = match env::var("SMTP_ENCRYPTION")
                .unwrap_or_else(|_| "starttls".to_string())
                .to_lowercase()
                .as_str()
            {
                "tls" => SmtpEncryption::Tls,
                "starttls" => SmtpEncryption::StartTls,
                "none" => SmtpEncryption::None,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "SMTP_ENCRYPTION",
                        value: other.to_string(),
                    })
                }
            };

            return Ok(MailerSettings::Smtp {
                host,
                port: parse_var("SMTP_PORT", 587u16)?,
                username: required_var("SMTP_USERNAME")?,
                password: required_var("SMTP_PASSWORD")?,
                from_email: required_var("SMTP_FROM_EMAIL")?,
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Quickr".to_string()),
                encryption,
            });
        }

        Ok(MailerSettings::Log)
    }
}

pub(crate) fn required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_flag_enabled(key: &str) -> bool {
    env::var(key).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}
