use std::env;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use time::Duration;

use super::app::{env_flag_enabled, required_var, AppConfig, ConfigError};

/// Minimum decoded length of `JWT_SECRET` accepted in production.
pub const MIN_PRODUCTION_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct SessionSettings {
    pub secret: Vec<u8>,
    pub cookie_name: String,
    pub max_age: Duration,
    pub secure: bool,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("cookie_name", &self.cookie_name)
            .field("max_age", &self.max_age)
            .field("secure", &self.secure)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SessionSettings {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: "session".to_string(),
            max_age: Duration::days(180),
            secure: true,
        }
    }

    pub fn from_env(environment: &str) -> Result<Self, ConfigError> {
        let raw_secret = required_var("JWT_SECRET")?;
        if environment == "production" && looks_like_placeholder(&raw_secret) {
            return Err(ConfigError::Insecure(
                "JWT_SECRET appears to be a default value".to_string(),
            ));
        }
        let secret = decode_secret_bytes(&raw_secret);

        let max_age_days = match env::var("SESSION_MAX_AGE_DAYS") {
            Ok(raw) => raw.trim().parse::<i64>().map_err(|_| ConfigError::Invalid {
                key: "SESSION_MAX_AGE_DAYS",
                value: raw,
            })?,
            Err(_) => 180,
        };

        // Plain-http development servers can't carry Secure cookies
        let secure = match env::var("SECURE_COOKIES") {
            Ok(_) => env_flag_enabled("SECURE_COOKIES"),
            Err(_) => environment == "production",
        };

        Ok(Self {
            secret,
            cookie_name: env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "session".to_string()),
            max_age: Duration::days(max_age_days),
            secure,
        })
    }
}

/// Refuse to start a production server with a guessable signing key or
/// cookies that would travel over plain http.
pub fn validate_production_config(config: &AppConfig) -> Result<(), ConfigError> {
    if !config.is_production() {
        return Ok(());
    }

    if !config.session.secure {
        return Err(ConfigError::Insecure(
            "session cookies must be Secure in production (SECURE_COOKIES=true)".to_string(),
        ));
    }

    if config.session.secret.len() < MIN_PRODUCTION_SECRET_BYTES {
        return Err(ConfigError::Insecure(format!(
            "JWT_SECRET must be at least {} bytes",
            MIN_PRODUCTION_SECRET_BYTES
        )));
    }

    if looks_like_placeholder(&String::from_utf8_lossy(&config.session.secret)) {
        return Err(ConfigError::Insecure(
            "JWT_SECRET appears to be a default value".to_string(),
        ));
    }

    Ok(())
}

fn looks_like_placeholder(secret: &str) -> bool {
    let lowered = secret.to_ascii_lowercase();
    lowered.contains("example") || lowered.contains("changeme") || lowered.contains("default")
}

/// Accept either a base64 secret or raw text.
fn decode_secret_bytes(secret: &str) -> Vec<u8> {
    STANDARD
        .decode(secret.trim().as_bytes())
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_secrets_are_decoded() {
        let encoded = STANDARD.encode([7u8; 48]);
        assert_eq!(decode_secret_bytes(&encoded), vec![7u8; 48]);
    }

    #[test]
    fn raw_secrets_are_used_verbatim() {
        assert_eq!(decode_secret_bytes("not base64!"), b"not base64!".to_vec());
    }
}
