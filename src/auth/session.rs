//! Stateless sessions: an HS256-signed token carried in an HttpOnly cookie.
//!
//! The cookie is the only session record. Revoking a user therefore cannot
//! invalidate tokens already issued; request guards re-check the user's
//! disabled flag on every call instead.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionSettings;
use crate::models::user::{Identity, Role};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to sign session: {0}")]
    Encoding(String),
    #[error("Session expired")]
    Expired,
    #[error("Invalid session")]
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Email of the signed-in user
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    settings: SessionSettings,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("encoding_key", &"[REDACTED]")
            .finish()
    }
}

impl SessionManager {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&settings.secret),
            decoding_key: DecodingKey::from_secret(&settings.secret),
            settings: settings.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    /// Sign a session token for the identity, valid for the configured max age.
    pub fn issue(&self, identity: &Identity) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: identity.email.clone(),
            role: identity.role,
            iat: now,
            exp: now + self.settings.max_age.whole_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Encoding(e.to_string()))
    }

    /// Verify signature and expiry and recover the identity.
    pub fn parse(&self, token: &str) -> Result<Identity, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            }
        })?;

        Ok(Identity::new(data.claims.sub, data.claims.role))
    }

    /// Attach a fresh session cookie for the identity.
    pub fn sign_in(&self, jar: CookieJar, identity: &Identity) -> Result<CookieJar, SessionError> {
        let token = self.issue(identity)?;
        let cookie = Cookie::build((self.settings.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(self.settings.max_age);

        Ok(jar.add(cookie))
    }

    /// Identity from the request's session cookie, if it is present and valid.
    pub fn identity_from(&self, jar: &CookieJar) -> Option<Identity> {
        let cookie = jar.get(&self.settings.cookie_name)?;
        match self.parse(cookie.value()) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!("Rejected session cookie: {}", e);
                None
            }
        }
    }

    /// Overwrite the session cookie with an expired one.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let cookie = Cookie::build((self.settings.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO);

        jar.add(cookie)
    }
}
